//! Test environment configuration.
//!
//! A [`TestEnv`] is built once at startup (from a TOML file or the process
//! environment) and handed to every scenario. Nothing reads the environment
//! after construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::eventually::PollSettings;

/// Pause applied before teardown when `FLEET_DEBUG` is set.
pub const DEBUG_PAUSE_SECS: u64 = 300;

/// Problems found in a configuration. Errors block a run, warnings are
/// only logged.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Folds the findings of a nested section (the git server) into these.
    fn absorb(&mut self, section: &str, other: ValidationResult) {
        self.errors
            .extend(other.errors.into_iter().map(|e| format!("{}: {}", section, e)));
        self.warnings
            .extend(other.warnings.into_iter().map(|w| format!("{}: {}", section, w)));
    }

    /// Returns the warnings, or every error joined into one [`Error::Config`].
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Checked before a [`TestEnv`] is handed to a runner.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

/// Connection details for the git server the controller pulls from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitServerConfig {
    /// Clone URL reachable by both the harness and the controller.
    pub url: String,
    /// Host scanned into the trust file. `None` for local remotes.
    #[serde(default)]
    pub host: Option<String>,
    /// Private key used for pushes and stored in the credential secret.
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
    /// Public half of `ssh_key`.
    #[serde(default)]
    pub ssh_public_key: Option<PathBuf>,
    /// Branch the controller tracks.
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "master".to_string()
}

impl GitServerConfig {
    /// Creates a config for the given clone URL with no SSH material.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            host: None,
            ssh_key: None,
            ssh_public_key: None,
            branch: default_branch(),
        }
    }
}

impl Validate for GitServerConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.url.trim().is_empty() {
            result.add_error("git url cannot be empty");
        }
        if self.branch.trim().is_empty() {
            result.add_error("git branch cannot be empty");
        }
        if self.ssh_key.is_some() != self.ssh_public_key.is_some() {
            result.add_error("ssh_key and ssh_public_key must be set together");
        }
        if self.ssh_key.is_some() && self.host.is_none() {
            result.add_warning("ssh_key set without host - known_hosts will be empty");
        }

        result
    }
}

/// Process-wide harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestEnv {
    /// kubectl binary.
    pub kubectl: String,
    /// Namespace the controller watches for GitRepo resources.
    pub namespace: String,
    /// Global convergence deadline, in seconds.
    pub timeout_secs: u64,
    /// Delay between polling ticks, in milliseconds.
    pub poll_interval_ms: u64,
    /// Root of the static asset tree.
    pub assets_dir: PathBuf,
    /// Pause before teardown, for manual inspection.
    pub debug_pause_secs: Option<u64>,
    /// Git server used by the git-driven scenarios.
    pub git: Option<GitServerConfig>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            namespace: "fleet-local".to_string(),
            timeout_secs: 300,
            poll_interval_ms: 1000,
            assets_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets"),
            debug_pause_secs: None,
            git: None,
        }
    }
}

impl TestEnv {
    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;

        toml::from_str(&content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Builds a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut env = Self::default();

        if let Some(ns) = lookup("FLEET_E2E_NAMESPACE") {
            env.namespace = ns;
        }
        if let Some(timeout) = lookup("FLEET_E2E_TIMEOUT") {
            env.timeout_secs = timeout.parse().map_err(|_| {
                Error::Config(format!("FLEET_E2E_TIMEOUT is not a number: {}", timeout))
            })?;
        }
        if let Some(assets) = lookup("FLEET_E2E_ASSETS") {
            env.assets_dir = PathBuf::from(assets);
        }
        if lookup("FLEET_DEBUG").is_some() {
            env.debug_pause_secs = Some(DEBUG_PAUSE_SECS);
        }

        if let Some(url) = lookup("GIT_REPO_URL") {
            let mut git = GitServerConfig::new(url);
            git.host = lookup("GIT_REPO_HOST");
            git.ssh_key = lookup("GIT_SSH_KEY").map(PathBuf::from);
            git.ssh_public_key = lookup("GIT_SSH_PUBKEY").map(PathBuf::from);
            if let Some(branch) = lookup("GIT_REPO_BRANCH") {
                git.branch = branch;
            }
            env.git = Some(git);
        }

        Ok(env)
    }

    /// Returns the polling schedule shared by every assertion.
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    /// Returns the debug pause as a Duration.
    pub fn debug_pause(&self) -> Option<Duration> {
        self.debug_pause_secs.map(Duration::from_secs)
    }

    /// Resolves a path relative to the asset tree.
    pub fn asset_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.assets_dir.join(relative)
    }
}

impl Validate for TestEnv {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.namespace.trim().is_empty() {
            result.add_error("namespace cannot be empty");
        }
        if self.kubectl.trim().is_empty() {
            result.add_error("kubectl binary cannot be empty");
        }
        if self.poll_interval_ms == 0 {
            result.add_error("poll_interval_ms must be greater than zero");
        }
        if Duration::from_millis(self.poll_interval_ms) >= Duration::from_secs(self.timeout_secs) {
            result.add_error("poll interval must be shorter than timeout");
        }
        if self.timeout_secs > 3600 {
            result.add_warning("timeout over 1 hour may indicate a misconfiguration");
        }
        if !self.assets_dir.is_dir() {
            result.add_warning(format!(
                "assets_dir '{}' does not exist",
                self.assets_dir.display()
            ));
        }
        if let Some(git) = &self.git {
            result.absorb("git", git.validate());
        }

        result
    }
}
