//! Control-plane command runner.
//!
//! Commands are single-shot: nothing here retries. Callers decide whether a
//! failure is fatal (setup, teardown) or just "not converged yet" (probes).

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout and stderr.
    pub output: String,
    /// Whether the command exited successfully.
    pub success: bool,
}

impl CommandOutput {
    /// Creates a successful output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    /// Creates a failed output.
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }

    /// Returns the output, or an error carrying it if the command failed.
    pub fn into_result(self, command: impl Into<String>) -> Result<String> {
        if self.success {
            Ok(self.output)
        } else {
            Err(Error::Command {
                command: command.into(),
                output: self.output,
            })
        }
    }
}

/// Executes control-plane commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command with `args`, scoped to `namespace` when given.
    ///
    /// Returns `Err` only if the command could not be started; an
    /// unsuccessful exit is reported through [`CommandOutput::success`].
    async fn run(&self, args: &[String], namespace: Option<&str>) -> Result<CommandOutput>;
}

/// Runs the real `kubectl` binary.
#[derive(Debug, Clone)]
pub struct KubectlCli {
    /// Path to the kubectl binary.
    cli_path: String,
}

impl Default for KubectlCli {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlCli {
    /// Creates a runner using the default `kubectl` command.
    pub fn new() -> Self {
        Self {
            cli_path: "kubectl".to_string(),
        }
    }

    /// Creates a runner with a custom binary path.
    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    fn build_args(args: &[String], namespace: Option<&str>) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(ns) = namespace {
            full.push("-n".to_string());
            full.push(ns.to_string());
        }
        full.extend(args.iter().cloned());
        full
    }
}

#[async_trait]
impl CommandRunner for KubectlCli {
    async fn run(&self, args: &[String], namespace: Option<&str>) -> Result<CommandOutput> {
        let args = Self::build_args(args, namespace);
        tracing::debug!(cmd = %self.cli_path, args = ?args, "running command");

        let output = Command::new(&self.cli_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Config(format!("failed to run {}: {}", self.cli_path, e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            output: text,
            success: output.status.success(),
        })
    }
}

/// Verb-level handle over a [`CommandRunner`], optionally namespace scoped.
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    namespace: Option<String>,
}

impl std::fmt::Debug for Kubectl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kubectl")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Kubectl {
    /// Creates an unscoped handle.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            namespace: None,
        }
    }

    /// Returns a copy scoped to `namespace`.
    pub fn namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            namespace: Some(namespace.into()),
        }
    }

    /// Returns the current namespace scope.
    pub fn current_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Runs `verb args...` and returns the raw output, successful or not.
    pub async fn run(&self, verb: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(verb.to_string());
        full.extend(args.iter().map(|a| a.to_string()));
        self.runner.run(&full, self.namespace.as_deref()).await
    }

    async fn run_checked(&self, verb: &str, args: &[&str]) -> Result<String> {
        let command = self.describe(verb, args);
        self.run(verb, args).await?.into_result(command)
    }

    fn describe(&self, verb: &str, args: &[&str]) -> String {
        let mut parts = vec!["kubectl".to_string()];
        if let Some(ns) = &self.namespace {
            parts.push(format!("-n {}", ns));
        }
        parts.push(verb.to_string());
        parts.extend(args.iter().map(|a| a.to_string()));
        parts.join(" ")
    }

    pub async fn create(&self, args: &[&str]) -> Result<String> {
        self.run_checked("create", args).await
    }

    pub async fn apply(&self, args: &[&str]) -> Result<String> {
        self.run_checked("apply", args).await
    }

    pub async fn get(&self, args: &[&str]) -> Result<String> {
        self.run_checked("get", args).await
    }

    pub async fn delete(&self, args: &[&str]) -> Result<String> {
        self.run_checked("delete", args).await
    }

    /// Runs `get` for polling: returns the output text even when the
    /// command fails, so a missing resource simply reads as "not yet".
    pub async fn probe(&self, args: &[&str]) -> String {
        match self.run("get", args).await {
            Ok(out) => out.output,
            Err(e) => e.to_string(),
        }
    }
}
