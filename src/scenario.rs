//! Per-scenario fixture lifecycle.
//!
//! Each scenario moves through
//! `Uninitialized -> FixturesProvisioned -> ResourceApplied -> Running -> TornDown`.
//! Teardown runs exactly once per scenario, whether provisioning failed, the
//! body returned an error, or the body panicked.
//!
//! Fixtures created here never collide: every workspace is a fresh temp
//! directory and every generated resource name carries a random suffix.
//! Resources named inside static assets are not covered by this; scenarios
//! applying such assets must not run concurrently with each other.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::config::{TestEnv, Validate};
use crate::error::{Error, Result};
use crate::eventually::{eventually, Matcher, PollSettings};
use crate::git::{replace_in_file, GitRepo, GitServer};
use crate::kubectl::{CommandRunner, Kubectl, KubectlCli};
use crate::template::GitRepoResource;

/// Lifecycle state of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Uninitialized,
    FixturesProvisioned,
    ResourceApplied,
    Running,
    TornDown,
}

/// What a scenario deploys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    /// Apply a static resource file from the asset tree.
    Asset {
        /// Path relative to the asset tree.
        path: PathBuf,
    },
    /// Publish an asset directory to the git server and point a GitRepo at it.
    Git {
        /// Directory relative to the asset tree.
        asset: PathBuf,
        /// Where the asset lands inside the repository.
        #[serde(default = "default_subpath")]
        subpath: String,
        /// Repository paths the GitRepo deploys; defaults to `subpath`.
        #[serde(default)]
        paths: Vec<String>,
    },
}

fn default_subpath() -> String {
    "examples".to_string()
}

/// Generates `<prefix>-<8 hex chars>`.
pub fn unique_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..8])
}

enum Cleanup {
    /// `kubectl delete -f <path>`
    DeleteFile(PathBuf),
    /// `kubectl delete <kind> <name>`
    DeleteResource { kind: String, name: String },
    /// Removes the fixture's branch from the git server.
    RemoteBranch,
}

/// Handles owned by one running scenario.
pub struct ScenarioContext {
    name: String,
    state: ScenarioState,
    kubectl: Kubectl,
    settings: PollSettings,
    workspace: Option<TempDir>,
    git: Option<GitServer>,
    repo: Option<GitRepo>,
    resource_name: Option<String>,
    cleanups: Vec<Cleanup>,
}

impl std::fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("workspace", &self.workspace())
            .field("resource_name", &self.resource_name)
            .finish_non_exhaustive()
    }
}

impl ScenarioContext {
    fn new(name: &str, kubectl: Kubectl, settings: PollSettings) -> Self {
        Self {
            name: name.to_string(),
            state: ScenarioState::Uninitialized,
            kubectl,
            settings,
            workspace: None,
            git: None,
            repo: None,
            resource_name: None,
            cleanups: Vec::new(),
        }
    }

    fn transition(&mut self, next: ScenarioState) {
        tracing::info!(scenario = %self.name, from = ?self.state, to = ?next, "scenario state");
        self.state = next;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    /// kubectl scoped to the controller's namespace.
    pub fn kubectl(&self) -> &Kubectl {
        &self.kubectl
    }

    pub fn namespace(&self) -> &str {
        self.kubectl.current_namespace().unwrap_or_default()
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// The scenario's temp directory, once provisioned.
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_ref().map(TempDir::path)
    }

    /// The repository working copy, for git-driven scenarios.
    pub fn repo_dir(&self) -> Option<&Path> {
        self.repo.as_ref().map(GitRepo::path)
    }

    /// Name of the generated GitRepo resource, for git-driven scenarios.
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// Most recently published commit hash.
    pub fn latest_commit(&self) -> Option<&str> {
        self.repo.as_ref().and_then(GitRepo::head)
    }

    /// Substitutes text in a file of the working copy.
    pub fn edit(&self, file: impl AsRef<Path>, search: &str, replace: &str) -> Result<()> {
        let dir = self
            .repo_dir()
            .ok_or_else(|| Error::Precondition("edit needs a git-driven scenario".to_string()))?;
        replace_in_file(dir.join(file), search, replace)
    }

    /// Commits and pushes pending edits, returning the new commit hash.
    pub fn publish(&mut self) -> Result<String> {
        match (&self.git, &mut self.repo) {
            (Some(git), Some(repo)) => git.update(repo),
            _ => Err(Error::Precondition(
                "publish needs a git-driven scenario".to_string(),
            )),
        }
    }

    /// Expands `{commit}`, `{gitrepo}` and `{namespace}` placeholders.
    pub fn expand(&self, template: &str) -> Result<String> {
        let mut out = template.replace("{namespace}", self.namespace());

        if out.contains("{commit}") {
            let commit = self.latest_commit().ok_or_else(|| {
                Error::Precondition(format!("no commit published for {:?}", template))
            })?;
            out = out.replace("{commit}", commit);
        }
        if out.contains("{gitrepo}") {
            let name = self.resource_name().ok_or_else(|| {
                Error::Precondition(format!("no GitRepo resource for {:?}", template))
            })?;
            out = out.replace("{gitrepo}", name);
        }

        Ok(out)
    }

    /// Polls `kubectl get <args>` until `matcher` holds on its output.
    ///
    /// `namespace` overrides the controller namespace for this probe.
    pub async fn expect_get<M>(
        &self,
        description: &str,
        args: &[String],
        namespace: Option<&str>,
        matcher: &M,
    ) -> Result<String>
    where
        M: Matcher<String> + ?Sized,
    {
        let kubectl = match namespace {
            Some(ns) => self.kubectl.namespace(ns),
            None => self.kubectl.clone(),
        };

        eventually(
            &self.settings,
            description,
            || {
                let kubectl = kubectl.clone();
                let args = args.to_vec();
                async move {
                    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
                    kubectl.probe(&refs).await
                }
            },
            matcher,
        )
        .await
    }
}

/// The assertions of a scenario, run once its fixtures are in place.
#[async_trait]
pub trait ScenarioBody: Send + Sync {
    async fn execute(&self, ctx: &mut ScenarioContext) -> Result<()>;
}

/// Outcome of one scenario run.
#[derive(Debug)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Setup or body failure, or teardown failure of a passing body.
    pub outcome: Result<()>,
    /// Every cleanup failure, including ones hidden behind `outcome`.
    pub teardown_errors: Vec<String>,
    /// State the scenario reached before teardown.
    pub reached: ScenarioState,
    pub duration: Duration,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<()> {
        self.outcome
    }
}

/// Provisions, runs and tears down scenarios.
pub struct ScenarioRunner {
    env: TestEnv,
    kubectl: Kubectl,
}

impl std::fmt::Debug for ScenarioRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl ScenarioRunner {
    /// Creates a runner issuing commands through `runner`.
    pub fn new(env: TestEnv, runner: Arc<dyn CommandRunner>) -> Self {
        let kubectl = Kubectl::new(runner).namespace(env.namespace.clone());
        Self { env, kubectl }
    }

    /// Creates a runner using the kubectl binary named in `env`.
    ///
    /// Fails if `env` does not validate; warnings are logged.
    pub fn with_kubectl_cli(env: TestEnv) -> Result<Self> {
        for warning in env.validate().into_result()? {
            tracing::warn!(%warning, "configuration warning");
        }
        let cli = KubectlCli::with_cli_path(env.kubectl.clone());
        Ok(Self::new(env, Arc::new(cli)))
    }

    pub fn env(&self) -> &TestEnv {
        &self.env
    }

    /// Runs `body` against freshly provisioned fixtures for `source`.
    ///
    /// A panic in the body is re-raised after teardown.
    pub async fn run(&self, name: &str, source: &Source, body: &dyn ScenarioBody) -> ScenarioReport {
        let start = Instant::now();
        let mut ctx = ScenarioContext::new(name, self.kubectl.clone(), self.env.poll_settings());

        tracing::info!(scenario = %name, "starting scenario");

        let outcome = AssertUnwindSafe(async {
            self.provision(&mut ctx, source).await?;
            ctx.transition(ScenarioState::Running);
            body.execute(&mut ctx).await
        })
        .catch_unwind()
        .await;

        let reached = ctx.state;
        let teardown_errors = teardown(&mut ctx, self.env.debug_pause()).await;

        let outcome = match outcome {
            Ok(result) => result,
            Err(panic) => {
                tracing::error!(scenario = %name, "scenario panicked");
                std::panic::resume_unwind(panic);
            }
        };

        let outcome = match outcome {
            Err(e) => {
                if !teardown_errors.is_empty() {
                    tracing::error!(
                        scenario = %name,
                        errors = ?teardown_errors,
                        "teardown also failed"
                    );
                }
                Err(e)
            }
            Ok(()) if !teardown_errors.is_empty() => Err(Error::Teardown(teardown_errors.clone())),
            Ok(()) => Ok(()),
        };

        let duration = start.elapsed();
        match &outcome {
            Ok(()) => tracing::info!(scenario = %name, ?duration, "scenario passed"),
            Err(e) => tracing::warn!(scenario = %name, error = %e, "scenario failed"),
        }

        ScenarioReport {
            name: name.to_string(),
            outcome,
            teardown_errors,
            reached,
            duration,
        }
    }

    async fn provision(&self, ctx: &mut ScenarioContext, source: &Source) -> Result<()> {
        let workspace = tempfile::Builder::new().prefix("fleet-").tempdir()?;
        let root = workspace.path().to_path_buf();
        ctx.workspace = Some(workspace);

        match source {
            Source::Asset { path } => {
                ctx.transition(ScenarioState::FixturesProvisioned);

                let asset = self.env.asset_path(path);
                let file = asset.to_string_lossy().into_owned();
                ctx.kubectl.apply(&["-f", file.as_str()]).await?;
                ctx.cleanups.push(Cleanup::DeleteFile(asset));
            }
            Source::Git {
                asset,
                subpath,
                paths,
            } => {
                let config = self.env.git.clone().ok_or_else(|| {
                    Error::Config("git-driven scenario needs a git server".to_string())
                })?;
                let server = GitServer::new(config);

                let secret = unique_name("git-auth");
                create_credential(&ctx.kubectl, &server, &secret).await?;
                ctx.cleanups.push(Cleanup::DeleteResource {
                    kind: "secret".to_string(),
                    name: secret.clone(),
                });

                let known_hosts = server.register_trust(root.join("known_hosts"))?;
                let branch = unique_name(&server.config().branch);
                let repo = server.create_on_branch(
                    &known_hosts,
                    root.join("repo"),
                    self.env.asset_path(asset),
                    subpath,
                    &branch,
                )?;
                ctx.repo = Some(repo);
                ctx.git = Some(server.clone());
                ctx.cleanups.push(Cleanup::RemoteBranch);
                ctx.transition(ScenarioState::FixturesProvisioned);

                let name = unique_name("testing");
                let paths = if paths.is_empty() {
                    vec![subpath.clone()]
                } else {
                    paths.clone()
                };
                let yaml = GitRepoResource::new(
                    name.clone(),
                    server.url(),
                    secret,
                    branch,
                    paths,
                )
                .render()?;
                let file = root.join("gitrepo.yaml");
                std::fs::write(&file, yaml)?;

                let file = file.to_string_lossy().into_owned();
                ctx.kubectl.apply(&["-f", file.as_str()]).await?;
                ctx.cleanups.push(Cleanup::DeleteResource {
                    kind: "gitrepo".to_string(),
                    name: name.clone(),
                });
                ctx.resource_name = Some(name);
            }
        }

        ctx.transition(ScenarioState::ResourceApplied);
        Ok(())
    }
}

async fn create_credential(kubectl: &Kubectl, server: &GitServer, name: &str) -> Result<()> {
    let config = server.config();
    match (&config.ssh_key, &config.ssh_public_key) {
        (Some(key), Some(public)) => {
            let private = format!("--from-file=ssh-privatekey={}", key.display());
            let public = format!("--from-file=ssh-publickey={}", public.display());
            kubectl
                .create(&[
                    "secret",
                    "generic",
                    name,
                    "--type",
                    "kubernetes.io/ssh-auth",
                    private.as_str(),
                    public.as_str(),
                ])
                .await?;
        }
        _ => {
            kubectl.create(&["secret", "generic", name]).await?;
        }
    }
    Ok(())
}

/// Undoes everything provisioning created, newest first.
///
/// Returns one message per failed cleanup. Calling it again is a no-op.
async fn teardown(ctx: &mut ScenarioContext, debug_pause: Option<Duration>) -> Vec<String> {
    if ctx.state == ScenarioState::TornDown {
        return Vec::new();
    }

    if let Some(pause) = debug_pause {
        tracing::info!(scenario = %ctx.name, ?pause, "pausing before teardown");
        tokio::time::sleep(pause).await;
    }

    let mut errors = Vec::new();
    while let Some(cleanup) = ctx.cleanups.pop() {
        let result = match &cleanup {
            Cleanup::DeleteFile(path) => {
                let file = path.to_string_lossy();
                ctx.kubectl.delete(&["-f", &*file]).await
            }
            Cleanup::DeleteResource { kind, name } => {
                ctx.kubectl.delete(&[kind.as_str(), name.as_str()]).await
            }
            Cleanup::RemoteBranch => match (&ctx.git, &ctx.repo) {
                (Some(git), Some(repo)) => git.delete_remote_branch(repo).map(|_| String::new()),
                _ => Ok(String::new()),
            },
        };
        if let Err(e) = result {
            tracing::error!(scenario = %ctx.name, error = %e, "cleanup failed");
            errors.push(e.to_string());
        }
    }

    ctx.repo = None;
    ctx.git = None;
    if let Some(workspace) = ctx.workspace.take() {
        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            tracing::error!(scenario = %ctx.name, path = ?path, error = %e, "failed to remove workspace");
            errors.push(format!("failed to remove {}: {}", path.display(), e));
        }
    }

    ctx.transition(ScenarioState::TornDown);
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitServerConfig;
    use crate::eventually::SatisfyAll;
    use crate::kubectl::testing::FakeRunner;
    use crate::kubectl::CommandOutput;
    use std::process::Command;
    use std::sync::Mutex;

    fn env() -> TestEnv {
        TestEnv {
            timeout_secs: 5,
            poll_interval_ms: 100,
            assets_dir: PathBuf::from("/assets"),
            ..Default::default()
        }
    }

    fn manifests() -> Source {
        Source::Asset {
            path: PathBuf::from("single-cluster/manifests.yaml"),
        }
    }

    /// Records what it saw, then behaves as configured.
    #[derive(Default)]
    struct Probe {
        fail: bool,
        panic: bool,
        seen: Mutex<Vec<(PathBuf, Option<String>, ScenarioState)>>,
    }

    #[async_trait]
    impl ScenarioBody for Probe {
        async fn execute(&self, ctx: &mut ScenarioContext) -> Result<()> {
            self.seen.lock().unwrap().push((
                ctx.workspace().unwrap().to_path_buf(),
                ctx.resource_name().map(str::to_string),
                ctx.state(),
            ));
            if self.panic {
                panic!("assertion blew up");
            }
            if self.fail {
                return Err(Error::Precondition("body failed".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn asset_scenario_applies_and_deletes_once() {
        let fake = FakeRunner::new();
        let runner = ScenarioRunner::new(env(), fake.clone());
        let body = Probe::default();

        let report = runner.run("manifests", &manifests(), &body).await;

        assert!(report.passed(), "{:?}", report.outcome);
        assert_eq!(report.reached, ScenarioState::Running);
        assert_eq!(fake.count(&["apply", "-f", "/assets/single-cluster/manifests.yaml"]), 1);
        assert_eq!(fake.count(&["delete", "-f", "/assets/single-cluster/manifests.yaml"]), 1);
        assert!(fake
            .calls()
            .iter()
            .all(|(ns, _)| ns.as_deref() == Some("fleet-local")));

        let seen = body.seen.lock().unwrap();
        assert_eq!(seen[0].2, ScenarioState::Running);
        assert!(!seen[0].0.exists());
    }

    #[tokio::test]
    async fn body_failure_still_tears_down() {
        let fake = FakeRunner::new();
        let runner = ScenarioRunner::new(env(), fake.clone());
        let body = Probe {
            fail: true,
            ..Default::default()
        };

        let report = runner.run("manifests", &manifests(), &body).await;

        assert!(matches!(report.outcome, Err(Error::Precondition(_))));
        assert_eq!(fake.count(&["delete"]), 1);
        assert!(!body.seen.lock().unwrap()[0].0.exists());
    }

    #[tokio::test]
    async fn body_panic_tears_down_then_resumes() {
        let fake = FakeRunner::new();
        let runner = ScenarioRunner::new(env(), fake.clone());
        let body = Probe {
            panic: true,
            ..Default::default()
        };

        let result = AssertUnwindSafe(runner.run("manifests", &manifests(), &body))
            .catch_unwind()
            .await;

        assert!(result.is_err());
        assert_eq!(fake.count(&["delete"]), 1);
        assert!(!body.seen.lock().unwrap()[0].0.exists());
    }

    #[tokio::test]
    async fn setup_failure_skips_body_and_cleans_up() {
        let fake = FakeRunner::new();
        fake.respond(&["apply"], CommandOutput::failed("error: unable to recognize"));
        let runner = ScenarioRunner::new(env(), fake.clone());
        let body = Probe::default();

        let report = runner.run("manifests", &manifests(), &body).await;

        let err = report.outcome.as_ref().unwrap_err();
        assert_eq!(err.output(), Some("error: unable to recognize"));
        assert_eq!(report.reached, ScenarioState::FixturesProvisioned);
        assert!(body.seen.lock().unwrap().is_empty());
        // Nothing was applied, so nothing is deleted.
        assert_eq!(fake.count(&["delete"]), 0);
        assert!(report.teardown_errors.is_empty());
    }

    #[tokio::test]
    async fn teardown_failure_fails_passing_scenario() {
        let fake = FakeRunner::new();
        fake.respond(&["delete"], CommandOutput::failed("error: not found"));
        let runner = ScenarioRunner::new(env(), fake.clone());

        let report = runner.run("manifests", &manifests(), &Probe::default()).await;

        assert!(matches!(report.outcome, Err(Error::Teardown(_))));
        assert_eq!(report.teardown_errors.len(), 1);
    }

    #[tokio::test]
    async fn teardown_failure_does_not_mask_body_failure() {
        let fake = FakeRunner::new();
        fake.respond(&["delete"], CommandOutput::failed("error: not found"));
        let runner = ScenarioRunner::new(env(), fake.clone());
        let body = Probe {
            fail: true,
            ..Default::default()
        };

        let report = runner.run("manifests", &manifests(), &body).await;

        assert!(matches!(report.outcome, Err(Error::Precondition(_))));
        assert_eq!(report.teardown_errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn debug_pause_delays_teardown() {
        let fake = FakeRunner::new();
        let env = TestEnv {
            debug_pause_secs: Some(300),
            ..env()
        };
        let runner = ScenarioRunner::new(env, fake.clone());
        let start = tokio::time::Instant::now();

        let report = runner.run("manifests", &manifests(), &Probe::default()).await;

        assert!(report.passed());
        assert!(start.elapsed() >= Duration::from_secs(300));
    }

    #[tokio::test]
    async fn git_scenario_without_server_is_a_config_error() {
        let fake = FakeRunner::new();
        let runner = ScenarioRunner::new(env(), fake.clone());
        let source = Source::Git {
            asset: PathBuf::from("gitrepo/sleeper-chart"),
            subpath: "examples".to_string(),
            paths: Vec::new(),
        };

        let report = runner.run("gitrepo", &source, &Probe::default()).await;

        assert!(matches!(report.outcome, Err(Error::Config(_))));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn expect_get_polls_until_output_matches() {
        let fake = FakeRunner::new();
        fake.respond(&["get", "pods"], CommandOutput::ok("No resources found"));
        fake.respond(&["get", "pods"], CommandOutput::ok("frontend-1\nredis-1"));
        let ctx = ScenarioContext::new(
            "probe",
            Kubectl::new(fake.clone()).namespace("fleet-local"),
            PollSettings::new(Duration::from_secs(5), Duration::from_millis(10)),
        );

        let out = ctx
            .expect_get(
                "pods",
                &["pods".to_string()],
                Some("fleet-manifest-example"),
                &SatisfyAll::<String>::substrings(["frontend-", "redis-"]),
            )
            .await
            .unwrap();

        assert!(out.contains("redis-1"));
        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.as_deref(), Some("fleet-manifest-example"));
    }

    #[test]
    fn expand_requires_published_commit() {
        let ctx = ScenarioContext::new(
            "expand",
            Kubectl::new(FakeRunner::new()).namespace("fleet-local"),
            PollSettings::default(),
        );

        assert_eq!(ctx.expand("ns={namespace}").unwrap(), "ns=fleet-local");
        assert!(matches!(
            ctx.expand("commit: {commit}"),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn kubectl_runner_rejects_zero_poll_interval() {
        let env = TestEnv {
            poll_interval_ms: 0,
            ..Default::default()
        };
        let err = ScenarioRunner::with_kubectl_cli(env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unique_names_differ() {
        let a = unique_name("testing");
        let b = unique_name("testing");
        assert_ne!(a, b);
        assert!(a.starts_with("testing-"));
        assert_eq!(a.len(), "testing-".len() + 8);
    }

    fn git_env(root: &Path) -> TestEnv {
        let remote = root.join("remote.git");
        let out = Command::new("git")
            .args(["init", "--bare", "--quiet"])
            .arg(&remote)
            .output()
            .unwrap();
        assert!(out.status.success());

        let chart = root.join("assets/gitrepo/sleeper-chart");
        std::fs::create_dir_all(chart.join("templates")).unwrap();
        std::fs::write(chart.join("Chart.yaml"), "version: 0.1.0\n").unwrap();
        std::fs::write(chart.join("templates/deployment.yaml"), "name: sleeper\n").unwrap();

        TestEnv {
            assets_dir: root.join("assets"),
            git: Some(GitServerConfig::new(remote.to_string_lossy())),
            ..env()
        }
    }

    struct EditAndPublish {
        expanded: Mutex<Option<String>>,
    }

    #[async_trait]
    impl ScenarioBody for EditAndPublish {
        async fn execute(&self, ctx: &mut ScenarioContext) -> Result<()> {
            ctx.edit("examples/Chart.yaml", "0.1.0", "0.2.0")?;
            let commit = ctx.publish()?;
            let expanded = ctx.expand("{gitrepo} commit: {commit}")?;
            assert!(expanded.ends_with(&commit));
            *self.expanded.lock().unwrap() = Some(expanded);
            Ok(())
        }
    }

    #[tokio::test]
    async fn git_scenario_provisions_publishes_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let fake = FakeRunner::new();
        let runner = ScenarioRunner::new(git_env(root.path()), fake.clone());
        let source = Source::Git {
            asset: PathBuf::from("gitrepo/sleeper-chart"),
            subpath: "examples".to_string(),
            paths: Vec::new(),
        };
        let body = EditAndPublish {
            expanded: Mutex::new(None),
        };

        let report = runner.run("gitrepo", &source, &body).await;
        assert!(report.passed(), "{:?}", report.outcome);

        let expanded = body.expanded.lock().unwrap().clone().unwrap();
        assert!(expanded.starts_with("testing-"));

        assert_eq!(fake.count(&["create", "secret", "generic"]), 1);
        assert_eq!(fake.count(&["apply", "-f"]), 1);
        assert_eq!(fake.count(&["delete", "secret"]), 1);
        assert_eq!(fake.count(&["delete", "gitrepo"]), 1);

        // GitRepo goes before the secret it references.
        let deletes: Vec<String> = fake
            .calls()
            .into_iter()
            .filter(|(_, args)| args[0] == "delete")
            .map(|(_, args)| args[1].clone())
            .collect();
        assert_eq!(deletes, vec!["gitrepo", "secret"]);
    }

    #[tokio::test]
    async fn ssh_keys_create_ssh_auth_secret_and_delete_it() {
        let root = TempDir::new().unwrap();
        let fake = FakeRunner::new();
        let mut env = git_env(root.path());
        if let Some(git) = env.git.as_mut() {
            git.ssh_key = Some(PathBuf::from("/keys/id"));
            git.ssh_public_key = Some(PathBuf::from("/keys/id.pub"));
        }
        let runner = ScenarioRunner::new(env, fake.clone());
        let source = Source::Git {
            asset: PathBuf::from("gitrepo/sleeper-chart"),
            subpath: "examples".to_string(),
            paths: Vec::new(),
        };

        let report = runner.run("gitrepo", &source, &Probe::default()).await;
        assert!(report.passed(), "{:?}", report.outcome);

        let calls = fake.calls();
        let create = calls
            .iter()
            .map(|(_, args)| args)
            .find(|args| args[0] == "create")
            .unwrap();
        let secret = create[3].clone();
        assert!(secret.starts_with("git-auth-"));
        assert_eq!(
            create,
            &vec![
                "create".to_string(),
                "secret".to_string(),
                "generic".to_string(),
                secret.clone(),
                "--type".to_string(),
                "kubernetes.io/ssh-auth".to_string(),
                "--from-file=ssh-privatekey=/keys/id".to_string(),
                "--from-file=ssh-publickey=/keys/id.pub".to_string(),
            ]
        );
        assert_eq!(fake.count(&["delete", "secret", secret.as_str()]), 1);
    }

    #[tokio::test]
    async fn concurrent_git_scenarios_use_disjoint_fixtures() {
        let root = TempDir::new().unwrap();
        let fake = FakeRunner::new();
        let runner = ScenarioRunner::new(git_env(root.path()), fake.clone());
        let source = Source::Git {
            asset: PathBuf::from("gitrepo/sleeper-chart"),
            subpath: "examples".to_string(),
            paths: Vec::new(),
        };
        let first = Probe::default();
        let second = Probe::default();

        let (a, b) = tokio::join!(
            runner.run("a", &source, &first),
            runner.run("b", &source, &second),
        );
        assert!(a.passed(), "{:?}", a.outcome);
        assert!(b.passed(), "{:?}", b.outcome);

        let a = first.seen.lock().unwrap()[0].clone();
        let b = second.seen.lock().unwrap()[0].clone();
        assert_ne!(a.0, b.0);
        assert_ne!(a.1, b.1);
        assert!(a.1.is_some());
    }
}
