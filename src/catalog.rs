//! Scenario catalog loading and step execution.
//!
//! A catalog entry is pure data: what to deploy and what the cluster should
//! eventually show. Expectations with several substrings must all hold on
//! the same observation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::eventually::SatisfyAll;
use crate::scenario::{ScenarioBody, ScenarioContext, ScenarioReport, ScenarioRunner, Source};

/// An eventual observation of `kubectl get` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    /// Arguments after `kubectl get`. Placeholders are expanded.
    pub get: Vec<String>,
    /// Namespace to query; defaults to the controller namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Substrings that must all appear in one observation.
    pub contains: Vec<String>,
    /// Label used in logs and failure reports.
    #[serde(default)]
    pub description: Option<String>,
}

/// A substitution in a file of the fixture repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// Path relative to the working copy root.
    pub file: PathBuf,
    pub search: String,
    pub replace: String,
}

/// One action in a scenario body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Wait for an observation to match.
    Expect(Expectation),
    /// Change a tracked file.
    Edit(Edit),
    /// Commit and push pending edits.
    Publish,
}

impl Step {
    async fn execute(&self, ctx: &mut ScenarioContext) -> Result<()> {
        match self {
            Step::Expect(expectation) => {
                let args = expectation
                    .get
                    .iter()
                    .map(|a| ctx.expand(a))
                    .collect::<Result<Vec<_>>>()?;
                let contains = expectation
                    .contains
                    .iter()
                    .map(|c| ctx.expand(c))
                    .collect::<Result<Vec<_>>>()?;
                let description = expectation
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("get {}", args.join(" ")));

                tracing::info!(scenario = %ctx.name(), check = %description, "waiting for expectation");
                let matcher: SatisfyAll<String> = SatisfyAll::substrings(contains);
                ctx.expect_get(&description, &args, expectation.namespace.as_deref(), &matcher)
                    .await?;
            }
            Step::Edit(edit) => {
                tracing::info!(scenario = %ctx.name(), file = ?edit.file, "editing fixture");
                ctx.edit(&edit.file, &edit.search, &edit.replace)?;
            }
            Step::Publish => {
                let commit = ctx.publish()?;
                tracing::info!(scenario = %ctx.name(), commit = %commit, "published fixture");
            }
        }
        Ok(())
    }
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,

    /// What this scenario checks.
    #[serde(default)]
    pub description: String,

    /// What gets deployed.
    pub source: Source,

    /// Actions run in order once the source is applied.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Loads a scenario from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let scenario: Scenario = serde_yaml::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse scenario {}: {}", path.display(), e))
        })?;
        scenario.check()?;
        Ok(scenario)
    }

    /// Rejects entries that could never pass.
    fn check(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Config(format!("scenario {} has no steps", self.name)));
        }

        let is_git = matches!(self.source, Source::Git { .. });
        let mut pending_publish = false;
        for step in &self.steps {
            match step {
                Step::Expect(e) if e.contains.is_empty() => {
                    return Err(Error::Config(format!(
                        "scenario {} has an expectation with nothing to match",
                        self.name
                    )));
                }
                Step::Edit(_) | Step::Publish if !is_git => {
                    return Err(Error::Config(format!(
                        "scenario {} edits a repository but is not git-driven",
                        self.name
                    )));
                }
                Step::Edit(_) => pending_publish = true,
                Step::Publish => pending_publish = false,
                Step::Expect(_) => {}
            }
        }
        if pending_publish {
            return Err(Error::Config(format!(
                "scenario {} ends with unpublished edits",
                self.name
            )));
        }
        Ok(())
    }

    /// Runs this scenario with fresh fixtures.
    pub async fn run(&self, runner: &ScenarioRunner) -> ScenarioReport {
        runner.run(&self.name, &self.source, self).await
    }
}

#[async_trait]
impl ScenarioBody for Scenario {
    async fn execute(&self, ctx: &mut ScenarioContext) -> Result<()> {
        for step in &self.steps {
            step.execute(ctx).await?;
        }
        Ok(())
    }
}

/// All scenarios found in a directory.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    scenarios: Vec<Scenario>,
}

impl Catalog {
    /// Loads every `*.yaml` file under `dir`, sorted by name.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
                files.push(path);
            }
        }
        files.sort();

        let mut scenarios = Vec::with_capacity(files.len());
        for file in files {
            let scenario = Scenario::load(&file)?;
            if scenarios.iter().any(|s: &Scenario| s.name == scenario.name) {
                return Err(Error::Config(format!(
                    "duplicate scenario name {} in {}",
                    scenario.name,
                    file.display()
                )));
            }
            scenarios.push(scenario);
        }

        Ok(Self { scenarios })
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Keeps only the named scenarios; an empty filter keeps everything.
    pub fn select(&self, names: &[String]) -> Result<Vec<&Scenario>> {
        if names.is_empty() {
            return Ok(self.scenarios.iter().collect());
        }
        names
            .iter()
            .map(|n| {
                self.get(n)
                    .ok_or_else(|| Error::Config(format!("unknown scenario: {}", n)))
            })
            .collect()
    }
}

/// Directory holding the bundled catalog.
pub fn default_catalog_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("e2e")
        .join("catalog")
}
