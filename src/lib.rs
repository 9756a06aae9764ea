//! Fleet E2E - end-to-end harness for a GitOps controller
//!
//! This library provisions disposable fixtures (a workspace, a git
//! repository, credentials and a GitRepo resource) around each scenario and
//! polls the cluster through kubectl until the controller's observable state
//! converges or a deadline passes.

pub mod catalog;
pub mod config;
pub mod error;
pub mod eventually;
pub mod git;
pub mod kubectl;
pub mod scenario;
pub mod template;

pub use error::{Error, Result};

pub use catalog::{default_catalog_dir, Catalog, Edit, Expectation, Scenario, Step};
pub use config::{GitServerConfig, TestEnv, Validate, ValidationResult};
pub use eventually::{eventually, ContainsSubstring, Matcher, PollSettings, Predicate, SatisfyAll};
pub use git::{replace_in_file, GitRepo, GitServer, KnownHosts};
pub use kubectl::{CommandOutput, CommandRunner, Kubectl, KubectlCli};
pub use scenario::{
    unique_name, ScenarioBody, ScenarioContext, ScenarioReport, ScenarioRunner, ScenarioState,
    Source,
};
pub use template::GitRepoResource;
