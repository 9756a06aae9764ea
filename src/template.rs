//! GitRepo resource rendering.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const GITREPO_API_VERSION: &str = "fleet.cattle.io/v1alpha1";
pub const GITREPO_KIND: &str = "GitRepo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepoSpec {
    /// Clone URL the controller pulls from.
    pub repo: String,
    /// Secret holding the SSH credentials.
    pub client_secret_name: String,
    pub branch: String,
    /// Paths inside the repository to deploy.
    pub paths: Vec<String>,
}

/// A `GitRepo` resource pointing the controller at a fixture repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepoResource {
    pub kind: String,
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: GitRepoSpec,
}

impl GitRepoResource {
    pub fn new(
        name: impl Into<String>,
        repo: impl Into<String>,
        client_secret_name: impl Into<String>,
        branch: impl Into<String>,
        paths: Vec<String>,
    ) -> Self {
        Self {
            kind: GITREPO_KIND.to_string(),
            api_version: GITREPO_API_VERSION.to_string(),
            metadata: Metadata { name: name.into() },
            spec: GitRepoSpec {
                repo: repo.into(),
                client_secret_name: client_secret_name.into(),
                branch: branch.into(),
                paths,
            },
        }
    }

    /// Renders the resource as a YAML document.
    pub fn render(&self) -> Result<String> {
        if self.spec.paths.is_empty() {
            return Err(Error::Template("GitRepo needs at least one path".to_string()));
        }
        serde_yaml::to_string(self).map_err(|e| Error::Template(e.to_string()))
    }
}
