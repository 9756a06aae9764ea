//! Git repository fixtures.
//!
//! A [`GitServer`] seeds a fresh working copy from a static asset tree,
//! publishes it to the configured remote, and republishes it after edits.
//! The remote's host key must be registered first: both [`GitServer::create`]
//! and [`GitServer::update`] take the [`KnownHosts`] produced by
//! [`GitServer::register_trust`].

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use walkdir::WalkDir;

use crate::config::GitServerConfig;
use crate::error::{Error, Result};

const COMMIT_AUTHOR: &str = "fleet-e2e";
const COMMIT_EMAIL: &str = "fleet-e2e@example.com";

/// Trust file holding the remote's host key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHosts {
    path: PathBuf,
}

impl KnownHosts {
    /// Returns the path of the trust file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A published working copy.
#[derive(Debug)]
pub struct GitRepo {
    /// Local working copy.
    path: PathBuf,
    /// Remote the working copy pushes to.
    url: String,
    /// Branch that is published.
    branch: String,
    /// Trust file used for pushes.
    known_hosts: KnownHosts,
    /// Every commit hash published so far, oldest first.
    published: Vec<String>,
}

impl GitRepo {
    /// Returns the local path to the working copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the remote URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the published branch.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Returns the most recently published commit hash.
    pub fn head(&self) -> Option<&str> {
        self.published.last().map(String::as_str)
    }

    /// Returns every published commit hash, oldest first.
    pub fn published(&self) -> &[String] {
        &self.published
    }
}

/// Creates and publishes repository fixtures against one git server.
#[derive(Debug, Clone)]
pub struct GitServer {
    config: GitServerConfig,
}

impl GitServer {
    pub fn new(config: GitServerConfig) -> Self {
        Self { config }
    }

    /// Returns the clone URL the controller should use.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &GitServerConfig {
        &self.config
    }

    /// Writes the server's host key to `path`.
    ///
    /// Without a configured host (local remotes) the file is created empty.
    pub fn register_trust(&self, path: impl Into<PathBuf>) -> Result<KnownHosts> {
        let path = path.into();

        let keys = match &self.config.host {
            Some(host) => {
                tracing::info!(host = %host, path = ?path, "registering git host key");
                let output = Command::new("ssh-keyscan")
                    .args(["-H", host])
                    .output()
                    .map_err(|e| Error::Git(format!("failed to run ssh-keyscan: {}", e)))?;
                if !output.status.success() || output.stdout.is_empty() {
                    return Err(Error::Command {
                        command: format!("ssh-keyscan -H {}", host),
                        output: String::from_utf8_lossy(&output.stderr).into_owned(),
                    });
                }
                output.stdout
            }
            None => Vec::new(),
        };

        std::fs::write(&path, keys)?;
        Ok(KnownHosts { path })
    }

    /// Seeds `destination/subpath` from `asset` and publishes it to the
    /// configured branch.
    ///
    /// Fails if `destination` already exists or `asset` is missing.
    pub fn create(
        &self,
        known_hosts: &KnownHosts,
        destination: impl Into<PathBuf>,
        asset: impl AsRef<Path>,
        subpath: impl AsRef<Path>,
    ) -> Result<GitRepo> {
        let branch = self.config.branch.clone();
        self.create_on_branch(known_hosts, destination, asset, subpath, &branch)
    }

    /// Like [`GitServer::create`], publishing to `branch` instead.
    pub fn create_on_branch(
        &self,
        known_hosts: &KnownHosts,
        destination: impl Into<PathBuf>,
        asset: impl AsRef<Path>,
        subpath: impl AsRef<Path>,
        branch: &str,
    ) -> Result<GitRepo> {
        let destination = destination.into();
        let asset = asset.as_ref();

        if destination.exists() {
            return Err(Error::Precondition(format!(
                "repository destination already exists: {}",
                destination.display()
            )));
        }
        if !asset.is_dir() {
            return Err(Error::Precondition(format!(
                "asset directory not found: {}",
                asset.display()
            )));
        }

        tracing::info!(
            path = ?destination,
            asset = ?asset,
            url = %self.config.url,
            "creating repository fixture"
        );

        copy_tree(asset, &destination.join(subpath))?;

        let mut repo = GitRepo {
            path: destination,
            url: self.config.url.clone(),
            branch: branch.to_string(),
            known_hosts: known_hosts.clone(),
            published: Vec::new(),
        };

        let head_ref = format!("refs/heads/{}", repo.branch);
        self.git(&repo, &["init", "--quiet"])?;
        self.git(&repo, &["symbolic-ref", "HEAD", head_ref.as_str()])?;
        self.git(&repo, &["remote", "add", "origin", repo.url.as_str()])?;
        self.commit_and_push(&mut repo, "initial fixture commit")?;

        Ok(repo)
    }

    /// Commits every pending change, pushes it and returns the new hash.
    ///
    /// Fails with [`Error::NoChanges`] on a clean working copy.
    pub fn update(&self, repo: &mut GitRepo) -> Result<String> {
        let status = self.git(repo, &["status", "--porcelain"])?;
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            return Err(Error::NoChanges);
        }

        let message = format!("fixture update {}", repo.published.len());
        self.commit_and_push(repo, &message)
    }

    /// Deletes the published branch from the remote.
    pub fn delete_remote_branch(&self, repo: &GitRepo) -> Result<()> {
        tracing::info!(branch = %repo.branch, url = %repo.url, "deleting remote branch");
        self.git(repo, &["push", "--quiet", "origin", "--delete", repo.branch.as_str()])?;
        Ok(())
    }

    fn commit_and_push(&self, repo: &mut GitRepo, message: &str) -> Result<String> {
        let name = format!("user.name={}", COMMIT_AUTHOR);
        let email = format!("user.email={}", COMMIT_EMAIL);
        self.git(repo, &["add", "-A"])?;
        self.git(
            repo,
            &[
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "commit",
                "--quiet",
                "-m",
                message,
            ],
        )?;

        let branch = repo.branch.clone();
        self.git(repo, &["push", "--quiet", "-u", "origin", branch.as_str()])?;

        let head = self.git(repo, &["rev-parse", "HEAD"])?;
        let hash = String::from_utf8_lossy(&head.stdout).trim().to_string();

        if repo.published.contains(&hash) {
            return Err(Error::Git(format!("push did not produce a new commit: {}", hash)));
        }

        tracing::info!(commit = %hash, url = %repo.url, "published repository");
        repo.published.push(hash.clone());
        Ok(hash)
    }

    /// Runs git in the working copy with this server's SSH settings.
    fn git(&self, repo: &GitRepo, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&repo.path).args(args);
        if let Some(ssh) = self.ssh_command(&repo.known_hosts) {
            cmd.env("GIT_SSH_COMMAND", ssh);
        }

        let output = cmd
            .output()
            .map_err(|e| Error::Git(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(output)
    }

    /// SSH invocation for git, or `None` for local remotes with no key.
    ///
    /// A scanned host always pins the trust file, with or without a key.
    fn ssh_command(&self, known_hosts: &KnownHosts) -> Option<String> {
        if self.config.host.is_none() && self.config.ssh_key.is_none() {
            return None;
        }

        let mut cmd = String::from("ssh");
        if let Some(key) = &self.config.ssh_key {
            cmd.push_str(&format!(" -i {} -o IdentitiesOnly=yes", key.display()));
        }
        cmd.push_str(&format!(
            " -o UserKnownHostsFile={} -o StrictHostKeyChecking=yes",
            known_hosts.path.display()
        ));
        Some(cmd)
    }
}

/// Replaces every occurrence of `search` in the file at `path`.
///
/// The change becomes visible to the controller after the next
/// [`GitServer::update`]. Fails if `search` does not occur in the file.
pub fn replace_in_file(path: impl AsRef<Path>, search: &str, replace: &str) -> Result<()> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Precondition(format!("cannot read {}: {}", path.display(), e))
    })?;

    if !content.contains(search) {
        return Err(Error::Precondition(format!(
            "{:?} not found in {}",
            search,
            path.display()
        )));
    }

    std::fs::write(path, content.replace(search, replace)).map_err(|e| {
        Error::Precondition(format!("cannot write {}: {}", path.display(), e))
    })?;
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|_| Error::Precondition(format!("bad asset path: {}", entry.path().display())))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
