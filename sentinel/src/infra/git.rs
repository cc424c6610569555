//! Infrastructure implementation of the `GitRepository` port on top of the
//! `git` binary.

use std::path::Path;
use std::process::Output;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::application::ports::{CommandRunner, GitRepository};
use crate::domain::deploy::parse_ls_remote;
use crate::domain::error::DeployError;

pub struct GitCli {
    runner: Arc<dyn CommandRunner>,
}

impl GitCli {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn git(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
        let output = self.runner.run("git", args, cwd).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(output)
    }
}

fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[async_trait]
impl GitRepository for GitCli {
    async fn latest_commit(&self, repository_url: &str, branch: &str) -> Result<String> {
        let output = self
            .git(&["ls-remote", "--heads", repository_url, branch], None)
            .await?;
        let listing = String::from_utf8_lossy(&output.stdout);
        parse_ls_remote(&listing, branch).ok_or_else(|| {
            DeployError::BranchNotFound {
                repository: repository_url.to_string(),
                branch: branch.to_string(),
            }
            .into()
        })
    }

    async fn fetch_branch(&self, checkout: &Path, branch: &str) -> Result<()> {
        self.git(&["fetch", "origin", branch], Some(checkout))
            .await
            .with_context(|| format!("fetching {branch} in {}", checkout.display()))?;
        Ok(())
    }

    async fn rev_parse(&self, checkout: &Path, rev: &str) -> Result<String> {
        let output = self
            .git(&["rev-parse", "--verify", rev], Some(checkout))
            .await?;
        Ok(stdout_line(&output))
    }

    async fn checkout_commit(
        &self,
        repository_url: &str,
        commit: &str,
        dest: &Path,
    ) -> Result<()> {
        let dest_str = dest.to_string_lossy();
        self.git(&["clone", "--no-checkout", repository_url, &dest_str], None)
            .await
            .with_context(|| format!("cloning {repository_url}"))?;
        self.git(&["fetch", "origin", commit], Some(dest))
            .await
            .with_context(|| format!("fetching commit {commit}"))?;
        self.git(&["checkout", commit], Some(dest))
            .await
            .with_context(|| format!("checking out {commit}"))?;
        Ok(())
    }
}
