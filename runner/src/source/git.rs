//! Git checkouts

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::errors::RunnerError;
use crate::source::{Checkout, SourceFetcher};
use crate::utils::deployment_name;

/// Clones repositories with the `git` binary into a work directory
pub struct GitFetcher {
    work_dir: PathBuf,
}

impl GitFetcher {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Directory a deployment's tree is cloned into
    pub fn checkout_dir(&self, deployment_id: &str) -> PathBuf {
        self.work_dir.join(deployment_name(deployment_id))
    }
}

async fn git(args: &[&str], cwd: Option<&Path>) -> Result<(), RunnerError> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| RunnerError::FetchError(format!("Failed to run git {}: {}", args[0], e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("git {} failed: {}", args[0], stderr.trim());
        return Err(RunnerError::FetchError(format!(
            "git {} failed: {}",
            args[0],
            stderr.trim()
        )));
    }

    Ok(())
}

/// Reject caller values git would parse as options
fn check_refs(repo_url: &str, branch: &str, commit: &str) -> Result<(), RunnerError> {
    for (what, value) in [("repository URL", repo_url), ("branch", branch), ("commit", commit)] {
        if value.starts_with('-') {
            return Err(RunnerError::FetchError(format!(
                "invalid {} {:?}: must not start with '-'",
                what, value
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        deployment_id: &str,
        repo_url: &str,
        branch: &str,
        commit: &str,
    ) -> Result<Checkout, RunnerError> {
        check_refs(repo_url, branch, commit)?;

        let target = self.checkout_dir(deployment_id);
        info!(
            deployment = %deployment_id,
            "Cloning {} (branch: {}) to {}",
            repo_url,
            branch,
            target.display()
        );

        if target.exists() {
            debug!("Removing previous checkout at {}", target.display());
            tokio::fs::remove_dir_all(&target).await?;
        }
        tokio::fs::create_dir_all(&self.work_dir).await?;

        // From here on the directory is ours to clean up, even on failure
        let checkout = Checkout::owned(target);
        let target_str = checkout.path().to_string_lossy().into_owned();

        git(&["clone", "-b", branch, "--", repo_url, &target_str], None).await?;

        if !commit.is_empty() {
            git(&["checkout", "--detach", commit, "--"], Some(checkout.path())).await?;
        }

        let revision = if commit.is_empty() { branch } else { commit };
        info!(deployment = %deployment_id, "Checked out {}", revision);
        Ok(checkout)
    }
}
