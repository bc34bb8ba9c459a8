//! Source checkout
//!
//! A [`SourceFetcher`] turns a repository URL, branch and commit into a local
//! working tree the build context is assembled from.

pub mod git;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::RunnerError;

pub use git::GitFetcher;

/// A local working tree produced by a fetcher.
///
/// Trees the fetcher created are removed when the checkout drops.
#[derive(Debug)]
pub struct Checkout {
    path: PathBuf,
    owned: bool,
}

impl Checkout {
    /// A tree created for this deployment; removed on drop
    pub fn owned(path: PathBuf) -> Self {
        Self { path, owned: true }
    }

    /// A tree that existed before the deployment; left in place
    pub fn borrowed(path: PathBuf) -> Self {
        Self {
            path,
            owned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if !self.owned || !self.path.exists() {
            return;
        }

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed checkout"),
            Err(e) => warn!(path = %self.path.display(), "Failed to remove checkout: {}", e),
        }
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Produce the working tree for `repo_url` at `branch`/`commit`.
    ///
    /// `deployment_id` namespaces any directory the fetcher creates.
    async fn fetch(
        &self,
        deployment_id: &str,
        repo_url: &str,
        branch: &str,
        commit: &str,
    ) -> Result<Checkout, RunnerError>;
}

/// Uses the repository URL as a path to an existing local tree
#[derive(Debug, Default)]
pub struct LocalFetcher;

#[async_trait]
impl SourceFetcher for LocalFetcher {
    async fn fetch(
        &self,
        deployment_id: &str,
        repo_url: &str,
        _branch: &str,
        _commit: &str,
    ) -> Result<Checkout, RunnerError> {
        let path = PathBuf::from(repo_url.trim_start_matches("file://"));
        if !path.is_dir() {
            return Err(RunnerError::FetchError(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        debug!(deployment = %deployment_id, path = %path.display(), "Using local tree");
        Ok(Checkout::borrowed(path))
    }
}
