//! JSON documents on disk

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;

use crate::errors::RunnerError;

/// Handle to a JSON document at a fixed path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the document. Fails if it is missing.
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, RunnerError> {
        let raw = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Like [`File::read_json`], but a missing document is `None`
    pub async fn read_json_opt<T: DeserializeOwned>(&self) -> Result<Option<T>, RunnerError> {
        match fs::read(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
