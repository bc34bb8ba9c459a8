//! Error types for the deployment runner

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the runner
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    ContextAssembly(#[from] ContextAssemblyError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Source fetch error: {0}")]
    FetchError(String),

    #[error("Record store error: {0}")]
    StoreError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid transition: {0}")]
    TransitionError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for RunnerError {
    fn from(err: anyhow::Error) -> Self {
        RunnerError::Internal(err.to_string())
    }
}

/// Container engine failures
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no such object: {0}")]
    NotFound(String),

    /// The object is already in the requested state
    #[error("not modified: {0}")]
    NotModified(String),

    #[error("{0}")]
    Api(String),

    #[error("engine connection failed: {0}")]
    Connection(String),
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 304,
                message,
            } => EngineError::NotModified(message),
            bollard::errors::Error::DockerResponseServerError { message, .. } => {
                EngineError::Api(message)
            }
            other => EngineError::Api(other.to_string()),
        }
    }
}

/// A file under the working tree could not be read into the build context
#[derive(Error, Debug)]
#[error("failed to add {path} to build context: {source}")]
pub struct ContextAssemblyError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// The image build failed; `logs` holds everything captured up to the failure
#[derive(Error, Debug)]
#[error("build failed: {message}")]
pub struct BuildError {
    pub message: String,
    pub logs: String,
}

/// The container could not be created or started
#[derive(Error, Debug)]
#[error("run failed: {message}")]
pub struct RunError {
    pub message: String,
}

impl From<EngineError> for RunError {
    fn from(err: EngineError) -> Self {
        RunError {
            message: err.to_string(),
        }
    }
}

impl RunnerError {
    /// Logs captured before the failure, if the error carries any
    pub fn logs(&self) -> Option<&str> {
        match self {
            RunnerError::Build(e) => Some(&e.logs),
            _ => None,
        }
    }
}
