//! Deployment models

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A deployment attempt submitted by the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Unique deployment ID
    pub deployment_id: String,

    /// Project this deployment belongs to
    pub project_id: String,

    /// Repository to build from
    pub repo_url: String,

    /// Branch to check out
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Commit reference (full or short SHA)
    #[serde(default)]
    pub commit: String,

    /// Container build file contents
    pub dockerfile: String,

    /// Environment variables injected into the container
    #[serde(default)]
    pub env_vars: HashMap<String, String>,

    /// Port the workload listens on
    #[serde(default)]
    pub port: Option<u16>,

    /// Memory ceiling, e.g. "512Mi"
    #[serde(default)]
    pub memory: Option<String>,

    /// Relative CPU weight
    #[serde(default)]
    pub cpu_shares: Option<i64>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Status update sent to the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatusUpdate {
    /// New status
    pub status: String,

    /// Optional error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Accumulated logs at the time of the update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,

    /// Container running the deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    /// Public URL of the deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DeploymentStatusUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            error_message: None,
            logs: None,
            container_id: None,
            url: None,
        }
    }
}

/// Log entry streamed to the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentLog {
    /// Log level: 'info', 'warn', 'error'
    pub level: String,

    /// Log message
    pub message: String,
}

impl DeploymentLog {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: "info".to_string(),
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: "warn".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Output stream a log chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A timestamped fragment of container output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogChunk {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub text: String,
}

/// Built image, tagged per deployment and commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub name: String,
    pub tag: String,
}

impl ImageReference {
    /// `name:tag` form understood by the engine
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// A container created for a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub deployment_id: String,
    pub project_id: String,
    pub internal_port: Option<u16>,
    pub host_port: Option<u16>,
    pub state: String,
}

/// Point-in-time resource usage of a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub sampled_at: Option<DateTime<Utc>>,
}

impl MetricSample {
    /// Sample reported when stats are unavailable
    pub fn zeroed() -> Self {
        Self {
            sampled_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}
