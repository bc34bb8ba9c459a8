//! Container engine capability
//!
//! Every component that talks to the container engine receives an
//! `Arc<dyn ContainerEngine>`. The Docker implementation lives in [`docker`];
//! tests substitute their own.

pub mod docker;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::errors::EngineError;
use crate::models::deployment::LogChunk;

pub use docker::DockerEngine;

/// Label carrying the deployment ID on images and containers
pub const DEPLOYMENT_LABEL: &str = "runway.deployment_id";

/// Label carrying the project ID on images and containers
pub const PROJECT_LABEL: &str = "runway.project_id";

/// Label carrying the commit reference on images
pub const COMMIT_LABEL: &str = "runway.commit";

/// One event from the engine's build stream
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    /// Build output text
    Output(String),

    /// The engine reported a build error
    Error(String),

    /// Final image identifier
    ImageId(String),
}

/// Everything needed to create a container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Container port exposed and bound to an engine-chosen host port
    pub port: Option<u16>,
    pub memory_bytes: Option<i64>,
    pub cpu_shares: Option<i64>,
    pub restart_policy: Option<String>,
}

/// Inspected state of a single container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub ip_address: Option<String>,
    pub labels: HashMap<String, String>,
    /// Host ports keyed by container port
    pub host_ports: HashMap<u16, u16>,
}

/// Row of a container listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
    pub labels: HashMap<String, String>,
    /// (container port, host port) pairs
    pub ports: Vec<(u16, Option<u16>)>,
}

/// Raw counters from one stats call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    pub cpu_total: u64,
    pub precpu_total: u64,
    pub system_cpu: u64,
    pub presystem_cpu: u64,
    pub online_cpus: u64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    /// (rx bytes, tx bytes) per interface
    pub networks: Vec<(u64, u64)>,
}

/// Options for reading container logs
#[derive(Debug, Clone, Default)]
pub struct LogStreamOptions {
    pub follow: bool,
    pub tail: Option<usize>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the engine is reachable
    async fn ping(&self) -> Result<(), EngineError>;

    /// Submit a tar build context; the returned stream yields build events
    /// until the engine finishes the build
    fn build_image(
        &self,
        context: Bytes,
        tag: &str,
        labels: HashMap<String, String>,
    ) -> BoxStream<'static, Result<BuildEvent, EngineError>>;

    /// Look up a container ID by exact name, running or not
    async fn find_container_by_name(&self, name: &str) -> Result<Option<String>, EngineError>;

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError>;

    /// List containers (including exited ones) carrying the given label
    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerSummary>, EngineError>;

    fn logs(
        &self,
        id: &str,
        options: LogStreamOptions,
    ) -> BoxStream<'static, Result<LogChunk, EngineError>>;

    /// One stats reading, including the engine's previous CPU window
    async fn stats(&self, id: &str) -> Result<EngineStats, EngineError>;
}
