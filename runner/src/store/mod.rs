//! Deployment record store
//!
//! Durable bookkeeping for deployments lives outside the runner. The pipeline
//! reports status transitions, log lines and metric samples through
//! [`RecordStore`].

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::errors::RunnerError;
use crate::models::deployment::{DeploymentLog, DeploymentStatusUpdate, MetricSample};

pub use http::HttpRecordStore;
pub use memory::{MemoryRecordStore, StoreEntry};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Record a status transition
    async fn update_status(
        &self,
        deployment_id: &str,
        update: DeploymentStatusUpdate,
    ) -> Result<(), RunnerError>;

    /// Append one log line to the deployment's record
    async fn append_log(&self, deployment_id: &str, log: DeploymentLog) -> Result<(), RunnerError>;

    /// Persist a resource usage sample
    async fn record_metrics(
        &self,
        deployment_id: &str,
        sample: &MetricSample,
    ) -> Result<(), RunnerError>;
}
