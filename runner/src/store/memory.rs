//! In-process record store

use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::RunnerError;
use crate::models::deployment::{DeploymentLog, DeploymentStatusUpdate, MetricSample};
use crate::store::RecordStore;

/// One recorded call, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEntry {
    Status(String, DeploymentStatusUpdate),
    Log(String, DeploymentLog),
    Metrics(String, MetricSample),
}

impl StoreEntry {
    pub fn deployment_id(&self) -> &str {
        match self {
            StoreEntry::Status(id, _) | StoreEntry::Log(id, _) | StoreEntry::Metrics(id, _) => id,
        }
    }
}

/// Keeps every record in memory. Used when no store URL is configured.
#[derive(Default)]
pub struct MemoryRecordStore {
    entries: RwLock<Vec<StoreEntry>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: StoreEntry) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    /// Every entry recorded so far
    pub fn entries(&self) -> Vec<StoreEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }

    /// Status updates for a deployment, oldest first
    pub fn statuses(&self, deployment_id: &str) -> Vec<DeploymentStatusUpdate> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter_map(|e| match e {
                StoreEntry::Status(id, update) if id == deployment_id => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    /// Most recent status update for a deployment
    pub fn last_status(&self, deployment_id: &str) -> Option<DeploymentStatusUpdate> {
        self.statuses(deployment_id).pop()
    }

    /// Log lines for a deployment, oldest first
    pub fn logs(&self, deployment_id: &str) -> Vec<DeploymentLog> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter_map(|e| match e {
                StoreEntry::Log(id, log) if id == deployment_id => Some(log.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn metrics(&self, deployment_id: &str) -> Vec<MetricSample> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter_map(|e| match e {
                StoreEntry::Metrics(id, sample) if id == deployment_id => Some(sample.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn update_status(
        &self,
        deployment_id: &str,
        update: DeploymentStatusUpdate,
    ) -> Result<(), RunnerError> {
        debug!(deployment = %deployment_id, status = %update.status, "Recorded status");
        self.push(StoreEntry::Status(deployment_id.to_string(), update));
        Ok(())
    }

    async fn append_log(&self, deployment_id: &str, log: DeploymentLog) -> Result<(), RunnerError> {
        self.push(StoreEntry::Log(deployment_id.to_string(), log));
        Ok(())
    }

    async fn record_metrics(
        &self,
        deployment_id: &str,
        sample: &MetricSample,
    ) -> Result<(), RunnerError> {
        self.push(StoreEntry::Metrics(deployment_id.to_string(), sample.clone()));
        Ok(())
    }
}
