//! Build log cache
//!
//! Keeps the last log text a pipeline produced for each deployment, so logs
//! can still be served when the deployment has no live container.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Default number of deployments kept
pub const DEFAULT_CAPACITY: usize = 256;

/// Build log cache entry
#[derive(Debug, Clone)]
pub struct BuildLogEntry {
    pub logs: String,
    pub cached_at: DateTime<Utc>,
    seq: u64,
}

/// Bounded map of deployment ID to its last pipeline logs
pub struct BuildLogCache {
    entries: RwLock<HashMap<String, BuildLogEntry>>,
    capacity: usize,
    seq: AtomicU64,
}

impl BuildLogCache {
    /// Create a new cache holding at most `capacity` deployments
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    /// Get the cached logs of a deployment
    pub fn get(&self, deployment_id: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(deployment_id).map(|e| e.logs.clone())
    }

    pub fn entry(&self, deployment_id: &str) -> Option<BuildLogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(deployment_id).cloned()
    }

    /// Store the logs of a deployment, replacing earlier ones
    pub fn insert(&self, deployment_id: &str, logs: String) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        // Evict oldest if at capacity
        if !entries.contains_key(deployment_id) && entries.len() >= self.capacity {
            if let Some(oldest_id) = entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(id, _)| id.clone())
            {
                entries.remove(&oldest_id);
            }
        }

        let entry = BuildLogEntry {
            logs,
            cached_at: Utc::now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };

        entries.insert(deployment_id.to_string(), entry);
    }

    /// Remove a deployment's logs
    pub fn remove(&self, deployment_id: &str) -> Option<String> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(deployment_id).map(|e| e.logs)
    }

    /// Get cache size
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BuildLogCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
