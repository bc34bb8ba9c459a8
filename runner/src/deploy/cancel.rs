//! Stop requests for in-flight deployments

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Maps running pipelines to their cancel flags
#[derive(Default)]
pub struct CancelRegistry {
    flags: RwLock<HashMap<String, Arc<AtomicBool>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline. The flag is removed when the guard drops.
    pub fn register(self: &Arc<Self>, deployment_id: &str) -> CancelGuard {
        let flag = Arc::new(AtomicBool::new(false));
        let mut flags = self.flags.write().unwrap_or_else(|e| e.into_inner());
        flags.insert(deployment_id.to_string(), flag.clone());

        CancelGuard {
            registry: self.clone(),
            deployment_id: deployment_id.to_string(),
            flag,
        }
    }

    /// Raise the flag for a deployment. False when no pipeline is running for it.
    pub fn cancel(&self, deployment_id: &str) -> bool {
        let flags = self.flags.read().unwrap_or_else(|e| e.into_inner());
        match flags.get(deployment_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                debug!(deployment = %deployment_id, "Cancel flag raised");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, deployment_id: &str) -> bool {
        let flags = self.flags.read().unwrap_or_else(|e| e.into_inner());
        flags.contains_key(deployment_id)
    }

    fn unregister(&self, deployment_id: &str, flag: &Arc<AtomicBool>) {
        let mut flags = self.flags.write().unwrap_or_else(|e| e.into_inner());
        // A newer pipeline for the same id may have replaced this entry
        if flags
            .get(deployment_id)
            .is_some_and(|current| Arc::ptr_eq(current, flag))
        {
            flags.remove(deployment_id);
        }
    }
}

/// Registration held by a running pipeline
pub struct CancelGuard {
    registry: Arc<CancelRegistry>,
    deployment_id: String,
    flag: Arc<AtomicBool>,
}

impl CancelGuard {
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.deployment_id, &self.flag);
    }
}
