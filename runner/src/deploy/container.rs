//! Container lifecycle management

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::deploy::limits::ResourceLimits;
use crate::engine::{
    ContainerEngine, ContainerSpec, ContainerSummary, DEPLOYMENT_LABEL, PROJECT_LABEL,
};
use crate::errors::{EngineError, RunError};
use crate::models::deployment::{ContainerHandle, ImageReference};
use crate::utils::deployment_name;

/// Grace period given to a container before it is killed on stop
pub const DEFAULT_STOP_GRACE_SECS: i64 = 10;

const RESTART_POLICY: &str = "unless-stopped";

/// Conventional container name for a deployment
pub fn container_name(deployment_id: &str) -> String {
    format!("runway-{}", deployment_name(deployment_id))
}

/// Parameters for starting a deployment's container
#[derive(Debug, Clone)]
pub struct RunParams<'a> {
    pub image: &'a ImageReference,
    pub deployment_id: &'a str,
    pub project_id: &'a str,
    pub port: u16,
    pub env: &'a HashMap<String, String>,
    pub limits: ResourceLimits,
}

/// Creates, starts, stops and lists deployment containers
pub struct ContainerManager {
    engine: Arc<dyn ContainerEngine>,
    stop_grace_secs: i64,
}

impl ContainerManager {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
        }
    }

    pub fn with_stop_grace(mut self, secs: i64) -> Self {
        self.stop_grace_secs = secs;
        self
    }

    /// Replace any container for the deployment with a fresh one and start it
    pub async fn run(&self, params: RunParams<'_>) -> Result<ContainerHandle, RunError> {
        let name = container_name(params.deployment_id);

        self.remove_existing(&name).await?;

        let mut env: Vec<String> = params
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();

        let labels = HashMap::from([
            (DEPLOYMENT_LABEL.to_string(), params.deployment_id.to_string()),
            (PROJECT_LABEL.to_string(), params.project_id.to_string()),
        ]);

        let spec = ContainerSpec {
            name: name.clone(),
            image: params.image.reference(),
            env,
            labels,
            port: Some(params.port),
            memory_bytes: i64::try_from(params.limits.memory_bytes).ok(),
            cpu_shares: Some(params.limits.cpu_shares),
            restart_policy: Some(RESTART_POLICY.to_string()),
        };

        let id = self.engine.create_container(spec).await?;

        if let Err(e) = self.engine.start_container(&id).await {
            warn!(container = %name, "Start failed, removing created container: {}", e);
            if let Err(rm) = self.engine.remove_container(&id, true).await {
                warn!(container = %name, "Failed to remove unstarted container: {}", rm);
            }
            return Err(e.into());
        }

        let host_port = match self.engine.inspect_container(&id).await {
            Ok(details) => details.host_ports.get(&params.port).copied(),
            Err(e) => {
                warn!(container = %name, "Failed to inspect started container: {}", e);
                None
            }
        };

        info!(
            deployment = %params.deployment_id,
            container = %name,
            id = %id,
            port = params.port,
            host_port = ?host_port,
            "Container started"
        );

        Ok(ContainerHandle {
            id,
            name,
            deployment_id: params.deployment_id.to_string(),
            project_id: params.project_id.to_string(),
            internal_port: Some(params.port),
            host_port,
            state: "running".to_string(),
        })
    }

    async fn remove_existing(&self, name: &str) -> Result<(), RunError> {
        let Some(existing) = self.engine.find_container_by_name(name).await? else {
            debug!(container = %name, "No previous container");
            return Ok(());
        };

        info!(container = %name, id = %existing, "Removing previous container");
        match self.engine.remove_container(&existing, true).await {
            Ok(()) | Err(EngineError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Gracefully stop and remove a container. Returns false on any failure.
    pub async fn stop(&self, container_id: &str) -> bool {
        match self
            .engine
            .stop_container(container_id, self.stop_grace_secs)
            .await
        {
            Ok(()) => {}
            // Exited on its own; it still has to be removed
            Err(EngineError::NotModified(_)) => {
                debug!(container = %container_id, "Container was already stopped");
            }
            Err(e) => {
                warn!(container = %container_id, "Failed to stop container: {}", e);
                return false;
            }
        }

        if let Err(e) = self.engine.remove_container(container_id, false).await {
            warn!(container = %container_id, "Failed to remove container: {}", e);
            return false;
        }

        info!(container = %container_id, "Container stopped and removed");
        true
    }

    /// Stop whatever container belongs to the deployment; false if none does
    pub async fn stop_deployment(&self, deployment_id: &str) -> bool {
        match self.find(deployment_id).await {
            Ok(Some(handle)) => self.stop(&handle.id).await,
            Ok(None) => {
                warn!(deployment = %deployment_id, "No container to stop");
                false
            }
            Err(e) => {
                warn!(deployment = %deployment_id, "Failed to look up container: {}", e);
                false
            }
        }
    }

    /// All containers carrying the deployment label, running or exited
    pub async fn list(&self) -> Result<Vec<ContainerHandle>, EngineError> {
        let containers = self.engine.list_containers(DEPLOYMENT_LABEL).await?;
        Ok(containers.into_iter().map(to_handle).collect())
    }

    /// Resolve a deployment ID to its container
    pub async fn find(&self, deployment_id: &str) -> Result<Option<ContainerHandle>, EngineError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|h| h.deployment_id == deployment_id))
    }
}

fn to_handle(summary: ContainerSummary) -> ContainerHandle {
    let label = |key: &str| summary.labels.get(key).cloned().unwrap_or_default();
    let (internal_port, host_port) = summary
        .ports
        .iter()
        .find(|(_, host)| host.is_some())
        .or_else(|| summary.ports.first())
        .map(|(c, h)| (Some(*c), *h))
        .unwrap_or((None, None));

    ContainerHandle {
        deployment_id: label(DEPLOYMENT_LABEL),
        project_id: label(PROJECT_LABEL),
        name: summary.names.first().cloned().unwrap_or_default(),
        id: summary.id,
        internal_port,
        host_port,
        state: summary.state,
    }
}
