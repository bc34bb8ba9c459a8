//! HTTP readiness probe

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::engine::ContainerEngine;

/// Timeout for a single probe request
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks whether a container answers HTTP on its internal address
pub struct HealthProber {
    engine: Arc<dyn ContainerEngine>,
    client: Client,
}

impl HealthProber {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self::with_timeout(engine, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(engine: Arc<dyn ContainerEngine>, timeout: Duration) -> Self {
        // Container addresses are only reachable directly
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build probe client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self { engine, client }
    }

    /// Single GET against `http://<container ip>:<port><path>`.
    ///
    /// True only for HTTP 200; any failure yields false.
    pub async fn check(&self, container_id: &str, path: &str, port: u16) -> bool {
        let details = match self.engine.inspect_container(container_id).await {
            Ok(details) => details,
            Err(e) => {
                warn!(container = %container_id, "Probe could not inspect container: {}", e);
                return false;
            }
        };

        if !details.running {
            warn!(container = %container_id, "Probe target is not running");
            return false;
        }

        let Some(address) = details.ip_address else {
            warn!(container = %container_id, "Probe target has no network address");
            return false;
        };

        let url = probe_url(&address, port, path);
        debug!(container = %container_id, url = %url, "Probing");

        match self.client.get(&url).send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "Probe got non-200 response");
                false
            }
            Err(e) => {
                warn!(url = %url, "Probe request failed: {}", e);
                false
            }
        }
    }
}

fn probe_url(address: &str, port: u16, path: &str) -> String {
    if path.starts_with('/') {
        format!("http://{}:{}{}", address, port, path)
    } else {
        format!("http://{}:{}/{}", address, port, path)
    }
}
