//! Container resource sampling

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::engine::{ContainerEngine, EngineStats};
use crate::models::deployment::MetricSample;

/// Samples CPU, memory and network usage of containers
pub struct MetricsCollector {
    engine: Arc<dyn ContainerEngine>,
}

impl MetricsCollector {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Current usage of a container. Never fails: if stats are unavailable
    /// a zeroed sample is returned.
    pub async fn sample(&self, container_id: &str) -> MetricSample {
        match self.engine.stats(container_id).await {
            Ok(stats) => {
                let sample = compute_sample(&stats);
                debug!(
                    container = %container_id,
                    cpu = sample.cpu_percent,
                    memory = sample.memory_percent,
                    "Sampled container"
                );
                sample
            }
            Err(e) => {
                warn!(container = %container_id, "Stats unavailable: {}", e);
                MetricSample::zeroed()
            }
        }
    }
}

/// Normalize one engine reading.
///
/// CPU percent is `cpu_delta / system_delta * online_cpus * 100` over the
/// engine's own previous window; memory percent is `usage / limit * 100`;
/// network totals are summed over all interfaces.
pub fn compute_sample(stats: &EngineStats) -> MetricSample {
    let cpu_delta = stats.cpu_total.saturating_sub(stats.precpu_total) as f64;
    let system_delta = stats.system_cpu.saturating_sub(stats.presystem_cpu) as f64;
    let online_cpus = stats.online_cpus.max(1) as f64;

    let cpu_percent = if system_delta > 0.0 && cpu_delta > 0.0 {
        (cpu_delta / system_delta) * online_cpus * 100.0
    } else {
        0.0
    };

    let memory_percent = if stats.memory_limit > 0 {
        (stats.memory_usage as f64 / stats.memory_limit as f64) * 100.0
    } else {
        0.0
    };

    let (network_rx_bytes, network_tx_bytes) = stats
        .networks
        .iter()
        .fold((0u64, 0u64), |(rx, tx), (r, t)| {
            (rx.saturating_add(*r), tx.saturating_add(*t))
        });

    MetricSample {
        cpu_percent,
        memory_percent,
        memory_usage: stats.memory_usage,
        memory_limit: stats.memory_limit,
        network_rx_bytes,
        network_tx_bytes,
        sampled_at: Some(Utc::now()),
    }
}
