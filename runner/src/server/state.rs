//! Server state

use std::sync::Arc;
use std::time::Duration;

use crate::deploy::metrics::MetricsCollector;
use crate::deploy::streamer::LogStreamer;
use crate::deploy::Orchestrator;
use crate::engine::ContainerEngine;

/// Server state shared across handlers
pub struct ServerState {
    pub engine: Arc<dyn ContainerEngine>,
    pub orchestrator: Arc<Orchestrator>,
    pub streamer: LogStreamer,
    pub metrics: MetricsCollector,

    /// Ceiling for a whole pipeline run
    pub pipeline_timeout: Duration,

    /// Line count for log reads without `tail`
    pub log_tail: usize,
}

impl ServerState {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        orchestrator: Arc<Orchestrator>,
        pipeline_timeout: Duration,
        log_tail: usize,
    ) -> Self {
        Self {
            streamer: LogStreamer::new(engine.clone()),
            metrics: MetricsCollector::new(engine.clone()),
            engine,
            orchestrator,
            pipeline_timeout,
            log_tail,
        }
    }
}
