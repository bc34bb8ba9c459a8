//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::cache::BuildLogCache;
use crate::deploy::Orchestrator;
use crate::engine::{ContainerEngine, DockerEngine};
use crate::errors::RunnerError;
use crate::source::{GitFetcher, SourceFetcher};
use crate::store::{HttpRecordStore, MemoryRecordStore, RecordStore};

/// Main application state
pub struct AppState {
    /// Container engine shared by every component
    pub engine: Arc<dyn ContainerEngine>,

    /// Deployment record store
    pub store: Arc<dyn RecordStore>,

    /// Deployment pipeline
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Connect to the engine and the record store and build the pipeline
    pub async fn init(options: &AppOptions) -> Result<Self, RunnerError> {
        info!("Initializing application state...");

        let engine: Arc<dyn ContainerEngine> =
            Arc::new(DockerEngine::connect(options.engine_host.as_deref())?);
        if let Err(e) = engine.ping().await {
            warn!("Container engine is not reachable yet: {}", e);
        }

        let store = init_store(options)?;
        let fetcher: Arc<dyn SourceFetcher> = Arc::new(GitFetcher::new(options.work_dir.clone()));

        Ok(Self::with_components(engine, fetcher, store, options))
    }

    /// Assemble state from already constructed components
    pub fn with_components(
        engine: Arc<dyn ContainerEngine>,
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<dyn RecordStore>,
        options: &AppOptions,
    ) -> Self {
        let build_logs = Arc::new(BuildLogCache::new(options.build_log_capacity));
        let orchestrator = Arc::new(Orchestrator::new(
            engine.clone(),
            fetcher,
            store.clone(),
            build_logs,
            options.deploy.clone(),
        ));

        Self {
            engine,
            store,
            orchestrator,
        }
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), RunnerError> {
        info!("Shutting down application state...");
        Ok(())
    }
}

fn init_store(options: &AppOptions) -> Result<Arc<dyn RecordStore>, RunnerError> {
    match &options.store.base_url {
        Some(base_url) => {
            info!("Recording deployments at {}", base_url);
            let store = HttpRecordStore::new(base_url, options.store.token.clone())?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No record store configured, keeping deployment records in memory");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
    }
}
