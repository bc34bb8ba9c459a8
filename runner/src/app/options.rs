//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::cache::build_logs::DEFAULT_CAPACITY;
use crate::deploy::OrchestratorOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Record store configuration
    pub store: StoreOptions,

    /// Container engine address; local defaults when absent
    pub engine_host: Option<String>,

    /// Parent directory of source checkouts
    pub work_dir: PathBuf,

    /// Pipeline options
    pub deploy: OrchestratorOptions,

    /// Ceiling for a whole pipeline run
    pub pipeline_timeout: Duration,

    /// Default line count for log reads
    pub log_tail: usize,

    /// Capacity of the build log cache
    pub build_log_capacity: usize,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            store: StoreOptions::default(),
            engine_host: None,
            work_dir: StorageLayout::default().work_dir(),
            deploy: OrchestratorOptions::default(),
            pipeline_timeout: Duration::from_secs(600),
            log_tail: 100,
            build_log_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl AppOptions {
    /// Options from a settings file
    pub fn from_settings(settings: &Settings, layout: &StorageLayout) -> Self {
        let deploy = &settings.deploy;

        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            store: StoreOptions {
                base_url: settings.store.base_url.clone(),
                token: settings.store.token.clone().map(SecretString::from),
            },
            engine_host: settings.engine.host.clone(),
            work_dir: deploy.work_dir.clone().unwrap_or_else(|| layout.work_dir()),
            deploy: OrchestratorOptions {
                settle_delay: Duration::from_secs(deploy.settle_delay_secs),
                probe_path: deploy.probe_path.clone(),
                probe_timeout: Duration::from_secs(deploy.probe_timeout_secs),
                external_url_template: deploy.external_url_template.clone(),
                default_memory: deploy.default_memory.clone(),
                default_cpu_shares: deploy.default_cpu_shares,
                stop_grace_secs: deploy.stop_grace_secs,
            },
            pipeline_timeout: Duration::from_secs(deploy.pipeline_timeout_secs),
            log_tail: deploy.log_tail,
            build_log_capacity: deploy.build_log_capacity,
        }
    }
}

/// Lifecycle options for the runner
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Record store options
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub base_url: Option<String>,
    pub token: Option<SecretString>,
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}
