//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Runner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs
    #[serde(default)]
    pub json_logs: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Deployment record store configuration
    #[serde(default)]
    pub store: StoreSettings,

    /// Container engine configuration
    #[serde(default)]
    pub engine: EngineSettings,

    /// Pipeline configuration
    #[serde(default)]
    pub deploy: DeploySettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Record store settings. Without a base URL records are kept in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub token: Option<String>,
}

/// Container engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    /// `unix:///path/to/socket` or `http://host:port`; local defaults when absent
    #[serde(default)]
    pub host: Option<String>,
}

/// Deployment pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Parent directory of source checkouts; `<base_dir>/work` when absent
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Public URL template, `{project}` is replaced by the project ID
    #[serde(default = "default_external_url")]
    pub external_url_template: String,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Ceiling for a whole pipeline run
    #[serde(default = "default_pipeline_timeout")]
    pub pipeline_timeout_secs: u64,

    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: i64,

    #[serde(default = "default_memory")]
    pub default_memory: String,

    #[serde(default = "default_cpu_shares")]
    pub default_cpu_shares: i64,

    /// Lines returned by the logs endpoint when no tail is given
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,

    /// Deployments whose last logs are kept in memory
    #[serde(default = "default_build_log_capacity")]
    pub build_log_capacity: usize,
}

fn default_external_url() -> String {
    "https://{project}.localhost".to_string()
}

fn default_settle_delay() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_probe_path() -> String {
    "/".to_string()
}

fn default_pipeline_timeout() -> u64 {
    600
}

fn default_stop_grace() -> i64 {
    10
}

fn default_memory() -> String {
    "512Mi".to_string()
}

fn default_cpu_shares() -> i64 {
    1024
}

fn default_log_tail() -> usize {
    100
}

fn default_build_log_capacity() -> usize {
    256
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            work_dir: None,
            external_url_template: default_external_url(),
            settle_delay_secs: default_settle_delay(),
            probe_timeout_secs: default_probe_timeout(),
            probe_path: default_probe_path(),
            pipeline_timeout_secs: default_pipeline_timeout(),
            stop_grace_secs: default_stop_grace(),
            default_memory: default_memory(),
            default_cpu_shares: default_cpu_shares(),
            log_tail: default_log_tail(),
            build_log_capacity: default_build_log_capacity(),
        }
    }
}
