//! runway - Entry Point
//!
//! Builds container images from repository snapshots and runs them on the
//! local container engine.

use std::collections::HashMap;
use std::env;

use runway::app::options::AppOptions;
use runway::app::run::run;
use runway::errors::RunnerError;
use runway::logs::{init_logging, LogLevel, LogOptions};
use runway::storage::layout::StorageLayout;
use runway::storage::settings::Settings;
use runway::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file
    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };
    let mut settings = match load_settings(&layout, cli_args.get("config")).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return;
        }
    };

    // Command line overrides
    if let Some(level) = cli_args.get("log-level") {
        match level.parse::<LogLevel>() {
            Ok(level) => settings.log_level = level,
            Err(e) => eprintln!("{e}, keeping {:?}", settings.log_level),
        }
    }
    let mut port_override_error = None;
    if let Some(port) = cli_args.get("port") {
        match port.parse::<u16>() {
            Ok(port) => settings.server.port = port,
            Err(e) => port_override_error = Some(format!("Invalid port {port}: {e}")),
        }
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.json_logs,
    };
    if let Err(e) = init_logging(&log_options) {
        println!("Failed to initialize logging: {e}");
    }
    if let Some(message) = port_override_error {
        warn!("{}", message);
    }

    // Run the server
    let options = AppOptions::from_settings(&settings, &layout);

    info!("Running runway {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the runner: {e}");
        std::process::exit(1);
    }
}

/// Settings from `--config=<path>`, else `<base_dir>/settings.json`.
/// A missing default file yields the defaults.
async fn load_settings(
    layout: &StorageLayout,
    config: Option<&String>,
) -> Result<Settings, RunnerError> {
    match config {
        Some(path) => runway::filesys::file::File::new(path).read_json().await,
        None => Ok(layout
            .settings_file()
            .read_json_opt::<Settings>()
            .await?
            .unwrap_or_default()),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    warn!("Unable to install signal handlers, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
