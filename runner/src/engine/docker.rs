//! Docker implementation of the container engine, backed by bollard

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
    StopContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::service::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{
    BuildEvent, ContainerDetails, ContainerEngine, ContainerSpec, ContainerSummary, EngineStats,
    LogStreamOptions,
};
use crate::errors::EngineError;
use crate::models::deployment::{LogChunk, LogStream};

const CONNECT_TIMEOUT_SECS: u64 = 120;
const STREAM_BUFFER: usize = 64;

/// Docker engine client
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the engine at `host`, or the local defaults when `None`.
    ///
    /// Accepts `unix:///path`, a bare socket path, `tcp://` or `http://` URLs.
    pub fn connect(host: Option<&str>) -> Result<Self, EngineError> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("unix://") || host.starts_with('/') => {
                Docker::connect_with_socket(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(host) => {
                let addr = host.replacen("tcp://", "http://", 1);
                Docker::connect_with_http(&addr, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
        }
        .map_err(|e| EngineError::Connection(e.to_string()))?;

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }

    fn build_image(
        &self,
        context: Bytes,
        tag: &str,
        labels: HashMap<String, String>,
    ) -> BoxStream<'static, Result<BuildEvent, EngineError>> {
        let docker = self.docker.clone();
        let tag = tag.to_string();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let options = BuildImageOptions {
                dockerfile: "Dockerfile".to_string(),
                t: tag.clone(),
                labels,
                rm: true,
                forcerm: true,
                ..Default::default()
            };

            let mut events = Box::pin(docker.build_image(options, None, Some(context)));
            let mut receiver_gone = false;

            // Drain every event even if the reader went away, so the engine
            // never blocks on an unread build stream.
            while let Some(item) = events.next().await {
                let mapped: Vec<Result<BuildEvent, EngineError>> = match item {
                    Ok(info) => {
                        let mut out = Vec::new();
                        if let Some(stream) = info.stream {
                            out.push(Ok(BuildEvent::Output(stream)));
                        }
                        if let Some(status) = info.status {
                            out.push(Ok(BuildEvent::Output(format!("{}\n", status))));
                        }
                        if let Some(error) = info.error {
                            out.push(Ok(BuildEvent::Error(error)));
                        }
                        if let Some(id) = info.aux.and_then(|aux| aux.id) {
                            out.push(Ok(BuildEvent::ImageId(id)));
                        }
                        out
                    }
                    Err(e) => vec![Err(EngineError::from(e))],
                };

                if receiver_gone {
                    continue;
                }
                for event in mapped {
                    if tx.send(event).await.is_err() {
                        warn!(tag = %tag, "Build event reader dropped, draining remaining events");
                        receiver_gone = true;
                        break;
                    }
                }
            }

            debug!(tag = %tag, "Build event stream finished");
        });

        channel_stream(rx)
    }

    async fn find_container_by_name(&self, name: &str) -> Result<Option<String>, EngineError> {
        let filters: HashMap<String, Vec<String>> =
            [("name".to_string(), vec![format!("^/{}$", name)])]
                .into_iter()
                .collect();

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().find_map(|c| c.id))
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, EngineError> {
        let exposed_ports: Option<HashMap<String, HashMap<(), ()>>> = spec
            .port
            .map(|p| [(format!("{}/tcp", p), HashMap::new())].into_iter().collect());

        // No host port: the engine picks an ephemeral one.
        let port_bindings: Option<HashMap<String, Option<Vec<PortBinding>>>> =
            spec.port.map(|p| {
                let binding = PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: None,
                };
                [(format!("{}/tcp", p), Some(vec![binding]))]
                    .into_iter()
                    .collect()
            });

        let restart_policy = spec.restart_policy.as_deref().map(|name| RestartPolicy {
            name: Some(match name {
                "always" => RestartPolicyNameEnum::ALWAYS,
                "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
                "no" => RestartPolicyNameEnum::NO,
                _ => RestartPolicyNameEnum::UNLESS_STOPPED,
            }),
            maximum_retry_count: None,
        });

        let host_config = HostConfig {
            port_bindings,
            memory: spec.memory_bytes,
            cpu_shares: spec.cpu_shares,
            restart_policy,
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env),
            labels: Some(spec.labels),
            exposed_ports,
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            warn!(container = %spec.name, "Engine warning: {}", warning);
        }

        info!(container = %spec.name, id = %response.id, image = %spec.image, "Created container");
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: grace_secs }))
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        let labels = inspect
            .config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default();

        let mut ip_address = None;
        let mut host_ports = HashMap::new();

        if let Some(settings) = inspect.network_settings {
            ip_address = settings.ip_address.filter(|ip| !ip.is_empty());

            // User-defined networks leave the top-level address empty
            if ip_address.is_none() {
                ip_address = settings.networks.and_then(|networks| {
                    networks
                        .into_values()
                        .find_map(|n| n.ip_address.filter(|ip| !ip.is_empty()))
                });
            }

            for (key, bindings) in settings.ports.unwrap_or_default() {
                let container_port = key.split('/').next().and_then(|p| p.parse::<u16>().ok());
                let host_port = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()));
                if let (Some(c), Some(h)) = (container_port, host_port) {
                    host_ports.insert(c, h);
                }
            }
        }

        Ok(ContainerDetails {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            running,
            ip_address,
            labels,
            host_ports,
        })
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerSummary>, EngineError> {
        let filters: HashMap<String, Vec<String>> =
            [("label".to_string(), vec![label.to_string()])]
                .into_iter()
                .collect();

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    names: c
                        .names
                        .unwrap_or_default()
                        .into_iter()
                        .map(|n| n.trim_start_matches('/').to_string())
                        .collect(),
                    state: c.state.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                    ports: c
                        .ports
                        .unwrap_or_default()
                        .into_iter()
                        .map(|p| (p.private_port, p.public_port))
                        .collect(),
                })
            })
            .collect())
    }

    fn logs(
        &self,
        id: &str,
        options: LogStreamOptions,
    ) -> BoxStream<'static, Result<LogChunk, EngineError>> {
        let docker = self.docker.clone();
        let id = id.to_string();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let options = LogsOptions::<String> {
                follow: options.follow,
                stdout: true,
                stderr: true,
                timestamps: true,
                tail: options
                    .tail
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "all".to_string()),
                ..Default::default()
            };

            let mut output = Box::pin(docker.logs(&id, Some(options)));

            loop {
                tokio::select! {
                    // Subscriber went away: drop the engine stream.
                    _ = tx.closed() => {
                        debug!(container = %id, "Log subscriber disconnected");
                        break;
                    }
                    item = output.next() => {
                        let Some(item) = item else { break };
                        let chunk = item.map(log_chunk).map_err(EngineError::from);
                        if tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        channel_stream(rx)
    }

    async fn stats(&self, id: &str) -> Result<EngineStats, EngineError> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };

        let mut stream = Box::pin(self.docker.stats(id, Some(options)));
        let stats = stream
            .next()
            .await
            .ok_or_else(|| EngineError::NotFound(format!("no stats for {}", id)))??;

        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or_else(|| {
            stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(|v| v.len() as u64)
                .unwrap_or(1)
        });

        Ok(EngineStats {
            cpu_total: stats.cpu_stats.cpu_usage.total_usage,
            precpu_total: stats.precpu_stats.cpu_usage.total_usage,
            system_cpu: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
            presystem_cpu: stats.precpu_stats.system_cpu_usage.unwrap_or(0),
            online_cpus,
            memory_usage: stats.memory_stats.usage.unwrap_or(0),
            memory_limit: stats.memory_stats.limit.unwrap_or(0),
            networks: stats
                .networks
                .unwrap_or_default()
                .into_values()
                .map(|n| (n.rx_bytes, n.tx_bytes))
                .collect(),
        })
    }
}

/// Turn a receiver into a stream that ends when the sender is dropped
fn channel_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Split a timestamped engine log line into a chunk
fn log_chunk(output: LogOutput) -> LogChunk {
    let (stream, message) = match output {
        LogOutput::StdErr { message } => (LogStream::Stderr, message),
        LogOutput::StdOut { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => (LogStream::Stdout, message),
    };

    let line = String::from_utf8_lossy(&message).into_owned();
    let (timestamp, text) = split_timestamp(&line);

    LogChunk {
        timestamp,
        stream,
        text,
    }
}

fn split_timestamp(line: &str) -> (DateTime<Utc>, String) {
    if let Some((ts, rest)) = line.split_once(' ') {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
            return (parsed.with_timezone(&Utc), rest.to_string());
        }
    }
    (Utc::now(), line.to_string())
}
