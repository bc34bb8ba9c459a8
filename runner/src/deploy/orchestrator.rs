//! Deployment orchestrator
//!
//! Drives one deployment request through fetch, build, run, settle and probe,
//! recording every state transition in the record store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::BuildLogCache;
use crate::deploy::builder::{BuildLabels, ImageBuilder, LogSink};
use crate::deploy::cancel::{CancelGuard, CancelRegistry};
use crate::deploy::container::{ContainerManager, RunParams, DEFAULT_STOP_GRACE_SECS};
use crate::deploy::context;
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::deploy::limits::{ResourceLimits, DEFAULT_CPU_SHARES};
use crate::deploy::port::{env_with_port, PortResolver};
use crate::deploy::probe::{HealthProber, DEFAULT_PROBE_TIMEOUT};
use crate::engine::ContainerEngine;
use crate::errors::RunnerError;
use crate::models::deployment::{DeploymentLog, DeploymentRequest, DeploymentStatusUpdate};
use crate::source::SourceFetcher;
use crate::store::RecordStore;
use crate::utils::external_url;

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Pause between container start and the readiness probe
    pub settle_delay: Duration,

    /// Path the readiness probe requests
    pub probe_path: String,

    /// Timeout of the readiness probe request
    pub probe_timeout: Duration,

    /// Public URL template containing `{project}`
    pub external_url_template: String,

    /// Memory quantity used when the request names none
    pub default_memory: String,

    /// CPU weight used when the request names none
    pub default_cpu_shares: i64,

    /// Grace period for stopping containers
    pub stop_grace_secs: i64,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            probe_path: "/".to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            external_url_template: "https://{project}.localhost".to_string(),
            default_memory: "512Mi".to_string(),
            default_cpu_shares: DEFAULT_CPU_SHARES,
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
        }
    }
}

/// Final result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    pub deployment_id: String,
    pub state: DeploymentState,
    pub container_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
    pub logs: String,
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        self.state == DeploymentState::Success
    }
}

/// Log text of one pipeline attempt.
///
/// Clones share the buffer, so the text stays readable when the pipeline
/// future is dropped at the time limit.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog(Arc<Mutex<String>>);

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_str(&self, text: &str) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push_str(text);
    }

    pub fn snapshot(&self) -> String {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// State carried through a single pipeline run
struct Progress {
    fsm: DeploymentFsm,
    logs: AttemptLog,
    container_id: Option<String>,
    url: Option<String>,
}

/// Forwards build output to the record store line by line
struct StoreLogSink<'a> {
    store: &'a dyn RecordStore,
    deployment_id: &'a str,
}

#[async_trait]
impl LogSink for StoreLogSink<'_> {
    async fn on_log(&self, text: &str) {
        for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            let log = if line.starts_with("ERROR:") {
                DeploymentLog::error(line)
            } else {
                DeploymentLog::info(line)
            };

            if let Err(e) = self.store.append_log(self.deployment_id, log).await {
                error!(deployment = %self.deployment_id, "Failed to store build log: {}", e);
            }
        }
    }
}

/// Runs deployment pipelines
pub struct Orchestrator {
    fetcher: Arc<dyn SourceFetcher>,
    builder: ImageBuilder,
    containers: Arc<ContainerManager>,
    prober: HealthProber,
    store: Arc<dyn RecordStore>,
    build_logs: Arc<BuildLogCache>,
    cancels: Arc<CancelRegistry>,
    ports: PortResolver,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<dyn RecordStore>,
        build_logs: Arc<BuildLogCache>,
        options: OrchestratorOptions,
    ) -> Self {
        let containers =
            ContainerManager::new(engine.clone()).with_stop_grace(options.stop_grace_secs);

        Self {
            fetcher,
            builder: ImageBuilder::new(engine.clone()),
            containers: Arc::new(containers),
            prober: HealthProber::with_timeout(engine, options.probe_timeout),
            store,
            build_logs,
            cancels: Arc::new(CancelRegistry::new()),
            ports: PortResolver::default(),
            options,
        }
    }

    pub fn containers(&self) -> &Arc<ContainerManager> {
        &self.containers
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn build_logs(&self) -> &Arc<BuildLogCache> {
        &self.build_logs
    }

    pub fn cancels(&self) -> &Arc<CancelRegistry> {
        &self.cancels
    }

    /// Run the whole pipeline for a request.
    ///
    /// Never returns an error: failures end in a `FAILED` outcome that has
    /// already been recorded.
    pub async fn deploy(&self, request: DeploymentRequest) -> DeploymentOutcome {
        self.deploy_with_log(request, AttemptLog::new()).await
    }

    /// [`Orchestrator::deploy`], writing the attempt's logs into `log`
    pub async fn deploy_with_log(
        &self,
        request: DeploymentRequest,
        log: AttemptLog,
    ) -> DeploymentOutcome {
        let deployment_id = request.deployment_id.clone();
        let guard = self.cancels.register(&deployment_id);

        let mut progress = Progress {
            fsm: DeploymentFsm::new(),
            logs: log,
            container_id: None,
            url: None,
        };

        info!(
            deployment = %deployment_id,
            project = %request.project_id,
            commit = %request.commit,
            "Starting deployment"
        );

        if let Err(e) = self.run_pipeline(&request, &guard, &mut progress).await {
            if let Some(logs) = e.logs() {
                progress.logs.push_str(logs);
            }
            self.fail(&deployment_id, &mut progress, e).await;
        }

        let logs = progress.logs.snapshot();
        self.build_logs.insert(&deployment_id, logs.clone());

        let outcome = DeploymentOutcome {
            deployment_id,
            state: progress.fsm.state(),
            container_id: progress.container_id,
            url: progress.url,
            error: progress.fsm.error().map(str::to_string),
            logs,
        };

        info!(
            deployment = %outcome.deployment_id,
            state = %outcome.state,
            "Deployment finished"
        );
        outcome
    }

    async fn run_pipeline(
        &self,
        request: &DeploymentRequest,
        guard: &CancelGuard,
        progress: &mut Progress,
    ) -> Result<(), RunnerError> {
        let id = request.deployment_id.as_str();

        // PENDING -> BUILDING
        let update = DeploymentStatusUpdate::new(DeploymentState::Building.as_str());
        self.transition(id, progress, DeploymentEvent::StartBuild, update)
            .await?;

        let fetching = format!("Fetching {} (branch: {})", request.repo_url, request.branch);
        self.note(id, progress, DeploymentLog::info(fetching)).await;

        let checkout = self
            .fetcher
            .fetch(id, &request.repo_url, &request.branch, &request.commit)
            .await?;
        let build_context = context::assemble(checkout.path(), &request.dockerfile, id).await?;

        let labels = BuildLabels {
            deployment_id: id.to_string(),
            project_id: request.project_id.clone(),
            commit: request.commit.clone(),
        };
        let sink = StoreLogSink {
            store: self.store.as_ref(),
            deployment_id: id,
        };

        let build = self.builder.build(build_context, &labels, &sink).await;
        drop(checkout);

        let output = build?;
        progress.logs.push_str(&output.logs);

        if guard.is_canceled() {
            return self.cancel_pipeline(id, progress).await;
        }

        // BUILDING -> DEPLOYING
        let mut update = DeploymentStatusUpdate::new(DeploymentState::Deploying.as_str());
        update.logs = Some(progress.logs.snapshot());
        self.transition(id, progress, DeploymentEvent::BuildSucceeded, update)
            .await?;

        let port = self.ports.resolve(request);
        let env = env_with_port(&request.env_vars, port);
        let limits = ResourceLimits::from_quantities(
            request
                .memory
                .as_deref()
                .unwrap_or(&self.options.default_memory),
            request
                .cpu_shares
                .unwrap_or(self.options.default_cpu_shares),
        );

        let handle = self
            .containers
            .run(RunParams {
                image: &output.image,
                deployment_id: id,
                project_id: &request.project_id,
                port,
                env: &env,
                limits,
            })
            .await?;
        progress.container_id = Some(handle.id.clone());
        let started = format!("Container {} started from {}", handle.name, output.image);
        self.note(id, progress, DeploymentLog::info(started)).await;

        if guard.is_canceled() {
            return self.cancel_pipeline(id, progress).await;
        }

        // Fixed settle delay, then a single probe attempt
        tokio::time::sleep(self.options.settle_delay).await;

        if guard.is_canceled() {
            return self.cancel_pipeline(id, progress).await;
        }

        if !self
            .prober
            .check(&handle.id, &self.options.probe_path, port)
            .await
        {
            warn!(deployment = %id, port, "Health check failed, continuing");
            let warning = format!(
                "Health check on port {} path {} failed; the application may still be starting",
                port, self.options.probe_path
            );
            self.note(id, progress, DeploymentLog::warn(warning)).await;
        }

        // A stop during the health check has already removed the container
        if guard.is_canceled() {
            return self.cancel_pipeline(id, progress).await;
        }

        // DEPLOYING -> SUCCESS
        let url = external_url(&self.options.external_url_template, &request.project_id);
        progress.url = Some(url.clone());

        let mut update = DeploymentStatusUpdate::new(DeploymentState::Success.as_str());
        update.container_id = Some(handle.id.clone());
        update.url = Some(url);
        update.logs = Some(progress.logs.snapshot());
        self.transition(id, progress, DeploymentEvent::Deployed, update)
            .await?;

        Ok(())
    }

    async fn transition(
        &self,
        deployment_id: &str,
        progress: &mut Progress,
        event: DeploymentEvent,
        update: DeploymentStatusUpdate,
    ) -> Result<(), RunnerError> {
        let state = progress
            .fsm
            .process(event)
            .map_err(RunnerError::TransitionError)?;
        info!(deployment = %deployment_id, state = %state, "Deployment transition");
        self.record(deployment_id, update).await;
        Ok(())
    }

    /// Write a status update; failures are logged and swallowed
    async fn record(&self, deployment_id: &str, update: DeploymentStatusUpdate) {
        let status = update.status.clone();
        if let Err(e) = self.store.update_status(deployment_id, update).await {
            error!(
                deployment = %deployment_id,
                status = %status,
                "Failed to record status: {}",
                e
            );
        }
    }

    /// Append a pipeline message to the run's logs and the store
    async fn note(&self, deployment_id: &str, progress: &mut Progress, log: DeploymentLog) {
        progress
            .logs
            .push_str(&format!("[{}] {}\n", log.level, log.message));
        if let Err(e) = self.store.append_log(deployment_id, log).await {
            error!(deployment = %deployment_id, "Failed to store log: {}", e);
        }
    }

    async fn fail(&self, deployment_id: &str, progress: &mut Progress, err: RunnerError) {
        let message = err.to_string();
        error!(deployment = %deployment_id, "Deployment failed: {}", message);

        if let Err(e) = progress.fsm.process(DeploymentEvent::Fail(message.clone())) {
            warn!(deployment = %deployment_id, "{}", e);
            return;
        }

        self.note(deployment_id, progress, DeploymentLog::error(message.clone()))
            .await;

        let mut update = DeploymentStatusUpdate::new(DeploymentState::Failed.as_str());
        update.error_message = Some(message);
        update.logs = Some(progress.logs.snapshot());
        update.container_id = progress.container_id.clone();
        self.record(deployment_id, update).await;
    }

    async fn cancel_pipeline(
        &self,
        deployment_id: &str,
        progress: &mut Progress,
    ) -> Result<(), RunnerError> {
        info!(deployment = %deployment_id, "Deployment canceled");

        if let Some(container_id) = progress.container_id.take() {
            self.containers.stop(&container_id).await;
        }

        let canceled = DeploymentLog::warn("Deployment canceled by stop request");
        self.note(deployment_id, progress, canceled).await;

        let mut update = DeploymentStatusUpdate::new(DeploymentState::Canceled.as_str());
        update.logs = Some(progress.logs.snapshot());
        self.transition(deployment_id, progress, DeploymentEvent::Cancel, update)
            .await
    }

    /// Stop a deployment: raise the cancel flag of an in-flight pipeline and
    /// stop any container it owns. False when there was nothing to stop.
    pub async fn stop(&self, deployment_id: &str) -> bool {
        let flagged = self.cancels.cancel(deployment_id);
        let stopped = self.containers.stop_deployment(deployment_id).await;

        info!(deployment = %deployment_id, flagged, stopped, "Stop requested");
        flagged || stopped
    }

    /// Record a pipeline that exceeded its ceiling as failed and remove any
    /// container it left behind. `log` holds what the attempt wrote before
    /// it was dropped.
    pub async fn record_timeout(
        &self,
        deployment_id: &str,
        ceiling: Duration,
        log: &AttemptLog,
    ) -> DeploymentOutcome {
        let message = format!("deployment exceeded the {}s time limit", ceiling.as_secs());
        error!(deployment = %deployment_id, "{}", message);

        self.containers.stop_deployment(deployment_id).await;

        let entry = DeploymentLog::error(message.clone());
        log.push_str(&format!("[{}] {}\n", entry.level, entry.message));
        if let Err(e) = self.store.append_log(deployment_id, entry).await {
            error!(deployment = %deployment_id, "Failed to store log: {}", e);
        }

        let logs = log.snapshot();
        self.build_logs.insert(deployment_id, logs.clone());

        let mut update = DeploymentStatusUpdate::new(DeploymentState::Failed.as_str());
        update.error_message = Some(message.clone());
        update.logs = Some(logs.clone());
        self.record(deployment_id, update).await;

        DeploymentOutcome {
            deployment_id: deployment_id.to_string(),
            state: DeploymentState::Failed,
            container_id: None,
            url: None,
            error: Some(message),
            logs,
        }
    }
}
