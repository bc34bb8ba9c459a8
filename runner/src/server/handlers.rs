//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::deploy::fsm::DeploymentState;
use crate::deploy::AttemptLog;
use crate::errors::EngineError;
use crate::models::deployment::{ContainerHandle, DeploymentRequest, MetricSample};
use crate::server::state::ServerState;
use crate::telemetry::{collect_host_metrics, HostMetrics};
use crate::utils::version_info;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Handler error carrying an HTTP status
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ================================ HEALTH ======================================= //

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub engine: String,
    pub host: Option<HostMetrics>,
}

/// Health check handler. Reports the runner process, not any deployment.
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let engine = match state.engine.ping().await {
        Ok(()) => "reachable".to_string(),
        Err(e) => {
            warn!("Container engine unreachable: {}", e);
            "unreachable".to_string()
        }
    };

    let host = tokio::task::spawn_blocking(collect_host_metrics).await.ok();

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "runway".to_string(),
        version: version_info().version,
        engine,
        host,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================ DEPLOY ======================================= //

/// Deploy response
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub success: bool,
    pub deployment_id: String,
    pub status: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run a deployment pipeline to completion.
///
/// The pipeline runs in its own task so a client disconnect does not abort
/// it half way; the ceiling still applies.
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DeploymentRequest>,
) -> Result<Json<DeployResponse>, ApiError> {
    info!(
        deployment = %request.deployment_id,
        project = %request.project_id,
        "Deploy requested"
    );

    let orchestrator = state.orchestrator.clone();
    let ceiling = state.pipeline_timeout;
    let deployment_id = request.deployment_id.clone();

    let task = tokio::spawn(async move {
        let id = request.deployment_id.clone();
        let log = AttemptLog::new();
        let pipeline = orchestrator.deploy_with_log(request, log.clone());
        match tokio::time::timeout(ceiling, pipeline).await {
            Ok(outcome) => outcome,
            Err(_) => orchestrator.record_timeout(&id, ceiling, &log).await,
        }
    });

    let outcome = task.await.map_err(|e| {
        error!(deployment = %deployment_id, "Deployment task failed: {}", e);
        ApiError::internal(format!("deployment task failed: {}", e))
    })?;

    if !outcome.is_success() {
        let message = match outcome.state {
            DeploymentState::Canceled => "deployment canceled".to_string(),
            _ => outcome
                .error
                .unwrap_or_else(|| "deployment failed".to_string()),
        };
        return Err(ApiError::internal(message));
    }

    Ok(Json(DeployResponse {
        success: true,
        deployment_id: outcome.deployment_id,
        status: outcome.state,
        container_id: outcome.container_id,
        url: outcome.url,
        error: None,
    }))
}

/// Stop response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub success: bool,
}

/// Best-effort stop of a deployment
pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> impl IntoResponse {
    let success = state.orchestrator.stop(&deployment_id).await;
    Json(StopResponse { success })
}

/// Deployments response
#[derive(Debug, Serialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<ContainerHandle>,
    pub total: usize,
}

/// All containers carrying the deployment label
pub async fn deployments_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<DeploymentsResponse>, ApiError> {
    let deployments = state.orchestrator.containers().list().await?;
    Ok(Json(DeploymentsResponse {
        total: deployments.len(),
        deployments,
    }))
}

// ============================== OBSERVATION ==================================== //

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
}

/// Container logs, or the last pipeline logs when no container is found
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<String, ApiError> {
    let tail = query.tail.unwrap_or(state.log_tail);

    match state.orchestrator.containers().find(&deployment_id).await {
        Ok(Some(handle)) => match state.streamer.tail(&handle.id, tail).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                warn!(deployment = %deployment_id, "Failed to read container logs: {}", e)
            }
        },
        Ok(None) => {}
        Err(e) => warn!(deployment = %deployment_id, "Failed to look up container: {}", e),
    }

    state
        .orchestrator
        .build_logs()
        .get(&deployment_id)
        .ok_or_else(|| ApiError::not_found(format!("no logs for deployment {}", deployment_id)))
}

/// Server-sent events, one per log line, until the container's output ends
pub async fn stream_logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let handle = state
        .orchestrator
        .containers()
        .find(&deployment_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no container for deployment {}", deployment_id))
        })?;

    let subscription = state.streamer.follow(&handle.id);

    let lines = subscription.flat_map(|chunk| {
        let events: Vec<Result<Event, Infallible>> = chunk
            .text
            .lines()
            .map(|line| Ok(Event::default().data(line)))
            .collect();
        stream::iter(events)
    });
    let end = stream::once(async {
        Ok::<_, Infallible>(Event::default().event("end").data("stream closed"))
    });

    Ok(Sse::new(lines.chain(end)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub deployment_id: String,
    pub container_id: String,
    #[serde(flatten)]
    pub sample: MetricSample,
}

/// Current resource usage; the sample is also recorded in the store
pub async fn stats_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<StatsResponse>, ApiError> {
    let handle = state
        .orchestrator
        .containers()
        .find(&deployment_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no container for deployment {}", deployment_id))
        })?;

    let sample = state.metrics.sample(&handle.id).await;

    if let Err(e) = state
        .orchestrator
        .store()
        .record_metrics(&deployment_id, &sample)
        .await
    {
        error!(deployment = %deployment_id, "Failed to record metrics: {}", e);
    }

    Ok(Json(StatsResponse {
        deployment_id,
        container_id: handle.id,
        sample,
    }))
}
