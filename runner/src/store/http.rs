//! Record store backed by the platform's HTTP API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::errors::RunnerError;
use crate::models::deployment::{DeploymentLog, DeploymentStatusUpdate, MetricSample};
use crate::store::RecordStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the deployment record API
pub struct HttpRecordStore {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpRecordStore {
    /// Create a new store client
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, RunnerError> {
        let parsed = Url::parse(base_url).map_err(|e| {
            RunnerError::ConfigError(format!("invalid store URL {}: {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RunnerError::ConfigError(format!(
                "store URL must be http or https: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<(), RunnerError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let request = self.authorize(self.client.request(method.clone(), &url).json(body));
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed: {} - {}", method, status, body);
            return Err(RunnerError::StoreError(format!("{}: {}", status, body)));
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn update_status(
        &self,
        deployment_id: &str,
        update: DeploymentStatusUpdate,
    ) -> Result<(), RunnerError> {
        self.send(
            reqwest::Method::PATCH,
            &format!("/deployments/{}/status", deployment_id),
            &update,
        )
        .await
    }

    async fn append_log(&self, deployment_id: &str, log: DeploymentLog) -> Result<(), RunnerError> {
        self.send(
            reqwest::Method::POST,
            &format!("/deployments/{}/logs", deployment_id),
            &log,
        )
        .await
    }

    async fn record_metrics(
        &self,
        deployment_id: &str,
        sample: &MetricSample,
    ) -> Result<(), RunnerError> {
        self.send(
            reqwest::Method::POST,
            &format!("/deployments/{}/metrics", deployment_id),
            sample,
        )
        .await
    }
}
