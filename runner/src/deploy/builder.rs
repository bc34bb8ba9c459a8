//! Image builder

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::deploy::context::BuildContext;
use crate::engine::{BuildEvent, ContainerEngine, COMMIT_LABEL, DEPLOYMENT_LABEL, PROJECT_LABEL};
use crate::errors::BuildError;
use crate::models::deployment::ImageReference;
use crate::utils::{deployment_name, short_commit};

/// Receives build output as it arrives
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn on_log(&self, text: &str);
}

/// Sink that discards everything
pub struct NullSink;

#[async_trait]
impl LogSink for NullSink {
    async fn on_log(&self, _text: &str) {}
}

/// Labels attached to built images
#[derive(Debug, Clone)]
pub struct BuildLabels {
    pub deployment_id: String,
    pub project_id: String,
    pub commit: String,
}

impl BuildLabels {
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (DEPLOYMENT_LABEL.to_string(), self.deployment_id.clone()),
            (PROJECT_LABEL.to_string(), self.project_id.clone()),
            (COMMIT_LABEL.to_string(), self.commit.clone()),
        ])
    }
}

/// A successful build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub image: ImageReference,
    pub image_id: Option<String>,
    pub logs: String,
}

/// Image reference for a deployment at a commit
pub fn image_reference(deployment_id: &str, commit: &str) -> ImageReference {
    ImageReference {
        name: format!("runway-{}", deployment_name(deployment_id)),
        tag: short_commit(commit),
    }
}

/// Builds images through the container engine
pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
}

impl ImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Build `context` into an image.
    ///
    /// Every engine event is appended to the log buffer and forwarded to
    /// `on_log`. Error events do not stop the build early: the event stream is
    /// drained to the end before failing. The context's temporary storage is
    /// removed on every path.
    pub async fn build(
        &self,
        context: BuildContext,
        labels: &BuildLabels,
        on_log: &dyn LogSink,
    ) -> Result<BuildOutput, BuildError> {
        let image = image_reference(&labels.deployment_id, &labels.commit);
        let result = self.build_inner(&context, &image, labels, on_log).await;
        context.close();
        result
    }

    async fn build_inner(
        &self,
        context: &BuildContext,
        image: &ImageReference,
        labels: &BuildLabels,
        on_log: &dyn LogSink,
    ) -> Result<BuildOutput, BuildError> {
        let archive = context.read_archive().await.map_err(|e| BuildError {
            message: format!("failed to read build context: {}", e),
            logs: String::new(),
        })?;

        info!(
            deployment = %labels.deployment_id,
            image = %image,
            size = archive.len(),
            "Submitting build"
        );

        let mut events = self
            .engine
            .build_image(archive, &image.reference(), labels.to_map());

        // Reader: drains the engine stream to completion no matter what the
        // accumulator does with the events.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut forwarded = true;
            while let Some(item) = events.next().await {
                let event = item.unwrap_or_else(|e| BuildEvent::Error(e.to_string()));
                if forwarded && tx.send(event).is_err() {
                    forwarded = false;
                }
            }
        });

        let mut logs = String::new();
        let mut errors: Vec<String> = Vec::new();
        let mut image_id = None;

        while let Some(event) = rx.recv().await {
            match event {
                BuildEvent::Output(text) => {
                    logs.push_str(&text);
                    on_log.on_log(&text).await;
                }
                BuildEvent::Error(message) => {
                    let line = format!("ERROR: {}\n", message.trim_end());
                    logs.push_str(&line);
                    on_log.on_log(&line).await;
                    errors.push(message);
                }
                BuildEvent::ImageId(id) => {
                    debug!(image = %image, id = %id, "Engine reported image ID");
                    image_id = Some(id);
                }
            }
        }

        if let Err(e) = reader.await {
            error!(image = %image, "Build event reader failed: {}", e);
            errors.push(format!("build event reader failed: {}", e));
        }

        if let Some(first) = errors.first() {
            error!(
                deployment = %labels.deployment_id,
                image = %image,
                errors = errors.len(),
                "Build failed: {}",
                first.trim_end()
            );
            return Err(BuildError {
                message: first.trim_end().to_string(),
                logs,
            });
        }

        info!(deployment = %labels.deployment_id, image = %image, "Build succeeded");
        Ok(BuildOutput {
            image: image.clone(),
            image_id,
            logs,
        })
    }
}
