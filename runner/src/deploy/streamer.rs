//! Container log retrieval

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::engine::{ContainerEngine, LogStreamOptions};
use crate::errors::EngineError;
use crate::models::deployment::LogChunk;

/// Reads historical and live container logs
pub struct LogStreamer {
    engine: Arc<dyn ContainerEngine>,
}

impl LogStreamer {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// The last `max_lines` lines of combined stdout/stderr, each prefixed
    /// with its timestamp
    pub async fn tail(&self, container_id: &str, max_lines: usize) -> Result<String, EngineError> {
        let options = LogStreamOptions {
            follow: false,
            tail: Some(max_lines),
        };

        let mut stream = self.engine.logs(container_id, options);
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            text.push_str(&format_chunk(&chunk?));
        }

        Ok(text)
    }

    /// Follow the container's output until it exits or the subscription is
    /// dropped
    pub fn follow(&self, container_id: &str) -> LogSubscription {
        let options = LogStreamOptions {
            follow: true,
            tail: Some(0),
        };

        debug!(container = %container_id, "Opening log subscription");
        LogSubscription {
            container_id: container_id.to_string(),
            inner: Some(self.engine.logs(container_id, options)),
        }
    }
}

/// Open-ended stream of log chunks for one container.
///
/// Dropping the subscription releases the engine-side log stream; the
/// container itself is unaffected. Engine errors end the stream.
pub struct LogSubscription {
    container_id: String,
    inner: Option<BoxStream<'static, Result<LogChunk, EngineError>>>,
}

impl LogSubscription {
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Stop receiving logs
    pub fn close(mut self) {
        self.inner.take();
        debug!(container = %self.container_id, "Closed log subscription");
    }
}

impl Stream for LogSubscription {
    type Item = LogChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(chunk)),
            Poll::Ready(Some(Err(e))) => {
                warn!(container = %self.container_id, "Log stream failed: {}", e);
                self.inner = None;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// `<rfc3339 timestamp> <text>` terminated by a newline
pub fn format_chunk(chunk: &LogChunk) -> String {
    let text = chunk.text.trim_end_matches(['\r', '\n']);
    format!("{} {}\n", chunk.timestamp.to_rfc3339(), text)
}
