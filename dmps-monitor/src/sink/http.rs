//! HTTP event processor sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use thiserror::Error;
use tracing::{debug, warn};

use dmps_event::DecodedEvent;

use super::EventSink;

/// Errors delivering to a single sink address.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("sink responded {status}: {body}")]
    Status { status: u16, body: String },
}

/// Posts every event as JSON to each configured URL in turn.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    urls: Vec<String>,
    client: Client,
}

impl HttpEventSink {
    /// Create a sink with a per-request timeout.
    pub fn new(urls: Vec<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { urls, client }
    }

    /// Deliver an event to every URL, returning the per-URL outcome.
    pub async fn deliver(&self, event: &DecodedEvent) -> Vec<(&str, Result<(), SinkError>)> {
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                let e = SinkError::from(e);
                warn!(key = %event.key, error = %e, "Dropping unserializable event");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            outcomes.push((url.as_str(), self.post(url, body.clone()).await));
        }
        outcomes
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), SinkError> {
        debug!(url = %url, "Sending event");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn forward(&self, event: &DecodedEvent) {
        for (url, outcome) in self.deliver(event).await {
            if let Err(e) = outcome {
                warn!(
                    url = %url,
                    device = %event.target_device.device_id,
                    key = %event.key,
                    error = %e,
                    "Failed to send event"
                );
            }
        }
    }
}
