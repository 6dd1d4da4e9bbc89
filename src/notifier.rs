//! Downstream scoring notification
//!
//! After a message is processed it is forwarded to a risk-scoring
//! endpoint. The forward is best-effort: the pipeline never waits on it
//! for correctness and its failure is never surfaced to the caller. An
//! unconfigured (empty) endpoint is still attempted so the failure path
//! stays uniform.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::{PrepError, PrepResult};

/// Notification sink contract
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a message to the endpoint; returns the response status code
    async fn post(&self, endpoint: &str, body: &serde_json::Value) -> PrepResult<u16>;
}

/// HTTP [`Notifier`] backed by reqwest
pub struct HttpNotifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNotifier {
    /// Create a notifier with the given per-request timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn post(&self, endpoint: &str, body: &serde_json::Value) -> PrepResult<u16> {
        let response = self
            .client
            .post(endpoint)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| PrepError::Notify(format!("request to {endpoint} failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            error!("Scoring endpoint response status != 200: {}", status);
        } else {
            debug!("Scoring endpoint accepted message");
        }
        Ok(status.as_u16())
    }
}
