//! flow-prep: payment-flow correlation and pseudonymization service
//!
//! This crate ingests correlated financial-transaction messages belonging
//! to a single payment flow and prepares them for graph analysis:
//!
//! - **Deterministic pseudonymization**: account identities are replaced
//!   by keyed digests before they cross any persistence or network
//!   boundary
//! - **Flow identity cache**: the originating quote establishes a
//!   creditor/debtor identity pair that every follow-up message recovers
//!   through a cache-aside read, rebuilt from durable storage when the
//!   fast cache has moved on
//! - **Relationship edges**: each message yields a directed edge between
//!   pseudonymized accounts, persisted for downstream graph analysis
//! - **Best-effort scoring forward**: enriched messages are posted to a
//!   downstream risk-scoring endpoint without ever failing the pipeline
//!
//! # Architecture
//!
//! The HTTP API decodes the four tagged message kinds and dispatches each
//! to the correlation pipeline, which talks to its collaborators (fast
//! cache, durable store, notifier) through injected traits.
//!
#![warn(missing_docs)]

pub mod api;
pub mod bus;
pub mod cache;
pub mod config;
pub mod hasher;
pub mod messages;
pub mod notifier;
pub mod pipeline;
pub mod relationship;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use bus::EventPublisher;
use cache::InMemoryCache;
pub use config::Config;
use messages::PaymentMessage;
use notifier::HttpNotifier;
use pipeline::CorrelationPipeline;
use store::SqliteStore;

/// The main application state
#[derive(Clone)]
pub struct FlowPrepApp {
    /// Application configuration
    pub config: Arc<Config>,
    /// The correlation pipeline with its wired collaborators
    pub pipeline: Arc<CorrelationPipeline>,
    /// Message bus publisher, when configured
    publisher: Option<Arc<EventPublisher>>,
}

impl FlowPrepApp {
    /// Create a new application instance: open durable storage, wire the
    /// pipeline, and establish the bus connection (bounded retry, fatal
    /// when exhausted).
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing flow-prep application...");

        let config = Arc::new(config);

        let store = SqliteStore::connect(
            &config.resolve_database_path(),
            &config.database.quote_collection,
            &config.database.transfer_collection,
        )
        .await?;

        let cache = InMemoryCache::new();
        let notifier = HttpNotifier::new(Duration::from_secs(
            config.downstream.notify_timeout_seconds,
        ));

        let pipeline = Arc::new(CorrelationPipeline::new(
            Arc::new(cache),
            Arc::new(store),
            Arc::new(notifier),
            &config,
        ));

        let publisher = match &config.downstream.bus {
            Some(bus_config) => Some(Arc::new(EventPublisher::connect(bus_config).await?)),
            None => {
                info!("Message bus not configured, enriched messages will not be forwarded");
                None
            }
        };

        info!("flow-prep application initialized successfully");

        Ok(Self {
            config,
            pipeline,
            publisher,
        })
    }

    /// Start the application with a shutdown signal
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        info!(
            "flow-prep running. API available at http://{}",
            self.config.api.bind_address
        );
        api::serve_with_shutdown(self.clone(), shutdown_rx).await
    }

    /// Forward an enriched message to the evaluation exchange,
    /// best-effort: failures are logged and never surfaced.
    pub async fn forward(&self, message: &PaymentMessage) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        match serde_json::to_value(message) {
            Ok(payload) => {
                if let Err(e) = publisher.publish(&payload).await {
                    warn!("Failed to forward enriched message to bus: {e}");
                }
            }
            Err(e) => warn!("Failed to encode enriched message for bus: {e}"),
        }
    }
}

/// Error types for the correlation service
#[derive(thiserror::Error, Debug)]
pub enum PrepError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or unserializable message
    #[error("Malformed message: {0}")]
    Message(String),

    /// Fast cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Durable storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Downstream notification error
    #[error("Notification error: {0}")]
    Notify(String),

    /// Message bus error
    #[error("Message bus error: {0}")]
    Bus(String),
}

/// Result type alias for correlation operations
pub type PrepResult<T> = std::result::Result<T, PrepError>;
