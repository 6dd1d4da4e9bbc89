//! Message bus publisher
//!
//! Forwards enriched messages to the downstream evaluation exchange. The
//! connection is established once at startup with a bounded retry loop;
//! exhausting the retries is fatal. Individual publish failures after
//! startup are the caller's to log, not to fail on.

use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::{PrepError, PrepResult};

/// Connection attempts before startup fails
const CONNECT_ATTEMPTS: u32 = 10;
/// Delay between connection attempts
const CONNECT_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Publisher for enriched messages
pub struct EventPublisher {
    channel: Channel,
    exchange: String,
}

impl EventPublisher {
    /// Connect to the bus with bounded retry and declare the exchange.
    /// Fails once the retries are exhausted.
    pub async fn connect(config: &BusConfig) -> PrepResult<Self> {
        let mut last_err = None;
        let mut connection = None;

        for attempt in 1..=CONNECT_ATTEMPTS {
            info!("Connecting to message bus (attempt {attempt}/{CONNECT_ATTEMPTS})...");
            match Connection::connect(&config.connection_string, ConnectionProperties::default())
                .await
            {
                Ok(conn) => {
                    connection = Some(conn);
                    break;
                }
                Err(e) => {
                    warn!("Message bus connection failed: {e}");
                    last_err = Some(e);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
            }
        }

        let connection = connection.ok_or_else(|| {
            PrepError::Bus(format!(
                "unable to connect to message bus after {CONNECT_ATTEMPTS} attempts: {}",
                last_err.map(|e| e.to_string()).unwrap_or_default()
            ))
        })?;

        info!("Connected to message bus");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| PrepError::Bus(format!("failed to create channel: {e}")))?;

        channel
            .exchange_declare(
                &config.exchange_name,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| PrepError::Bus(format!("failed to declare exchange: {e}")))?;

        info!("Declared exchange: {}", config.exchange_name);

        Ok(Self {
            channel,
            exchange: config.exchange_name.clone(),
        })
    }

    /// Publish an enriched message to the exchange
    pub async fn publish(&self, payload: &serde_json::Value) -> PrepResult<()> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| PrepError::Bus(format!("failed to encode payload: {e}")))?;

        self.channel
            .basic_publish(
                &self.exchange,
                "",
                BasicPublishOptions::default(),
                &bytes,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| PrepError::Bus(format!("publish failed: {e}")))?
            .await
            .map_err(|e| PrepError::Bus(format!("publish confirmation failed: {e}")))?;

        debug!("Published enriched message to {}", self.exchange);
        Ok(())
    }
}
