use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::{EventPublisher, record_publish};
use crate::config::KafkaConfig;
use crate::message::ProcessedEvent;

/// Per-send wait for the broker's acknowledgement
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes events to a Kafka topic, keyed by review id.
///
/// Configured for:
/// - `acks=all` (configurable) so a confirmed send is on every in-sync replica
/// - idempotent writes so producer retries do not duplicate events
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!("Initializing Kafka producer...");

        let mut client_config = create_client_config(config);
        let producer: FutureProducer = client_config
            .set("acks", &config.producer_acks)
            .set(
                "enable.idempotence",
                config.producer_enable_idempotence.to_string(),
            )
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "2147483647")
            .set("compression.type", &config.producer_compression)
            .set("linger.ms", "5")
            .set(
                "request.timeout.ms",
                config.producer_request_timeout_ms.to_string(),
            )
            .set(
                "delivery.timeout.ms",
                config.producer_delivery_timeout_ms.to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        info!(topic = %config.topic, "Kafka producer initialized");

        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }

    async fn send(&self, event: &ProcessedEvent) -> Result<(i32, i64)> {
        let payload = event.to_json().context("Failed to serialize processed event")?;

        let record = FutureRecord::to(&self.topic)
            .key(event.review_id.as_bytes())
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(kafka_err, _)| anyhow::anyhow!("Kafka send failed: {}", kafka_err))
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    fn backend(&self) -> &'static str {
        "kafka"
    }

    async fn publish(&self, event: &ProcessedEvent) -> Result<()> {
        let started = Instant::now();
        let result = self.send(event).await;
        record_publish(self.backend(), started, &result);

        match result {
            Ok((partition, offset)) => {
                debug!(
                    review_id = %event.review_id,
                    partition = partition,
                    offset = offset,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Published processed event to Kafka"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    review_id = %event.review_id,
                    topic = %self.topic,
                    error = %e,
                    "Failed to publish processed event to Kafka"
                );
                Err(e)
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        info!("Flushing Kafka producer (timeout: {:?})", timeout);
        self.producer
            .flush(Timeout::After(timeout))
            .context("Failed to flush Kafka producer")?;
        info!("Kafka producer flushed successfully");
        Ok(())
    }
}

/// Builds the base client config: bootstrap servers, TLS and SASL.
pub(crate) fn create_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.brokers);
    client_config.set("security.protocol", "plaintext");

    if config.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");
        if let Some(ca) = &config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca);
        }
    }

    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password);

        if config.ssl_enabled {
            client_config.set("security.protocol", "sasl_ssl");
        } else {
            client_config.set("security.protocol", "sasl_plaintext");
        }
    }

    client_config
}
