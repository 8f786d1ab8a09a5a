// ============================================================================
// Publisher Configuration
// ============================================================================
//
// Processed-review events go either to a Redis stream (default, same broker
// as the inbound queue) or to a Kafka topic.
//
// ============================================================================

use super::{env_or, parse_env};
use anyhow::Result;

/// Which transport carries processed-review events downstream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublisherBackend {
    RedisStream,
    Kafka,
}

impl PublisherBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherBackend::RedisStream => "redis",
            PublisherBackend::Kafka => "kafka",
        }
    }
}

impl std::str::FromStr for PublisherBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" | "redis-stream" | "redis_stream" => Ok(PublisherBackend::RedisStream),
            "kafka" => Ok(PublisherBackend::Kafka),
            other => anyhow::bail!("Unknown PUBLISHER_BACKEND {:?} (expected redis or kafka)", other),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub backend: PublisherBackend,
    /// Output stream for the Redis backend
    pub output_stream: String,
    /// Routing key attached to every event
    pub routing_key: String,
    pub kafka: KafkaConfig,
}

impl PublisherConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Ok(Self {
            backend: env_or("PUBLISHER_BACKEND", "redis").parse()?,
            output_stream: env_or("OUTPUT_STREAM", "review_events"),
            routing_key: env_or("ROUTING_KEY", "review.processed"),
            kafka: KafkaConfig::from_env()?,
        })
    }
}

/// Kafka producer configuration for the Kafka publisher backend
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Topic receiving processed-review events
    pub topic: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// Path to CA certificate file (for self-signed certificates)
    pub ssl_ca_location: Option<String>,
    pub producer_acks: String, // "all" | "1" | "-1" | "0"
    pub producer_compression: String,
    pub producer_request_timeout_ms: u32,
    pub producer_delivery_timeout_ms: u32,
    pub producer_enable_idempotence: bool,
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Ok(Self {
            brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            topic: env_or("KAFKA_TOPIC", "review_events"),
            ssl_enabled: parse_env("KAFKA_SSL_ENABLED", false)?,
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            ssl_ca_location: std::env::var("KAFKA_SSL_CA_LOCATION").ok(),
            producer_acks: env_or("KAFKA_PRODUCER_ACKS", "all"),
            producer_compression: env_or("KAFKA_PRODUCER_COMPRESSION", "snappy"),
            producer_request_timeout_ms: parse_env("KAFKA_PRODUCER_REQUEST_TIMEOUT_MS", 30000)?,
            producer_delivery_timeout_ms: parse_env("KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS", 120000)?,
            producer_enable_idempotence: parse_env("KAFKA_PRODUCER_ENABLE_IDEMPOTENCE", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!(
            "redis".parse::<PublisherBackend>().unwrap(),
            PublisherBackend::RedisStream
        );
        assert_eq!(
            " Kafka ".parse::<PublisherBackend>().unwrap(),
            PublisherBackend::Kafka
        );
        assert!("rabbitmq".parse::<PublisherBackend>().is_err());
    }
}
