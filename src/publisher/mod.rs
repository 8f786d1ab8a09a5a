// ============================================================================
// Processed-Event Publishing
// ============================================================================
//
// After a review is committed to the ledger, a ProcessedEvent is handed to
// exactly one publisher backend:
//
// - redis_stream.rs - XADD to an output stream (default)
// - kafka.rs        - rdkafka FutureProducer with acks=all
//
// A publish call returns only once the backend has confirmed the write.
//
// ============================================================================

mod kafka;
mod redis_stream;

pub use kafka::KafkaEventPublisher;
pub use redis_stream::RedisStreamPublisher;

use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::message::ProcessedEvent;
use crate::metrics;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Short backend label used in logs and metrics
    fn backend(&self) -> &'static str;

    /// Publish one event and wait for the broker's confirmation.
    async fn publish(&self, event: &ProcessedEvent) -> Result<()>;

    /// Drain anything still in flight (called on shutdown)
    async fn flush(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn record_publish<T>(backend: &str, started: Instant, result: &Result<T>) {
    let status = if result.is_ok() { "success" } else { "failure" };
    metrics::EVENTS_PUBLISHED
        .with_label_values(&[backend, status])
        .inc();
    metrics::PUBLISH_LATENCY
        .with_label_values(&[backend])
        .observe(started.elapsed().as_secs_f64());
}
