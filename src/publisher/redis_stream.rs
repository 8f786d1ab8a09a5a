use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionLike;
use redis::{Cmd, cmd};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{EventPublisher, record_publish};
use crate::message::ProcessedEvent;
use crate::redis_client::RedisHandle;

/// Publishes events to a Redis stream.
///
/// Entry layout:
/// `XADD {stream} MAXLEN ~ {max_len} * review_id {id} routing_key {key} payload {json}`
///
/// The XADD is sent once per publish. A lost reply is reported as a publish
/// failure and is not reissued.
pub struct RedisStreamPublisher {
    redis: Arc<RedisHandle>,
    stream: String,
    routing_key: String,
    max_len: usize,
}

impl RedisStreamPublisher {
    pub fn new(redis: Arc<RedisHandle>, stream: String, routing_key: String, max_len: usize) -> Self {
        Self {
            redis,
            stream,
            routing_key,
            max_len,
        }
    }

    async fn append(&self, event: &ProcessedEvent) -> Result<String> {
        let entry = event_entry(&self.stream, &self.routing_key, self.max_len, event)?;

        self.redis
            .execute_once("publish_processed_event", move |conn| {
                Box::pin(async move { send_entry(conn, &entry).await })
            })
            .await
    }
}

fn event_entry(
    stream: &str,
    routing_key: &str,
    max_len: usize,
    event: &ProcessedEvent,
) -> Result<Cmd> {
    let payload = event.to_json().context("Failed to serialize processed event")?;

    let mut entry = cmd("XADD");
    entry
        .arg(stream)
        .arg("MAXLEN")
        .arg("~")
        .arg(max_len as i64)
        .arg("*")
        .arg("review_id")
        .arg(&event.review_id)
        .arg("routing_key")
        .arg(routing_key)
        .arg("payload")
        .arg(payload);
    Ok(entry)
}

async fn send_entry<C>(conn: &mut C, entry: &Cmd) -> redis::RedisResult<String>
where
    C: ConnectionLike + Send,
{
    entry.query_async(conn).await
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, event: &ProcessedEvent) -> Result<()> {
        let started = Instant::now();
        let result = self.append(event).await;
        record_publish(self.backend(), started, &result);

        let stream_id = result.with_context(|| {
            format!("Failed to publish event to stream '{}'", self.stream)
        })?;

        debug!(
            review_id = %event.review_id,
            stream = %self.stream,
            stream_id = %stream_id,
            "Published processed event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ProcessedReview;
    use crate::sentiment::Sentiment;
    use chrono::Utc;
    use redis::{Pipeline, RedisError, RedisFuture, Value};
    use std::io;

    /// Accepts every command onto the wire, then loses the reply
    #[derive(Default)]
    struct ResetAfterWrite {
        written: Vec<Vec<u8>>,
    }

    fn connection_reset() -> RedisError {
        io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer").into()
    }

    impl ConnectionLike for ResetAfterWrite {
        fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
            self.written.push(cmd.get_packed_command());
            Box::pin(async { Err::<Value, RedisError>(connection_reset()) })
        }

        fn req_packed_commands<'a>(
            &'a mut self,
            pipeline: &'a Pipeline,
            _offset: usize,
            _count: usize,
        ) -> RedisFuture<'a, Vec<Value>> {
            self.written.push(pipeline.get_packed_pipeline());
            Box::pin(async { Err::<Vec<Value>, RedisError>(connection_reset()) })
        }

        fn get_db(&self) -> i64 {
            0
        }
    }

    fn event() -> ProcessedEvent {
        let review = crate::message::InboundReview::parse(
            br#"{"reviewId":"rv_1","productId":"p1","userId":"u1","rating":4,"comment":"good"}"#,
        )
        .unwrap();
        ProcessedEvent::from_record(&ProcessedReview::new(review, Sentiment::Positive, Utc::now()))
    }

    #[test]
    fn test_entry_trims_output_stream_and_carries_review_id() {
        let entry = event_entry("processed_reviews", "review.processed", 1000, &event()).unwrap();
        let packed = String::from_utf8_lossy(&entry.get_packed_command()).to_string();

        assert!(packed.contains("XADD"));
        assert!(packed.contains("processed_reviews"));
        assert!(packed.contains("MAXLEN"));
        assert!(packed.contains("rv_1"));
        assert!(packed.contains("review.processed"));
    }

    #[tokio::test]
    async fn test_lost_reply_is_not_reissued() {
        let entry = event_entry("processed_reviews", "review.processed", 1000, &event()).unwrap();
        let mut conn = ResetAfterWrite::default();

        let result = send_entry(&mut conn, &entry).await;

        let err = result.unwrap_err();
        assert!(err.is_io_error());
        assert_eq!(conn.written.len(), 1);
        assert_eq!(conn.written[0], entry.get_packed_command());
    }
}
