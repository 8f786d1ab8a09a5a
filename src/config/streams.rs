// ============================================================================
// Redis Streams Configuration
// ============================================================================
//
// Inbound reviews arrive on a Redis stream consumed through a consumer group.
// Rejected deliveries are moved to a dead-letter stream that has its own
// group so operators can inspect and replay them.
//
// ============================================================================

use super::{env_or, parse_env};
use anyhow::Result;

#[derive(Clone, Debug)]
pub struct StreamsConfig {
    pub redis_url: String,
    /// Inbound stream carrying raw review payloads
    pub review_stream: String,
    /// Consumer group shared by all review workers
    pub consumer_group: String,
    /// Name of this worker inside the consumer group
    pub consumer_name: String,
    /// Dead-letter destination for rejected deliveries
    pub dead_letter_stream: String,
    /// Group declared on the dead-letter stream for reprocessing tools
    pub dead_letter_group: String,
    /// How long a fetch blocks waiting for a new entry (milliseconds)
    pub block_ms: u64,
    /// Pending entries idle at least this long are claimed from other
    /// consumers in the group (milliseconds)
    pub claim_min_idle_ms: u64,
    /// Approximate MAXLEN applied to the processed-event stream
    pub max_len: usize,
}

impl StreamsConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let consumer_name = std::env::var("REVIEW_CONSUMER_NAME")
            .unwrap_or_else(|_| format!("review-worker-{}", uuid::Uuid::new_v4()));

        let config = Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            review_stream: env_or("REVIEW_STREAM", "product_reviews"),
            consumer_group: env_or("REVIEW_CONSUMER_GROUP", "review-workers"),
            consumer_name,
            dead_letter_stream: env_or("DEAD_LETTER_STREAM", "product_reviews.dlq"),
            dead_letter_group: env_or("DEAD_LETTER_GROUP", "review-reprocessors"),
            block_ms: parse_env("STREAM_BLOCK_MS", 5000)?,
            claim_min_idle_ms: parse_env("STREAM_CLAIM_MIN_IDLE_MS", 60_000)?,
            max_len: parse_env("STREAM_MAX_LEN", 100_000)?,
        };

        if config.review_stream == config.dead_letter_stream {
            anyhow::bail!("DEAD_LETTER_STREAM must differ from REVIEW_STREAM");
        }

        Ok(config)
    }

    /// Redis URL with credentials masked, for logging
    pub fn redacted_redis_url(&self) -> String {
        super::database::redact_credentials(&self.redis_url)
    }
}
