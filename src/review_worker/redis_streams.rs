// ============================================================================
// Redis Streams Transport
// ============================================================================
//
// Inbound reviews are entries on REVIEW_STREAM consumed through a consumer
// group; each worker reads with COUNT 1, so at most one entry is in flight.
//
// Entry fields:
//   payload - raw review body
//   attempt - delivery attempt (absent on first delivery)
//
// Fetch order:
//   1. own pending entries      XREADGROUP ... STREAMS review_stream 0
//   2. idle entries of others   XAUTOCLAIM review_stream group me min_idle cursor COUNT 1
//   3. new entries              XREADGROUP ... BLOCK ms STREAMS review_stream >
//
// Settling:
//   ACK     -> XACK
//   REJECT  -> MULTI  XADD dlq * payload reason source_id attempt dead_lettered_at
//                     XACK  EXEC
//   REQUEUE -> MULTI  XADD review_stream * payload attempt=n+1
//                     XACK  EXEC
//
// Neither settlement XADD trims its stream. An entry whose settlement fails
// stays in this consumer's pending list; the next fetch drains that list
// again. Entries left pending by a consumer that died are claimed by any
// live consumer once idle for claim_min_idle_ms.
//
// ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::streams::{StreamId, StreamReadReply};
use redis::{Pipeline, Value, cmd, pipe};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transport::{Delivery, DeliveryTransport};
use crate::config::StreamsConfig;
use crate::redis_client::RedisHandle;

const PAYLOAD_FIELD: &str = "payload";
const ATTEMPT_FIELD: &str = "attempt";

/// Read id that replays this consumer's pending (delivered, unacked) entries
const PENDING_ID: &str = "0";
/// Read id for entries never delivered to any consumer in the group
const NEW_ENTRIES_ID: &str = ">";
/// XAUTOCLAIM cursor that starts a scan of the group's pending list
const CLAIM_START_ID: &str = "0-0";

pub struct RedisStreamTransport {
    redis: Arc<RedisHandle>,
    config: StreamsConfig,
    /// Replay own pending entries before reading new ones (crash recovery)
    draining_pending: bool,
    /// Where the next XAUTOCLAIM scan of the pending list resumes
    claim_cursor: String,
}

impl RedisStreamTransport {
    pub fn new(redis: Arc<RedisHandle>, config: StreamsConfig) -> Self {
        Self {
            redis,
            config,
            draining_pending: true,
            claim_cursor: CLAIM_START_ID.to_string(),
        }
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<bool> {
        self.redis
            .execute_with_retry("xgroup_create", |conn| {
                let stream = stream.to_string();
                let group = group.to_string();

                Box::pin(async move {
                    let result: redis::RedisResult<()> = cmd("XGROUP")
                        .arg("CREATE")
                        .arg(&stream)
                        .arg(&group)
                        .arg("$")
                        .arg("MKSTREAM")
                        .query_async(conn)
                        .await;

                    match result {
                        Ok(()) => Ok(true),
                        Err(e) if e.code() == Some("BUSYGROUP") => Ok(false),
                        Err(e) => Err(e),
                    }
                })
            })
            .await
            .with_context(|| format!("Failed to declare group '{}' on '{}'", group, stream))
    }

    async fn read_one(&self, id: &str, block_ms: Option<u64>) -> Result<Option<Delivery>> {
        let reply: Option<StreamReadReply> = self
            .redis
            .execute_with_retry("xreadgroup", |conn| {
                let mut read = cmd("XREADGROUP");
                read.arg("GROUP")
                    .arg(&self.config.consumer_group)
                    .arg(&self.config.consumer_name)
                    .arg("COUNT")
                    .arg(1);
                if let Some(ms) = block_ms {
                    read.arg("BLOCK").arg(ms);
                }
                read.arg("STREAMS").arg(&self.config.review_stream).arg(id);

                Box::pin(async move { read.query_async(conn).await })
            })
            .await
            .context("Failed to read from review stream")?;

        let entry = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .next();

        Ok(entry.map(delivery_from_entry))
    }

    /// Take over one entry that another consumer left pending past the idle threshold
    async fn claim_idle(&mut self) -> Result<Option<Delivery>> {
        let reply: Value = self
            .redis
            .execute_with_retry("xautoclaim", |conn| {
                let mut claim = cmd("XAUTOCLAIM");
                claim
                    .arg(&self.config.review_stream)
                    .arg(&self.config.consumer_group)
                    .arg(&self.config.consumer_name)
                    .arg(self.config.claim_min_idle_ms)
                    .arg(&self.claim_cursor)
                    .arg("COUNT")
                    .arg(1);

                Box::pin(async move { claim.query_async(conn).await })
            })
            .await
            .context("Failed to claim idle pending entries")?;

        let (next_cursor, entry) = parse_claim_reply(reply)?;
        self.claim_cursor = next_cursor;

        let Some(entry) = entry else {
            return Ok(None);
        };
        let delivery = delivery_from_entry(entry);
        info!(
            delivery_id = %delivery.delivery_id,
            consumer = %self.config.consumer_name,
            min_idle_ms = self.config.claim_min_idle_ms,
            "Claimed idle pending entry"
        );
        Ok(Some(delivery))
    }

    /// A failed settlement leaves the entry in this consumer's pending list
    fn settled<T>(&mut self, result: Result<T>, delivery: &Delivery) -> Result<T> {
        if result.is_err() {
            self.draining_pending = true;
            debug!(
                delivery_id = %delivery.delivery_id,
                "Settlement failed, entry stays pending for the next drain"
            );
        }
        result
    }
}

#[async_trait]
impl DeliveryTransport for RedisStreamTransport {
    async fn declare_topology(&mut self) -> Result<()> {
        let declarations = [
            (&self.config.review_stream, &self.config.consumer_group),
            (&self.config.dead_letter_stream, &self.config.dead_letter_group),
        ];

        for (stream, group) in declarations {
            if self.create_group(stream, group).await? {
                info!(stream = %stream, group = %group, "Created consumer group");
            } else {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
            }
        }
        Ok(())
    }

    async fn fetch(&mut self) -> Result<Option<Delivery>> {
        if self.draining_pending {
            if let Some(delivery) = self.read_one(PENDING_ID, None).await? {
                debug!(delivery_id = %delivery.delivery_id, "Replaying pending entry");
                return Ok(Some(delivery));
            }
            self.draining_pending = false;
            info!(
                consumer = %self.config.consumer_name,
                "No pending entries left, reading new entries"
            );
        }

        if let Some(delivery) = self.claim_idle().await? {
            return Ok(Some(delivery));
        }

        self.read_one(NEW_ENTRIES_ID, Some(self.config.block_ms)).await
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let result = self
            .redis
            .execute_with_retry("xack", |conn| {
                let mut ack = cmd("XACK");
                ack.arg(&self.config.review_stream)
                    .arg(&self.config.consumer_group)
                    .arg(&delivery.delivery_id);

                Box::pin(async move { ack.query_async(conn).await })
            })
            .await;
        let acked: i64 = self
            .settled(result, delivery)
            .context("Failed to acknowledge review entry")?;

        if acked == 0 {
            warn!(delivery_id = %delivery.delivery_id, "Entry was not pending on acknowledge");
        }
        Ok(())
    }

    async fn reject(&mut self, delivery: &Delivery, reason: &str) -> Result<()> {
        let dead_lettered_at = Utc::now().to_rfc3339();

        let result = self
            .redis
            .execute_with_retry("dead_letter", |conn| {
                let tx = dead_letter_pipeline(&self.config, delivery, reason, &dead_lettered_at);
                Box::pin(async move { tx.query_async(conn).await })
            })
            .await;
        let (dlq_id, _acked): (String, i64) = self
            .settled(result, delivery)
            .context("Failed to move review entry to dead-letter stream")?;

        warn!(
            delivery_id = %delivery.delivery_id,
            dead_letter_stream = %self.config.dead_letter_stream,
            dead_letter_id = %dlq_id,
            "Review entry dead-lettered"
        );
        Ok(())
    }

    async fn requeue(&mut self, delivery: &Delivery) -> Result<()> {
        let next_attempt = delivery.attempt.saturating_add(1);

        let result = self
            .redis
            .execute_with_retry("requeue", |conn| {
                let tx = requeue_pipeline(&self.config, delivery, next_attempt);
                Box::pin(async move { tx.query_async(conn).await })
            })
            .await;
        let (requeued_id, _acked): (String, i64) = self
            .settled(result, delivery)
            .context("Failed to requeue review entry")?;

        debug!(
            delivery_id = %delivery.delivery_id,
            requeued_id = %requeued_id,
            attempt = next_attempt,
            "Review entry requeued"
        );
        Ok(())
    }
}

/// XADD to the dead-letter stream and XACK of the source entry, applied atomically
fn dead_letter_pipeline(
    config: &StreamsConfig,
    delivery: &Delivery,
    reason: &str,
    dead_lettered_at: &str,
) -> Pipeline {
    let mut tx = pipe();
    tx.atomic();
    tx.cmd("XADD")
        .arg(&config.dead_letter_stream)
        .arg("*")
        .arg(PAYLOAD_FIELD)
        .arg(&delivery.payload)
        .arg("reason")
        .arg(reason)
        .arg("source_id")
        .arg(&delivery.delivery_id)
        .arg(ATTEMPT_FIELD)
        .arg(delivery.attempt)
        .arg("dead_lettered_at")
        .arg(dead_lettered_at);
    tx.cmd("XACK")
        .arg(&config.review_stream)
        .arg(&config.consumer_group)
        .arg(&delivery.delivery_id);
    tx
}

/// Re-append with the next attempt number and XACK the original, atomically
fn requeue_pipeline(config: &StreamsConfig, delivery: &Delivery, next_attempt: u32) -> Pipeline {
    let mut tx = pipe();
    tx.atomic();
    tx.cmd("XADD")
        .arg(&config.review_stream)
        .arg("*")
        .arg(PAYLOAD_FIELD)
        .arg(&delivery.payload)
        .arg(ATTEMPT_FIELD)
        .arg(next_attempt);
    tx.cmd("XACK")
        .arg(&config.review_stream)
        .arg(&config.consumer_group)
        .arg(&delivery.delivery_id);
    tx
}

/// XAUTOCLAIM replies with `[next-cursor, [[id, [field, value, ...]], ...], ...]`.
/// Redis 6.2 reports deleted entries as nil in the entry list; they are skipped.
fn parse_claim_reply(reply: Value) -> Result<(String, Option<StreamId>)> {
    let mut parts = match reply {
        Value::Array(parts) => parts,
        other => anyhow::bail!("Unexpected XAUTOCLAIM reply: {:?}", other),
    };
    if parts.len() < 2 {
        anyhow::bail!("XAUTOCLAIM reply has {} elements, expected at least 2", parts.len());
    }

    let entries = parts.swap_remove(1);
    let cursor = value_string(&parts[0]).context("XAUTOCLAIM reply without cursor")?;

    let entry = match entries {
        Value::Array(entries) => entries.into_iter().find_map(claimed_entry),
        Value::Nil => None,
        other => anyhow::bail!("Unexpected XAUTOCLAIM entry list: {:?}", other),
    };
    Ok((cursor, entry))
}

fn claimed_entry(value: Value) -> Option<StreamId> {
    let Value::Array(mut pair) = value else {
        return None;
    };
    if pair.len() != 2 {
        return None;
    }
    let fields = pair.pop()?;
    let id = value_string(&pair[0])?;

    let mut map = HashMap::new();
    if let Value::Array(fields) = fields {
        let mut fields = fields.into_iter();
        while let (Some(key), Some(value)) = (fields.next(), fields.next()) {
            if let Some(key) = value_string(&key) {
                map.insert(key, value);
            }
        }
    }
    Some(StreamId { id, map })
}

fn value_string(value: &Value) -> Option<String> {
    value_bytes(value).and_then(|raw| String::from_utf8(raw).ok())
}

/// Entries whose fields were trimmed away while pending come back without a
/// payload; they surface as an empty body and are dead-lettered as malformed.
fn delivery_from_entry(entry: StreamId) -> Delivery {
    let payload = entry
        .map
        .get(PAYLOAD_FIELD)
        .and_then(value_bytes)
        .unwrap_or_default();

    let attempt = entry
        .map
        .get(ATTEMPT_FIELD)
        .and_then(value_string)
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .unwrap_or(1);

    Delivery::new(entry.id, payload).with_attempt(attempt)
}

fn value_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(bytes) => Some(bytes.clone()),
        Value::SimpleString(s) => Some(s.as_bytes().to_vec()),
        Value::Int(i) => Some(i.to_string().into_bytes()),
        _ => None,
    }
}
