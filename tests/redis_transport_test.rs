// ============================================================================
// Redis Streams Transport Integration Tests
// ============================================================================
//
// These tests require a Redis instance (local or test container).
//
// Run with: cargo test --test redis_transport_test -- --ignored
//
// ============================================================================

use redis::streams::StreamRangeReply;
use redis::{AsyncCommands, Value};
use review_sentiment_worker::config::StreamsConfig;
use review_sentiment_worker::redis_client::RedisHandle;
use review_sentiment_worker::review_worker::{DeliveryTransport, RedisStreamTransport};
use serial_test::serial;
use std::env;
use std::sync::Arc;
use uuid::Uuid;

fn redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn test_config() -> StreamsConfig {
    let suffix = Uuid::new_v4();
    StreamsConfig {
        redis_url: redis_url(),
        review_stream: format!("test_reviews:{}", suffix),
        consumer_group: "test-review-workers".to_string(),
        consumer_name: "test-worker-1".to_string(),
        dead_letter_stream: format!("test_reviews:{}.dlq", suffix),
        dead_letter_group: "test-reprocessors".to_string(),
        block_ms: 100,
        claim_min_idle_ms: 60_000,
        max_len: 1000,
    }
}

async fn setup() -> (RedisStreamTransport, redis::aio::MultiplexedConnection, StreamsConfig) {
    let config = test_config();
    let handle = RedisHandle::connect(&config.redis_url)
        .await
        .expect("Failed to connect to Redis for tests");
    let mut transport = RedisStreamTransport::new(Arc::new(handle), config.clone());
    transport.declare_topology().await.expect("declare topology");

    let conn = redis::Client::open(config.redis_url.as_str())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    (transport, conn, config)
}

async fn cleanup(conn: &mut redis::aio::MultiplexedConnection, config: &StreamsConfig) {
    let _: () = conn
        .del(&[&config.review_stream, &config.dead_letter_stream])
        .await
        .unwrap();
}

async fn add_review(conn: &mut redis::aio::MultiplexedConnection, stream: &str, body: &[u8]) -> String {
    conn.xadd(stream, "*", &[("payload", body)]).await.unwrap()
}

fn field(map: &std::collections::HashMap<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).to_string(),
        other => panic!("unexpected field {}: {:?}", key, other),
    }
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_declare_topology_is_idempotent() {
    let (mut transport, mut conn, config) = setup().await;

    // second declaration hits BUSYGROUP and must still succeed
    transport.declare_topology().await.unwrap();

    cleanup(&mut conn, &config).await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_fetch_and_ack() {
    let (mut transport, mut conn, config) = setup().await;
    let entry_id = add_review(&mut conn, &config.review_stream, b"{\"reviewId\":\"rv_1\"}").await;

    let delivery = transport.fetch().await.unwrap().expect("one entry");
    assert_eq!(delivery.delivery_id, entry_id);
    assert_eq!(delivery.payload, b"{\"reviewId\":\"rv_1\"}".to_vec());
    assert_eq!(delivery.attempt, 1);

    transport.ack(&delivery).await.unwrap();

    let pending: redis::streams::StreamPendingReply = conn
        .xpending(&config.review_stream, &config.consumer_group)
        .await
        .unwrap();
    assert_eq!(pending.count(), 0);

    // nothing left; BLOCK times out
    assert!(transport.fetch().await.unwrap().is_none());

    cleanup(&mut conn, &config).await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_reject_moves_entry_to_dead_letter_stream() {
    let (mut transport, mut conn, config) = setup().await;
    add_review(&mut conn, &config.review_stream, b"not json").await;

    let delivery = transport.fetch().await.unwrap().expect("one entry");
    transport.reject(&delivery, "invalid JSON").await.unwrap();

    let dlq: StreamRangeReply = conn.xrange_all(&config.dead_letter_stream).await.unwrap();
    assert_eq!(dlq.ids.len(), 1);
    let dead = &dlq.ids[0].map;
    assert_eq!(field(dead, "payload"), "not json");
    assert_eq!(field(dead, "reason"), "invalid JSON");
    assert_eq!(field(dead, "source_id"), delivery.delivery_id);
    assert_eq!(field(dead, "attempt"), "1");

    let pending: redis::streams::StreamPendingReply = conn
        .xpending(&config.review_stream, &config.consumer_group)
        .await
        .unwrap();
    assert_eq!(pending.count(), 0);

    cleanup(&mut conn, &config).await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_requeue_redelivers_with_next_attempt() {
    let (mut transport, mut conn, config) = setup().await;
    add_review(&mut conn, &config.review_stream, b"{}").await;

    let first = transport.fetch().await.unwrap().expect("one entry");
    transport.requeue(&first).await.unwrap();

    let second = transport.fetch().await.unwrap().expect("requeued entry");
    assert_ne!(second.delivery_id, first.delivery_id);
    assert_eq!(second.payload, b"{}".to_vec());
    assert_eq!(second.attempt, 2);

    transport.ack(&second).await.unwrap();
    cleanup(&mut conn, &config).await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_unsettled_entry_is_replayed_after_restart() {
    let (mut transport, mut conn, config) = setup().await;
    let entry_id = add_review(&mut conn, &config.review_stream, b"{}").await;

    let delivery = transport.fetch().await.unwrap().expect("one entry");
    assert_eq!(delivery.delivery_id, entry_id);
    drop(transport);

    // same consumer name, fresh process
    let handle = RedisHandle::connect(&config.redis_url).await.unwrap();
    let mut restarted = RedisStreamTransport::new(Arc::new(handle), config.clone());
    let replayed = restarted.fetch().await.unwrap().expect("pending entry");
    assert_eq!(replayed.delivery_id, entry_id);

    restarted.ack(&replayed).await.unwrap();
    cleanup(&mut conn, &config).await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_idle_entry_of_dead_consumer_is_claimed_by_another() {
    let (mut transport, mut conn, config) = setup().await;
    let entry_id = add_review(&mut conn, &config.review_stream, b"{\"reviewId\":\"rv_2\"}").await;

    let delivery = transport.fetch().await.unwrap().expect("one entry");
    assert_eq!(delivery.delivery_id, entry_id);
    // worker dies before settling
    drop(transport);

    let survivor_config = StreamsConfig {
        consumer_name: format!("test-worker-{}", Uuid::new_v4()),
        claim_min_idle_ms: 50,
        ..config.clone()
    };
    let handle = RedisHandle::connect(&survivor_config.redis_url).await.unwrap();
    let mut survivor = RedisStreamTransport::new(Arc::new(handle), survivor_config);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let claimed = survivor.fetch().await.unwrap().expect("claimed entry");
    assert_eq!(claimed.delivery_id, entry_id);
    assert_eq!(claimed.payload, b"{\"reviewId\":\"rv_2\"}".to_vec());

    survivor.ack(&claimed).await.unwrap();

    let pending: redis::streams::StreamPendingReply = conn
        .xpending(&config.review_stream, &config.consumer_group)
        .await
        .unwrap();
    assert_eq!(pending.count(), 0);

    cleanup(&mut conn, &config).await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_busy_entry_of_live_consumer_is_not_claimed() {
    let (mut transport, mut conn, config) = setup().await;
    add_review(&mut conn, &config.review_stream, b"{}").await;

    let delivery = transport.fetch().await.unwrap().expect("one entry");

    let other_config = StreamsConfig {
        consumer_name: format!("test-worker-{}", Uuid::new_v4()),
        ..config.clone()
    };
    let handle = RedisHandle::connect(&other_config.redis_url).await.unwrap();
    let mut other = RedisStreamTransport::new(Arc::new(handle), other_config);

    // idle for far less than claim_min_idle_ms
    assert!(other.fetch().await.unwrap().is_none());

    transport.ack(&delivery).await.unwrap();
    cleanup(&mut conn, &config).await;
}
