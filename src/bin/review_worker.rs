// ============================================================================
// Review Sentiment Worker
// ============================================================================
//
// Consumes product reviews from a Redis stream, classifies their sentiment,
// records each review once in Postgres and publishes a processed-review
// event downstream.
//
// Flow per delivery:
// 1. Parse and validate the payload (malformed -> dead-letter stream)
// 2. Look the review up in the ledger (already recorded -> ACK)
// 3. Classify the comment
// 4. Insert the ledger record (lost race -> ACK)
// 5. Publish the processed event, mark the record published
// 6. ACK
//
// Guarantees:
// - At-least-once delivery, idempotent effects
// - One in-flight delivery per worker; run more workers to scale out
//
// ============================================================================

use anyhow::{Context, Result};
use review_sentiment_worker::config::{Config, PublisherBackend};
use review_sentiment_worker::db;
use review_sentiment_worker::ledger::PgReviewLedger;
use review_sentiment_worker::publisher::{
    EventPublisher, KafkaEventPublisher, RedisStreamPublisher,
};
use review_sentiment_worker::redis_client::RedisHandle;
use review_sentiment_worker::review_worker::{
    DeliveryTransport, RedisStreamTransport, ReviewProcessor, run_dispatch_loop,
};
use review_sentiment_worker::sentiment::LexiconClassifier;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

const PUBLISHER_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    review_sentiment_worker::init_tracing(&config.logging)?;

    info!("=== Review Sentiment Worker Starting ===");
    info!("Review stream: {}", config.streams.review_stream);
    info!("Consumer group: {}", config.streams.consumer_group);
    info!("Consumer name: {}", config.streams.consumer_name);
    info!("Dead-letter stream: {}", config.streams.dead_letter_stream);
    info!("Publisher backend: {}", config.publisher.backend.as_str());

    // Ledger
    info!("Connecting to Postgres at: {}", config.db.redacted_url());
    let db_pool = Arc::new(db::create_pool(&config.db).await?);
    if config.db.run_migrations {
        info!("Applying database migrations...");
        db::run_migrations(&db_pool).await?;
        info!("Database migrations applied successfully.");
    }

    // Redis: the consumer connection blocks in XREADGROUP, so publishing and
    // health checks get their own handle
    info!("Connecting to Redis at: {}", config.streams.redacted_redis_url());
    let consumer_redis = Arc::new(RedisHandle::connect(&config.streams.redis_url).await?);
    let shared_redis = Arc::new(RedisHandle::connect(&config.streams.redis_url).await?);
    info!("Connected to Redis");

    let mut transport = RedisStreamTransport::new(consumer_redis, config.streams.clone());
    transport
        .declare_topology()
        .await
        .context("Failed to declare review streams")?;

    let publisher: Arc<dyn EventPublisher> = match config.publisher.backend {
        PublisherBackend::RedisStream => Arc::new(RedisStreamPublisher::new(
            shared_redis.clone(),
            config.publisher.output_stream.clone(),
            config.publisher.routing_key.clone(),
            config.streams.max_len,
        )),
        PublisherBackend::Kafka => Arc::new(KafkaEventPublisher::new(&config.publisher.kafka)?),
    };

    let processor = ReviewProcessor::new(
        Arc::new(PgReviewLedger::new((*db_pool).clone())),
        Arc::new(LexiconClassifier::new()),
        publisher.clone(),
        config.worker.clone(),
        config.logging.clone(),
    );

    // Health + metrics listener
    let http_pool = db_pool.clone();
    let http_redis = shared_redis.clone();
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = review_sentiment_worker::run_http_server(health_port, http_pool, http_redis).await {
            error!(error = %format!("{:#}", e), "Health server stopped");
        }
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            info!("SIGTERM received, initiating graceful shutdown...");
                        }
                        _ = tokio::signal::ctrl_c() => {
                            info!("SIGINT received, initiating graceful shutdown...");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    tokio::signal::ctrl_c().await.ok();
                    info!("Ctrl-C received, initiating graceful shutdown...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, initiating graceful shutdown...");
        }
        shutdown_signal.store(true, Ordering::SeqCst);
    });

    let stats_interval = Duration::from_secs(config.worker.stats_log_interval_secs);
    run_dispatch_loop(&processor, &mut transport, shutdown, stats_interval).await;

    info!("Shutdown flag set, flushing publisher...");
    if let Err(e) = publisher.flush(PUBLISHER_FLUSH_TIMEOUT).await {
        error!(error = %format!("{:#}", e), "Failed to flush publisher on shutdown");
    }
    db_pool.close().await;

    info!("Review worker stopped gracefully");
    Ok(())
}
