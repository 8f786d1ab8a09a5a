// ============================================================================
// Redis Connection Handle
// ============================================================================
//
// Shared multiplexed connection plus the retry/reconnect wrapper every
// idempotent Redis operation in the worker goes through. Appends that must
// not be repeated use execute_once.
//
// ============================================================================

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

pub struct RedisHandle {
    client: redis::Client,
    conn: RwLock<MultiplexedConnection>,
}

impl RedisHandle {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            client,
            conn: RwLock::new(conn),
        })
    }

    /// Execute a Redis operation with retry logic and auto-reconnection
    ///
    /// - Exponential backoff between attempts (100ms, 200ms)
    /// - Reconnects before the final attempt
    /// - Gives up after three attempts
    pub async fn execute_with_retry<F, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(
            &mut MultiplexedConnection,
        ) -> Pin<Box<dyn Future<Output = Result<T, redis::RedisError>> + Send + '_>>,
    {
        let mut attempt = 1;
        loop {
            let mut conn = self.conn.write().await;

            let err = match operation(&mut conn).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempt = attempt,
                            "Redis operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };
            drop(conn); // Release lock before potentially reconnecting

            if attempt >= MAX_RETRIES {
                return Err(anyhow::anyhow!(
                    "Redis operation '{}' failed after {} attempts: {}",
                    operation_name,
                    MAX_RETRIES,
                    err
                ));
            }

            warn!(
                operation = operation_name,
                attempt = attempt,
                max_retries = MAX_RETRIES,
                error = %err,
                "Redis operation failed, will retry"
            );

            let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;

            if attempt == MAX_RETRIES - 1 {
                self.reconnect().await;
            }
            attempt += 1;
        }
    }

    /// Execute a Redis operation exactly once
    ///
    /// A failure may arrive after the server applied the command, so the
    /// operation is never reissued here. Dropped connections are replaced
    /// for the next caller.
    pub async fn execute_once<F, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnOnce(
            &mut MultiplexedConnection,
        ) -> Pin<Box<dyn Future<Output = Result<T, redis::RedisError>> + Send + '_>>,
    {
        let mut conn = self.conn.write().await;
        let result = operation(&mut conn).await;
        drop(conn);

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_connection_dropped() || err.is_io_error() {
                    self.reconnect().await;
                }
                Err(anyhow::anyhow!(
                    "Redis operation '{}' failed: {}",
                    operation_name,
                    err
                ))
            }
        }
    }

    async fn reconnect(&self) {
        info!("Attempting to reconnect to Redis...");
        match self.client.get_multiplexed_async_connection().await {
            Ok(new_conn) => {
                *self.conn.write().await = new_conn;
                info!("Successfully reconnected to Redis");
            }
            Err(e) => {
                error!(error = %e, "Failed to reconnect to Redis");
            }
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.read().await.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis ping failed")?;
        Ok(())
    }
}
