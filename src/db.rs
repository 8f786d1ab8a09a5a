use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

use crate::config::DbConfig;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Create the ledger connection pool.
///
/// The pool is created once at startup and shared by reference; each ledger
/// operation checks a connection out and returns it when the operation (or
/// its transaction) ends.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
        .test_before_acquire(true)
        .connect(&config.url)
        .await
        .with_context(|| format!("Failed to connect to Postgres at {}", config.redacted_url()))?;

    Ok(pool)
}

/// Apply the embedded migrations under `migrations/`.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!()
        .run(pool)
        .await
        .context("Failed to apply database migrations")?;
    Ok(())
}

pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Postgres ping failed")?;
    Ok(())
}
