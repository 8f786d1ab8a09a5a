use crate::db::{self, DbPool};
use crate::redis_client::RedisHandle;
use anyhow::Result;

/// Both the ledger database and the Redis broker must answer.
pub async fn health_check(pool: &DbPool, redis: &RedisHandle) -> Result<()> {
    db::ping(pool).await?;
    redis.ping().await?;
    Ok(())
}
