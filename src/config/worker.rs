// ============================================================================
// Worker Configuration
// ============================================================================

use super::parse_env;
use anyhow::Result;

/// Review worker specific configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Delivery attempts allowed on the requeue path before dead-lettering
    pub max_requeue_attempts: u32,
    /// Age after which an unpublished ledger record is republished on redelivery
    pub republish_grace_secs: i64,
    /// Interval between periodic throughput summaries in the log
    pub stats_log_interval_secs: u64,
}

impl WorkerConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let config = Self {
            max_requeue_attempts: parse_env("MAX_REQUEUE_ATTEMPTS", 5)?,
            republish_grace_secs: parse_env("REPUBLISH_GRACE_SECS", 60)?,
            stats_log_interval_secs: parse_env("STATS_LOG_INTERVAL_SECS", 30)?,
        };

        if config.max_requeue_attempts == 0 {
            anyhow::bail!("MAX_REQUEUE_ATTEMPTS must be at least 1");
        }
        if config.republish_grace_secs < 0 {
            anyhow::bail!("REPUBLISH_GRACE_SECS must not be negative");
        }

        Ok(config)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_requeue_attempts: 5,
            republish_grace_secs: 60,
            stats_log_interval_secs: 30,
        }
    }
}
