// ============================================================================
// Review Worker Configuration
// ============================================================================
//
// Configuration is loaded from environment variables (optionally seeded from
// a .env file). Every sub-configuration lives in its own module under
// config/ and knows how to read itself.
//
// ============================================================================

mod database;
mod logging;
mod publisher;
mod streams;
mod worker;

pub use database::DbConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use publisher::{KafkaConfig, PublisherBackend, PublisherConfig};
pub use streams::StreamsConfig;
pub use worker::WorkerConfig;

use anyhow::{Context, Result};

// Default port for the /health and /metrics listener
const DEFAULT_HEALTH_PORT: u16 = 8081;

/// Main configuration structure for the review worker
#[derive(Clone, Debug)]
pub struct Config {
    pub health_port: u16,

    // Sub-configurations
    pub db: DbConfig,
    pub streams: StreamsConfig,
    pub publisher: PublisherConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            health_port: parse_env("HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            db: DbConfig::from_env()?,
            streams: StreamsConfig::from_env()?,
            publisher: PublisherConfig::from_env()?,
            worker: WorkerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }
}

/// Read an environment variable, falling back to `default` when unset.
pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
///
/// A variable that is set but does not parse is a startup error rather than
/// a silent fallback.
pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
