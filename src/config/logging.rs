// ============================================================================
// Logging Configuration
// ============================================================================

use super::{env_or, parse_env};
use anyhow::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// EnvFilter directive (RUST_LOG)
    pub rust_log: String,
    pub format: LogFormat,
    /// Log user identifiers in clear instead of a salted hash
    pub enable_user_identifiers: bool,
    pub hash_salt: String,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let format = match env_or("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "text" | "pretty" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => anyhow::bail!("Unknown LOG_FORMAT {:?} (expected text or json)", other),
        };

        Ok(Self {
            rust_log: env_or("RUST_LOG", "info"),
            format,
            enable_user_identifiers: parse_env("LOG_USER_IDENTIFIERS", false)?,
            hash_salt: env_or("LOG_HASH_SALT", ""),
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log: "info".to_string(),
            format: LogFormat::Text,
            enable_user_identifiers: false,
            hash_salt: String::new(),
        }
    }
}
