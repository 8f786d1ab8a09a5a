// ============================================================================
// Database Configuration
// ============================================================================

use super::{env_or, parse_env};
use anyhow::Result;

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Postgres connection URL for the idempotency ledger
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

impl DbConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Ok(Self {
            url: database_url_from_env(),
            max_connections: parse_env("DB_MAX_CONNECTIONS", 5)?,
            acquire_timeout_secs: parse_env("DB_ACQUIRE_TIMEOUT_SECS", 30)?,
            idle_timeout_secs: parse_env("DB_IDLE_TIMEOUT_SECS", 600)?,
            run_migrations: parse_env("DB_RUN_MIGRATIONS", true)?,
        })
    }

    /// Connection URL with the password masked, for logging
    pub fn redacted_url(&self) -> String {
        redact_credentials(&self.url)
    }
}

/// DATABASE_URL wins; otherwise the URL is assembled from the discrete
/// DB_* variables.
fn database_url_from_env() -> String {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        return url;
    }

    format!(
        "postgres://{}:{}@{}:{}/{}",
        env_or("DB_USER", "user"),
        env_or("DB_PASS", "password"),
        env_or("DB_HOST", "localhost"),
        env_or("DB_PORT", "5432"),
        env_or("DB_NAME", "reviews_db"),
    )
}

/// Replace everything between the scheme and '@' with `***`.
pub(crate) fn redact_credentials(url: &str) -> String {
    match url.rfind('@') {
        Some(at_pos) => {
            let protocol_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if protocol_end > at_pos {
                return url.to_string();
            }
            format!("{}***{}", &url[..protocol_end], &url[at_pos..])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_credentials() {
        assert_eq!(
            redact_credentials("postgres://user:secret@db:5432/reviews_db"),
            "postgres://***@db:5432/reviews_db"
        );
        assert_eq!(
            redact_credentials("redis://127.0.0.1:6379"),
            "redis://127.0.0.1:6379"
        );
    }
}
