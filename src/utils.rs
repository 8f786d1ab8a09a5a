use sha2::{Digest, Sha256};

use crate::config::LoggingConfig;

/// Creates a truncated, salted hash of an identifier for safe logging.
///
/// # Arguments
/// * `id` - The identifier to hash (e.g., user_id).
/// * `salt` - A salt value from the application's configuration.
///
/// # Returns
/// A short, hexadecimal string representing the salted hash.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    // Take first 4 bytes and format each as hex
    hash[..4]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// User identifier as it should appear in logs under the current config
pub fn user_label(user_id: &str, logging: &LoggingConfig) -> String {
    if logging.enable_user_identifiers {
        user_id.to_string()
    } else {
        log_safe_id(user_id, &logging.hash_salt)
    }
}
