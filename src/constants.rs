//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! `config.rs` reads the environment through the helpers below.

/// Default platform URL
///
/// Fallback when `PLATFORM_URL` is not set.
/// For development: http://localhost:8080
pub const DEFAULT_PLATFORM_URL: &str = "http://localhost:8080";

/// Default connector name (used as the author identity)
pub const DEFAULT_CONNECTOR_NAME: &str = "Intel Connector";

/// Default cycle period (seconds)
pub const DEFAULT_DURATION_PERIOD: u64 = 3600;

/// Default minimum score. Reputation vendors do not publish below 20.
pub const DEFAULT_MIN_SCORE: u8 = 20;

/// Default score for blocklist feeds that carry no score of their own
pub const DEFAULT_FEED_SCORE: u8 = 50;

/// Default maximum objects per bundle
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default timeout for any external call (seconds)
pub const DEFAULT_FETCH_TIMEOUT: u64 = 30;

/// Default ceiling on consecutive backoff entries
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default first backoff wait (seconds)
pub const DEFAULT_BACKOFF_BASE: u64 = 5;

/// Default maximum backoff wait (seconds)
pub const DEFAULT_BACKOFF_MAX: u64 = 300;

/// Default TLP marking applied to every emitted object
pub const DEFAULT_TLP: &str = "amber+strict";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "intel-connector";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get platform URL from environment or use default
pub fn get_platform_url() -> String {
    std::env::var("PLATFORM_URL")
        .unwrap_or_else(|_| DEFAULT_PLATFORM_URL.to_string())
}

/// Get connector name from environment or use default
pub fn get_connector_name() -> String {
    std::env::var("CONNECTOR_NAME")
        .unwrap_or_else(|_| DEFAULT_CONNECTOR_NAME.to_string())
}

/// Get cycle period from environment or use default
pub fn get_duration_period() -> u64 {
    env_parse("CONNECTOR_DURATION_PERIOD").unwrap_or(DEFAULT_DURATION_PERIOD)
}

/// Get min score from environment or use default
pub fn get_min_score() -> u8 {
    env_parse("CONNECTOR_MIN_SCORE").unwrap_or(DEFAULT_MIN_SCORE)
}

/// Get batch size from environment or use default
pub fn get_batch_size() -> usize {
    env_parse("CONNECTOR_BATCH_SIZE").unwrap_or(DEFAULT_BATCH_SIZE)
}

/// Get external call timeout from environment or use default
pub fn get_fetch_timeout() -> u64 {
    env_parse("CONNECTOR_FETCH_TIMEOUT").unwrap_or(DEFAULT_FETCH_TIMEOUT)
}

/// Get retry ceiling from environment or use default
pub fn get_max_retries() -> u32 {
    env_parse("CONNECTOR_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES)
}

/// Get backoff base from environment or use default
pub fn get_backoff_base() -> u64 {
    env_parse("CONNECTOR_BACKOFF_BASE").unwrap_or(DEFAULT_BACKOFF_BASE)
}

/// Get backoff cap from environment or use default
pub fn get_backoff_max() -> u64 {
    env_parse("CONNECTOR_BACKOFF_MAX").unwrap_or(DEFAULT_BACKOFF_MAX)
}

/// Get default blocklist score from environment or use default
pub fn get_feed_score() -> u8 {
    env_parse("SOURCE_DEFAULT_SCORE").unwrap_or(DEFAULT_FEED_SCORE)
}

/// Check if indicators should be created next to observables
pub fn is_create_indicator() -> bool {
    env_flag("CONNECTOR_CREATE_INDICATOR", true)
}

/// Check if the connector runs against the local dry-run platform
pub fn is_dry_run() -> bool {
    env_flag("PLATFORM_DRY_RUN", false)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|s| s.to_lowercase() != "false" && s != "0")
        .unwrap_or(default)
}
