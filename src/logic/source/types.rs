//! Source Types

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::logic::normalizer::RawRecord;
use crate::logic::scheduler::Cursor;

/// Records of one fetch plus the token to resume from
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    /// Pagination token for the next cycle, if the feed uses one
    pub next_token: Option<String>,
}

/// Fetch failure taxonomy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("fetch timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error: HTTP {0}")]
    ServerError(u16),

    #[error("unauthorized")]
    Unauthorized,

    #[error("unexpected response: {message}")]
    Unknown {
        message: String,
        /// The remote side may have changed state; do not replay blindly
        side_effect_applied: bool,
    },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout
            | FetchError::Connection(_)
            | FetchError::RateLimited { .. }
            | FetchError::ServerError(_) => true,
            FetchError::Unauthorized => false,
            FetchError::Unknown { side_effect_applied, .. } => !side_effect_applied,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Map a transport error from reqwest
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() || e.is_request() {
            FetchError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::from_status(status.as_u16(), None)
        } else {
            FetchError::Unknown {
                message: e.to_string(),
                side_effect_applied: false,
            }
        }
    }

    /// Map a non-success HTTP status
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => FetchError::Unauthorized,
            429 => FetchError::RateLimited { retry_after },
            500..=599 => FetchError::ServerError(status),
            other => FetchError::Unknown {
                message: format!("HTTP {}", other),
                side_effect_applied: false,
            },
        }
    }
}

/// An external feed. One client per sub-feed.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Feed name, used as the key of its pagination token
    fn name(&self) -> &str;

    /// Fetch everything newer than the cursor
    async fn fetch(&self, cursor: &Cursor) -> Result<FetchOutcome, FetchError>;
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(FetchError::from_status(401, None), FetchError::Unauthorized);
        assert_eq!(FetchError::from_status(503, None), FetchError::ServerError(503));
        assert_eq!(
            FetchError::from_status(429, Some(Duration::from_secs(7))).retry_after(),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_retryable() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::ServerError(502).is_retryable());
        assert!(!FetchError::Unauthorized.is_retryable());
        assert!(!FetchError::Unknown { message: "x".into(), side_effect_applied: true }.is_retryable());
        assert!(FetchError::Unknown { message: "x".into(), side_effect_applied: false }.is_retryable());
    }
}
