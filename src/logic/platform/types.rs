//! Platform Types

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::logic::emitter::{BatchAck, Bundle};
use crate::logic::scheduler::Cursor;

// ============================================================================
// ERRORS
// ============================================================================

/// Bundle submission / work tracking failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("platform call timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error: HTTP {0}")]
    ServerError(u16),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bundle rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(String),
}

impl SubmitError {
    /// Transient errors send the cycle to backoff; others fail the batch
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SubmitError::Timeout
                | SubmitError::Connection(_)
                | SubmitError::RateLimited { .. }
                | SubmitError::ServerError(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SubmitError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Cursor storage failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("state call timed out")]
    Timeout,

    #[error("state http error: {0}")]
    Http(String),

    #[error("state server error: HTTP {0}")]
    ServerError(u16),

    #[error("state io error: {0}")]
    Io(String),

    #[error("state parse error: {0}")]
    Parse(String),
}

impl StateError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StateError::Timeout | StateError::Http(_) | StateError::ServerError(_))
    }
}

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        StateError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Parse(e.to_string())
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// The central platform: receives bundles, stores the cursor
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn submit(&self, bundle: &Bundle, work_id: Option<&str>) -> Result<BatchAck, SubmitError>;

    /// `None` on first run
    async fn read_cursor(&self) -> Result<Option<Cursor>, StateError>;

    async fn write_cursor(&self, cursor: &Cursor) -> Result<(), StateError>;

    /// Open a work item for the cycle; `None` when the platform does not track work
    async fn initiate_work(&self, _name: &str) -> Result<Option<String>, SubmitError> {
        Ok(None)
    }

    async fn complete_work(&self, _work_id: &str, _message: &str) -> Result<(), SubmitError> {
        Ok(())
    }
}
