//! Error handling
//!
//! Each module owns its error enum; `ConnectorError` is what escalates out
//! of a cycle. Per-record failures never reach this type.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::logic::normalizer::NormalizeError;
use crate::logic::platform::{StateError, SubmitError};
use crate::logic::source::FetchError;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    // Startup errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Author or marking anchors could not be derived from the config
    #[error("anchor setup error: {0}")]
    Normalize(#[from] NormalizeError),

    // Cycle errors
    #[error("source error: {0}")]
    Source(#[from] FetchError),

    #[error("submit error: {0}")]
    Submit(#[from] SubmitError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("a cycle is already in progress")]
    CycleInProgress,

    #[error("feed task failed: {0}")]
    Task(String),
}

impl ConnectorError {
    /// Transient errors send the cycle to backoff
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::Source(e) => e.is_retryable(),
            ConnectorError::Submit(e) => e.is_transient(),
            ConnectorError::State(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Server-provided wait hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ConnectorError::Source(e) => e.retry_after(),
            ConnectorError::Submit(e) => e.retry_after(),
            _ => None,
        }
    }
}
