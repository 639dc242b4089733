//! Source Clients
//!
//! Thin HTTP wrappers around external feeds. They return raw records and
//! classify failures; all retry logic lives in the scheduler.

pub mod json_feed;
pub mod text_feed;
pub mod types;

pub use json_feed::JsonFeedSource;
pub use text_feed::TextFeedSource;
pub use types::{FetchError, FetchOutcome, SourceClient};
