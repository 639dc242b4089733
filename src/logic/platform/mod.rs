//! Platform Module
//!
//! The receiving side: bundle submission, work tracking and cursor storage.

pub mod http;
pub mod local;
pub mod types;

pub use http::{HttpPlatform, PlatformConfig};
pub use local::{default_state_dir, LocalPlatform};
pub use types::{PlatformClient, StateError, SubmitError};
