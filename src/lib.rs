//! Threat Intelligence Connector
//!
//! Polls external threat feeds, reshapes vendor records into a de-duplicated
//! STIX 2.1 object graph and forwards that graph to the central platform.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Source feeds │──▶│ Normalizer │──▶│ Graph Builder │──▶│ Bundle       │
//! │ (JSON/text)  │   │ (shapes)   │   │ (merge/check) │   │ Emitter      │
//! └──────────────┘   └────────────┘   └───────────────┘   └──────┬───────┘
//!        ▲                                                        │
//!        │              ┌─────────────────────┐                   ▼
//!        └──────────────│ Cycle Scheduler     │◀──────────── Platform
//!                       │ (cursor + backoff)  │          (bundles, state)
//!                       └─────────────────────┘
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logic;

pub use error::{ConnectorError, ConnectorResult};
