//! Graph Builder Module
//!
//! Owns the per-cycle object graph. One builder per cycle, single writer;
//! it is never shared across cycles.

pub mod builder;
pub mod types;


pub use builder::GraphBuilder;
pub use types::{BuildReport, DroppedRelationship, Graph, MergeOutcome};
