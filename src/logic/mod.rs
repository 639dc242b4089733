//! Logic Module - Ingestion Engines
//!
//! Leaf-first:
//! - `identifier/` - content-derived STIX ids
//! - `objects/` - candidate objects and relationships
//! - `normalizer/` - raw record → candidates (closed shape dispatch)
//! - `graph/` - per-cycle merge and integrity pass
//! - `emitter/` - size-bounded bundles
//! - `scheduler/` - cycle state machine, cursor, backoff
//! - `source/`, `platform/` - external collaborators

pub mod identifier;
pub mod objects;
pub mod normalizer;
pub mod graph;
pub mod emitter;
pub mod scheduler;
pub mod source;
pub mod platform;
