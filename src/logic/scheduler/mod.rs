//! Cycle Scheduler / State Tracker
//!
//! Runs polling cycles on a period, checkpoints progress in the
//! cursor, and retries transient failures with bounded backoff.

pub mod backoff;
pub mod cursor;
pub mod cycle;
pub mod state;


pub use backoff::BackoffPolicy;
pub use cursor::Cursor;
pub use cycle::{CycleReport, Scheduler, SchedulerConfig};
pub use state::CycleState;
