//! Cycle State Machine
//!
//! ```text
//! Idle → Fetching → Normalizing → Emitting → Committing → Idle
//!           ↑           │            │           │
//!           └─ Backoff ←┴────────────┴───────────┘  (transient failure)
//! ```

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
    Normalizing,
    Emitting,
    Committing,
    Backoff { attempt: u32 },
}

impl CycleState {
    /// Allowed transitions
    pub fn can_transition_to(&self, next: CycleState) -> bool {
        use CycleState::*;
        match (self, next) {
            (Idle, Fetching) => true,
            (Fetching, Normalizing) => true,
            (Normalizing, Emitting) => true,
            (Emitting, Committing) => true,
            (Committing, Idle) => true,
            (Backoff { .. }, Fetching) => true,
            (Fetching | Normalizing | Emitting | Committing, Backoff { .. }) => true,
            // Non-retryable failure or exhausted retries
            (_, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Idle => write!(f, "Idle"),
            CycleState::Fetching => write!(f, "Fetching"),
            CycleState::Normalizing => write!(f, "Normalizing"),
            CycleState::Emitting => write!(f, "Emitting"),
            CycleState::Committing => write!(f, "Committing"),
            CycleState::Backoff { attempt } => write!(f, "Backoff({})", attempt),
        }
    }
}
