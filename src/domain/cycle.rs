//! Aggregation cycle state machine.
//!
//! `Idle → Fetching → Normalizing → Assembling → Done`. Transitions only move
//! one step forward; `Done` is terminal. A new cycle is a new machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of one aggregation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    Fetching,
    Normalizing,
    Assembling,
    Done,
}

impl CyclePhase {
    /// The only legal successor, or `None` for `Done`.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Fetching),
            Self::Fetching => Some(Self::Normalizing),
            Self::Normalizing => Some(Self::Assembling),
            Self::Assembling => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::Assembling => "assembling",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: CyclePhase, to: CyclePhase },

    #[error("cycle already completed")]
    AlreadyDone,
}

/// Tracks the current phase and enforces single-step transitions.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    phase: CyclePhase,
}

impl PhaseTracker {
    pub const fn new() -> Self {
        Self {
            phase: CyclePhase::Idle,
        }
    }

    pub const fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Move to `to`, which must be the immediate successor.
    pub fn advance(&mut self, to: CyclePhase) -> Result<(), CycleError> {
        match self.phase.next() {
            None => Err(CycleError::AlreadyDone),
            Some(expected) if expected == to => {
                self.phase = to;
                Ok(())
            }
            Some(_) => Err(CycleError::IllegalTransition {
                from: self.phase,
                to,
            }),
        }
    }
}
