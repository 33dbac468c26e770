//! Mission phase state machine and the choreographies it drives.
//!
//! The [`Orchestrator`] owns the single [`MissionState`]. Phases run strictly one after the
//! other; cancellation and watchdog expiry are cooperative and observed between
//! choreography steps.

mod health_report;
mod mission_state;
mod orchestrator;
mod phase_health;
mod phase_scan;
mod phase_target;
mod watchdog;

use crate::ipc::SupervisorError;
use crate::protocol::ProtocolError;

pub(crate) use mission_state::{MissionState, ObdhState, Phase, SubPhase};
pub(crate) use orchestrator::Orchestrator;

#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("on-board computer is still initialising")]
    NotReady,
    #[error("busy with {0}")]
    Busy(String),
    #[error("readiness handshake failed: {0}")]
    Handshake(SupervisorError),
}

/// Why a choreography stopped before completing.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("cancelled")]
    Cancelled,
    #[error("watchdog expired")]
    TimedOut,
    #[error("{0}")]
    Aborted(String),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("report could not be written: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Cancelled,
    TimedOut,
    Aborted(String),
}

impl std::fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseOutcome::Completed => write!(f, "completed"),
            PhaseOutcome::Cancelled => write!(f, "cancelled"),
            PhaseOutcome::TimedOut => write!(f, "timed out"),
            PhaseOutcome::Aborted(reason) => write!(f, "aborted ({reason})"),
        }
    }
}

impl From<Result<(), PhaseError>> for PhaseOutcome {
    fn from(value: Result<(), PhaseError>) -> Self {
        match value {
            Ok(()) => PhaseOutcome::Completed,
            Err(PhaseError::Cancelled) => PhaseOutcome::Cancelled,
            Err(PhaseError::TimedOut) => PhaseOutcome::TimedOut,
            Err(e) => PhaseOutcome::Aborted(e.to_string()),
        }
    }
}
