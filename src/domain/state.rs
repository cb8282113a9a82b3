//! Explicit states of the iteration controller.

use std::fmt;

use super::outcome::RunOutcome;

/// STARTING -> RUNNING -> {COMPLETE, ROTATING, GUTTERED, CONTINUING} -> STARTING | TERMINAL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// About to bump the counter and launch a pipeline
    Starting,
    /// Pipeline is running, signals are being consumed
    Running,
    Complete,
    Rotating,
    Guttered,
    /// Agent exited naturally with work remaining
    Continuing,
    Terminal(RunOutcome),
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Terminal(_))
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: &ControllerState) -> bool {
        use ControllerState::{Complete, Continuing, Guttered, Rotating, Running, Starting, Terminal};

        match (self, next) {
            (Starting, Running) => true,
            // Preflight completion check and the iteration cap both end the run
            // without launching anything
            (Starting, Terminal(_)) => true,
            (Running, Complete | Rotating | Guttered | Continuing) => true,
            // An interrupt tears the pipeline down and ends the run at once
            (Running, Terminal(RunOutcome::Interrupted { .. })) => true,
            (Rotating | Continuing, Starting) => true,
            (Complete | Guttered | Rotating | Continuing, Terminal(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Starting => f.write_str("STARTING"),
            ControllerState::Running => f.write_str("RUNNING"),
            ControllerState::Complete => f.write_str("COMPLETE"),
            ControllerState::Rotating => f.write_str("ROTATING"),
            ControllerState::Guttered => f.write_str("GUTTERED"),
            ControllerState::Continuing => f.write_str("CONTINUING"),
            ControllerState::Terminal(outcome) => write!(f, "TERMINAL({:?})", outcome),
        }
    }
}
