//! Iteration and run outcome types.

use std::fmt;

use serde::Serialize;

use super::signal::SignalKind;

/// Outcome of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    /// Every criterion in the task document is done
    Complete,
    /// Token budget exhausted, the agent was terminated
    Rotate,
    /// The agent was classified as stuck
    Gutter,
    /// The agent exited on its own with work remaining
    Natural,
    /// The supervisor itself was told to stop
    Interrupted,
}

impl IterationOutcome {
    /// Combine the last actionable signal with task completion.
    ///
    /// Completion always wins: a finished task ends the run regardless of
    /// any signal received while the agent was running.
    pub fn resolve(signal: Option<SignalKind>, task_complete: bool) -> Self {
        if task_complete {
            return IterationOutcome::Complete;
        }
        match signal {
            Some(SignalKind::Rotate) => IterationOutcome::Rotate,
            Some(SignalKind::Gutter) => IterationOutcome::Gutter,
            Some(SignalKind::Warn) | None => IterationOutcome::Natural,
        }
    }
}

impl fmt::Display for IterationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IterationOutcome::Complete => "complete",
            IterationOutcome::Rotate => "rotate",
            IterationOutcome::Gutter => "gutter",
            IterationOutcome::Natural => "natural",
            IterationOutcome::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Terminal result of a whole supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Task finished after `iterations` iterations of this run
    Complete { iterations: u32 },
    /// Task was already complete, nothing was started
    AlreadyComplete,
    /// Agent got stuck during `iteration` (persisted counter value)
    Gutter { iteration: u64 },
    /// Iteration cap reached with criteria still pending
    MaxIterations { iterations: u32 },
    /// SIGINT/SIGTERM during `iteration`; the pipeline was torn down
    Interrupted { iteration: u64 },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Complete { .. } | RunOutcome::AlreadyComplete)
    }

    /// Process exit code for the supervisor program.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Complete { .. } | RunOutcome::AlreadyComplete => 0,
            RunOutcome::Gutter { .. } | RunOutcome::MaxIterations { .. } => 1,
            RunOutcome::Interrupted { .. } => 130,
        }
    }
}
