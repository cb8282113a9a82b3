//! Domain types for Relayr
//!
//! This module contains the core domain types:
//! - Signal: control tokens emitted by the monitor (warn, rotate, gutter)
//! - IterationOutcome / RunOutcome: results of one iteration and of the run
//! - ControllerState: the iteration controller's explicit states
//! - SessionEvent: entries of the append-only session log

pub mod event;
pub mod outcome;
pub mod signal;
pub mod state;

pub use event::{EventKind, SessionEvent};
pub use outcome::{IterationOutcome, RunOutcome};
pub use signal::{Signal, SignalKind};
pub use state::ControllerState;
