//! Iteration controller - the top-level state machine.
//!
//! This module provides the supervising loop, including:
//! - IterationController driving STARTING -> RUNNING -> ... -> TERMINAL
//! - IterationReport describing how each iteration ended
//! - Heartbeat, a purely decorative liveness indicator
//! - Interrupt handling, so SIGINT/SIGTERM tear the pipeline down
//! - StatusReport, the read-only view used by `relayr status`

mod heartbeat;
mod interrupt;
mod iteration;
mod status;

pub use heartbeat::Heartbeat;
pub use interrupt::{InterruptFlag, interrupt_flag, interrupted, listen_for_interrupt};
pub use iteration::{IterationController, IterationReport, operator_paths};
pub use status::{RECENT_EVENTS, StatusReport};
