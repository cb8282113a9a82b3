//! Relayr - supervises a token-budgeted coding agent across context rotations
//!
//! The agent's memory lives in files: a checklist task document and a state
//! directory. Each iteration starts the agent with a fresh context; a monitor
//! process watches its output and signals when the budget runs low (WARN), runs
//! out (ROTATE) or the agent is stuck (GUTTER).

pub mod config;
pub mod controller;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod prompt;
pub mod state;
pub mod supervisor;
pub mod task;

pub use error::{RelayrError, Result};
