//! On-disk supervisor state.
//!
//! Everything lives under one state directory inside the workspace:
//! - `.iteration`: persisted iteration counter
//! - `session.log`: append-only supervisor events
//! - `activity.log` / `errors.log`: the agent's output trails
//! - `guardrails.md`: lessons trail maintained by the agent

mod counter;
mod session_log;
mod trail;

use std::fs;
use std::path::{Path, PathBuf};

pub use counter::IterationCounter;
pub use session_log::SessionLog;
pub use trail::ActivityTrail;

use crate::error::Result;

pub const COUNTER_FILE: &str = ".iteration";
pub const SESSION_LOG_FILE: &str = "session.log";
pub const ACTIVITY_FILE: &str = "activity.log";
pub const ERRORS_FILE: &str = "errors.log";
pub const GUARDRAILS_FILE: &str = "guardrails.md";

/// Layout of the state directory.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn counter_path(&self) -> PathBuf {
        self.root.join(COUNTER_FILE)
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.root.join(SESSION_LOG_FILE)
    }

    pub fn activity_path(&self) -> PathBuf {
        self.root.join(ACTIVITY_FILE)
    }

    pub fn errors_path(&self) -> PathBuf {
        self.root.join(ERRORS_FILE)
    }

    pub fn guardrails_path(&self) -> PathBuf {
        self.root.join(GUARDRAILS_FILE)
    }

    pub fn counter(&self) -> IterationCounter {
        IterationCounter::new(self.counter_path())
    }

    pub fn session_log(&self) -> SessionLog {
        SessionLog::new(self.session_log_path())
    }
}
