//! Read-only run status, assembled from the task document and state directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;
use crate::domain::SessionEvent;
use crate::error::Result;
use crate::state::StateDir;
use crate::task::{TaskProgress, TaskStore};

/// Session log entries shown by `status`.
pub const RECENT_EVENTS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub task_file: PathBuf,
    pub task_present: bool,
    pub progress: TaskProgress,
    pub complete: bool,
    /// Persisted iteration counter
    pub iteration: u64,
    pub recent: Vec<SessionEvent>,
}

impl StatusReport {
    pub fn collect(config: &Config, workspace: &Path) -> Result<Self> {
        let task = TaskStore::new(config.paths.task_path(workspace));
        let state = StateDir::new(config.paths.state_path(workspace));
        let progress = task.progress();

        Ok(Self {
            task_file: task.path().to_path_buf(),
            task_present: task.exists(),
            complete: progress.is_complete(),
            progress,
            iteration: state.counter().load(),
            recent: state.session_log().tail(RECENT_EVENTS)?,
        })
    }
}
