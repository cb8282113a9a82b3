//! Read-only view of the task document on disk.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use super::checklist::{is_complete, parse_completion};

/// Completion counts for a task document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub done: usize,
    pub total: usize,
}

impl TaskProgress {
    pub fn new(done: usize, total: usize) -> Self {
        Self { done, total }
    }

    /// Parse counts out of document content.
    pub fn from_content(content: &str) -> Self {
        let (done, total) = parse_completion(content);
        Self { done, total }
    }

    pub fn is_complete(&self) -> bool {
        is_complete(self.done, self.total)
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.done)
    }
}

impl std::fmt::Display for TaskProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

/// Observes the task document. The agent is its only writer.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the current progress.
    ///
    /// Returns `None` when there is no task: the document is absent or
    /// cannot be read. Callers never see an error from here.
    pub fn read_progress(&self) -> Option<TaskProgress> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let progress = TaskProgress::from_content(&content);
                debug!("Task progress {} from {}", progress, self.path.display());
                Some(progress)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read task document {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Progress with the soft `(0, 0)` fallback for a missing document.
    pub fn progress(&self) -> TaskProgress {
        self.read_progress().unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.progress().is_complete()
    }
}
