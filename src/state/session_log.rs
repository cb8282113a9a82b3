//! Append-only session log.
//!
//! Single writer (the controller), one flushed line per event so tail
//! followers never observe a partial entry.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::domain::{EventKind, SessionEvent};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Failures are logged and swallowed.
    pub fn append(&self, iteration: u64, kind: EventKind, detail: impl Into<String>) {
        let event = SessionEvent::new(iteration, kind, detail);
        if let Err(e) = self.write_event(&event) {
            warn!("Failed to append to session log {}: {}", self.path.display(), e);
        }
    }

    fn write_event(&self, event: &SessionEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        // One write call per line keeps appends whole under O_APPEND
        let line = format!("{}\n", event.to_line());
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Read every parseable entry back, oldest first.
    pub fn read_all(&self) -> Result<Vec<SessionEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            if let Some(event) = SessionEvent::parse_line(&line?) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// The last `n` entries.
    pub fn tail(&self, n: usize) -> Result<Vec<SessionEvent>> {
        let mut events = self.read_all()?;
        let skip = events.len().saturating_sub(n);
        Ok(events.split_off(skip))
    }
}
