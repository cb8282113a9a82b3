//! Persisted iteration counter.
//!
//! A single integer as the only content of a small file; absence means zero.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::Result;

/// Monotonic iteration counter surviving restarts.
#[derive(Debug, Clone)]
pub struct IterationCounter {
    path: PathBuf,
}

impl IterationCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value. Missing or garbled files read as zero.
    pub fn load(&self) -> u64 {
        match fs::read_to_string(&self.path) {
            Ok(contents) => contents.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring unparseable iteration counter in {}", self.path.display());
                0
            }),
            Err(_) => 0,
        }
    }

    pub fn store(&self, value: u64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", value))?;
        Ok(())
    }

    /// Bump and persist, returning the new value.
    ///
    /// The in-memory value is returned even when persisting fails; a counter
    /// that cannot be written must not stop the run.
    pub fn increment(&self) -> u64 {
        let next = self.load() + 1;
        if let Err(e) = self.store(next) {
            warn!("Failed to persist iteration counter {}: {}", self.path.display(), e);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_counter_is_zero() {
        let temp = TempDir::new().unwrap();
        let counter = IterationCounter::new(temp.path().join(".iteration"));
        assert_eq!(counter.load(), 0);
    }

    #[test]
    fn test_increment_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".iteration");
        let counter = IterationCounter::new(&path);

        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "2");

        // A fresh handle sees the persisted value
        assert_eq!(IterationCounter::new(&path).load(), 2);
    }

    #[test]
    fn test_garbled_counter_reads_zero() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".iteration");
        fs::write(&path, "not a number").unwrap();
        assert_eq!(IterationCounter::new(path).load(), 0);
    }

    #[test]
    fn test_store_creates_parent() {
        let temp = TempDir::new().unwrap();
        let counter = IterationCounter::new(temp.path().join("state").join(".iteration"));
        counter.store(41).unwrap();
        assert_eq!(counter.increment(), 42);
    }
}
