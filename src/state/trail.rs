//! Best-effort line trails (activity and error logs).
//!
//! A trail that cannot be opened or written turns itself off; the pipeline
//! keeps running either way.

use std::path::{Path, PathBuf};

use chrono::Local;
use log::warn;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub struct ActivityTrail {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl ActivityTrail {
    /// Open the trail for appending, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open_file(&path).await {
            Ok(file) => Self { path, file: Some(file) },
            Err(e) => {
                warn!("Activity trail {} disabled: {}", path.display(), e);
                Self::disabled(path)
            }
        }
    }

    /// A trail that drops every line.
    pub fn disabled(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    async fn open_file(path: &Path) -> std::io::Result<tokio::fs::File> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        OpenOptions::new().create(true).append(true).open(path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one timestamped line.
    pub async fn write_line(&mut self, line: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let entry = format!("[{}] {}\n", Local::now().format("%H:%M:%S"), line.trim_end());
        let result = match file.write_all(entry.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Activity trail {} disabled after write failure: {}", self.path.display(), e);
            self.file = None;
        }
    }
}
