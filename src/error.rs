//! Error types for Relayr
//!
//! Centralized error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

/// All error types that can occur while supervising an agent
#[derive(Debug, Error)]
pub enum RelayrError {
    /// Task document is missing from the workspace
    #[error("Task document not found: {}", .0.display())]
    TaskNotFound(PathBuf),

    /// A required external binary could not be resolved on PATH
    #[error("Required binary not found: {0}")]
    BinaryNotFound(String),

    /// Workspace is not inside a git work tree
    #[error("Not a version-controlled workspace: {}", .0.display())]
    NotVersionControlled(PathBuf),

    /// A pipeline process could not be spawned
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The running pipeline failed in a way the controller cannot absorb
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Configuration could not be resolved
    #[error("Config error: {0}")]
    Config(String),

    /// Prompt template failed to render
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayrError {
    /// Whether this error means the run cannot start at all.
    pub fn is_precondition(&self) -> bool {
        match self {
            RelayrError::TaskNotFound(_) | RelayrError::BinaryNotFound(_) | RelayrError::NotVersionControlled(_) => {
                true
            }
            RelayrError::Spawn { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias for Relayr operations
pub type Result<T> = std::result::Result<T, RelayrError>;
