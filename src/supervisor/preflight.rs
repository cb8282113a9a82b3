//! Precondition checks, run once before the first iteration.
//!
//! Any failure here is fatal: no iteration is attempted.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use tokio::process::Command;

use crate::config::Config;
use crate::error::{RelayrError, Result};

/// What preflight resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub task_path: PathBuf,
    pub agent_path: PathBuf,
    pub monitor_path: PathBuf,
    /// `None` when the git check is disabled
    pub git_root: Option<PathBuf>,
}

/// Verify task document, workspace and binaries.
pub async fn preflight(config: &Config, workspace: &Path) -> Result<Preflight> {
    let task_path = config.paths.task_path(workspace);
    if !task_path.is_file() {
        return Err(RelayrError::TaskNotFound(task_path));
    }

    let git_root = if config.run.require_git {
        Some(git_toplevel(workspace).await?)
    } else {
        debug!("Skipping git work tree check");
        None
    };

    let agent_path = resolve_binary(&config.agent.command)?;
    let monitor_path = resolve_binary(&config.monitor.command)?;

    info!(
        "Preflight ok: task={} agent={} monitor={}",
        task_path.display(),
        agent_path.display(),
        monitor_path.display()
    );

    Ok(Preflight {
        task_path,
        agent_path,
        monitor_path,
        git_root,
    })
}

/// Resolve a command name (or path) to an executable.
pub fn resolve_binary(command: &str) -> Result<PathBuf> {
    which::which(command).map_err(|e| {
        debug!("which({}) failed: {}", command, e);
        RelayrError::BinaryNotFound(command.to_string())
    })
}

async fn git_toplevel(workspace: &Path) -> Result<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayrError::BinaryNotFound("git".to_string())
            } else {
                RelayrError::Io(e)
            }
        })?;

    if !output.status.success() {
        return Err(RelayrError::NotVersionControlled(workspace.to_path_buf()));
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(PathBuf::from(root))
}
