//! Configuration system for Relayr.
//!
//! Resolution happens once at startup:
//! 1. YAML file (explicit path, ~/.config/relayr/relayr.yml, ./relayr.yml, or defaults)
//! 2. Environment overrides (`RELAYR_*`)
//! 3. Command-line overrides
//!
//! The resolved `Config` is never mutated afterwards.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use self::overrides::{ENV_MAX_ITERATIONS, ENV_MODEL, ENV_ROTATE_THRESHOLD, ENV_WARN_THRESHOLD, RunOverrides};

mod overrides;

/// Directory and file stem of implicit config files.
const CONFIG_NAME: &str = "relayr";

/// Default agent binary.
pub const DEFAULT_AGENT_COMMAND: &str = "cursor-agent";

/// Default monitor binary.
pub const DEFAULT_MONITOR_COMMAND: &str = "relayr-monitor";

/// Default model passed to the agent.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub agent: AgentConfig,
    pub monitor: MonitorConfig,
    pub run: RunConfig,
    pub paths: PathsConfig,
}

/// How to invoke the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command: String,
    /// Arguments placed before the model flag and the prompt
    pub args: Vec<String>,
    pub model: String,
    pub model_flag: String,
    pub resume_flag: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_AGENT_COMMAND.to_string(),
            args: vec![
                "-p".to_string(),
                "--force".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
            ],
            model: DEFAULT_MODEL.to_string(),
            model_flag: "--model".to_string(),
            resume_flag: "--resume".to_string(),
        }
    }
}

/// How to invoke the stream-to-signal monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub command: String,
    /// Arguments placed before the workspace path
    pub args: Vec<String>,
    /// Tokens at which the monitor should emit WARN
    pub warn_threshold: u64,
    /// Tokens at which the monitor should emit ROTATE
    pub rotate_threshold: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_MONITOR_COMMAND.to_string(),
            args: Vec::new(),
            warn_threshold: 70_000,
            rotate_threshold: 80_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_iterations: u32,
    /// Pause between consecutive iterations
    pub iteration_pause_ms: u64,
    /// Liveness indicator interval; 0 disables it
    pub heartbeat_secs: u64,
    pub require_git: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            iteration_pause_ms: 2000,
            heartbeat_secs: 30,
            require_git: true,
        }
    }
}

/// Locations relative to the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub task_file: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            task_file: PathBuf::from("RALPH_TASK.md"),
            state_dir: PathBuf::from(".ralph"),
        }
    }
}

impl PathsConfig {
    pub fn task_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.task_file)
    }

    pub fn state_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.state_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            agent: AgentConfig::default(),
            monitor: MonitorConfig::default(),
            run: RunConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the file layer. An explicit path must load; otherwise the first
    /// readable candidate from `search_paths` wins, and defaults apply if none does.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).with_context(|| format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.is_file() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => log::warn!("Skipping config {}: {:#}", candidate.display(), e),
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations, most specific first.
    pub fn search_paths() -> Vec<PathBuf> {
        let file_name = format!("{}.yml", CONFIG_NAME);
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(CONFIG_NAME).join(&file_name));
        }
        paths.push(PathBuf::from(file_name));
        paths
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            eyre::bail!("agent.command must not be empty");
        }
        if self.monitor.command.trim().is_empty() {
            eyre::bail!("monitor.command must not be empty");
        }
        if self.run.max_iterations == 0 {
            eyre::bail!("run.max_iterations must be at least 1");
        }
        if self.monitor.warn_threshold > self.monitor.rotate_threshold {
            eyre::bail!(
                "monitor.warn_threshold ({}) exceeds monitor.rotate_threshold ({})",
                self.monitor.warn_threshold,
                self.monitor.rotate_threshold
            );
        }
        Ok(())
    }
}
