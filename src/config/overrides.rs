//! Environment and command-line overrides.
//!
//! Applied once, right after the file layer is loaded.

use log::warn;

use super::Config;

pub const ENV_MODEL: &str = "RELAYR_MODEL";
pub const ENV_MAX_ITERATIONS: &str = "RELAYR_MAX_ITERATIONS";
pub const ENV_WARN_THRESHOLD: &str = "RELAYR_WARN_THRESHOLD";
pub const ENV_ROTATE_THRESHOLD: &str = "RELAYR_ROTATE_THRESHOLD";

/// Overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub skip_git_check: bool,
}

impl RunOverrides {
    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.max_iterations.is_none() && !self.skip_git_check
    }
}

impl Config {
    /// Apply `RELAYR_*` variables from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `RELAYR_*` variables through an arbitrary lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.agent.model = model.trim().to_string();
        }
        if let Some(value) = parse_env(&lookup, ENV_MAX_ITERATIONS) {
            if value == 0 {
                warn!("Ignoring {}=0", ENV_MAX_ITERATIONS);
            } else {
                self.run.max_iterations = value;
            }
        }
        if let Some(value) = parse_env(&lookup, ENV_WARN_THRESHOLD) {
            self.monitor.warn_threshold = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_ROTATE_THRESHOLD) {
            self.monitor.rotate_threshold = value;
        }
        self
    }

    /// Apply command-line overrides; these win over the environment.
    pub fn apply_overrides(mut self, overrides: &RunOverrides) -> Self {
        if let Some(model) = &overrides.model {
            self.agent.model = model.clone();
        }
        if let Some(max) = overrides.max_iterations {
            self.run.max_iterations = max;
        }
        if overrides.skip_git_check {
            self.run.require_git = false;
        }
        self
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
