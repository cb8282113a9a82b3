//! Control signals emitted by the monitor.
//!
//! The monitor writes one token per line on its stdout. Only the first word
//! matters; anything after it is kept as free-text detail.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of control signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    /// Token usage is approaching the budget (advisory)
    Warn,
    /// Token budget exhausted, restart with fresh context
    Rotate,
    /// Agent appears stuck
    Gutter,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Warn => "WARN",
            SignalKind::Rotate => "ROTATE",
            SignalKind::Gutter => "GUTTER",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WARN" => Ok(SignalKind::Warn),
            "ROTATE" => Ok(SignalKind::Rotate),
            "GUTTER" => Ok(SignalKind::Gutter),
            other => Err(format!("unknown signal: {}", other)),
        }
    }
}

/// A signal received during one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
    /// Free text following the token, if any
    pub detail: Option<String>,
}

impl Signal {
    pub fn new(kind: SignalKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn warn() -> Self {
        Self::new(SignalKind::Warn)
    }

    pub fn rotate() -> Self {
        Self::new(SignalKind::Rotate)
    }

    pub fn gutter() -> Self {
        Self::new(SignalKind::Gutter)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Parse a monitor output line.
    ///
    /// Returns `None` for lines that carry no signal token.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let (token, rest) = match line.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (line, ""),
        };
        let kind = token.trim_end_matches(':').parse::<SignalKind>().ok()?;

        let detail = (!rest.is_empty()).then(|| rest.to_string());
        Some(Self { kind, detail })
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} {}", self.kind, detail),
            None => write!(f, "{}", self.kind),
        }
    }
}
