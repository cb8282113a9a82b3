//! Session log entries.
//!
//! One line per supervisor-level event:
//! `[<rfc3339>] iteration=<n> <kind>: <detail>`

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of supervisor-level event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionEndedComplete,
    SessionEndedRotated,
    SessionEndedGutter,
    SessionEndedNatural,
    /// The supervisor was asked to stop (SIGINT/SIGTERM)
    SessionEndedInterrupted,
    MaxIterationsExceeded,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::SessionEndedComplete => "session_ended_complete",
            EventKind::SessionEndedRotated => "session_ended_rotated",
            EventKind::SessionEndedGutter => "session_ended_gutter",
            EventKind::SessionEndedNatural => "session_ended_natural",
            EventKind::SessionEndedInterrupted => "session_ended_interrupted",
            EventKind::MaxIterationsExceeded => "max_iterations_exceeded",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_started" => Ok(EventKind::SessionStarted),
            "session_ended_complete" => Ok(EventKind::SessionEndedComplete),
            "session_ended_rotated" => Ok(EventKind::SessionEndedRotated),
            "session_ended_gutter" => Ok(EventKind::SessionEndedGutter),
            "session_ended_natural" => Ok(EventKind::SessionEndedNatural),
            "session_ended_interrupted" => Ok(EventKind::SessionEndedInterrupted),
            "max_iterations_exceeded" => Ok(EventKind::MaxIterationsExceeded),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

/// One entry of the session log. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub iteration: u64,
    pub kind: EventKind,
    pub detail: String,
}

impl SessionEvent {
    pub fn new(iteration: u64, kind: EventKind, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            iteration,
            kind,
            detail: detail.into(),
        }
    }

    /// Render as a single log line (no trailing newline).
    pub fn to_line(&self) -> String {
        let detail = self.detail.replace(['\n', '\r'], " ");
        if detail.is_empty() {
            format!("[{}] iteration={} {}", self.timestamp.to_rfc3339(), self.iteration, self.kind)
        } else {
            format!(
                "[{}] iteration={} {}: {}",
                self.timestamp.to_rfc3339(),
                self.iteration,
                self.kind,
                detail
            )
        }
    }

    /// Parse a line written by `to_line`. Foreign lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let rest = line.trim_end().strip_prefix('[')?;
        let (stamp, rest) = rest.split_once("] ")?;
        let timestamp = DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc);

        let rest = rest.strip_prefix("iteration=")?;
        let (iteration, rest) = rest.split_once(' ')?;
        let iteration = iteration.parse().ok()?;

        let (kind, detail) = match rest.split_once(": ") {
            Some((kind, detail)) => (kind, detail.to_string()),
            None => (rest, String::new()),
        };
        let kind = kind.parse().ok()?;

        Some(Self {
            timestamp,
            iteration,
            kind,
            detail,
        })
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}
