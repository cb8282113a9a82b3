//! Process supervision for one iteration.
//!
//! A pipeline is the agent process with its output piped through the
//! monitor. The `Supervisor` trait is the seam the controller drives;
//! `ProcessSupervisor` is the real implementation.

mod handle;
mod preflight;
mod process;

use async_trait::async_trait;

pub use handle::{PipelineExit, PipelineHandle, termination_requested};
pub use preflight::{Preflight, preflight};
pub use process::ProcessSupervisor;

use crate::coordination::SignalSender;
use crate::error::Result;

/// Everything needed to launch one iteration's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub iteration: u64,
    pub prompt: String,
    /// Resume a prior agent session instead of starting fresh
    pub resume_token: Option<String>,
}

impl Launch {
    pub fn new(iteration: u64, prompt: impl Into<String>) -> Self {
        Self {
            iteration,
            prompt: prompt.into(),
            resume_token: None,
        }
    }

    pub fn with_resume(mut self, token: Option<String>) -> Self {
        self.resume_token = token;
        self
    }
}

/// Starts iteration pipelines.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Launch the pipeline. Classified signals must be sent on `signals`;
    /// dropping the sender once the monitor is done closes the channel.
    async fn start(&self, launch: Launch, signals: SignalSender) -> Result<PipelineHandle>;
}
