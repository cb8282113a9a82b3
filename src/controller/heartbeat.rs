//! Liveness indicator.
//!
//! Prints a short line every interval while an iteration runs. It shares
//! nothing with the controller and never influences control flow.

use std::time::{Duration, Instant};

use colored::*;
use tokio::task::JoinHandle;

pub struct Heartbeat {
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Start ticking for `iteration`. A zero interval yields a disabled heartbeat.
    pub fn start(iteration: u64, interval: Duration) -> Self {
        if interval.is_zero() {
            return Self::disabled();
        }
        let started = Instant::now();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                println!(
                    "  {} iteration {} still running ({}s)",
                    "…".dimmed(),
                    iteration,
                    started.elapsed().as_secs()
                );
            }
        });
        Self { task: Some(task) }
    }

    pub fn disabled() -> Self {
        Self { task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.abort();
    }
}
