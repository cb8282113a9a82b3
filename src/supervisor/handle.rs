//! Handle to a running pipeline.

use std::future::Future;

use log::warn;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{RelayrError, Result};

/// How the pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineExit {
    /// Agent exit code; `None` when killed by a signal
    pub code: Option<i32>,
    /// The supervisor terminated the pipeline
    pub terminated: bool,
}

impl PipelineExit {
    pub fn exited(code: Option<i32>) -> Self {
        Self {
            code,
            terminated: false,
        }
    }

    pub fn terminated(code: Option<i32>) -> Self {
        Self { code, terminated: true }
    }
}

/// Owns a pipeline task. `terminate` asks it to stop; `wait` joins it.
pub struct PipelineHandle {
    kill: watch::Sender<bool>,
    task: Option<JoinHandle<PipelineExit>>,
    exit: Option<PipelineExit>,
}

impl PipelineHandle {
    /// Spawn a pipeline body. The body receives the termination flag and must
    /// stop its processes once it flips to `true`.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = PipelineExit> + Send + 'static,
    {
        let (kill, kill_rx) = watch::channel(false);
        let task = tokio::spawn(body(kill_rx));
        Self {
            kill,
            task: Some(task),
            exit: None,
        }
    }

    /// Best-effort forced termination. Safe to call any number of times,
    /// including after the pipeline has exited.
    pub fn terminate(&self) {
        self.kill.send_replace(true);
    }

    pub fn is_terminating(&self) -> bool {
        *self.kill.borrow()
    }

    /// Wait for the pipeline to exit. Repeated calls return the same result.
    pub async fn wait(&mut self) -> Result<PipelineExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let Some(task) = self.task.take() else {
            return Err(RelayrError::Pipeline("pipeline task already consumed".to_string()));
        };
        let exit = task.await.map_err(|e| {
            warn!("Pipeline task failed: {}", e);
            RelayrError::Pipeline(format!("pipeline task failed: {}", e))
        })?;
        self.exit = Some(exit);
        Ok(exit)
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        // An abandoned pipeline must not keep running
        if self.exit.is_none() {
            self.kill.send_replace(true);
        }
    }
}

/// Resolve once termination has been requested.
///
/// Also resolves if the handle is gone, since nobody is left to wait on the
/// pipeline.
pub async fn termination_requested(kill: &mut watch::Receiver<bool>) {
    let _ = kill.wait_for(|requested| *requested).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_natural_exit() {
        let mut handle = PipelineHandle::spawn(|_kill| async { PipelineExit::exited(Some(0)) });
        let exit = handle.wait().await.unwrap();
        assert_eq!(exit, PipelineExit::exited(Some(0)));
        assert!(!exit.terminated);
    }

    #[tokio::test]
    async fn test_terminate_stops_body() {
        let mut handle = PipelineHandle::spawn(|mut kill| async move {
            tokio::select! {
                () = termination_requested(&mut kill) => PipelineExit::terminated(None),
                () = tokio::time::sleep(Duration::from_secs(30)) => PipelineExit::exited(Some(0)),
            }
        });

        handle.terminate();
        assert!(handle.is_terminating());
        let exit = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(exit.terminated);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let mut handle = PipelineHandle::spawn(|mut kill| async move {
            termination_requested(&mut kill).await;
            PipelineExit::terminated(None)
        });

        handle.terminate();
        handle.terminate();
        let first = handle.wait().await.unwrap();

        // After exit, terminate and wait remain harmless
        handle.terminate();
        let second = handle.wait().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_drop_requests_termination() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let handle = PipelineHandle::spawn(|mut kill| async move {
            termination_requested(&mut kill).await;
            let _ = done_tx.send(());
            PipelineExit::terminated(None)
        });
        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), done_rx).await.unwrap().unwrap();
    }
}
