//! Operator interrupts (SIGINT/SIGTERM).
//!
//! The agent and monitor run in their own process groups, so a terminal
//! Ctrl-C never reaches them. The controller watches this flag instead and
//! tears the pipeline down itself.

use log::warn;
use tokio::sync::watch;

use crate::error::Result;

/// Flips to `true` once the supervisor has been asked to stop.
pub type InterruptFlag = watch::Receiver<bool>;

/// A flag the caller raises by hand, e.g. from tests or an embedding program.
pub fn interrupt_flag() -> (watch::Sender<bool>, InterruptFlag) {
    watch::channel(false)
}

/// Install SIGINT/SIGTERM handlers and return the flag they raise.
///
/// Handlers are registered before this returns, so a signal delivered right
/// after the call is never lost. Must be called inside a tokio runtime.
#[cfg(unix)]
pub fn listen_for_interrupt() -> Result<InterruptFlag> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (tx, rx) = interrupt_flag();

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        warn!("Received {}, stopping the pipeline", name);
        tx.send_replace(true);
        // Keep the sender alive so the flag stays raised
        std::future::pending::<()>().await;
    });

    Ok(rx)
}

#[cfg(not(unix))]
pub fn listen_for_interrupt() -> Result<InterruptFlag> {
    let (tx, rx) = interrupt_flag();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, stopping the pipeline");
            tx.send_replace(true);
        }
        std::future::pending::<()>().await;
    });

    Ok(rx)
}

/// Resolve once the flag is raised. Without a flag, or after every sender is
/// gone without raising it, this never resolves.
pub async fn interrupted(flag: &mut Option<InterruptFlag>) {
    if let Some(rx) = flag.as_mut()
        && rx.wait_for(|raised| *raised).await.is_ok()
    {
        return;
    }
    std::future::pending::<()>().await
}
