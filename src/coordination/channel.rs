//! Per-iteration signal channel.
//!
//! Ordered, unbounded, single consumer. The producer side lives in the
//! pipeline's monitor reader; when it is dropped the channel closes and the
//! consumer's `recv` returns `None`. Signals volume is tiny compared to an
//! iteration, so the queue is left unbounded.

use log::debug;
use tokio::sync::mpsc;

use crate::domain::Signal;

/// Open a channel scoped to one iteration.
pub fn signal_channel(iteration: u64) -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SignalSender { iteration, tx },
        SignalReceiver {
            iteration,
            rx,
            received: 0,
        },
    )
}

/// Producer half, owned by the pipeline.
#[derive(Debug)]
pub struct SignalSender {
    iteration: u64,
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalSender {
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Queue a signal. Returns `false` once the consumer has stopped listening.
    pub fn send(&self, signal: Signal) -> bool {
        match self.tx.send(signal) {
            Ok(()) => true,
            Err(mpsc::error::SendError(signal)) => {
                debug!("Iteration {} channel closed, dropping {}", self.iteration, signal);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the controller.
#[derive(Debug)]
pub struct SignalReceiver {
    iteration: u64,
    rx: mpsc::UnboundedReceiver<Signal>,
    received: usize,
}

impl SignalReceiver {
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Wait for the next signal; `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        let signal = self.rx.recv().await;
        if signal.is_some() {
            self.received += 1;
        }
        signal
    }

    /// Number of signals delivered so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Stop accepting signals and discard anything still queued.
    ///
    /// Returns how many queued signals were dropped.
    pub fn close(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while let Ok(signal) = self.rx.try_recv() {
            debug!("Iteration {} discarding unread {}", self.iteration, signal);
            dropped += 1;
        }
        dropped
    }
}
