//! Coordination between the monitor and the controller.
//!
//! Each iteration gets a fresh signal channel; nothing outlives it.

mod channel;

pub use channel::{SignalReceiver, SignalSender, signal_channel};
