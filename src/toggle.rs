//! Synchronous `customEnable` path: power-cycle the adapter directly.
//!
//! Bypasses the request coordinator entirely. Callers of this path rely on
//! always getting a success signal, so neither an interrupted settle wait
//! nor an adapter failure is surfaced.

use crate::adapter::{AdapterState, RadioAdapter};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;
use tracing::{debug, error, warn};

/// How a settle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleWait {
    Elapsed,
    Interrupted,
}

/// Interruptible fixed-delay wait.
///
/// An interrupt wakes the current wait, or the next one if none is running.
#[derive(Debug)]
pub struct SettleTimer {
    interrupt_tx: Sender<()>,
    interrupt_rx: Receiver<()>,
}

impl Default for SettleTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SettleTimer {
    #[must_use]
    pub fn new() -> Self {
        let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
        Self {
            interrupt_tx,
            interrupt_rx,
        }
    }

    /// Block the current thread for `delay` unless interrupted.
    pub fn wait(&self, delay: Duration) -> SettleWait {
        match self.interrupt_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => SettleWait::Elapsed,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => SettleWait::Interrupted,
        }
    }

    pub fn interrupt(&self) {
        match self.interrupt_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => debug!("settle timer already released"),
        }
    }
}

/// Disable, settle, enable. Always reports success.
///
/// A no-op when the adapter is already enabled.
pub fn custom_enable(adapter: &dyn RadioAdapter, settle: &SettleTimer, delay: Duration) -> bool {
    let state = adapter.state();
    if state == AdapterState::Enabled {
        debug!("customEnable: adapter already enabled");
        return true;
    }

    if let Err(e) = adapter.disable() {
        error!(error = %e, %state, "customEnable: disable failed");
    }
    if settle.wait(delay) == SettleWait::Interrupted {
        warn!(?delay, "customEnable: settle wait interrupted; enabling anyway");
    }
    if let Err(e) = adapter.enable() {
        error!(error = %e, "customEnable: enable failed");
    }
    true
}
