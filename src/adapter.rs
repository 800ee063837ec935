//! Radio adapter abstraction.
//!
//! The adapter is owned by the platform. This crate only reads its
//! [`AdapterState`] and, on the synchronous `customEnable` path, asks it to
//! power down and up again.

use crate::config::AdapterConfig;
use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Snapshot of the radio adapter's power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// The device has no radio adapter.
    Absent,
    Disabled,
    /// Power-up has been requested but has not finished.
    Enabling,
    Enabled,
}

impl AdapterState {
    #[must_use]
    pub fn is_present(self) -> bool {
        self != Self::Absent
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Disabled => "disabled",
            Self::Enabling => "enabling",
            Self::Enabled => "enabled",
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/power access to the platform radio adapter.
pub trait RadioAdapter: Send + Sync + 'static {
    /// Current power state. Must be cheap; it is queried on every call.
    fn state(&self) -> AdapterState;

    /// Request power-on.
    fn enable(&self) -> Result<()>;

    /// Request power-off.
    fn disable(&self) -> Result<()>;
}

/// A power operation observed by [`SimulatedAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterOp {
    Enable,
    Disable,
}

/// In-memory adapter used by the headless host bridge and tests.
///
/// Power changes take effect immediately and are recorded in order.
#[derive(Debug)]
pub struct SimulatedAdapter {
    state: Mutex<AdapterState>,
    operations: Mutex<Vec<AdapterOp>>,
}

impl SimulatedAdapter {
    #[must_use]
    pub fn new(state: AdapterState) -> Self {
        Self {
            state: Mutex::new(state),
            operations: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &AdapterConfig) -> Self {
        let state = match (config.present, config.initially_enabled) {
            (false, _) => AdapterState::Absent,
            (true, true) => AdapterState::Enabled,
            (true, false) => AdapterState::Disabled,
        };
        Self::new(state)
    }

    /// Overwrite the state, e.g. after the platform finished an activation.
    ///
    /// An absent adapter stays absent.
    pub fn set_state(&self, state: AdapterState) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_present() {
            *guard = state;
        }
    }

    /// Power operations performed so far, oldest first.
    pub fn operations(&self) -> Vec<AdapterOp> {
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn apply(&self, op: AdapterOp, target: AdapterState) -> Result<()> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.is_present() {
            return Err(PluginError::Adapter(
                "device does not have a radio adapter".to_owned(),
            ));
        }
        *guard = target;
        drop(guard);

        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(op);
        Ok(())
    }
}

impl RadioAdapter for SimulatedAdapter {
    fn state(&self) -> AdapterState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enable(&self) -> Result<()> {
        self.apply(AdapterOp::Enable, AdapterState::Enabled)
    }

    fn disable(&self) -> Result<()> {
        self.apply(AdapterOp::Disable, AdapterState::Disabled)
    }
}
