//! The attached host context every operation runs against.
//!
//! An [`ActivityContext`] is created when the host attaches and torn down
//! when it detaches. It owns the handles to the platform collaborators and
//! the [`RequestCoordinator`] whose lifetime is scoped to it, so a detach
//! abandons whatever was pending instead of leaving it in shared state.

use crate::adapter::RadioAdapter;
use crate::config::{FlowConfig, PluginConfig};
use crate::coordinator::{RequestCode, RequestCoordinator};
use crate::error::Result;
use crate::permissions::{Capability, PermissionGate};
use crate::toggle::SettleTimer;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Starts the platform's out-of-process activation prompt.
///
/// The result is delivered later through
/// [`CompletionDispatcher::on_activation_result`](crate::dispatcher::CompletionDispatcher::on_activation_result)
/// with the same request code.
pub trait ActivationLauncher: Send + Sync + 'static {
    fn launch(&self, request_id: RequestCode) -> Result<()>;
}

/// Explicitly owned state for one attachment of the host.
pub struct ActivityContext {
    adapter: Arc<dyn RadioAdapter>,
    gate: Arc<dyn PermissionGate>,
    launcher: Arc<dyn ActivationLauncher>,
    coordinator: Arc<RequestCoordinator>,
    flow: FlowConfig,
    required: &'static [Capability],
    next_code: AtomicU32,
    settle: SettleTimer,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityContext")
            .field("adapter_state", &self.adapter.state())
            .field("pending", &self.coordinator.pending_id())
            .field("torn_down", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ActivityContext {
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        gate: Arc<dyn PermissionGate>,
        launcher: Arc<dyn ActivationLauncher>,
        config: &PluginConfig,
    ) -> Self {
        Self {
            adapter,
            gate,
            launcher,
            coordinator: Arc::new(RequestCoordinator::new()),
            flow: config.flow.clone(),
            required: Capability::required_for(config.platform.api_level),
            next_code: AtomicU32::new(1),
            settle: SettleTimer::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn adapter(&self) -> &dyn RadioAdapter {
        self.adapter.as_ref()
    }

    pub fn gate(&self) -> &dyn PermissionGate {
        self.gate.as_ref()
    }

    pub fn launcher(&self) -> &dyn ActivationLauncher {
        self.launcher.as_ref()
    }

    pub fn coordinator(&self) -> &Arc<RequestCoordinator> {
        &self.coordinator
    }

    pub fn flow(&self) -> &FlowConfig {
        &self.flow
    }

    /// Capability set the platform requires for adapter access.
    pub fn required_capabilities(&self) -> &'static [Capability] {
        self.required
    }

    pub fn settle_timer(&self) -> &SettleTimer {
        &self.settle
    }

    /// Cancelled when the context is torn down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Allocate a correlation code no other request of this context has used.
    pub fn next_request_code(&self) -> RequestCode {
        RequestCode(self.next_code.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Release the context: abandon the pending request, stop timers and
    /// interrupt a running settle wait. Idempotent.
    pub fn teardown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.settle.interrupt();
        let abandoned = self.coordinator.clear();
        info!(abandoned, "activity context torn down");
    }
}

impl Drop for ActivityContext {
    fn drop(&mut self) {
        self.teardown();
    }
}
