//! Production host handler for the headless bridge.
//!
//! The bridge has no platform UI of its own: prompts are surfaced to the
//! host shell as events, and the shell answers with `activity_result` /
//! `permissions_result` envelopes.

use crate::adapter::{AdapterState, RadioAdapter, SimulatedAdapter};
use crate::config::PluginConfig;
use crate::context::{ActivationLauncher, ActivityContext};
use crate::coordinator::RequestCode;
use crate::dispatcher::ActivationResult;
use crate::error::Result;
use crate::host::channel::HostHandler;
use crate::host::contract::EventEnvelope;
use crate::permissions::{
    Capability, CapabilityGrant, PermissionGate, PermissionStore, SharedPermissionStore,
};
use crate::plugin::BluetoothEnablePlugin;
use std::sync::{Arc, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

fn emit_event(event_tx: &broadcast::Sender<EventEnvelope>, event: &str, payload: serde_json::Value) {
    let envelope = EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event, payload);
    if event_tx.send(envelope).is_err() {
        debug!(event, "no event subscribers");
    }
}

/// Surfaces the activation prompt as an `activation.requested` event.
#[derive(Debug, Clone)]
pub struct EventActivationLauncher {
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl EventActivationLauncher {
    pub fn new(event_tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { event_tx }
    }
}

impl ActivationLauncher for EventActivationLauncher {
    fn launch(&self, request_id: RequestCode) -> Result<()> {
        info!(request_code = %request_id, "activation.requested");
        emit_event(
            &self.event_tx,
            "activation.requested",
            serde_json::json!({ "request_code": request_id }),
        );
        Ok(())
    }
}

/// Answers `holds` from the live permission store and surfaces prompts as
/// `capability.requested` events.
#[derive(Debug, Clone)]
pub struct EventPermissionGate {
    store: SharedPermissionStore,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl EventPermissionGate {
    pub fn new(store: SharedPermissionStore, event_tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { store, event_tx }
    }

    fn lock_store(&self) -> MutexGuard<'_, PermissionStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PermissionGate for EventPermissionGate {
    fn holds(&self, capabilities: &[Capability]) -> bool {
        self.lock_store().holds_all(capabilities)
    }

    fn request(&self, request_id: RequestCode, capabilities: &[Capability]) -> Result<()> {
        let names: Vec<&str> = capabilities.iter().map(|c| c.as_str()).collect();
        info!(request_code = %request_id, capabilities = ?names, "capability.requested");
        emit_event(
            &self.event_tx,
            "capability.requested",
            serde_json::json!({
                "request_code": request_id,
                "capabilities": names,
            }),
        );
        Ok(())
    }

    fn record_results(&self, grants: &[CapabilityGrant]) {
        let all_granted: Vec<String> = {
            let mut store = self.lock_store();
            for grant in grants {
                store.record(*grant);
            }
            store.all_granted().iter().map(ToString::to_string).collect()
        };

        // Emit permissions.changed so the shell can mirror the live state.
        emit_event(
            &self.event_tx,
            "permissions.changed",
            serde_json::json!({ "all_granted": all_granted }),
        );
    }
}

/// Host handler backed by a simulated adapter.
pub struct BridgeHandler {
    config: PluginConfig,
    plugin: BluetoothEnablePlugin,
    adapter: Arc<SimulatedAdapter>,
    permissions: SharedPermissionStore,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl std::fmt::Debug for BridgeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandler")
            .field("adapter", &self.adapter.state())
            .field("attached", &self.plugin.is_attached())
            .finish_non_exhaustive()
    }
}

impl BridgeHandler {
    pub fn new(
        config: PluginConfig,
        permissions: SharedPermissionStore,
        event_tx: broadcast::Sender<EventEnvelope>,
    ) -> Self {
        let adapter = Arc::new(SimulatedAdapter::from_config(&config.adapter));
        Self {
            config,
            plugin: BluetoothEnablePlugin::new(),
            adapter,
            permissions,
            event_tx,
        }
    }

    pub fn adapter(&self) -> &Arc<SimulatedAdapter> {
        &self.adapter
    }

    pub fn permissions(&self) -> &SharedPermissionStore {
        &self.permissions
    }
}

impl HostHandler for BridgeHandler {
    fn plugin(&self) -> &BluetoothEnablePlugin {
        &self.plugin
    }

    fn attach(&self) -> Result<()> {
        let context = ActivityContext::new(
            self.adapter.clone(),
            Arc::new(EventPermissionGate::new(
                self.permissions.clone(),
                self.event_tx.clone(),
            )),
            Arc::new(EventActivationLauncher::new(self.event_tx.clone())),
            &self.config,
        );
        self.plugin.attach(context);
        emit_event(
            &self.event_tx,
            "activity.attached",
            serde_json::json!({ "adapter": self.adapter.state() }),
        );
        Ok(())
    }

    fn detach(&self) {
        if self.plugin.detach() {
            emit_event(&self.event_tx, "activity.detached", serde_json::json!({}));
        }
    }

    fn activation_finished(&self, result: ActivationResult) {
        // The platform powers the adapter up once the user accepts.
        if result.is_accepted() {
            self.adapter.set_state(AdapterState::Enabled);
        }
    }
}
