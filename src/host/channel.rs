//! Host command channel and router.
//!
//! The client side is cheap to clone and can be used from many tasks; the
//! server side owns the [`HostHandler`] and processes one inbound envelope
//! at a time. Method calls that cannot be answered inline are parked on
//! their own task so a long-running `enableBluetooth` never blocks the
//! completion callback that will eventually answer it.

use crate::dispatcher::ActivationResult;
use crate::error::{PluginError, Result};
use crate::host::contract::{EventEnvelope, InboundEnvelope, MethodCallEnvelope, ReplyEnvelope};
use crate::permissions::CapabilityGrant;
use crate::plugin::{BluetoothEnablePlugin, Routed};
use crate::reply::MethodError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Host-side glue around the plugin: builds contexts on attach and mirrors
/// platform side effects.
pub trait HostHandler: Send + Sync + 'static {
    fn plugin(&self) -> &BluetoothEnablePlugin;

    /// Build a fresh context and attach it.
    fn attach(&self) -> Result<()>;

    fn detach(&self) {
        self.plugin().detach();
    }

    /// Called after an activation result was dispatched.
    fn activation_finished(&self, _result: ActivationResult) {}
}

/// Response to a submitted envelope that has not been awaited yet.
#[derive(Debug)]
pub struct PendingResponse {
    response_rx: oneshot::Receiver<Option<ReplyEnvelope>>,
}

impl PendingResponse {
    /// Wait for the server to answer.
    pub async fn wait(self) -> Result<Option<ReplyEnvelope>> {
        self.response_rx
            .await
            .map_err(|e| PluginError::Channel(format!("host response dropped: {e}")))
    }
}

struct HostRequest {
    envelope: InboundEnvelope,
    response_tx: oneshot::Sender<Option<ReplyEnvelope>>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    /// Queue one inbound envelope without waiting for it to be processed.
    ///
    /// Envelopes are handled in the order they were submitted, so a caller
    /// that submits from a single task keeps the host's ordering even while
    /// earlier replies are still outstanding.
    pub async fn submit(&self, envelope: InboundEnvelope) -> Result<PendingResponse> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| PluginError::Channel(format!("failed to send host request: {e}")))?;
        Ok(PendingResponse { response_rx })
    }

    /// Submit one inbound envelope and wait for its response.
    ///
    /// Method calls resolve to `Some(reply)` once answered, which for
    /// `enableBluetooth` may be much later. Callbacks and lifecycle
    /// envelopes resolve to `None` as soon as they are processed.
    pub async fn send(&self, envelope: InboundEnvelope) -> Result<Option<ReplyEnvelope>> {
        self.submit(envelope).await?.wait().await
    }

    /// Submit a method call and wait for its reply.
    pub async fn call(&self, envelope: MethodCallEnvelope) -> Result<ReplyEnvelope> {
        let request_id = envelope.request_id.clone();
        self.send(InboundEnvelope::Call(envelope))
            .await?
            .ok_or_else(|| {
                PluginError::Bridge(format!("no reply produced for call {request_id}"))
            })
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<H: HostHandler> {
    request_rx: mpsc::Receiver<HostRequest>,
    handler: H,
}

#[must_use]
pub fn command_channel<H: HostHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    command_channel_with_events(request_capacity, event_tx, handler)
}

/// Create a command channel using an existing event broadcast sender.
///
/// The handler's launcher and permission gate emit prompt events on this
/// sender, so they reach the host through the same path as replies.
#[must_use]
pub fn command_channel_with_events<H: HostHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx,
        },
        HostCommandServer {
            request_rx,
            handler,
        },
    )
}

impl<H: HostHandler> HostCommandServer<H> {
    pub async fn run(mut self) {
        while let Some(HostRequest {
            envelope,
            response_tx,
        }) = self.request_rx.recv().await
        {
            match envelope {
                InboundEnvelope::Call(call) => {
                    let request_id = call.request_id.clone();
                    match self.route_call(&call) {
                        Routed::Ready(reply) => {
                            let _ = response_tx
                                .send(Some(ReplyEnvelope::from_reply(request_id, reply)));
                        }
                        routed => {
                            tokio::spawn(async move {
                                let reply = routed.reply().await;
                                let _ = response_tx
                                    .send(Some(ReplyEnvelope::from_reply(request_id, reply)));
                            });
                        }
                    }
                }
                callback => {
                    self.route_callback(callback);
                    let _ = response_tx.send(None);
                }
            }
        }
    }

    /// Route a method call to the plugin.
    pub fn route_call(&self, call: &MethodCallEnvelope) -> Routed {
        if let Err(e) = call.validate() {
            warn!(request_id = %call.request_id, error = %e, "invalid call envelope");
            return Routed::Ready(
                MethodError::new("invalid_envelope", e.message).into(),
            );
        }
        debug!(request_id = %call.request_id, method = %call.method, "method call");
        self.handler.plugin().on_method_call(&call.method)
    }

    /// Route a lifecycle or completion envelope.
    pub fn route_callback(&self, envelope: InboundEnvelope) {
        match envelope {
            InboundEnvelope::Call(call) => {
                warn!(request_id = %call.request_id, "call routed as callback; ignoring");
            }
            InboundEnvelope::Attach => {
                if let Err(e) = self.handler.attach() {
                    warn!(error = %e, "attach failed");
                }
            }
            InboundEnvelope::Detach => self.handler.detach(),
            InboundEnvelope::ActivityResult {
                request_code,
                result_code,
            } => {
                let resolved = self
                    .handler
                    .plugin()
                    .on_activity_result(request_code, result_code);
                debug!(%request_code, resolved, "activity result routed");
                if resolved {
                    self.handler
                        .activation_finished(ActivationResult::from_result_code(result_code));
                }
            }
            InboundEnvelope::PermissionsResult {
                request_code,
                grants,
            } => {
                let resolved = self
                    .handler
                    .plugin()
                    .on_permissions_result(request_code, &grants);
                debug!(%request_code, resolved, granted = CapabilityGrant::all_granted(&grants), "permission result routed");
            }
        }
    }
}
