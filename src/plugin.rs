//! Method-call surface and attach/detach lifecycle.
//!
//! [`BluetoothEnablePlugin`] is what a host talks to. It holds the currently
//! attached [`ActivityContext`] (if any), dispatches method calls by name and
//! forwards platform callbacks to the [`CompletionDispatcher`].

use crate::context::ActivityContext;
use crate::coordinator::{RequestCode, ResolveOutcome};
use crate::dispatcher::{ActivationResult, CompletionDispatcher};
use crate::flow;
use crate::permissions::{Capability, CapabilityGrant};
use crate::reply::{MethodError, MethodReply, ReplyReceiver, result_channel};
use crate::toggle;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Recognised method names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodName {
    IsAvailable,
    IsEnabled,
    EnableBluetooth,
    CustomEnable,
    RequestPermissions,
}

impl MethodName {
    /// Render method name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IsAvailable => "isAvailable",
            Self::IsEnabled => "isEnabled",
            Self::EnableBluetooth => "enableBluetooth",
            Self::CustomEnable => "customEnable",
            Self::RequestPermissions => "requestPermissions",
        }
    }

    /// Parse a method name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "isAvailable" => Some(Self::IsAvailable),
            "isEnabled" => Some(Self::IsEnabled),
            "enableBluetooth" => Some(Self::EnableBluetooth),
            "customEnable" => Some(Self::CustomEnable),
            "requestPermissions" => Some(Self::RequestPermissions),
            _ => None,
        }
    }
}

/// Blocking work whose reply is produced off the caller's thread.
pub type BlockingReply = Box<dyn FnOnce() -> MethodReply + Send + 'static>;

/// How a method call will be answered.
pub enum Routed {
    /// Answered synchronously.
    Ready(MethodReply),
    /// Answered later through the coordinator.
    Pending(ReplyReceiver),
    /// Answered by running blocking work (the `customEnable` settle wait).
    Blocking(BlockingReply),
}

impl std::fmt::Debug for Routed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(reply) => f.debug_tuple("Ready").field(reply).finish(),
            Self::Pending(_) => f.write_str("Pending"),
            Self::Blocking(_) => f.write_str("Blocking"),
        }
    }
}

impl Routed {
    /// Wait for the reply on an async runtime.
    ///
    /// An abandoned pending request becomes a `request_abandoned` error.
    pub async fn reply(self) -> MethodReply {
        match self {
            Self::Ready(reply) => reply,
            Self::Pending(rx) => rx
                .await
                .unwrap_or_else(|_| MethodReply::Error(MethodError::abandoned())),
            Self::Blocking(work) => tokio::task::spawn_blocking(work)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "blocking method task failed");
                    MethodReply::Error(MethodError::abandoned())
                }),
        }
    }

    /// Wait for the reply on the current thread.
    ///
    /// Must not be called from within an async runtime.
    pub fn reply_blocking(self) -> MethodReply {
        match self {
            Self::Ready(reply) => reply,
            Self::Pending(rx) => rx
                .blocking_recv()
                .unwrap_or_else(|_| MethodReply::Error(MethodError::abandoned())),
            Self::Blocking(work) => work(),
        }
    }
}

/// The control surface exposed to the host.
#[derive(Debug, Default)]
pub struct BluetoothEnablePlugin {
    context: Mutex<Option<Arc<ActivityContext>>>,
}

impl BluetoothEnablePlugin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_context(&self) -> MutexGuard<'_, Option<Arc<ActivityContext>>> {
        self.context.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a context, tearing down any previous one.
    pub fn attach(&self, context: ActivityContext) {
        let previous = self.lock_context().replace(Arc::new(context));
        if let Some(previous) = previous {
            info!("re-attached; releasing previous context");
            previous.teardown();
        }
        info!("activity attached");
    }

    /// Tear down the attached context. Returns `false` if none was attached.
    pub fn detach(&self) -> bool {
        let previous = self.lock_context().take();
        match previous {
            Some(context) => {
                context.teardown();
                info!("activity detached");
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock_context().is_some()
    }

    /// The attached context, if any.
    pub fn context(&self) -> Option<Arc<ActivityContext>> {
        self.lock_context().clone()
    }

    /// Dispatch one method call by name.
    pub fn on_method_call(&self, method: &str) -> Routed {
        let Some(ctx) = self.context() else {
            debug!(method, "method call with no attached activity");
            return Routed::Ready(MethodError::no_activity().into());
        };
        let Some(name) = MethodName::parse(method) else {
            debug!(method, "method not implemented");
            return Routed::Ready(MethodReply::NotImplemented);
        };

        if name != MethodName::IsAvailable && !ctx.adapter().state().is_present() {
            return Routed::Ready(MethodError::unavailable().into());
        }

        match name {
            MethodName::IsAvailable => Routed::Ready(MethodReply::success(flow::is_available(&ctx))),
            MethodName::IsEnabled => Routed::Ready(match flow::is_enabled(&ctx) {
                Ok(enabled) => MethodReply::success(enabled),
                Err(e) => e.into(),
            }),
            MethodName::EnableBluetooth => {
                let (sink, rx) = result_channel();
                match flow::request_enable(&ctx, sink) {
                    Ok(_) => Routed::Pending(rx),
                    Err(e) => Routed::Ready(e.into()),
                }
            }
            MethodName::CustomEnable => {
                let permission_code = ctx.next_request_code();
                if let Err(e) = ctx
                    .gate()
                    .request(permission_code, &[Capability::BluetoothConnect])
                {
                    warn!(error = %e, "customEnable: capability request failed");
                }
                Routed::Blocking(Box::new(move || {
                    toggle::custom_enable(
                        ctx.adapter(),
                        ctx.settle_timer(),
                        ctx.flow().settle_delay(),
                    );
                    MethodReply::success("true")
                }))
            }
            MethodName::RequestPermissions => {
                let (sink, rx) = result_channel();
                flow::request_permissions(&ctx, sink);
                Routed::Pending(rx)
            }
        }
    }

    /// Forward an activation result. Returns `true` if it resolved a request.
    pub fn on_activity_result(&self, request_id: RequestCode, result_code: i32) -> bool {
        let Some(ctx) = self.context() else {
            info!(request_code = %request_id, "activation result with no attached activity");
            return false;
        };
        let result = ActivationResult::from_result_code(result_code);
        CompletionDispatcher::for_context(&ctx).on_activation_result(request_id, result)
            == ResolveOutcome::Resolved
    }

    /// Forward a permission result. Returns `true` if it resolved a request.
    pub fn on_permissions_result(&self, request_id: RequestCode, grants: &[CapabilityGrant]) -> bool {
        let Some(ctx) = self.context() else {
            info!(request_code = %request_id, "permission result with no attached activity");
            return false;
        };
        CompletionDispatcher::for_context(&ctx).on_permissions_result(request_id, grants)
            == ResolveOutcome::Resolved
    }
}
