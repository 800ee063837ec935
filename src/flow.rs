//! Request-side operations: availability, power state, permissions and the
//! asynchronous enable flow.
//!
//! ## Enable flow
//!
//! `request_enable` never waits for the user. It registers the caller's
//! sink with the context's coordinator, starts the platform prompt and
//! returns; the answer arrives through the
//! [`CompletionDispatcher`](crate::dispatcher::CompletionDispatcher).
//!
//! The `bluetooth_connect` request it fires on the way is not joined into the
//! enable result. Its grant/deny answer arrives under its own request code
//! and is inert against the activation request in the slot.

use crate::adapter::AdapterState;
use crate::context::ActivityContext;
use crate::coordinator::{RegisterOutcome, RequestCode};
use crate::permissions::Capability;
use crate::reply::{MethodError, MethodReply, ResultSink};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an enable request was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableStart {
    /// The adapter was already on; the sink has been answered with `true`.
    AlreadyEnabled,
    /// Waiting for the activation result under this code.
    Pending(RequestCode),
}

/// How a permission request was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStart {
    /// Every required capability is held; the sink has been answered with `true`.
    AlreadyHeld,
    Pending(RequestCode),
}

/// Whether the device has a radio adapter. Touches nothing else.
pub fn is_available(ctx: &ActivityContext) -> bool {
    ctx.adapter().state().is_present()
}

/// Whether the adapter is powered on.
///
/// # Errors
///
/// `bluetooth_unavailable` without an adapter, `no_permissions` when the
/// platform capability set is not held.
pub fn is_enabled(ctx: &ActivityContext) -> Result<bool, MethodError> {
    let state = ctx.adapter().state();
    if !state.is_present() {
        return Err(MethodError::unavailable());
    }
    if !ctx.gate().holds(ctx.required_capabilities()) {
        return Err(MethodError::no_permissions());
    }
    Ok(state == AdapterState::Enabled)
}

/// Start the asynchronous enable flow for `sink`.
///
/// # Errors
///
/// `bluetooth_unavailable` when the device has no adapter. The coordinator
/// and the permission gate are left untouched in that case.
pub fn request_enable(ctx: &ActivityContext, sink: ResultSink) -> Result<EnableStart, MethodError> {
    let state = ctx.adapter().state();
    if !state.is_present() {
        info!("enableBluetooth: no adapter");
        return Err(MethodError::unavailable());
    }

    let permission_code = ctx.next_request_code();
    if let Err(e) = ctx
        .gate()
        .request(permission_code, &[Capability::BluetoothConnect])
    {
        warn!(error = %e, request_code = %permission_code, "enableBluetooth: capability request failed");
    }

    if state == AdapterState::Enabled {
        debug!("enableBluetooth: adapter already enabled");
        sink.success(true);
        return Ok(EnableStart::AlreadyEnabled);
    }

    // Register before launching so a fast completion always finds the slot.
    let code = ctx.next_request_code();
    if let RegisterOutcome::Replaced { previous } = ctx.coordinator().register(Some(code), sink) {
        info!(request_code = %code, ?previous, "enableBluetooth: replaced pending request");
    }

    if let Err(e) = ctx.launcher().launch(code) {
        warn!(error = %e, request_code = %code, "enableBluetooth: activation launch failed");
        ctx.coordinator()
            .resolve_with(code, MethodError::activation_failed(e.to_string()).into());
        return Ok(EnableStart::Pending(code));
    }

    schedule_timeout(ctx, code);
    info!(request_code = %code, "enableBluetooth: awaiting activation result");
    Ok(EnableStart::Pending(code))
}

/// Ask for the platform capability set, answering `sink` with whether it was
/// granted.
pub fn request_permissions(ctx: &ActivityContext, sink: ResultSink) -> PermissionStart {
    let required = ctx.required_capabilities();
    if ctx.gate().holds(required) {
        sink.success(true);
        return PermissionStart::AlreadyHeld;
    }

    let code = ctx.next_request_code();
    ctx.coordinator().register(Some(code), sink);
    if let Err(e) = ctx.gate().request(code, required) {
        warn!(error = %e, request_code = %code, "requestPermissions: capability request failed");
        ctx.coordinator().resolve_with(
            code,
            MethodReply::Error(
                MethodError::no_permissions().with_details(serde_json::Value::String(e.to_string())),
            ),
        );
    }
    PermissionStart::Pending(code)
}

/// Fail `code` with `request_timeout` if it is still pending when the
/// configured timeout elapses. Cancelled by context teardown.
fn schedule_timeout(ctx: &ActivityContext, code: RequestCode) {
    let Some(timeout) = ctx.flow().enable_timeout() else {
        return;
    };
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(request_code = %code, "no async runtime; enable timeout not armed");
        return;
    };

    let coordinator = Arc::clone(ctx.coordinator());
    let cancel = ctx.cancel_token().clone();
    handle.spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(timeout) => {
                if coordinator.pending_id() == Some(code) {
                    info!(request_code = %code, timeout_secs = timeout.as_secs(), "enableBluetooth: timed out");
                    coordinator.resolve_with(code, MethodError::timed_out().into());
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::adapter::SimulatedAdapter;
    use crate::config::PluginConfig;
    use crate::context::ActivationLauncher;
    use crate::coordinator::ResolveOutcome;
    use crate::error::PluginError;
    use crate::permissions::PermissionGate;
    use crate::reply::{codes, result_channel};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot::error::TryRecvError;

    #[derive(Default)]
    struct RecordingGate {
        held: AtomicBool,
        requests: Mutex<Vec<(RequestCode, Vec<Capability>)>>,
    }

    impl PermissionGate for RecordingGate {
        fn holds(&self, _capabilities: &[Capability]) -> bool {
            self.held.load(Ordering::SeqCst)
        }

        fn request(&self, request_id: RequestCode, capabilities: &[Capability]) -> crate::Result<()> {
            self.requests
                .lock()
                .expect("lock requests")
                .push((request_id, capabilities.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        fail: bool,
        launched: Mutex<Vec<RequestCode>>,
    }

    impl ActivationLauncher for RecordingLauncher {
        fn launch(&self, request_id: RequestCode) -> crate::Result<()> {
            if self.fail {
                return Err(PluginError::Launch("no activity to host the prompt".to_owned()));
            }
            self.launched.lock().expect("lock launches").push(request_id);
            Ok(())
        }
    }

    struct Fixture {
        gate: Arc<RecordingGate>,
        launcher: Arc<RecordingLauncher>,
        ctx: ActivityContext,
    }

    fn fixture(state: AdapterState, launcher: RecordingLauncher, config: &PluginConfig) -> Fixture {
        let gate = Arc::new(RecordingGate::default());
        let launcher = Arc::new(launcher);
        let ctx = ActivityContext::new(
            Arc::new(SimulatedAdapter::new(state)),
            gate.clone(),
            launcher.clone(),
            config,
        );
        Fixture { gate, launcher, ctx }
    }

    #[test]
    fn absent_adapter_fails_without_side_effects() {
        let f = fixture(AdapterState::Absent, RecordingLauncher::default(), &PluginConfig::default());
        let (sink, _rx) = result_channel();

        let err = request_enable(&f.ctx, sink).expect_err("absent adapter");
        assert_eq!(err.code, codes::BLUETOOTH_UNAVAILABLE);
        assert!(!f.ctx.coordinator().is_pending());
        assert!(f.gate.requests.lock().expect("lock").is_empty());
        assert!(f.launcher.launched.lock().expect("lock").is_empty());
    }

    #[test]
    fn enable_registers_then_launches_with_same_code() {
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &PluginConfig::default());
        let (sink, mut rx) = result_channel();

        let EnableStart::Pending(code) = request_enable(&f.ctx, sink).expect("start") else {
            panic!("expected pending enable");
        };
        assert_eq!(f.ctx.coordinator().pending_id(), Some(code));
        assert_eq!(*f.launcher.launched.lock().expect("lock"), vec![code]);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        let requests = f.gate.requests.lock().expect("lock").clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, vec![Capability::BluetoothConnect]);
        assert_ne!(requests[0].0, code);
    }

    #[test]
    fn permission_answer_is_not_joined_into_enable() {
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &PluginConfig::default());
        let (sink, mut rx) = result_channel();
        request_enable(&f.ctx, sink).expect("start");

        let permission_code = f.gate.requests.lock().expect("lock")[0].0;
        assert!(matches!(
            f.ctx.coordinator().resolve(permission_code, true),
            ResolveOutcome::Mismatch { .. }
        ));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn enabled_adapter_answers_immediately() {
        let f = fixture(AdapterState::Enabled, RecordingLauncher::default(), &PluginConfig::default());
        let (sink, mut rx) = result_channel();

        assert_eq!(request_enable(&f.ctx, sink), Ok(EnableStart::AlreadyEnabled));
        assert_eq!(rx.try_recv().expect("reply"), MethodReply::success(true));
        assert!(f.launcher.launched.lock().expect("lock").is_empty());
        assert!(!f.ctx.coordinator().is_pending());
    }

    #[test]
    fn launch_failure_resolves_the_caller() {
        let launcher = RecordingLauncher {
            fail: true,
            ..RecordingLauncher::default()
        };
        let f = fixture(AdapterState::Disabled, launcher, &PluginConfig::default());
        let (sink, mut rx) = result_channel();

        request_enable(&f.ctx, sink).expect("start");
        match rx.try_recv().expect("reply") {
            MethodReply::Error(err) => assert_eq!(err.code, codes::ACTIVATION_FAILED),
            other => panic!("expected activation failure, got {other:?}"),
        }
        assert!(!f.ctx.coordinator().is_pending());
    }

    #[test]
    fn second_enable_fails_the_first_caller() {
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &PluginConfig::default());
        let (first, mut first_rx) = result_channel();
        let (second, _second_rx) = result_channel();

        request_enable(&f.ctx, first).expect("first");
        let EnableStart::Pending(code) = request_enable(&f.ctx, second).expect("second") else {
            panic!("expected pending enable");
        };

        match first_rx.try_recv().expect("displaced reply") {
            MethodReply::Error(err) => assert_eq!(err.code, codes::REQUEST_SUPERSEDED),
            other => panic!("expected superseded error, got {other:?}"),
        }
        assert_eq!(f.ctx.coordinator().pending_id(), Some(code));
    }

    #[test]
    fn is_available_reads_only_the_adapter() {
        let f = fixture(AdapterState::Absent, RecordingLauncher::default(), &PluginConfig::default());
        assert!(!is_available(&f.ctx));
        assert!(f.gate.requests.lock().expect("lock").is_empty());
        assert!(!f.ctx.coordinator().is_pending());

        let f = fixture(AdapterState::Enabling, RecordingLauncher::default(), &PluginConfig::default());
        assert!(is_available(&f.ctx));
    }

    #[test]
    fn is_enabled_requires_permissions() {
        let f = fixture(AdapterState::Enabled, RecordingLauncher::default(), &PluginConfig::default());
        assert_eq!(
            is_enabled(&f.ctx).expect_err("no permissions").code,
            codes::NO_PERMISSIONS
        );

        f.gate.held.store(true, Ordering::SeqCst);
        assert_eq!(is_enabled(&f.ctx), Ok(true));

        let f = fixture(AdapterState::Absent, RecordingLauncher::default(), &PluginConfig::default());
        assert_eq!(
            is_enabled(&f.ctx).expect_err("absent").code,
            codes::BLUETOOTH_UNAVAILABLE
        );
    }

    #[test]
    fn request_permissions_short_circuits_when_held() {
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &PluginConfig::default());
        f.gate.held.store(true, Ordering::SeqCst);
        let (sink, mut rx) = result_channel();

        assert_eq!(request_permissions(&f.ctx, sink), PermissionStart::AlreadyHeld);
        assert_eq!(rx.try_recv().expect("reply"), MethodReply::success(true));
        assert!(f.gate.requests.lock().expect("lock").is_empty());
    }

    #[test]
    fn request_permissions_waits_for_grant_result() {
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &PluginConfig::default());
        let (sink, mut rx) = result_channel();

        let PermissionStart::Pending(code) = request_permissions(&f.ctx, sink) else {
            panic!("expected pending permission request");
        };
        let requests = f.gate.requests.lock().expect("lock").clone();
        assert_eq!(requests, vec![(code, Capability::required_for(33).to_vec())]);

        assert_eq!(f.ctx.coordinator().resolve(code, false), ResolveOutcome::Resolved);
        assert_eq!(rx.try_recv().expect("reply"), MethodReply::success(false));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_timeout_fails_a_stalled_enable() {
        let mut config = PluginConfig::default();
        config.flow.enable_timeout_secs = Some(5);
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &config);
        let (sink, rx) = result_channel();

        request_enable(&f.ctx, sink).expect("start");
        let reply = rx.await.expect("timeout reply");
        match reply {
            MethodReply::Error(err) => assert_eq!(err.code, codes::REQUEST_TIMEOUT),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!f.ctx.coordinator().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_does_not_touch_a_newer_request() {
        let mut config = PluginConfig::default();
        config.flow.enable_timeout_secs = Some(5);
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &config);

        let (first, first_rx) = result_channel();
        let EnableStart::Pending(first_code) = request_enable(&f.ctx, first).expect("first") else {
            panic!("expected pending enable");
        };
        f.ctx.coordinator().resolve(first_code, true);
        assert_eq!(first_rx.await.expect("reply"), MethodReply::success(true));

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        let (second, mut second_rx) = result_channel();
        let EnableStart::Pending(second_code) = request_enable(&f.ctx, second).expect("second") else {
            panic!("expected pending enable");
        };

        // First timer fires at t=5s while the second request is pending.
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(matches!(second_rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(f.ctx.coordinator().pending_id(), Some(second_code));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_timeout_and_abandons_caller() {
        let mut config = PluginConfig::default();
        config.flow.enable_timeout_secs = Some(5);
        let f = fixture(AdapterState::Disabled, RecordingLauncher::default(), &config);
        let (sink, rx) = result_channel();

        request_enable(&f.ctx, sink).expect("start");
        f.ctx.teardown();
        assert!(rx.await.is_err());
    }
}
