//! Method results and the exactly-once channel that carries them.
//!
//! Every method call ends in exactly one [`MethodReply`]. Synchronous
//! methods produce it inline; asynchronous ones hand a [`ResultSink`] to the
//! [`RequestCoordinator`](crate::coordinator::RequestCoordinator) and the
//! reply is written when the platform answers.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Machine-readable error codes carried by [`MethodError`].
pub mod codes {
    /// The device has no radio adapter.
    pub const BLUETOOTH_UNAVAILABLE: &str = "bluetooth_unavailable";
    /// No host context is attached.
    pub const NO_ACTIVITY: &str = "no_activity";
    /// The required capability set is not held.
    pub const NO_PERMISSIONS: &str = "no_permissions";
    /// A newer request displaced this one from the pending slot.
    pub const REQUEST_SUPERSEDED: &str = "request_superseded";
    /// The platform did not answer within the configured timeout.
    pub const REQUEST_TIMEOUT: &str = "request_timeout";
    /// The activation request could not be started.
    pub const ACTIVATION_FAILED: &str = "activation_failed";
    /// The owning context was torn down before the request completed.
    pub const REQUEST_ABANDONED: &str = "request_abandoned";
}

/// Error result: short code, human-readable message and optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl MethodError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(
            codes::BLUETOOTH_UNAVAILABLE,
            "the device does not have bluetooth",
        )
    }

    #[must_use]
    pub fn no_activity() -> Self {
        Self::new(codes::NO_ACTIVITY, "plugin not attached to an activity")
    }

    #[must_use]
    pub fn no_permissions() -> Self {
        Self::new(codes::NO_PERMISSIONS, "bluetooth permissions not granted")
    }

    #[must_use]
    pub fn superseded() -> Self {
        Self::new(
            codes::REQUEST_SUPERSEDED,
            "request replaced by a newer pending request",
        )
    }

    #[must_use]
    pub fn timed_out() -> Self {
        Self::new(
            codes::REQUEST_TIMEOUT,
            "no activation result before the timeout elapsed",
        )
    }

    #[must_use]
    pub fn activation_failed(reason: impl Into<String>) -> Self {
        Self::new(codes::ACTIVATION_FAILED, "failed to start activation")
            .with_details(serde_json::Value::String(reason.into()))
    }

    #[must_use]
    pub fn abandoned() -> Self {
        Self::new(
            codes::REQUEST_ABANDONED,
            "request abandoned before a result arrived",
        )
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for MethodError {}

/// Final outcome of one method call.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodReply {
    Success(serde_json::Value),
    Error(MethodError),
    /// The method name is not recognised.
    NotImplemented,
}

impl MethodReply {
    #[must_use]
    pub fn success(value: impl Into<serde_json::Value>) -> Self {
        Self::Success(value.into())
    }
}

impl From<MethodError> for MethodReply {
    fn from(err: MethodError) -> Self {
        Self::Error(err)
    }
}

/// Receiving half of a [`ResultSink`].
///
/// A `RecvError` means the sink was dropped unresolved: the request was
/// abandoned.
pub type ReplyReceiver = oneshot::Receiver<MethodReply>;

/// Exactly-once completion channel for one caller.
///
/// Every write consumes the sink. Each method returns `true` if the reply
/// reached a receiver that is still listening.
#[derive(Debug)]
pub struct ResultSink {
    respond_to: oneshot::Sender<MethodReply>,
}

/// Create a connected sink/receiver pair.
#[must_use]
pub fn result_channel() -> (ResultSink, ReplyReceiver) {
    let (respond_to, rx) = oneshot::channel();
    (ResultSink { respond_to }, rx)
}

impl ResultSink {
    pub fn reply(self, reply: MethodReply) -> bool {
        self.respond_to.send(reply).is_ok()
    }

    pub fn success(self, value: impl Into<serde_json::Value>) -> bool {
        self.reply(MethodReply::success(value))
    }

    pub fn error(self, err: MethodError) -> bool {
        self.reply(MethodReply::Error(err))
    }

    pub fn not_implemented(self) -> bool {
        self.reply(MethodReply::NotImplemented)
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.respond_to.is_closed()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use tokio::sync::oneshot::error::TryRecvError;

    #[test]
    fn sink_delivers_success_once() {
        let (sink, mut rx) = result_channel();
        assert!(sink.success(true));
        assert_eq!(rx.try_recv().expect("reply"), MethodReply::success(true));
    }

    #[test]
    fn dropped_sink_reads_as_closed() {
        let (sink, mut rx) = result_channel();
        drop(sink);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    }

    #[test]
    fn write_to_dropped_receiver_reports_false() {
        let (sink, rx) = result_channel();
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.error(MethodError::unavailable()));
    }

    #[test]
    fn error_shape_omits_empty_details() {
        let json = serde_json::to_value(MethodError::unavailable()).expect("serialize");
        assert_eq!(json["code"], codes::BLUETOOTH_UNAVAILABLE);
        assert!(json.get("details").is_none());

        let json = serde_json::to_value(MethodError::activation_failed("no ui")).expect("serialize");
        assert_eq!(json["details"], "no ui");
    }
}
