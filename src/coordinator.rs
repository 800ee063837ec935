//! Single-slot store for the one request awaiting an asynchronous result.
//!
//! The platform answers activation and permission prompts through callbacks
//! that are not sequenced with the thread that issued the request. The
//! coordinator is the only place that correlates the two: a request is
//! [`register`](RequestCoordinator::register)ed under a [`RequestCode`]
//! before the prompt is shown, and the callback
//! [`resolve`](RequestCoordinator::resolve)s it by the same code.
//!
//! ## Invariants
//!
//! - At most one [`PendingRequest`] exists at any instant.
//! - A registered sink is written at most once. Displacing a pending request
//!   fails its sink with `request_superseded` before the new one is
//!   installed, so no caller is left waiting on a sink nobody owns.
//! - A resolve for an unknown or stale code is inert.

use crate::reply::{MethodError, MethodReply, ResultSink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Opaque correlation token linking an external request to its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestCode(pub u32);

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit of in-flight asynchronous work.
#[derive(Debug)]
pub struct PendingRequest {
    /// `None` matches any completion.
    request_id: Option<RequestCode>,
    sink: ResultSink,
}

impl PendingRequest {
    fn matches(&self, request_id: RequestCode) -> bool {
        self.request_id.is_none_or(|pending| pending == request_id)
    }
}

/// Result of [`RequestCoordinator::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The slot was empty.
    Registered,
    /// A pending request was displaced; its sink was failed.
    Replaced { previous: Option<RequestCode> },
}

/// Result of [`RequestCoordinator::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The pending request's sink was written and the slot cleared.
    Resolved,
    /// Nothing was pending: a lost or duplicate callback.
    NoPendingRequest,
    /// A different request is pending; it was left untouched.
    Mismatch { pending: RequestCode },
}

/// Mutex-guarded single pending-request slot.
///
/// One coordinator belongs to one attached context and is shared between the
/// method-call path and the completion callback path.
#[derive(Debug, Default)]
pub struct RequestCoordinator {
    slot: Mutex<Option<PendingRequest>>,
}

impl RequestCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        // The slot holds no invariants a panicking writer could break halfway.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install `sink` as the sole outstanding request.
    pub fn register(&self, request_id: Option<RequestCode>, sink: ResultSink) -> RegisterOutcome {
        let mut slot = self.lock_slot();
        let outcome = match slot.take() {
            None => RegisterOutcome::Registered,
            Some(previous) => {
                warn!(
                    previous = ?previous.request_id,
                    next = ?request_id,
                    "pending request displaced; failing its caller"
                );
                if !previous.sink.error(MethodError::superseded()) {
                    debug!(previous = ?previous.request_id, "displaced caller already gone");
                }
                RegisterOutcome::Replaced {
                    previous: previous.request_id,
                }
            }
        };
        *slot = Some(PendingRequest { request_id, sink });
        debug!(request_code = ?request_id, "pending request registered");
        outcome
    }

    /// Deliver a boolean outcome to the request registered under `request_id`.
    pub fn resolve(&self, request_id: RequestCode, outcome: bool) -> ResolveOutcome {
        self.resolve_with(request_id, MethodReply::success(outcome))
    }

    /// Deliver an arbitrary reply to the request registered under `request_id`.
    pub fn resolve_with(&self, request_id: RequestCode, reply: MethodReply) -> ResolveOutcome {
        let mut slot = self.lock_slot();
        match slot.as_ref().map(|p| (p.matches(request_id), p.request_id)) {
            None => {
                info!(request_code = %request_id, "completion arrived with no pending request");
                return ResolveOutcome::NoPendingRequest;
            }
            Some((false, pending)) => {
                let pending = pending.unwrap_or(request_id);
                warn!(
                    request_code = %request_id,
                    %pending,
                    "completion does not match the pending request; ignoring"
                );
                return ResolveOutcome::Mismatch { pending };
            }
            Some((true, _)) => {}
        }
        let pending = slot.take();
        drop(slot);

        if let Some(pending) = pending {
            if pending.sink.reply(reply) {
                debug!(request_code = %request_id, "pending request resolved");
            } else {
                warn!(request_code = %request_id, "caller stopped listening before the result arrived");
            }
        }
        ResolveOutcome::Resolved
    }

    /// Empty the slot without writing the sink.
    ///
    /// Returns `true` if a request was abandoned. Its receiver observes the
    /// dropped sink as a closed channel.
    pub fn clear(&self) -> bool {
        let abandoned = self.lock_slot().take();
        match abandoned {
            Some(pending) => {
                info!(request_code = ?pending.request_id, "pending request abandoned on teardown");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Code of the pending request, if one is pending and correlated.
    pub fn pending_id(&self) -> Option<RequestCode> {
        self.lock_slot().as_ref().and_then(|p| p.request_id)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::reply::{codes, result_channel};
    use std::sync::Arc;
    use tokio::sync::oneshot::error::TryRecvError;

    const FIRST: RequestCode = RequestCode(1);
    const SECOND: RequestCode = RequestCode(2);

    #[test]
    fn matching_resolve_delivers_once_and_empties_slot() {
        let coordinator = RequestCoordinator::new();
        let (sink, mut rx) = result_channel();

        assert_eq!(
            coordinator.register(Some(FIRST), sink),
            RegisterOutcome::Registered
        );
        assert_eq!(coordinator.pending_id(), Some(FIRST));

        assert_eq!(coordinator.resolve(FIRST, true), ResolveOutcome::Resolved);
        assert!(!coordinator.is_pending());
        assert_eq!(rx.try_recv().expect("reply"), MethodReply::success(true));

        assert_eq!(
            coordinator.resolve(FIRST, false),
            ResolveOutcome::NoPendingRequest
        );
    }

    #[test]
    fn resolve_on_empty_slot_is_inert() {
        let coordinator = RequestCoordinator::new();
        assert_eq!(
            coordinator.resolve(FIRST, true),
            ResolveOutcome::NoPendingRequest
        );
        assert!(!coordinator.is_pending());
    }

    #[test]
    fn mismatched_resolve_keeps_pending_request() {
        let coordinator = RequestCoordinator::new();
        let (sink, mut rx) = result_channel();
        coordinator.register(Some(FIRST), sink);

        assert_eq!(
            coordinator.resolve(SECOND, true),
            ResolveOutcome::Mismatch { pending: FIRST }
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(coordinator.pending_id(), Some(FIRST));

        assert_eq!(coordinator.resolve(FIRST, false), ResolveOutcome::Resolved);
        assert_eq!(rx.try_recv().expect("reply"), MethodReply::success(false));
    }

    #[test]
    fn uncorrelated_request_matches_any_code() {
        let coordinator = RequestCoordinator::new();
        let (sink, mut rx) = result_channel();
        coordinator.register(None, sink);
        assert!(coordinator.is_pending());
        assert_eq!(coordinator.pending_id(), None);

        assert_eq!(coordinator.resolve(RequestCode(77), true), ResolveOutcome::Resolved);
        assert_eq!(rx.try_recv().expect("reply"), MethodReply::success(true));
    }

    #[test]
    fn displaced_request_is_failed_before_replacement() {
        let coordinator = RequestCoordinator::new();
        let (first_sink, mut first_rx) = result_channel();
        let (second_sink, mut second_rx) = result_channel();

        coordinator.register(Some(FIRST), first_sink);
        assert_eq!(
            coordinator.register(Some(SECOND), second_sink),
            RegisterOutcome::Replaced {
                previous: Some(FIRST)
            }
        );

        match first_rx.try_recv().expect("displaced reply") {
            MethodReply::Error(err) => assert_eq!(err.code, codes::REQUEST_SUPERSEDED),
            other => panic!("expected superseded error, got {other:?}"),
        }

        assert_eq!(
            coordinator.resolve(FIRST, true),
            ResolveOutcome::Mismatch { pending: SECOND }
        );
        assert_eq!(coordinator.resolve(SECOND, true), ResolveOutcome::Resolved);
        assert_eq!(second_rx.try_recv().expect("reply"), MethodReply::success(true));
    }

    #[test]
    fn clear_abandons_without_resolving() {
        let coordinator = RequestCoordinator::new();
        let (sink, mut rx) = result_channel();
        coordinator.register(Some(FIRST), sink);

        assert!(coordinator.clear());
        assert!(!coordinator.clear());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
        assert_eq!(
            coordinator.resolve(FIRST, true),
            ResolveOutcome::NoPendingRequest
        );
    }

    #[test]
    fn resolve_after_caller_left_still_clears_slot() {
        let coordinator = RequestCoordinator::new();
        let (sink, rx) = result_channel();
        coordinator.register(Some(FIRST), sink);
        drop(rx);

        assert_eq!(coordinator.resolve(FIRST, true), ResolveOutcome::Resolved);
        assert!(!coordinator.is_pending());
    }

    #[test]
    fn resolve_from_another_thread() {
        let coordinator = Arc::new(RequestCoordinator::new());
        let (sink, rx) = result_channel();
        coordinator.register(Some(FIRST), sink);

        let remote = Arc::clone(&coordinator);
        let outcome = std::thread::spawn(move || remote.resolve(FIRST, true))
            .join()
            .expect("callback thread");

        assert_eq!(outcome, ResolveOutcome::Resolved);
        assert_eq!(rx.blocking_recv().expect("reply"), MethodReply::success(true));
    }

    #[test]
    fn concurrent_duplicate_callbacks_resolve_exactly_once() {
        let coordinator = Arc::new(RequestCoordinator::new());
        let (sink, rx) = result_channel();
        coordinator.register(Some(FIRST), sink);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let remote = Arc::clone(&coordinator);
                std::thread::spawn(move || remote.resolve(FIRST, i % 2 == 0))
            })
            .collect();
        let resolved = handles
            .into_iter()
            .map(|h| h.join().expect("callback thread"))
            .filter(|outcome| *outcome == ResolveOutcome::Resolved)
            .count();

        assert_eq!(resolved, 1);
        assert!(matches!(rx.blocking_recv(), Ok(MethodReply::Success(_))));
    }
}
