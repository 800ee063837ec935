//! Entry point for the platform's asynchronous answers.
//!
//! Completions arrive on whatever thread the platform uses for callbacks.
//! Nothing here returns an error or panics: a completion with no matching
//! request has no caller left to notify, so it is logged and reported as a
//! [`ResolveOutcome`] only.

use crate::context::ActivityContext;
use crate::coordinator::{RequestCode, RequestCoordinator, ResolveOutcome};
use crate::permissions::{CapabilityGrant, PermissionGate};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Platform result code for an accepted prompt.
pub const RESULT_OK: i32 = -1;

/// Outcome of the activation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationResult {
    Accepted,
    /// Declined or cancelled by the user.
    Declined,
}

impl ActivationResult {
    /// Map a raw platform result code; anything but [`RESULT_OK`] is a decline.
    pub fn from_result_code(code: i32) -> Self {
        if code == RESULT_OK {
            Self::Accepted
        } else {
            Self::Declined
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// Routes completions to the coordinator of one context.
pub struct CompletionDispatcher<'a> {
    coordinator: &'a RequestCoordinator,
    gate: &'a dyn PermissionGate,
}

impl<'a> CompletionDispatcher<'a> {
    pub fn new(coordinator: &'a RequestCoordinator, gate: &'a dyn PermissionGate) -> Self {
        Self { coordinator, gate }
    }

    pub fn for_context(ctx: &'a ActivityContext) -> Self {
        Self::new(ctx.coordinator(), ctx.gate())
    }

    /// The activation prompt finished.
    pub fn on_activation_result(
        &self,
        request_id: RequestCode,
        result: ActivationResult,
    ) -> ResolveOutcome {
        info!(request_code = %request_id, ?result, "activation result received");
        self.coordinator.resolve(request_id, result.is_accepted())
    }

    /// The permission prompt finished.
    ///
    /// Grants are recorded with the gate whether or not a request is
    /// waiting on them.
    pub fn on_permissions_result(
        &self,
        request_id: RequestCode,
        grants: &[CapabilityGrant],
    ) -> ResolveOutcome {
        let granted = CapabilityGrant::all_granted(grants);
        info!(request_code = %request_id, granted, entries = grants.len(), "permission result received");
        self.gate.record_results(grants);
        self.coordinator.resolve(request_id, granted)
    }
}
