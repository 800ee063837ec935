//! Versioned envelopes for the newline-delimited JSON host protocol.

use crate::coordinator::RequestCode;
use crate::permissions::CapabilityGrant;
use crate::reply::{MethodError, MethodReply};
use serde::{Deserialize, Serialize};

/// Contract version for host envelopes.
pub const PROTOCOL_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

/// A method call from the host shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCallEnvelope {
    #[serde(default = "default_version")]
    pub v: u32,
    pub request_id: String,
    pub method: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl MethodCallEnvelope {
    /// Build a v1 call envelope.
    #[must_use]
    pub fn new(request_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            method: method.into(),
            args: serde_json::Value::Null,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != PROTOCOL_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, PROTOCOL_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Everything the host shell can send, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEnvelope {
    Call(MethodCallEnvelope),
    /// The host activity became available.
    Attach,
    /// The host activity is going away.
    Detach,
    /// The activation prompt finished. `result_code` is the platform's raw
    /// code (`-1` = accepted).
    ActivityResult {
        request_code: RequestCode,
        result_code: i32,
    },
    /// The permission prompt finished.
    PermissionsResult {
        request_code: RequestCode,
        #[serde(default)]
        grants: Vec<CapabilityGrant>,
    },
}

/// Discriminant of a [`ReplyEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    Error,
    NotImplemented,
}

/// The answer to one [`MethodCallEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub v: u32,
    pub request_id: String,
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MethodError>,
}

impl ReplyEnvelope {
    #[must_use]
    pub fn from_reply(request_id: impl Into<String>, reply: MethodReply) -> Self {
        let (status, result, error) = match reply {
            MethodReply::Success(value) => (ReplyStatus::Success, Some(value), None),
            MethodReply::Error(err) => (ReplyStatus::Error, None, Some(err)),
            MethodReply::NotImplemented => (ReplyStatus::NotImplemented, None, None),
        };
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            status,
            result,
            error,
        }
    }

    /// Build an error reply that is not tied to a method outcome (parse
    /// failures, invalid envelopes).
    #[must_use]
    pub fn error(request_id: impl Into<String>, err: MethodError) -> Self {
        Self::from_reply(request_id, MethodReply::Error(err))
    }

    #[must_use]
    pub fn into_reply(self) -> MethodReply {
        match self.status {
            ReplyStatus::Success => {
                MethodReply::Success(self.result.unwrap_or(serde_json::Value::Null))
            }
            ReplyStatus::Error => MethodReply::Error(self.error.unwrap_or_else(|| {
                MethodError::new("unknown_error", "error reply without details")
            })),
            ReplyStatus::NotImplemented => MethodReply::NotImplemented,
        }
    }
}

/// A versioned event envelope from bridge -> host shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
