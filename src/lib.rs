//! bluetooth-enable: a control surface for powering on a device's radio
//! adapter on behalf of a calling application.
//!
//! # Architecture
//!
//! A host delivers method calls one at a time; the platform answers its
//! consent prompts later, on an independent callback path:
//! - **Plugin**: dispatches method calls and owns the attached context
//! - **EnableFlow**: checks the adapter, fires the capability request,
//!   registers the caller and launches the activation prompt
//! - **RequestCoordinator**: the single mutex-guarded pending-request slot
//! - **CompletionDispatcher**: correlates platform callbacks back to the slot
//! - **SyncToggle**: the blocking disable/settle/enable fallback
//! - **Host bridge**: newline-delimited JSON over stdin/stdout

pub mod adapter;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod flow;
pub mod host;
pub mod permissions;
pub mod plugin;
pub mod reply;
pub mod toggle;

pub use adapter::{AdapterState, RadioAdapter};
pub use config::PluginConfig;
pub use context::{ActivationLauncher, ActivityContext};
pub use coordinator::{RegisterOutcome, RequestCode, RequestCoordinator, ResolveOutcome};
pub use dispatcher::{ActivationResult, CompletionDispatcher};
pub use error::{PluginError, Result};
pub use permissions::{Capability, CapabilityGrant, PermissionGate};
pub use plugin::{BluetoothEnablePlugin, MethodName, Routed};
pub use reply::{MethodError, MethodReply, ResultSink};
