//! Capability model and the gate that checks and requests it.
//!
//! Each platform permission the radio flow can need is a [`Capability`].
//! Which set is required depends on the platform API level: newer platforms
//! split the old admin permission into scan/connect/advertise.
//!
//! ## Live permission store
//!
//! [`SharedPermissionStore`] is an `Arc<Mutex<PermissionStore>>` shared
//! between the gate that answers `holds` checks and the callback path that
//! records the platform's grant results.

use crate::coordinator::RequestCode;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// First API level that uses the split capability set.
pub const SPLIT_CAPABILITY_API_LEVEL: u32 = 31;

/// A platform permission the radio flow may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    BluetoothScan,
    /// Required to change adapter power state on split-capability platforms.
    BluetoothConnect,
    BluetoothAdvertise,
    /// Legacy umbrella permission.
    Bluetooth,
    /// Legacy admin permission for power changes.
    BluetoothAdmin,
    /// Legacy platforms gate discovery behind fine location.
    AccessFineLocation,
}

const SPLIT_CAPABILITIES: &[Capability] = &[
    Capability::BluetoothScan,
    Capability::BluetoothConnect,
    Capability::BluetoothAdvertise,
];

const LEGACY_CAPABILITIES: &[Capability] = &[
    Capability::Bluetooth,
    Capability::BluetoothAdmin,
    Capability::AccessFineLocation,
];

impl Capability {
    /// Capability set the platform requires before the adapter may be used.
    pub fn required_for(api_level: u32) -> &'static [Capability] {
        if api_level >= SPLIT_CAPABILITY_API_LEVEL {
            SPLIT_CAPABILITIES
        } else {
            LEGACY_CAPABILITIES
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BluetoothScan => "bluetooth_scan",
            Self::BluetoothConnect => "bluetooth_connect",
            Self::BluetoothAdvertise => "bluetooth_advertise",
            Self::Bluetooth => "bluetooth",
            Self::BluetoothAdmin => "bluetooth_admin",
            Self::AccessFineLocation => "access_fine_location",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a platform grant result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub capability: Capability,
    pub granted: bool,
}

impl CapabilityGrant {
    /// A grant result counts as success only if it is non-empty and every
    /// entry was granted.
    pub fn all_granted(grants: &[CapabilityGrant]) -> bool {
        !grants.is_empty() && grants.iter().all(|g| g.granted)
    }
}

/// Thread-safe, live-view permission store.
pub type SharedPermissionStore = Arc<Mutex<PermissionStore>>;

/// Last known grant state per capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionStore {
    #[serde(default)]
    grants: Vec<CapabilityGrant>,
}

impl PermissionStore {
    #[must_use]
    pub fn into_shared(self) -> SharedPermissionStore {
        Arc::new(Mutex::new(self))
    }

    /// Set the grant state for one capability, replacing any previous record.
    pub fn record(&mut self, grant: CapabilityGrant) {
        match self
            .grants
            .iter_mut()
            .find(|g| g.capability == grant.capability)
        {
            Some(existing) => existing.granted = grant.granted,
            None => self.grants.push(grant),
        }
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.grants
            .iter()
            .any(|g| g.capability == capability && g.granted)
    }

    /// Whether every capability in `required` is granted.
    pub fn holds_all(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.is_granted(*c))
    }

    pub fn all_granted(&self) -> Vec<Capability> {
        self.grants
            .iter()
            .filter(|g| g.granted)
            .map(|g| g.capability)
            .collect()
    }
}

/// Checks and requests platform capabilities.
///
/// `request` is fire-and-forget: the platform answers later through the
/// permission-result callback tagged with the same [`RequestCode`].
pub trait PermissionGate: Send + Sync + 'static {
    /// Whether every capability in `capabilities` is currently held.
    fn holds(&self, capabilities: &[Capability]) -> bool;

    /// Ask the platform to prompt for `capabilities`.
    fn request(&self, request_id: RequestCode, capabilities: &[Capability]) -> Result<()>;

    /// Record a grant result delivered by the platform.
    fn record_results(&self, _grants: &[CapabilityGrant]) {}
}
