//! Configuration types for the enable control surface and its host bridge.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Enable-flow timing.
    pub flow: FlowConfig,
    /// Platform traits that select the required capability set.
    pub platform: PlatformConfig,
    /// Simulated adapter used by the headless host bridge.
    pub adapter: AdapterConfig,
    /// Host bridge channel sizing.
    pub bridge: BridgeConfig,
}

/// Timing for the asynchronous and synchronous enable paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Resolve a pending enable request with `request_timeout` after this many
    /// seconds. `None` waits indefinitely.
    pub enable_timeout_secs: Option<u64>,
    /// Settle interval between disable and enable in `customEnable`.
    pub settle_delay_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            enable_timeout_secs: None,
            settle_delay_ms: 500,
        }
    }
}

impl FlowConfig {
    /// Enable timeout as a [`Duration`], ignoring a zero value.
    pub fn enable_timeout(&self) -> Option<Duration> {
        self.enable_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Platform description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Platform API level. Levels 31 and above use the split
    /// scan/connect/advertise capabilities.
    pub api_level: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self { api_level: 33 }
    }
}

/// Initial state of the simulated adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Whether the device has a radio adapter at all.
    pub present: bool,
    /// Whether the adapter starts powered on.
    pub initially_enabled: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            present: true,
            initially_enabled: false,
        }
    }
}

/// Channel capacities for the host bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub request_capacity: usize,
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
        }
    }
}

impl PluginConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::PluginError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PluginError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/bluetooth-enable/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("bluetooth-enable")
            .join("config.toml")
    }
}
