//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Reads `InboundEnvelope` messages as newline-delimited JSON from stdin,
//! dispatches them through the host command channel, and writes
//! `ReplyEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use bluetooth_enable::config::PluginConfig;
use bluetooth_enable::host::channel::HostHandler;
use bluetooth_enable::host::handler::BridgeHandler;
use bluetooth_enable::host::stdio::run_stdio_bridge;
use bluetooth_enable::permissions::PermissionStore;
use std::path::PathBuf;

/// Environment variable that overrides the config file location.
const CONFIG_ENV: &str = "BLUETOOTH_ENABLE_CONFIG";

fn load_config() -> anyhow::Result<PluginConfig> {
    let path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(PluginConfig::default_config_path);

    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file; using defaults");
        return Ok(PluginConfig::default());
    }

    let config = PluginConfig::from_file(&path)
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("bluetooth-enable-host starting");

    let config = load_config()?;
    let (event_tx, _) = tokio::sync::broadcast::channel(config.bridge.event_capacity.max(1));
    let bridge = config.bridge.clone();

    let handler = BridgeHandler::new(config, PermissionStore::default().into_shared(), event_tx.clone());
    handler
        .attach()
        .map_err(|e| anyhow::anyhow!("initial attach failed: {e}"))?;

    run_stdio_bridge(handler, event_tx, &bridge)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "bluetooth-enable-host exited with error");
            anyhow::anyhow!("bluetooth-enable-host failed: {e}")
        })?;

    tracing::info!("bluetooth-enable-host shut down cleanly");
    Ok(())
}
