//! Error types for the bluetooth-enable control surface.

/// Top-level error type for plugin plumbing.
///
/// Method-level failures that are reported back to a caller use
/// [`MethodError`](crate::reply::MethodError) instead; this type covers the
/// infrastructure around them.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Radio adapter reported a failure while changing power state.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// The external activation request could not be issued.
    #[error("launch error: {0}")]
    Launch(String),

    /// Host bridge protocol error.
    #[error("bridge error: {0}")]
    Bridge(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PluginError>;
