//! Error types for the game server.

use polaris_protocol::RegistryError;

/// Server failures outside the per-packet path.
///
/// Per-packet problems (malformed frames, failed authentication) never
/// surface here; they end in a dropped packet or a disconnected connection.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket binding or I/O failures
    #[error("Network error: {0}")]
    Network(String),

    /// Plugin registration or event system failures
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
