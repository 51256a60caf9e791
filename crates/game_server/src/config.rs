//! Server configuration types and defaults.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default UDP port of the game protocol.
pub const DEFAULT_PORT: u16 = 22023;

/// Default first byte of an authenticated envelope.
pub const DEFAULT_AUTH_MARKER: u8 = 0x69;

/// Default seconds of silence after which a peer is dropped.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Configuration for the game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the UDP socket to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections; datagrams from new peers
    /// beyond this are dropped
    pub max_connections: usize,

    /// Seconds without a datagram before a connection is dropped; `0`
    /// disables the idle sweep
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Authenticated transport settings
    pub auth: AuthConfig,
}

/// Settings for the authenticated transport preprocessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// First byte that marks a datagram as an authenticated envelope
    pub marker: u8,

    /// Disconnect connections that send datagrams without the marker.
    /// When false, such datagrams pass through to dispatch unchanged.
    pub kick_unauthenticated: bool,

    /// Users allowed to authenticate
    pub users: Vec<UserConfig>,
}

/// One `[[auth.users]]` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    /// 16-byte client id as 32 hex digits
    pub client_id: String,

    /// Shared signing secret
    pub token: String,

    /// Display name
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The idle timeout, or `None` when the sweep is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_AUTH_MARKER,
            kick_unauthenticated: false,
            users: Vec::new(),
        }
    }
}
