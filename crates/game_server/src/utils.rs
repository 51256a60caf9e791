//! Factory helpers for servers without plugins.

use crate::{config::ServerConfig, server::GameServer, server::ServerBuilder};
use std::sync::Arc;

/// Creates a server with default configuration and no plugins.
///
/// # Example
///
/// ```rust
/// use game_server::create_server;
///
/// let server = create_server();
/// assert_eq!(server.plugin_count(), 0);
/// ```
pub fn create_server() -> Arc<GameServer> {
    create_server_with_config(ServerConfig::default())
}

/// Creates a server with `config`, the passthrough transformer and the
/// exact-code lobby join hook.
///
/// # Example
///
/// ```rust
/// use game_server::{create_server_with_config, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "127.0.0.1:0".parse().unwrap(),
///     max_connections: 16,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config);
/// assert_eq!(server.config().max_connections, 16);
/// ```
pub fn create_server_with_config(config: ServerConfig) -> Arc<GameServer> {
    Arc::new(ServerBuilder::new(config).build())
}
