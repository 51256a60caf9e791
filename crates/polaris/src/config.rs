//! Configuration management for the Polaris game server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files. Command-line and environment overrides are applied by the
//! application before validation.

use game_server::{AuthConfig, ClientId, ServerConfig};
use plugin_system::PluginsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Log levels accepted in `[logging]` and on the command line.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from TOML file.
///
/// Every section is optional in the file; missing sections take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Plugin discovery settings
    pub plugins: PluginsConfig,
    /// Authenticated transport settings
    pub auth: AuthConfig,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Network binding and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the UDP socket to (e.g., "0.0.0.0:22023")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    pub max_connections: usize,
    /// Seconds of silence before a peer is dropped (0 disables the sweep)
    pub idle_timeout_secs: u64,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind_address: defaults.bind_address.to_string(),
            max_connections: defaults.max_connections,
            idle_timeout_secs: defaults.idle_timeout_secs,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating a default file if none exists.
    ///
    /// # Returns
    ///
    /// The parsed configuration, or an error if the file could not be read,
    /// parsed, or created.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a game server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            idle_timeout_secs: self.server.idle_timeout_secs,
            auth: self.auth.clone(),
        })
    }

    /// Validates the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.plugins.directory.as_os_str().is_empty() {
            return Err("Plugin directory cannot be empty".to_string());
        }

        if !self.plugins.suffix.starts_with('.') || self.plugins.suffix.len() < 2 {
            return Err(format!(
                "Plugin suffix must start with '.': {:?}",
                &self.plugins.suffix
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        let mut seen = HashSet::new();
        for user in &self.auth.users {
            let client_id = user
                .client_id
                .parse::<ClientId>()
                .map_err(|e| format!("Invalid client id for user {:?}: {e}", user.name))?;

            if user.token.is_empty() {
                return Err(format!("User {:?} has an empty token", user.name));
            }

            if !seen.insert(client_id) {
                return Err(format!("Duplicate client id: {}", client_id));
            }
        }

        Ok(())
    }
}
