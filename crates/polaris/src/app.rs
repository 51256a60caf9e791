//! Main application logic and lifecycle management.
//!
//! Startup runs in a fixed order: signal handlers are installed, plugins are
//! loaded into the server builder (folder plugins, then packages), the
//! server is built and finally starts listening.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::display_banner;
use crate::shutdown::{ShutdownCoordinator, ShutdownStep};
use crate::signals::{ShutdownSignal, SignalListener};
use game_server::{GameServer, ServerBuilder};
use plugin_system::{LoadedPlugin, PluginCatalog, PluginManager};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Environment variable that, when present, disconnects peers sending
/// datagrams without an authentication envelope.
pub const KICK_UNAUTHENTICATED_ENV: &str = "POLARIS_KICK_UNAUTHENTICATED";

/// The plugins compiled into this binary, keyed by manifest entry name.
pub fn plugin_catalog() -> PluginCatalog {
    PluginCatalog::new().with(plugin_example::PLUGIN_KEY, plugin_example::create_plugin)
}

/// Applies command-line and environment overrides on top of the file config.
pub fn apply_overrides(config: &mut AppConfig, args: &CliArgs, kick_from_env: bool) {
    if let Some(plugin_dir) = &args.plugin_dir {
        config.plugins.directory = plugin_dir.clone();
    }

    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }

    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.to_ascii_lowercase();
    }

    if args.json_logs {
        config.logging.json_format = true;
    }

    if kick_from_env || args.kick_unauthenticated {
        config.auth.kick_unauthenticated = true;
    }
}

/// Owns the configured server from plugin loading to shutdown.
pub struct Application {
    /// Validated application configuration
    config: AppConfig,
    /// Game server instance
    server: Arc<GameServer>,
    /// Plugins registered on the server
    plugins: Vec<LoadedPlugin>,
    /// Signals received since startup
    signals: mpsc::UnboundedReceiver<ShutdownSignal>,
}

impl Application {
    /// Validates the configuration, loads plugins and builds the server.
    ///
    /// # Returns
    ///
    /// An `Application` ready to run, or the first configuration, signal
    /// registration or folder-plugin error.
    pub async fn new(config: AppConfig, catalog: PluginCatalog) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration validated");

        display_banner();

        let signals = forward_signals(SignalListener::new()?);

        let mut builder = ServerBuilder::new(config.to_server_config()?);
        let manager = PluginManager::new(catalog, config.plugins.clone());
        let plugins = manager.load_plugins(&mut builder).await?;
        let server = Arc::new(builder.build());

        Ok(Self {
            config,
            server,
            plugins,
            signals,
        })
    }

    pub fn server(&self) -> &Arc<GameServer> {
        &self.server
    }

    pub fn loaded_plugins(&self) -> &[LoadedPlugin] {
        &self.plugins
    }

    /// Starts listening and serves until shut down.
    ///
    /// # Returns
    ///
    /// The process exit status: the code of the signal that triggered the
    /// shutdown, or `0` when the signal source went away.
    pub async fn run(mut self) -> Result<i32, Box<dyn std::error::Error>> {
        let addr = self.server.listen().await?;
        info!("🚀 Server listening on {}", addr);
        self.log_configuration_summary();

        let coordinator = ShutdownCoordinator::new();
        Ok(drive_shutdown(&self.server, &coordinator, &mut self.signals).await)
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration summary:");
        info!("  - Max connections: {}", self.config.server.max_connections);
        info!("  - Idle timeout: {}s", self.config.server.idle_timeout_secs);
        info!("  - Plugin folder: {}", self.config.plugins.directory.display());
        info!(
            "  - Authenticated users: {} (kick unauthenticated: {})",
            self.config.auth.users.len(),
            self.config.auth.kick_unauthenticated
        );
        if self.plugins.is_empty() {
            info!("  - Plugins: none");
        } else {
            let names: Vec<String> = self.plugins.iter().map(ToString::to_string).collect();
            info!("  - Plugins: {}", names.join(", "));
        }
    }
}

/// Relays OS signals into a channel so every repeat is observed.
fn forward_signals(mut listener: SignalListener) -> mpsc::UnboundedReceiver<ShutdownSignal> {
    let (sender, receiver) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.recv().await {
                Ok(signal) => {
                    if sender.send(signal).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("❌ Signal listener failed: {}", e);
                    break;
                }
            }
        }
    });

    receiver
}

/// Waits for shutdown requests and closes the server.
///
/// Signals arriving while the close is in flight go through the
/// coordinator, which may abandon the close.
///
/// # Returns
///
/// The exit status for the process.
pub async fn drive_shutdown(
    server: &GameServer,
    coordinator: &ShutdownCoordinator,
    signals: &mut mpsc::UnboundedReceiver<ShutdownSignal>,
) -> i32 {
    loop {
        let (signal, exit_code) = match signals.recv().await {
            Some(signal) => (Some(signal), signal.exit_code()),
            None => (None, 0),
        };
        if let Some(signal) = signal {
            info!("📡 Received {}", signal);
        }

        match coordinator.request(exit_code) {
            ShutdownStep::Close { exit_code } => {
                let close = server.close();
                tokio::pin!(close);

                loop {
                    tokio::select! {
                        _ = &mut close => return exit_code,
                        Some(signal) = signals.recv() => {
                            info!("📡 Received {} while closing", signal);
                            if let ShutdownStep::ForceExit(code) = coordinator.request(signal.exit_code()) {
                                return code;
                            }
                        }
                    }
                }
            }
            ShutdownStep::ForceExit(code) => return code,
            ShutdownStep::Ignore => {
                if signal.is_none() {
                    return exit_code;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_server::ServerConfig;
    use std::path::PathBuf;

    fn server() -> GameServer {
        ServerBuilder::new(ServerConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        })
        .build()
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config_path: PathBuf::from("config.toml"),
            plugin_dir: Some(PathBuf::from("/srv/plugins")),
            bind_address: Some("127.0.0.1:22024".to_string()),
            log_level: Some("DEBUG".to_string()),
            json_logs: true,
            kick_unauthenticated: false,
        };

        apply_overrides(&mut config, &args, false);
        assert_eq!(config.plugins.directory, PathBuf::from("/srv/plugins"));
        assert_eq!(config.server.bind_address, "127.0.0.1:22024");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert!(!config.auth.kick_unauthenticated);

        apply_overrides(&mut config, &args, true);
        assert!(config.auth.kick_unauthenticated);
    }

    #[test]
    fn test_kick_flag_override() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            kick_unauthenticated: true,
            ..Default::default()
        };

        apply_overrides(&mut config, &args, false);
        assert!(config.auth.kick_unauthenticated);
        assert_eq!(config.server.bind_address, "0.0.0.0:22023");
    }

    #[test]
    fn test_catalog_contains_example_plugin() {
        assert!(plugin_catalog().contains(plugin_example::PLUGIN_KEY));
    }

    #[tokio::test]
    async fn test_signal_closes_server_with_its_code() {
        let server = server();
        let coordinator = ShutdownCoordinator::new();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        sender.send(ShutdownSignal::Terminate).unwrap();

        assert_eq!(drive_shutdown(&server, &coordinator, &mut receiver).await, 15);
        assert!(server.is_closed());
        assert_eq!(coordinator.requests(), 1);
    }

    #[tokio::test]
    async fn test_closed_signal_source_exits_cleanly() {
        let server = server();
        let coordinator = ShutdownCoordinator::new();
        let (sender, mut receiver) = mpsc::unbounded_channel::<ShutdownSignal>();
        drop(sender);

        assert_eq!(drive_shutdown(&server, &coordinator, &mut receiver).await, 0);
        assert!(server.is_closed());
    }

    #[tokio::test]
    async fn test_application_loads_folder_plugin() {
        let dir = tempfile::TempDir::new().unwrap();
        let plugin = dir.path().join("plugins").join("example.npplugin");
        std::fs::create_dir_all(&plugin).unwrap();
        std::fs::write(
            plugin.join("index.toml"),
            format!("entry = \"{}\"", plugin_example::PLUGIN_KEY),
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.server.bind_address = "127.0.0.1:0".to_string();
        config.plugins.directory = dir.path().join("plugins");
        config.plugins.package_manifest = dir.path().join("Cargo.toml");

        let app = Application::new(config, plugin_catalog()).await.unwrap();
        assert_eq!(app.loaded_plugins().len(), 1);
        assert_eq!(app.server().plugin_count(), 1);
        assert_eq!(app.server().registries().total_registered(), 3);
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();

        assert!(Application::new(config, plugin_catalog()).await.is_err());
    }
}
