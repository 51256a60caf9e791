//! # Polaris Game Server
//!
//! Entry point wiring for the Polaris UDP game server: CLI parsing,
//! configuration loading, logging, plugin bootstrap and graceful shutdown.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (creates config.toml if missing)
//! polaris
//!
//! # Override specific settings
//! polaris --bind 0.0.0.0:22023 --plugins ./plugins --log-level debug
//!
//! # Disconnect clients that do not sign their datagrams
//! POLARIS_KICK_UNAUTHENTICATED=1 polaris
//! ```
//!
//! ## Signal Handling
//!
//! The first SIGINT or SIGTERM closes the server and exits with status 2 or
//! 15. A second signal while closing is ignored; a third exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod shutdown;
pub mod signals;

use app::{apply_overrides, plugin_catalog, Application, KICK_UNAUTHENTICATED_ENV};
use cli::CliArgs;
use config::AppConfig;

pub use config::{LoggingSettings, ServerSettings};

/// Runs the server until it is shut down.
///
/// # Returns
///
/// The process exit status: `0` for a clean exit, the signal's code after a
/// signal-triggered shutdown and `1` for any startup failure.
pub async fn init() -> i32 {
    let args = CliArgs::parse();

    let loaded = AppConfig::load_from_file(&args.config_path).await;
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => AppConfig::default(),
    };
    let kick_from_env = std::env::var_os(KICK_UNAUTHENTICATED_ENV).is_some();
    apply_overrides(&mut config, &args, kick_from_env);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        return 1;
    }
    install_panic_hook();

    if let Err(e) = loaded {
        error!("❌ Failed to load configuration from {}: {}", args.config_path.display(), e);
        return 1;
    }

    match Application::new(config, plugin_catalog()).await {
        Ok(app) => match app.run().await {
            Ok(code) => code,
            Err(e) => {
                error!("❌ Application error: {}", e);
                1
            }
        },
        Err(e) => {
            error!("❌ Failed to start application: {}", e);
            1
        }
    }
}

/// Routes panics through the logger and terminates with status 1.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!("💥 Uncaught panic: {}", info);
        std::process::exit(1);
    }));
}
