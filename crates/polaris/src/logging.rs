//! Logging system setup and configuration.
//!
//! This module handles the initialization of the tracing-based logging
//! system with support for both human-readable and JSON output formats.
//!
//! The level comes from the first of these that is set:
//!
//! 1. `RUST_LOG` (full `EnvFilter` directives)
//! 2. `POLARIS_LOG_LEVEL` (ignored unless it names a valid level)
//! 3. `--log-level`
//! 4. `[logging] level`

use crate::config::{LoggingSettings, VALID_LOG_LEVELS};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable overriding the configured log level.
pub const LOG_LEVEL_ENV: &str = "POLARIS_LOG_LEVEL";

/// Picks the effective level from the environment override and the
/// configured level (already merged with the CLI).
pub fn resolve_level(configured: &str, env_override: Option<&str>) -> String {
    match env_override.map(str::trim).map(str::to_ascii_lowercase) {
        Some(level) if VALID_LOG_LEVELS.contains(&level.as_str()) => level,
        _ => configured.to_string(),
    }
}

/// Initializes the logging system with the specified configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration with CLI overrides applied
/// * `json_format` - Whether to force JSON output format (CLI override)
///
/// # Returns
///
/// `Ok(())` if logging was set up successfully, or an error if a global
/// subscriber was already installed.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_level = std::env::var(LOG_LEVEL_ENV).ok();
    let log_level = resolve_level(&config.level, env_level.as_deref());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer()
                .json()
                .with_file(false)
                .with_line_number(false)
                .with_thread_ids(true)
                .with_thread_names(true)
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer()
                .with_ansi(true)
                .with_file(false)
                .with_line_number(false)
                .with_target(true)
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Displays the startup banner through the logger.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║            ✨ POLARIS SERVER ✨          ║");
    info!("║                 v{:<10}              ║", version);
    info!("║                                          ║");
    info!("║  UDP Game Server                         ║");
    info!("║  🔌 Compiled-in Plugins                  ║");
    info!("║  🔐 Signed Client Envelopes              ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_wins_when_valid() {
        assert_eq!(resolve_level("info", Some("debug")), "debug");
        assert_eq!(resolve_level("info", Some(" WARN ")), "warn");
    }

    #[test]
    fn test_invalid_env_override_is_ignored() {
        assert_eq!(resolve_level("info", Some("chatty")), "info");
        assert_eq!(resolve_level("error", Some("")), "error");
        assert_eq!(resolve_level("trace", None), "trace");
    }
}
