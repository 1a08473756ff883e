//! Logging system initialization
//!
//! Builds a `tracing` subscriber from [`LoggingConfig`]: env-filter based
//! level control, console output, and optional daily-rolled file output via
//! a non-blocking appender whose worker guard is kept alive for the process
//! lifetime.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps non-blocking writer guards alive; dropping one silently stops
// file logging.
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Log directory next to the executable (falls back to the working dir)
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    exe_dir.join("logs")
}

/// Initialize logging with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize the global tracing subscriber from config.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level in configuration")?;

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
    });

    let file_layer = if config.file_output {
        let log_dir = get_log_directory();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
        let appender = rolling::daily(&log_dir, format!("{}.log", config.file_name_prefix));
        let (writer, guard) = non_blocking(appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }
        Some(fmt::layer().with_writer(writer).with_ansi(false))
    } else {
        None
    };

    let registry = Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    if config.json_format {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.try_init()
    }
    .context("failed to initialize tracing subscriber")?;

    info!(
        level = %config.level,
        file_output = config.file_output,
        "logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directory_is_under_logs() {
        let dir = get_log_directory();
        assert!(dir.ends_with("logs"));
    }

    #[test]
    fn repeated_init_returns_error_not_panic() {
        // Only one global subscriber can exist; a second init must surface
        // as an error, never a panic.
        let first = init_logging();
        if first.is_ok() {
            assert!(init_logging().is_err());
        }
    }
}
