//! Infrastructure layer: config, logging, history store, notifier

pub mod config;
pub mod history;
pub mod logging;
pub mod notifier;

pub use config::{ConfigManager, LoggingConfig, SyncConfig};
pub use history::JsonHistoryStore;
pub use logging::{init_logging, init_logging_with_config};
pub use notifier::LoggingNotifier;
