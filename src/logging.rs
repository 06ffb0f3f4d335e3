//! Logger initialization
//!
//! log4rs is configured from the file named in [`LoggingConfig`]. When that
//! file is missing the process falls back to env_logger, driven by `RUST_LOG`.

use crate::config::LoggingConfig;
use log::{info, warn};

/// Install the global logger. Only the first call has any effect.
pub fn init(config: &LoggingConfig) {
    if config.config_file.exists() {
        match log4rs::init_file(&config.config_file, Default::default()) {
            Ok(()) => {
                info!("Logging configured from {}", config.config_file.display());
                return;
            }
            Err(e) => {
                eprintln!(
                    "Failed to load log configuration {}: {}",
                    config.config_file.display(),
                    e
                );
            }
        }
    }

    if env_logger::try_init().is_ok() {
        warn!(
            "Log configuration {} not usable, logging with env_logger",
            config.config_file.display()
        );
    }
}
