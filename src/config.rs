//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use crate::storage::config::FilesystemStoreConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const CONFIG_FILE: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Filesystem store configuration
    pub store: FilesystemStoreConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Maximum payload size in bytes
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9710,
            max_payload_size: 1073741824, // 1GB
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to the log4rs configuration file
    pub config_file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("server_log.yaml"),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config.yaml`, use defaults if not found.
    /// Store settings from the environment take precedence over the file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::load_from(CONFIG_FILE)?;
        config.store = config.store.overlay(FilesystemStoreConfig::from_env());
        Ok(config)
    }

    /// Load configuration from `path`, use defaults if not found
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
