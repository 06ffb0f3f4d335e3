//! Configuration for the filesystem image store

use crate::storage::{local_store::FilesystemStore, Store};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable naming the data directory
pub const DATADIR_ENV: &str = "FILESYSTEM_STORE_DATADIR";

/// Environment variable naming the metadata file
pub const METADATA_FILE_ENV: &str = "FILESYSTEM_STORE_METADATA_FILE";

/// Configuration for the filesystem store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemStoreConfig {
    /// Directory to which the store writes images
    pub datadir: Option<PathBuf>,
    /// JSON file whose contents are returned with every location
    pub metadata_file: Option<PathBuf>,
}

impl FilesystemStoreConfig {
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: Some(datadir.into()),
            metadata_file: None,
        }
    }

    pub fn with_metadata_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_file = Some(path.into());
        self
    }

    /// Values set in `other` replace ours.
    pub fn overlay(self, other: FilesystemStoreConfig) -> Self {
        Self {
            datadir: other.datadir.or(self.datadir),
            metadata_file: other.metadata_file.or(self.metadata_file),
        }
    }

    /// Create a new store configuration from environment variables
    pub fn from_env() -> Self {
        let datadir = match env::var(DATADIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => {
                info!("Using image data directory from environment: {}", dir);
                Some(PathBuf::from(dir))
            }
            _ => {
                warn!("{} not defined in environment", DATADIR_ENV);
                None
            }
        };

        let metadata_file = match env::var(METADATA_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!("Using store metadata file from environment: {}", path);
                Some(PathBuf::from(path))
            }
            _ => None,
        };

        Self {
            datadir,
            metadata_file,
        }
    }

    /// Create a filesystem store for this configuration.
    ///
    /// The store still has to be configured before images can be added.
    pub fn create_store(&self) -> Arc<dyn Store> {
        Arc::new(FilesystemStore::new(self.clone()))
    }
}
