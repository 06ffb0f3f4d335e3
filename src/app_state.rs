//! Application State Management
//!
//! This module provides the application state shared by every HTTP worker:
//! the configured image store and the configuration it was built from.

use std::sync::Arc;
use log::info;

use crate::config::AppConfig;
use crate::error::StoreResult;
use crate::storage::local_store::FilesystemStore;
use crate::storage::mock_store::MockStore;
use crate::storage::Store;

/// Application state containing the store and its configuration
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: AppConfig,
}

impl AppState {
    /// Build the filesystem store from configuration and provision its
    /// data directory.
    pub fn from_config(config: AppConfig) -> StoreResult<Self> {
        info!(
            "Initializing filesystem store with datadir: {:?}, metadata_file: {:?}",
            config.store.datadir, config.store.metadata_file
        );
        let store = FilesystemStore::new(config.store.clone());
        store.configure()?;

        info!("Application state initialized successfully");
        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    /// Wrap an already configured store.
    pub fn with_store(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self { store, config }
    }

    /// Create application state for testing with the mock store
    pub fn new_for_testing() -> Self {
        Self::with_store(Arc::new(MockStore::new()), AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_provisions_datadir() {
        let dir = TempDir::new().unwrap();
        let datadir = dir.path().join("nested").join("images");

        let mut config = AppConfig::default();
        config.store.datadir = Some(datadir.clone());
        AppState::from_config(config).unwrap();

        assert!(datadir.is_dir());
    }

    #[test]
    fn test_from_config_without_datadir() {
        assert!(matches!(
            AppState::from_config(AppConfig::default()),
            Err(StoreError::BadConfiguration { .. })
        ));
    }
}
