// src/lib.rs

pub mod api;
pub mod app_state;
pub mod chunked;
pub mod config;
pub mod error;
pub mod location;
pub mod logging;
pub mod metadata;
pub mod storage;

pub use error::{StoreError, StoreResult};
pub use location::{Location, Scheme};
pub use storage::local_store::FilesystemStore;
pub use storage::{AddResult, Store, StoredImage};
