//! Error taxonomy for store operations
//!
//! Every variant is terminal: the store never retries on its own. The HTTP
//! layer turns these into status codes through `ResponseError`.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::io;
use std::path::PathBuf;

/// Errors returned by [`crate::storage::Store`] implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be used with the supplied configuration.
    #[error("store \"{store}\" could not be configured: {reason}")]
    BadConfiguration { store: &'static str, reason: String },

    /// A location URI could not be parsed.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// No object exists at the referenced path.
    #[error("image not found at {}", .0.display())]
    NotFound(PathBuf),

    /// An object already exists for the requested id.
    #[error("image already exists at {}", .0.display())]
    Duplicate(PathBuf),

    /// The OS refused to remove the object.
    #[error("you cannot delete file {}", .0.display())]
    Forbidden(PathBuf),

    /// The filesystem ran out of space or hit a file size limit while writing.
    #[error("there is not enough disk space on the image storage media")]
    StorageFull,

    /// The OS refused the write itself.
    #[error("permission to write image storage media denied")]
    StorageWriteDenied,

    /// Any other I/O failure, propagated as-is.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::InvalidLocation(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Duplicate(_) => StatusCode::CONFLICT,
            StoreError::Forbidden(_) | StoreError::StorageWriteDenied => StatusCode::FORBIDDEN,
            StoreError::StorageFull => StatusCode::INSUFFICIENT_STORAGE,
            StoreError::BadConfiguration { .. } | StoreError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
