//! Image Storage Layer Abstraction
//!
//! This module defines the contract every image store backend implements, so
//! the service above it can swap the local filesystem store for another
//! backend (or the in-memory mock) without changing call sites.

pub mod config;
pub mod local_store;
pub mod mock_store;


use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::io::{self, Read};

use crate::error::StoreResult;
use crate::location::{Location, Scheme};
use crate::metadata::MetadataDocument;

/// Lazy sequence of image chunks handed back by [`Store::get`]
pub type ChunkStream = Box<dyn Iterator<Item = io::Result<Bytes>> + Send>;

/// An image opened for reading
pub struct StoredImage {
    /// Chunks of the image, read on demand
    pub chunks: ChunkStream,
    /// Size of the image at the time it was resolved
    pub size: u64,
    /// Store-wide location metadata
    pub metadata: MetadataDocument,
}

impl StoredImage {
    /// Drain every chunk into one buffer.
    pub fn read_all(self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size as usize);
        for chunk in self.chunks {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

impl fmt::Debug for StoredImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredImage")
            .field("size", &self.size)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful [`Store::add`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddResult {
    /// Normalized `file://` URI of the new image
    pub location: String,
    pub bytes_written: u64,
    /// Lowercase hex MD5 of everything written
    pub checksum: String,
    pub metadata: MetadataDocument,
}

/// Trait defining the image store interface
pub trait Store: Send + Sync {
    /// URI schemes whose locations this store can serve
    fn schemes(&self) -> &'static [Scheme];

    /// Validate configuration and provision anything the store needs on disk.
    /// Safe to call more than once.
    fn configure(&self) -> StoreResult<()>;

    /// Open an image for streaming
    fn get(&self, location: &Location) -> StoreResult<StoredImage>;

    /// Size of an image in bytes
    fn get_size(&self, location: &Location) -> StoreResult<u64>;

    /// Remove an image
    fn delete(&self, location: &Location) -> StoreResult<()>;

    /// Write a new image under `image_id`.
    ///
    /// `image_size` is the size announced by the caller; it is informational
    /// and not checked against what was actually written.
    fn add(&self, image_id: &str, data: &mut dyn Read, image_size: u64) -> StoreResult<AddResult>;

    /// Location an image with this id is (or would be) stored at
    fn location_for(&self, image_id: &str) -> StoreResult<Location>;
}

/// Hex encoded MD5 checksum, computed incrementally over written chunks
pub(crate) struct Checksum(md5::Context);

impl Checksum {
    pub(crate) fn new() -> Self {
        Self(md5::Context::new())
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        self.0.consume(chunk);
    }

    pub(crate) fn finish(self) -> String {
        hex::encode(self.0.compute().0)
    }
}
