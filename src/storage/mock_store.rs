//! Mock implementation of the Store trait for testing

use crate::chunked::{chunk_readable, CHUNK_SIZE};
use crate::error::{StoreError, StoreResult};
use crate::location::{Location, Scheme};
use crate::metadata::MetadataDocument;
use crate::storage::{AddResult, Checksum, Store, StoredImage};
use bytes::Bytes;
use log::info;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory store with the same contract as the filesystem store.
///
/// Images are keyed by the path of their location, under a virtual root.
pub struct MockStore {
    root: PathBuf,
    images: Arc<Mutex<HashMap<PathBuf, Bytes>>>,
    metadata: MetadataDocument,
}

impl MockStore {
    pub fn new() -> Self {
        Self::with_metadata(MetadataDocument::new())
    }

    /// Mock store that hands out `metadata` with every location.
    pub fn with_metadata(metadata: MetadataDocument) -> Self {
        Self {
            root: PathBuf::from("/mock"),
            images: Arc::new(Mutex::new(HashMap::new())),
            metadata,
        }
    }

    fn images(&self) -> MutexGuard<'_, HashMap<PathBuf, Bytes>> {
        self.images.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of images currently stored
    pub fn image_count(&self) -> usize {
        self.images().len()
    }

    /// Remove every stored image
    pub fn clear(&self) {
        self.images().clear();
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MockStore {
    fn schemes(&self) -> &'static [Scheme] {
        Scheme::ALL
    }

    fn configure(&self) -> StoreResult<()> {
        Ok(())
    }

    fn get(&self, location: &Location) -> StoreResult<StoredImage> {
        let data = self
            .images()
            .get(location.path())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(location.path().to_path_buf()))?;

        let size = data.len() as u64;
        let chunks: Vec<io::Result<Bytes>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
            .collect();

        info!("Mock: Retrieved image at {} with size {}", location.path().display(), size);
        Ok(StoredImage {
            chunks: Box::new(chunks.into_iter()),
            size,
            metadata: self.metadata.clone(),
        })
    }

    fn get_size(&self, location: &Location) -> StoreResult<u64> {
        self.images()
            .get(location.path())
            .map(|data| data.len() as u64)
            .ok_or_else(|| StoreError::NotFound(location.path().to_path_buf()))
    }

    fn delete(&self, location: &Location) -> StoreResult<()> {
        match self.images().remove(location.path()) {
            Some(_) => {
                info!("Mock: Deleted image at {}", location.path().display());
                Ok(())
            }
            None => Err(StoreError::NotFound(location.path().to_path_buf())),
        }
    }

    fn add(&self, image_id: &str, data: &mut dyn Read, _image_size: u64) -> StoreResult<AddResult> {
        let location = self.location_for(image_id)?;
        if self.images().contains_key(location.path()) {
            return Err(StoreError::Duplicate(location.path().to_path_buf()));
        }

        let mut checksum = Checksum::new();
        let mut buffer = Vec::new();
        for chunk in chunk_readable(data, CHUNK_SIZE) {
            let chunk = chunk?;
            checksum.update(&chunk);
            buffer.extend_from_slice(&chunk);
        }
        let bytes_written = buffer.len() as u64;

        let mut images = self.images();
        if images.contains_key(location.path()) {
            return Err(StoreError::Duplicate(location.path().to_path_buf()));
        }
        images.insert(location.path().to_path_buf(), Bytes::from(buffer));

        info!("Mock: Stored image {} with size {}", image_id, bytes_written);
        Ok(AddResult {
            location: location.uri(),
            bytes_written,
            checksum: checksum.finish(),
            metadata: self.metadata.clone(),
        })
    }

    fn location_for(&self, image_id: &str) -> StoreResult<Location> {
        Location::from_path(self.root.join(image_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_mock_store_operations() {
        let store = MockStore::new();
        let result = store.add("a", &mut Cursor::new(b"mock bytes".to_vec()), 10).unwrap();
        assert_eq!(result.location, "file:///mock/a");
        assert_eq!(store.image_count(), 1);

        let location = Location::parse(&result.location).unwrap();
        assert_eq!(store.get_size(&location).unwrap(), 10);
        assert_eq!(store.get(&location).unwrap().read_all().unwrap(), b"mock bytes");

        store.delete(&location).unwrap();
        assert_eq!(store.image_count(), 0);
        assert!(matches!(store.delete(&location), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_mock_store_chunks_large_images() {
        let store = MockStore::new();
        let data = vec![3u8; CHUNK_SIZE * 2 + 1];
        store.add("big", &mut Cursor::new(data.clone()), data.len() as u64).unwrap();

        let image = store.get(&store.location_for("big").unwrap()).unwrap();
        let sizes: Vec<usize> = image.chunks.map(|c| c.unwrap().len()).collect();
        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 1]);
    }

    #[test]
    fn test_mock_store_metadata_and_clear() {
        let mut metadata = MetadataDocument::new();
        metadata.insert("id".to_string(), json!("mock-1"));
        let store = MockStore::with_metadata(metadata.clone());

        let result = store.add("m", &mut Cursor::new(vec![1u8]), 1).unwrap();
        assert_eq!(result.metadata, metadata);

        store.clear();
        assert_eq!(store.image_count(), 0);
    }
}
