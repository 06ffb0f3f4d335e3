//! Local filesystem image store
//!
//! Every image lives in its own file, `<datadir>/<image id>`. Files are created
//! exclusively, so an id can only ever be written once, and a failed write
//! removes what it left behind unless the OS denied the write itself.

use crate::chunked::{chunk_readable, ChunkedReader, CHUNK_SIZE};
use crate::error::{StoreError, StoreResult};
use crate::location::{Location, Scheme};
use crate::metadata::MetadataLoader;
use crate::storage::config::FilesystemStoreConfig;
use crate::storage::{AddResult, Checksum, Store, StoredImage};
use log::{debug, error, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const STORE_NAME: &str = "filesystem";

fn bad_configuration(reason: impl Into<String>) -> StoreError {
    StoreError::BadConfiguration {
        store: STORE_NAME,
        reason: reason.into(),
    }
}

/// Out of space, file too large, or over quota.
fn is_storage_full(err: &io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) => code == libc::ENOSPC || code == libc::EFBIG || is_quota_exceeded(code),
        None => false,
    }
}

#[cfg(unix)]
fn is_quota_exceeded(code: i32) -> bool {
    code == libc::EDQUOT
}

#[cfg(not(unix))]
fn is_quota_exceeded(_code: i32) -> bool {
    false
}

fn delete_partial(path: &Path, image_id: &str) {
    if let Err(e) = fs::remove_file(path) {
        error!(
            "Unable to remove partial image data for image {}: {}",
            image_id, e
        );
    }
}

/// Removes a half written image unless told to keep it.
///
/// Runs on every exit path out of a write, including unwinding.
struct PartialFile<'a> {
    path: &'a Path,
    image_id: &'a str,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path, image_id: &'a str) -> Self {
        Self {
            path,
            image_id,
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.armed {
            delete_partial(self.path, self.image_id);
        }
    }
}

/// Stream `data` into `file` chunk by chunk, returning the byte count and
/// hex checksum.
fn write_chunks(mut file: File, data: &mut dyn Read) -> io::Result<(u64, String)> {
    let mut checksum = Checksum::new();
    let mut bytes_written = 0u64;
    for chunk in chunk_readable(data, CHUNK_SIZE) {
        let chunk = chunk?;
        bytes_written += chunk.len() as u64;
        checksum.update(&chunk);
        file.write_all(&chunk)?;
    }
    file.flush()?;
    Ok((bytes_written, checksum.finish()))
}

/// Image store backed by a local directory
#[derive(Debug)]
pub struct FilesystemStore {
    config: FilesystemStoreConfig,
    metadata: MetadataLoader,
}

impl FilesystemStore {
    pub fn new(config: FilesystemStoreConfig) -> Self {
        let metadata = MetadataLoader::new(config.metadata_file.clone());
        Self { config, metadata }
    }

    /// Configured data directory
    pub fn datadir(&self) -> StoreResult<&Path> {
        self.config.datadir.as_deref().ok_or_else(|| {
            bad_configuration("Could not find filesystem_store_datadir in configuration options.")
        })
    }

    /// Path and current size of the image behind `location`.
    fn resolve(&self, location: &Location) -> StoreResult<(PathBuf, u64)> {
        let path = location.path();
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok((path.to_path_buf(), meta.len())),
            Ok(_) => Err(StoreError::NotFound(path.to_path_buf())),
            // A path we cannot stat (ENOTDIR, EACCES on a parent, ...) holds no image.
            Err(e) => {
                debug!("Could not stat {}: {}", path.display(), e);
                Err(StoreError::NotFound(path.to_path_buf()))
            }
        }
    }

    fn classify_write_error(err: io::Error) -> StoreError {
        if err.kind() == io::ErrorKind::PermissionDenied {
            StoreError::StorageWriteDenied
        } else if is_storage_full(&err) {
            StoreError::StorageFull
        } else {
            StoreError::Io(err)
        }
    }
}

impl Store for FilesystemStore {
    fn schemes(&self) -> &'static [Scheme] {
        Scheme::ALL
    }

    fn configure(&self) -> StoreResult<()> {
        let datadir = self.datadir().map_err(|e| {
            error!("{}", e);
            e
        })?;

        if datadir.exists() {
            if !datadir.is_dir() {
                let reason = format!("Image data path is not a directory: {}", datadir.display());
                error!("{}", reason);
                return Err(bad_configuration(reason));
            }
            return Ok(());
        }

        info!(
            "Directory to write image files does not exist ({}). Creating.",
            datadir.display()
        );
        if let Err(e) = fs::create_dir_all(datadir) {
            if datadir.is_dir() {
                // Someone else created it between our check and create_dir_all.
                debug!("Data directory {} appeared concurrently", datadir.display());
                return Ok(());
            }
            let reason = format!("Unable to create datadir: {}", datadir.display());
            error!("{}: {}", reason, e);
            return Err(bad_configuration(reason));
        }
        Ok(())
    }

    fn get(&self, location: &Location) -> StoreResult<StoredImage> {
        let (filepath, filesize) = self.resolve(location)?;
        let reader = match ChunkedReader::open(&filepath) {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(filepath));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        debug!("Found image at {}. Returning in ChunkedReader.", filepath.display());

        Ok(StoredImage {
            chunks: Box::new(reader),
            size: filesize,
            metadata: self.metadata.load(),
        })
    }

    fn get_size(&self, location: &Location) -> StoreResult<u64> {
        let (filepath, filesize) = self.resolve(location)?;
        debug!("Found image at {}.", filepath.display());
        Ok(filesize)
    }

    fn delete(&self, location: &Location) -> StoreResult<()> {
        let (filepath, _) = self.resolve(location)?;
        debug!("Deleting image at {}", filepath.display());
        fs::remove_file(&filepath).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(filepath.clone()),
            _ => {
                warn!("Failed to delete image at {}: {}", filepath.display(), e);
                StoreError::Forbidden(filepath.clone())
            }
        })
    }

    fn add(&self, image_id: &str, data: &mut dyn Read, image_size: u64) -> StoreResult<AddResult> {
        let filepath = self.datadir()?.join(image_id);

        if filepath.exists() {
            return Err(StoreError::Duplicate(filepath));
        }

        // create_new settles a race between two writers of the same id.
        let file = match OpenOptions::new().write(true).create_new(true).open(&filepath) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Duplicate(filepath));
            }
            Err(e) => {
                error!("Failed to create image file {}: {}", filepath.display(), e);
                return Err(Self::classify_write_error(e));
            }
        };

        let partial = PartialFile::new(&filepath, image_id);
        let (bytes_written, checksum_hex) = match write_chunks(file, data) {
            Ok(written) => written,
            Err(e) => {
                error!("Failed to write image {} to {}: {}", image_id, filepath.display(), e);
                let err = Self::classify_write_error(e);
                if matches!(err, StoreError::StorageWriteDenied) {
                    partial.keep();
                } else {
                    drop(partial);
                }
                return Err(err);
            }
        };
        partial.keep();

        if image_size != 0 && image_size != bytes_written {
            debug!(
                "Image {} announced {} bytes but {} were written",
                image_id, image_size, bytes_written
            );
        }

        let metadata = self.metadata.load();
        debug!(
            "Wrote {} bytes to {} with checksum {}",
            bytes_written,
            filepath.display(),
            checksum_hex
        );

        Ok(AddResult {
            location: Location::from_path(filepath)?.uri(),
            bytes_written,
            checksum: checksum_hex,
            metadata,
        })
    }

    fn location_for(&self, image_id: &str) -> StoreResult<Location> {
        Location::from_path(self.datadir()?.join(image_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn configured_store() -> (TempDir, FilesystemStore) {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(FilesystemStoreConfig::new(dir.path().join("images")));
        store.configure().unwrap();
        (dir, store)
    }

    #[test]
    fn test_path_below_a_file_is_not_found() {
        let (_dir, store) = configured_store();
        let result = store.add("img", &mut Cursor::new(b"data".to_vec()), 4).unwrap();
        let location = Location::parse(&format!("{}/child", result.location)).unwrap();

        assert!(matches!(store.get_size(&location), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get(&location), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&location), Err(StoreError::NotFound(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_undeletable_file_is_forbidden() {
        let (_dir, store) = configured_store();
        let location = Location::parse("file:///proc/self/status").unwrap();

        match store.delete(&location) {
            Err(StoreError::Forbidden(path)) => assert_eq!(path, PathBuf::from("/proc/self/status")),
            other => panic!("expected Forbidden, got {:?}", other),
        }
        assert!(Path::new("/proc/self/status").exists());
    }

    /// Yields `good` bytes, then fails with `error`.
    struct BrokenReader {
        good: usize,
        error: Option<io::Error>,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.good == 0 {
                return Err(self
                    .error
                    .take()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "already failed")));
            }
            let n = buf.len().min(self.good);
            buf[..n].fill(0xAB);
            self.good -= n;
            Ok(n)
        }
    }

    fn broken(good: usize, error: io::Error) -> BrokenReader {
        BrokenReader {
            good,
            error: Some(error),
        }
    }

    #[test]
    fn test_local_store_basic_operations() {
        let (_dir, store) = configured_store();
        let test_data = b"Hello, Filesystem Store!";

        let result = store
            .add("image-1", &mut Cursor::new(test_data.to_vec()), test_data.len() as u64)
            .unwrap();
        assert_eq!(result.bytes_written, test_data.len() as u64);
        assert_eq!(result.checksum, format!("{:x}", md5::compute(test_data)));
        assert!(result.metadata.is_empty());

        let location = Location::parse(&result.location).unwrap();
        assert_eq!(location, store.location_for("image-1").unwrap());
        assert_eq!(store.get_size(&location).unwrap(), test_data.len() as u64);

        let image = store.get(&location).unwrap();
        assert_eq!(image.size, test_data.len() as u64);
        assert_eq!(image.read_all().unwrap(), test_data);

        store.delete(&location).unwrap();
        assert!(matches!(store.get_size(&location), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_add_requires_datadir() {
        let store = FilesystemStore::new(FilesystemStoreConfig::default());
        assert!(matches!(
            store.configure(),
            Err(StoreError::BadConfiguration { .. })
        ));
        assert!(matches!(
            store.add("x", &mut Cursor::new(vec![1u8]), 1),
            Err(StoreError::BadConfiguration { .. })
        ));
    }

    #[test]
    fn test_configure_rejects_file_as_datadir() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("plain-file");
        fs::write(&not_a_dir, b"x").unwrap();

        let store = FilesystemStore::new(FilesystemStoreConfig::new(&not_a_dir));
        assert!(matches!(
            store.configure(),
            Err(StoreError::BadConfiguration { .. })
        ));
    }

    #[test]
    fn test_configure_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let store = FilesystemStore::new(FilesystemStoreConfig::new(blocker.join("images")));
        assert!(matches!(
            store.configure(),
            Err(StoreError::BadConfiguration { .. })
        ));
    }

    #[test]
    fn test_duplicate_add_leaves_original() {
        let (_dir, store) = configured_store();
        store.add("dup", &mut Cursor::new(b"first".to_vec()), 5).unwrap();

        let err = store
            .add("dup", &mut Cursor::new(b"second write".to_vec()), 12)
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let location = store.location_for("dup").unwrap();
        assert_eq!(store.get(&location).unwrap().read_all().unwrap(), b"first");
    }

    #[test]
    fn test_generic_error_removes_partial_file() {
        let (_dir, store) = configured_store();
        let mut reader = broken(
            CHUNK_SIZE + 100,
            io::Error::new(io::ErrorKind::ConnectionReset, "upload interrupted"),
        );

        let err = store.add("interrupted", &mut reader, 0).unwrap_err();
        match err {
            StoreError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected Io error, got {:?}", other),
        }
        assert!(!store.location_for("interrupted").unwrap().path().exists());
    }

    #[test]
    fn test_storage_full_removes_partial_file() {
        let (_dir, store) = configured_store();
        for code in [libc::ENOSPC, libc::EFBIG] {
            let id = format!("full-{}", code);
            let mut reader = broken(10, io::Error::from_raw_os_error(code));
            let err = store.add(&id, &mut reader, 0).unwrap_err();
            assert!(matches!(err, StoreError::StorageFull));
            assert!(!store.location_for(&id).unwrap().path().exists());
        }
    }

    #[test]
    fn test_permission_denied_keeps_partial_file() {
        let (_dir, store) = configured_store();
        let mut reader = broken(
            CHUNK_SIZE,
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );

        let err = store.add("denied", &mut reader, 0).unwrap_err();
        assert!(matches!(err, StoreError::StorageWriteDenied));

        let path = store.location_for("denied").unwrap().path().to_path_buf();
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), CHUNK_SIZE as u64);
    }

    struct PanickingReader;

    impl Read for PanickingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("reader blew up");
        }
    }

    #[test]
    fn test_panic_while_writing_removes_partial_file() {
        let (_dir, store) = configured_store();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.add("panicked", &mut PanickingReader, 0)
        }));
        assert!(outcome.is_err());
        assert!(!store.location_for("panicked").unwrap().path().exists());
    }

    #[test]
    fn test_declared_size_is_not_enforced() {
        let (_dir, store) = configured_store();
        let result = store.add("liar", &mut Cursor::new(b"abc".to_vec()), 1000).unwrap();
        assert_eq!(result.bytes_written, 3);
    }

    #[test]
    fn test_empty_image() {
        let (_dir, store) = configured_store();
        let result = store.add("empty", &mut Cursor::new(Vec::new()), 0).unwrap();
        assert_eq!(result.bytes_written, 0);
        assert_eq!(result.checksum, "d41d8cd98f00b204e9800998ecf8427e");

        let location = store.location_for("empty").unwrap();
        assert_eq!(store.get_size(&location).unwrap(), 0);
        assert!(store.get(&location).unwrap().read_all().unwrap().is_empty());
    }

    #[test]
    fn test_directory_is_not_an_image() {
        let (_dir, store) = configured_store();
        let location = Location::from_path(store.datadir().unwrap()).unwrap();
        assert!(matches!(store.get_size(&location), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_schemes() {
        let (_dir, store) = configured_store();
        assert_eq!(store.schemes(), &[Scheme::File, Scheme::Filesystem]);
    }
}
