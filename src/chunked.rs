//! Chunked streaming over image files
//!
//! Reads never load a whole image into memory. [`ChunkedReader`] hands back a
//! file in fixed-size chunks and [`chunk_readable`] does the same for any
//! `Read` on the write path.

use bytes::Bytes;
use log::debug;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Size of every chunk read from or written to the store, in bytes
pub const CHUNK_SIZE: usize = 65536;

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
///
/// Returns the number of bytes read; `0` means end of stream.
fn read_chunk<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Lazy, finite sequence of chunks over one image file
///
/// The file is opened on construction and released exactly once: when the
/// last chunk has been read, when a read fails, on [`ChunkedReader::close`],
/// or when the reader is dropped part way through.
#[derive(Debug)]
pub struct ChunkedReader {
    path: PathBuf,
    file: Option<File>,
    chunk_size: usize,
}

impl ChunkedReader {
    /// Open `path` for reading with the default chunk size.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_chunk_size(path, CHUNK_SIZE)
    }

    /// Open `path` for reading, yielding chunks of at most `chunk_size` bytes.
    pub fn with_chunk_size(path: impl AsRef<Path>, chunk_size: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Release the underlying file. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed chunked reader for {}", self.path.display());
        }
    }
}

impl Iterator for ChunkedReader {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.file.as_mut()?;
        let mut buf = vec![0u8; self.chunk_size];
        match read_chunk(file, &mut buf) {
            Ok(0) => {
                self.close();
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some(Ok(Bytes::from(buf)))
            }
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

impl Drop for ChunkedReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Chunks pulled from an arbitrary reader, see [`chunk_readable`]
#[derive(Debug)]
pub struct ChunkReadable<R> {
    reader: R,
    chunk_size: usize,
    done: bool,
}

/// Slice `reader` into chunks of at most `chunk_size` bytes.
///
/// The sequence ends after end of stream or after yielding the first error.
pub fn chunk_readable<R: Read>(reader: R, chunk_size: usize) -> ChunkReadable<R> {
    ChunkReadable {
        reader,
        chunk_size: chunk_size.max(1),
        done: false,
    }
}

impl<R: Read> Iterator for ChunkReadable<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.chunk_size];
        match read_chunk(&mut self.reader, &mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some(Ok(buf))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
