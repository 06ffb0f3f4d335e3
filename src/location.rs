//! Filesystem store locations
//!
//! A location is the backend-specific half of an image URI. Two schemes are
//! accepted on input (`file://` and `filesystem://`) but locations are always
//! written back out as `file://<path>`.

use crate::error::{StoreError, StoreResult};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// URI schemes handled by the filesystem store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    File,
    Filesystem,
}

impl Scheme {
    /// Every scheme this backend accepts.
    pub const ALL: &'static [Scheme] = &[Scheme::File, Scheme::Filesystem];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::File => "file",
            Scheme::Filesystem => "filesystem",
        }
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Scheme::File
    }
}

impl FromStr for Scheme {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Scheme::File),
            "filesystem" => Ok(Scheme::Filesystem),
            _ => Err(StoreError::InvalidLocation(format!(
                "unsupported scheme for filesystem store: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed location of one stored image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    scheme: Scheme,
    path: PathBuf,
}

impl Location {
    /// Parse a `file:` or `filesystem:` URI, with or without the `//` authority marker.
    ///
    /// The host and path components are joined and trimmed; an empty result is
    /// rejected. The path is not checked for existence.
    pub fn parse(uri: &str) -> StoreResult<Self> {
        let (scheme, rest) = uri.split_once(':').ok_or_else(|| {
            StoreError::InvalidLocation(format!("URI is missing a scheme: {}", uri))
        })?;
        let scheme = scheme.parse::<Scheme>()?;
        // `file:/tmp/x` carries no authority and is accepted as is.
        let rest = rest.strip_prefix("//").unwrap_or(rest);

        // Query and fragment are not part of the stored path.
        let end = rest.find(|c: char| c == '?' || c == '#').unwrap_or(rest.len());
        let path = rest[..end].trim();
        if path.is_empty() {
            debug!("No path specified in URI: {}", uri);
            return Err(StoreError::InvalidLocation("No path specified".to_string()));
        }

        Ok(Self {
            scheme,
            path: PathBuf::from(path),
        })
    }

    /// Build a `file` location for a path on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(StoreError::InvalidLocation("No path specified".to_string()));
        }
        Ok(Self {
            scheme: Scheme::File,
            path,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Normalized URI form. Always uses the `file` scheme.
    pub fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

impl FromStr for Location {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}
