//! Best-effort loading of the store metadata file

use crate::metadata::{
    LocationMetadataValidator, MetadataDocument, MetadataError, MetadataValidator,
};
use log::error;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Reads the optional metadata file configured for a store.
///
/// [`MetadataLoader::load`] never fails: anything that goes wrong is logged
/// and an empty document is returned instead.
pub struct MetadataLoader {
    path: Option<PathBuf>,
    validator: Box<dyn MetadataValidator>,
}

impl MetadataLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self::with_validator(path, Box::new(LocationMetadataValidator))
    }

    pub fn with_validator(path: Option<PathBuf>, validator: Box<dyn MetadataValidator>) -> Self {
        Self { path, validator }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load and validate the metadata file, or return an empty document.
    pub fn load(&self) -> MetadataDocument {
        let path = match &self.path {
            Some(path) => path,
            None => return MetadataDocument::new(),
        };

        match self.try_load(path) {
            Ok(document) => document,
            Err(MetadataError::Io(e)) => {
                error!(
                    "The path for the metadata file {} could not be opened: {}  An empty dictionary will be returned to the client.",
                    path.display(),
                    e
                );
                MetadataDocument::new()
            }
            Err(e) => {
                error!(
                    "The JSON in the metadata file {} could not be used: {}  An empty dictionary will be returned to the client.",
                    path.display(),
                    e
                );
                MetadataDocument::new()
            }
        }
    }

    fn try_load(&self, path: &Path) -> Result<MetadataDocument, MetadataError> {
        let reader = BufReader::new(File::open(path)?);
        let document: Value = serde_json::from_reader(reader)?;
        self.validator.validate(&document)?;
        match document {
            Value::Object(map) => Ok(map),
            _ => Err(MetadataError::InvalidShape(
                "The location metadata must be a JSON object.".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for MetadataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataLoader")
            .field("path", &self.path)
            .finish()
    }
}
