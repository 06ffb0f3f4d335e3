//! Static location metadata
//!
//! The filesystem store can be pointed at a JSON file whose contents are
//! returned with every location it hands out. The document is opaque to the
//! store; it only has to pass the location metadata shape check below.

pub mod loader;

pub use loader::MetadataLoader;

use serde_json::{Map, Value};
use std::io;

/// Metadata returned alongside stored locations
pub type MetadataDocument = Map<String, Value>;

/// Reasons a metadata file could not be used
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("the metadata file could not be opened: {0}")]
    Io(#[from] io::Error),

    #[error("the metadata file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidShape(String),
}

/// Contract a metadata document has to satisfy before it is handed out
pub trait MetadataValidator: Send + Sync {
    fn validate(&self, document: &Value) -> Result<(), MetadataError>;
}

/// Default validator, see [`check_location_metadata`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationMetadataValidator;

impl MetadataValidator for LocationMetadataValidator {
    fn validate(&self, document: &Value) -> Result<(), MetadataError> {
        check_location_metadata(document)
    }
}

/// Check that `document` is a JSON object whose values are strings, arrays
/// or nested objects, all the way down.
pub fn check_location_metadata(document: &Value) -> Result<(), MetadataError> {
    match document {
        Value::Object(map) => {
            for (key, value) in map {
                check_value(value, key)?;
            }
            Ok(())
        }
        other => Err(MetadataError::InvalidShape(format!(
            "The location metadata must be a JSON object, found {}.",
            type_name(other)
        ))),
    }
}

fn check_value(value: &Value, key: &str) -> Result<(), MetadataError> {
    match value {
        Value::String(_) => Ok(()),
        Value::Object(map) => {
            for (child, value) in map {
                check_value(value, child)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                check_value(item, &format!("{}[{}]", key, index))?;
            }
            Ok(())
        }
        other => Err(MetadataError::InvalidShape(format!(
            "The image metadata key {} has an invalid type of {}. Only dict, list, and unicode are supported.",
            key,
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_nested_strings() {
        let document = json!({
            "id": "f0c0ba5e",
            "mountpoint": "/var/lib/images",
            "hosts": ["node-1", "node-2"],
            "extra": {"zone": "a", "tags": [{"k": "v"}]}
        });
        assert!(check_location_metadata(&document).is_ok());
        assert!(check_location_metadata(&json!({})).is_ok());
    }

    #[test]
    fn test_rejects_non_object_root() {
        for document in [json!([]), json!("x"), json!(null), json!(3)] {
            assert!(matches!(
                check_location_metadata(&document),
                Err(MetadataError::InvalidShape(_))
            ));
        }
    }

    #[test]
    fn test_rejects_scalar_values() {
        let err = check_location_metadata(&json!({"size": 10})).unwrap_err();
        assert!(err.to_string().contains("size"));
        assert!(err.to_string().contains("number"));

        let err = check_location_metadata(&json!({"hosts": ["a", true]})).unwrap_err();
        assert!(err.to_string().contains("hosts[1]"));
    }
}
