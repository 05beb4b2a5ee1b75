use std::fmt;

use serde_json::{Map, Value};

use crate::error::StoreError;

/// The fields of an existing document.
pub type FieldMap = Map<String, Value>;

/// Address of a single document: `<collection>/<document>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    collection: String,
    document: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            document: document.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn document(&self) -> &str {
        &self.document
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.document)
    }
}

/// One delivered state of the watched document.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Exists(FieldMap),
    Absent,
}

impl Snapshot {
    /// Build a snapshot from a decoded JSON document. Only objects are documents.
    pub fn from_json(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(fields) => Ok(Snapshot::Exists(fields)),
            other => Err(StoreError::Malformed(format!(
                "expected an object at the top level, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Extract the identifier list stored under `field`.
    ///
    /// Returns `None` when the document is absent, the field is missing, the field is
    /// not an array, or any element is not a string.
    pub fn identifiers(&self, field: &str) -> Option<Vec<String>> {
        let Snapshot::Exists(fields) = self else {
            return None;
        };
        let Value::Array(items) = fields.get(field)? else {
            return None;
        };
        items
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect()
    }
}

/// A single item of a live feed: a snapshot, or an error reported by the store.
#[derive(Debug)]
pub enum SnapshotEvent {
    Snapshot(Snapshot),
    Error(StoreError),
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Snapshot {
        Snapshot::from_json(value).unwrap()
    }

    #[test]
    fn test_identifiers_from_string_array() {
        let snapshot = doc(json!({ "uids": ["user_1", "user_2"], "other": 3 }));
        assert_eq!(
            snapshot.identifiers("uids"),
            Some(vec!["user_1".to_string(), "user_2".to_string()])
        );
    }

    #[test]
    fn test_absent_document_has_no_identifiers() {
        assert_eq!(Snapshot::Absent.identifiers("uids"), None);
    }

    #[test]
    fn test_missing_or_malformed_field() {
        assert_eq!(doc(json!({ "other": [] })).identifiers("uids"), None);
        assert_eq!(doc(json!({ "uids": "user_1" })).identifiers("uids"), None);
        assert_eq!(doc(json!({ "uids": ["user_1", 7] })).identifiers("uids"), None);
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert_eq!(doc(json!({ "uids": [] })).identifiers("uids"), Some(vec![]));
    }

    #[test]
    fn test_non_object_document_is_malformed() {
        let err = Snapshot::from_json(json!(["user_1"])).unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_document_path_display() {
        let path = DocumentPath::new("users", "userid");
        assert_eq!(path.to_string(), "users/userid");
        assert_eq!(path.collection(), "users");
        assert_eq!(path.document(), "userid");
    }
}
