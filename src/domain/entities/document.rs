//! Document entity - one unit of content of a given kind

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::value_objects::{contains_reference, DocumentKind};

/// Flag under which a document's source id is preserved
pub const IMPORT_ID_FLAG: &str = "importid";

/// A document as held by a content store.
///
/// `payload` is the full structured object and the source of truth; `id`,
/// `name` and `folder_id` mirror its `_id`, `name` and `folder` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub kind: DocumentKind,
    pub id: String,
    pub name: String,
    pub folder_id: Option<String>,
    pub payload: Value,
}

impl Document {
    /// Build a document from a payload, stamping `id` into it as `_id`
    pub fn new(kind: DocumentKind, id: impl Into<String>, mut payload: Value) -> Self {
        let id = id.into();
        if !payload.is_object() {
            payload = Value::Object(Map::new());
        }
        if let Some(object) = payload.as_object_mut() {
            object.insert("_id".to_string(), Value::String(id.clone()));
        }
        let mut document = Self {
            kind,
            id,
            name: String::new(),
            folder_id: None,
            payload,
        };
        document.refresh();
        document
    }

    /// Re-read the mirrored fields after the payload changed
    pub fn refresh(&mut self) {
        self.name = self
            .payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.folder_id = self
            .payload
            .get("folder")
            .and_then(Value::as_str)
            .filter(|folder| !folder.is_empty())
            .map(str::to_string);
    }

    pub fn import_id(&self) -> Option<&str> {
        import_id_of(&self.payload)
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Id and display name, as returned by listings and collection indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
}

/// The import key stamped on a payload, if any
pub fn import_id_of(payload: &Value) -> Option<&str> {
    payload
        .get("flags")
        .and_then(|flags| flags.get(IMPORT_ID_FLAG))
        .and_then(Value::as_str)
}

/// Stamp `import_id` into the payload's flags
pub fn stamp_import_id(payload: &mut Value, import_id: &str) {
    let Some(object) = payload.as_object_mut() else {
        return;
    };
    let flags = object
        .entry("flags".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !flags.is_object() {
        *flags = Value::Object(Map::new());
    }
    if let Some(flags) = flags.as_object_mut() {
        flags.insert(IMPORT_ID_FLAG.to_string(), Value::String(import_id.to_string()));
    }
}

/// Whether any string inside the payload holds a reference token
pub fn payload_has_reference(payload: &Value) -> bool {
    match payload {
        Value::String(text) => contains_reference(text),
        Value::Array(values) => values.iter().any(payload_has_reference),
        Value::Object(map) => map.values().any(payload_has_reference),
        _ => false,
    }
}
