//! Folder entity - hierarchical grouping of documents of one kind

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::DocumentKind;

/// A live folder in a content store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    /// Kind of document the folder may contain
    pub kind: DocumentKind,
    pub parent_id: Option<String>,
    pub import_id: Option<String>,
    pub color: Option<String>,
}

/// Request to create a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFolder {
    pub name: String,
    pub kind: DocumentKind,
    pub parent_id: Option<String>,
    pub import_id: Option<String>,
    pub color: Option<String>,
}

/// A folder as written to `folders.json`.
///
/// `id` is the import key (the folder's id in the exporting store) and
/// `parent_id` is the import key of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    pub kind: DocumentKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl FolderRecord {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
