//! Content store port - the host database that adventures are moved between
//!
//! The bundle codec never talks to a database directly; every read, create,
//! update and file operation goes through this trait.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::entities::{
    CollectionInfo, Document, DocumentSummary, Folder, NewFolder, StoreEnvironment,
};
use crate::domain::value_objects::{DocumentKind, PartialUpdate};

/// File storage area addressed by browse operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// User data area, where world assets live
    Data,
    /// Assets shipped with the host application
    Core,
}

/// Options for [`ContentStorePort::browse`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseOptions {
    /// Only return files with one of these extensions (case-insensitive, with dot)
    pub extensions: Vec<String>,
    /// Treat the path as a glob and return every file it matches
    pub wildcard: bool,
}

impl BrowseOptions {
    pub fn wildcard() -> Self {
        Self {
            extensions: Vec::new(),
            wildcard: true,
        }
    }
}

/// Repository port for the host content store
#[async_trait]
pub trait ContentStorePort: Send + Sync {
    /// Identity of the world this store serves
    fn environment(&self) -> StoreEnvironment;

    // =========================================================================
    // Documents
    // =========================================================================

    /// List documents of a kind
    async fn list(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>>;

    /// Get a document by id
    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Document>>;

    /// Find the document stamped with `import_id`
    async fn find_by_import_id(&self, kind: DocumentKind, import_id: &str) -> Result<Option<Document>>;

    /// Create a document, assigning it a new id
    async fn create(&self, kind: DocumentKind, payload: Value) -> Result<Document>;

    /// Apply a partial update to a document
    async fn update(&self, kind: DocumentKind, id: &str, changes: &PartialUpdate) -> Result<Document>;

    /// Apply a partial update to one member of an embedded collection
    /// (`tokens`, `notes`, `results`, `items`, ...)
    async fn update_nested_member(
        &self,
        parent_kind: DocumentKind,
        parent_id: &str,
        collection: &str,
        member_id: &str,
        changes: &PartialUpdate,
    ) -> Result<()>;

    // =========================================================================
    // Folders
    // =========================================================================

    /// List every folder in the store
    async fn list_folders(&self) -> Result<Vec<Folder>>;

    /// Create a folder
    async fn create_folder(&self, folder: NewFolder) -> Result<Folder>;

    // =========================================================================
    // Files
    // =========================================================================

    /// List files in a directory, or files matching a glob when `options.wildcard` is set
    async fn browse(&self, area: StorageArea, path: &str, options: &BrowseOptions) -> Result<Vec<String>>;

    /// Read a file's bytes
    async fn read_binary(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a file's bytes
    async fn upload_binary(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Make sure a directory exists
    async fn ensure_directory(&self, path: &str) -> Result<()>;

    // =========================================================================
    // Collections
    // =========================================================================

    /// List every collection pack
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Get a collection by pack id
    async fn get_collection(&self, pack_id: &str) -> Result<Option<CollectionInfo>>;

    /// Find a collection by its display label
    async fn find_collection_by_label(&self, label: &str) -> Result<Option<CollectionInfo>>;

    /// Create a world-owned collection holding documents of `kind`
    async fn create_collection(&self, kind: DocumentKind, label: &str) -> Result<CollectionInfo>;

    /// Id/name index of a collection
    async fn collection_index(&self, pack_id: &str) -> Result<Vec<DocumentSummary>>;

    /// Full content of a collection
    async fn collection_content(&self, pack_id: &str) -> Result<Vec<Document>>;

    /// Get one collection entry
    async fn collection_get(&self, pack_id: &str, entry_id: &str) -> Result<Option<Document>>;

    /// Import a payload into a collection, assigning it a new id
    async fn collection_import(&self, pack_id: &str, payload: Value) -> Result<Document>;

    /// Apply a partial update to a collection entry
    async fn collection_update(&self, pack_id: &str, entry_id: &str, changes: &PartialUpdate) -> Result<Document>;
}
