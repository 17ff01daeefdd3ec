//! In-memory content store
//!
//! A complete [`ContentStorePort`] kept behind a tokio `RwLock`. Used as the
//! store double in tests and for embedding the codec without a database.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::application::ports::outbound::{BrowseOptions, ContentStorePort, StorageArea};
use crate::domain::entities::{
    CollectionInfo, Document, DocumentSummary, Folder, NewFolder, StoreEnvironment, WORLD_PACKAGE,
};
use crate::domain::value_objects::{random_document_id, DocumentKind, PartialUpdate};
use crate::infrastructure::persistence::store_support::{unique_id, world_collection_id, BrowseFilter};

#[derive(Debug, Default)]
struct StoreState {
    documents: HashMap<DocumentKind, Vec<Document>>,
    folders: Vec<Folder>,
    files: BTreeMap<String, Vec<u8>>,
    directories: BTreeSet<String>,
    collections: Vec<CollectionInfo>,
    entries: HashMap<String, Vec<Document>>,
    rejected_names: HashSet<String>,
    nested_updates: usize,
}

impl StoreState {
    fn document_mut(&mut self, kind: DocumentKind, id: &str) -> Result<&mut Document> {
        match self
            .documents
            .get_mut(&kind)
            .and_then(|documents| documents.iter_mut().find(|d| d.id == id))
        {
            Some(document) => Ok(document),
            None => bail!("{} not found: {}", kind, id),
        }
    }

    fn collection(&self, pack_id: &str) -> Result<&CollectionInfo> {
        match self.collections.iter().find(|c| c.id == pack_id) {
            Some(info) => Ok(info),
            None => bail!("Collection not found: {}", pack_id),
        }
    }

    fn entries(&self, pack_id: &str) -> Result<&[Document]> {
        self.collection(pack_id)?;
        Ok(self
            .entries
            .get(pack_id)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}

pub struct InMemoryContentStore {
    environment: StoreEnvironment,
    state: RwLock<StoreState>,
}

impl InMemoryContentStore {
    pub fn with_environment(environment: StoreEnvironment) -> Self {
        Self {
            environment,
            state: RwLock::new(StoreState::default()),
        }
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Insert a document as-is, keeping its `_id` when it has one
    pub async fn insert_document(&self, kind: DocumentKind, payload: Value) -> Document {
        let id = payload
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(random_document_id);
        let document = Document::new(kind, id, payload);
        self.state
            .write()
            .await
            .documents
            .entry(kind)
            .or_default()
            .push(document.clone());
        document
    }

    pub async fn document(&self, kind: DocumentKind, id: &str) -> Option<Document> {
        self.state
            .read()
            .await
            .documents
            .get(&kind)
            .and_then(|documents| documents.iter().find(|d| d.id == id))
            .cloned()
    }

    /// Documents of a kind in creation order
    pub async fn documents(&self, kind: DocumentKind) -> Vec<Document> {
        self.state
            .read()
            .await
            .documents
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.values().map(Vec::len).sum()
    }

    pub async fn insert_folder(&self, folder: NewFolder) -> Folder {
        let folder = Folder {
            id: random_document_id(),
            name: folder.name,
            kind: folder.kind,
            parent_id: folder.parent_id,
            import_id: folder.import_id,
            color: folder.color,
        };
        self.state.write().await.folders.push(folder.clone());
        folder
    }

    pub async fn folders(&self) -> Vec<Folder> {
        self.state.read().await.folders.clone()
    }

    pub async fn insert_file(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.state.write().await.files.insert(path.into(), bytes);
    }

    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.read().await.files.get(path).cloned()
    }

    /// Every stored file path, sorted
    pub async fn files(&self) -> Vec<String> {
        self.state.read().await.files.keys().cloned().collect()
    }

    pub async fn has_directory(&self, path: &str) -> bool {
        self.state.read().await.directories.contains(path)
    }

    pub async fn insert_collection(&self, info: CollectionInfo) -> CollectionInfo {
        self.state.write().await.collections.push(info.clone());
        info
    }

    /// Add an entry to a collection, bypassing the lock check
    pub async fn insert_collection_entry(&self, pack_id: &str, payload: Value) -> Document {
        let mut state = self.state.write().await;
        let kind = state
            .collections
            .iter()
            .find(|c| c.id == pack_id)
            .map(|c| c.kind)
            .unwrap_or(DocumentKind::Item);
        let document = Document::new(kind, random_document_id(), payload);
        state
            .entries
            .entry(pack_id.to_string())
            .or_default()
            .push(document.clone());
        document
    }

    /// Make every later `create` of a document with this name fail
    pub async fn reject_creates_named(&self, name: impl Into<String>) {
        self.state.write().await.rejected_names.insert(name.into());
    }

    /// Number of nested member updates applied so far
    pub async fn nested_update_count(&self) -> usize {
        self.state.read().await.nested_updates
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::with_environment(StoreEnvironment {
            world_id: "world".to_string(),
            system_id: "dnd5e".to_string(),
            system_version: "1.0.0".to_string(),
            core_version: "0.7.9".to_string(),
            active_modules: Vec::new(),
        })
    }
}

#[async_trait]
impl ContentStorePort for InMemoryContentStore {
    fn environment(&self) -> StoreEnvironment {
        self.environment.clone()
    }

    async fn list(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>> {
        Ok(self
            .documents(kind)
            .await
            .iter()
            .map(Document::summary)
            .collect())
    }

    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Document>> {
        Ok(self.document(kind, id).await)
    }

    async fn find_by_import_id(&self, kind: DocumentKind, import_id: &str) -> Result<Option<Document>> {
        Ok(self
            .state
            .read()
            .await
            .documents
            .get(&kind)
            .and_then(|documents| documents.iter().find(|d| d.import_id() == Some(import_id)))
            .cloned())
    }

    async fn create(&self, kind: DocumentKind, payload: Value) -> Result<Document> {
        let mut state = self.state.write().await;
        let name = payload.get("name").and_then(Value::as_str).unwrap_or_default();
        if state.rejected_names.contains(name) {
            bail!("Store rejected {} '{}'", kind, name);
        }
        let document = Document::new(kind, random_document_id(), payload);
        state
            .documents
            .entry(kind)
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn update(&self, kind: DocumentKind, id: &str, changes: &PartialUpdate) -> Result<Document> {
        let mut state = self.state.write().await;
        let document = state.document_mut(kind, id)?;
        changes.apply_to(&mut document.payload);
        document.refresh();
        Ok(document.clone())
    }

    async fn update_nested_member(
        &self,
        parent_kind: DocumentKind,
        parent_id: &str,
        collection: &str,
        member_id: &str,
        changes: &PartialUpdate,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let document = state.document_mut(parent_kind, parent_id)?;
        let member = document
            .payload
            .get_mut(collection)
            .and_then(Value::as_array_mut)
            .and_then(|members| {
                members
                    .iter_mut()
                    .find(|m| m.get("_id").and_then(Value::as_str) == Some(member_id))
            });
        let Some(member) = member else {
            bail!("{} {} has no {} member {}", parent_kind, parent_id, collection, member_id);
        };
        changes.apply_to(member);
        state.nested_updates += 1;
        Ok(())
    }

    async fn list_folders(&self) -> Result<Vec<Folder>> {
        Ok(self.folders().await)
    }

    async fn create_folder(&self, folder: NewFolder) -> Result<Folder> {
        if let Some(parent) = &folder.parent_id {
            if !self.state.read().await.folders.iter().any(|f| &f.id == parent) {
                bail!("Parent folder not found: {}", parent);
            }
        }
        Ok(self.insert_folder(folder).await)
    }

    async fn browse(&self, area: StorageArea, path: &str, options: &BrowseOptions) -> Result<Vec<String>> {
        if area == StorageArea::Core {
            return Ok(Vec::new());
        }
        let filter = BrowseFilter::new(path, options);
        Ok(self
            .state
            .read()
            .await
            .files
            .keys()
            .filter(|file| filter.matches(file))
            .cloned()
            .collect())
    }

    async fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        match self.file(path).await {
            Some(bytes) => Ok(bytes),
            None => bail!("File not found: {}", path),
        }
    }

    async fn upload_binary(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.insert_file(path, bytes).await;
        Ok(())
    }

    async fn ensure_directory(&self, path: &str) -> Result<()> {
        self.state
            .write()
            .await
            .directories
            .insert(path.trim_end_matches('/').to_string());
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self.state.read().await.collections.clone())
    }

    async fn get_collection(&self, pack_id: &str) -> Result<Option<CollectionInfo>> {
        Ok(self
            .state
            .read()
            .await
            .collections
            .iter()
            .find(|c| c.id == pack_id)
            .cloned())
    }

    async fn find_collection_by_label(&self, label: &str) -> Result<Option<CollectionInfo>> {
        Ok(self
            .state
            .read()
            .await
            .collections
            .iter()
            .find(|c| c.label == label)
            .cloned())
    }

    async fn create_collection(&self, kind: DocumentKind, label: &str) -> Result<CollectionInfo> {
        let mut state = self.state.write().await;
        let id = unique_id(world_collection_id(label), |candidate| {
            state.collections.iter().any(|c| c.id == candidate)
        });
        let info = CollectionInfo {
            id,
            label: label.to_string(),
            kind,
            package: WORLD_PACKAGE.to_string(),
            locked: false,
        };
        state.collections.push(info.clone());
        Ok(info)
    }

    async fn collection_index(&self, pack_id: &str) -> Result<Vec<DocumentSummary>> {
        let state = self.state.read().await;
        Ok(state
            .entries(pack_id)?
            .iter()
            .map(Document::summary)
            .collect())
    }

    async fn collection_content(&self, pack_id: &str) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        Ok(state.entries(pack_id)?.to_vec())
    }

    async fn collection_get(&self, pack_id: &str, entry_id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state
            .entries(pack_id)?
            .iter()
            .find(|entry| entry.id == entry_id)
            .cloned())
    }

    async fn collection_import(&self, pack_id: &str, payload: Value) -> Result<Document> {
        let mut state = self.state.write().await;
        let info = state.collection(pack_id)?;
        if info.locked {
            bail!("Collection {} is locked", pack_id);
        }
        let document = Document::new(info.kind, random_document_id(), payload);
        state
            .entries
            .entry(pack_id.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn collection_update(&self, pack_id: &str, entry_id: &str, changes: &PartialUpdate) -> Result<Document> {
        let mut state = self.state.write().await;
        state.collection(pack_id)?;
        let entry = state
            .entries
            .get_mut(pack_id)
            .and_then(|entries| entries.iter_mut().find(|e| e.id == entry_id));
        let Some(entry) = entry else {
            bail!("Entry {} not found in {}", entry_id, pack_id);
        };
        changes.apply_to(&mut entry.payload);
        entry.refresh();
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_assigns_fresh_ids_and_import_lookup_works() {
        let store = InMemoryContentStore::default();
        let created = store
            .create(DocumentKind::Item, json!({ "name": "Rope", "flags": { "importid": "src1" } }))
            .await
            .unwrap();
        assert_eq!(created.id.len(), 16);
        assert_eq!(created.payload["_id"], json!(created.id));

        let found = store
            .find_by_import_id(DocumentKind::Item, "src1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert!(store
            .find_by_import_id(DocumentKind::Actor, "src1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_wildcard_browse_stays_in_directory() {
        let store = InMemoryContentStore::default();
        store.insert_file("tokens/wolf1.png", vec![]).await;
        store.insert_file("tokens/wolf2.PNG", vec![]).await;
        store.insert_file("tokens/deep/wolf3.png", vec![]).await;

        let found = store
            .browse(StorageArea::Data, "tokens/wolf*", &BrowseOptions::wildcard())
            .await
            .unwrap();
        assert_eq!(found, vec!["tokens/wolf1.png", "tokens/wolf2.PNG"]);

        let pngs = store
            .browse(
                StorageArea::Data,
                "tokens",
                &BrowseOptions {
                    extensions: vec![".png".to_string()],
                    wildcard: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(pngs.len(), 2);
    }

    #[tokio::test]
    async fn test_created_collections_get_unique_world_ids() {
        let store = InMemoryContentStore::default();
        let first = store.create_collection(DocumentKind::Item, "Magic Loot!").await.unwrap();
        let second = store.create_collection(DocumentKind::Item, "Magic Loot!").await.unwrap();
        assert_eq!(first.id, "world.magic-loot");
        assert_eq!(second.id, "world.magic-loot-2");
        assert!(first.is_world_owned());
    }

    #[tokio::test]
    async fn test_nested_member_update_requires_member() {
        let store = InMemoryContentStore::default();
        let scene = store
            .insert_document(DocumentKind::Scene, json!({ "name": "Cave", "tokens": [{ "_id": "t1" }] }))
            .await;
        store
            .update_nested_member(DocumentKind::Scene, &scene.id, "tokens", "t1", &PartialUpdate::single("actorId", "a9"))
            .await
            .unwrap();
        assert!(store
            .update_nested_member(DocumentKind::Scene, &scene.id, "tokens", "nope", &PartialUpdate::new())
            .await
            .is_err());

        let after = store.document(DocumentKind::Scene, &scene.id).await.unwrap();
        assert_eq!(after.payload["tokens"][0]["actorId"], json!("a9"));
    }
}
