//! Bundle writer - export orchestration
//!
//! Walks the selected documents kind by kind, relocates their assets, writes
//! one canonical JSON file per document, then the folder list and finally the
//! manifest.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::application::dto::{ExportRequest, ExportSummary};
use crate::application::ports::outbound::ContentStorePort;
use crate::application::services::asset_relocator::AssetExporter;
use crate::application::services::errors::AdventureError;
use crate::application::services::folder_tree::FolderTreeBuilder;
use crate::application::services::kind_strategy::{KindRegistry, KindStrategy};
use crate::application::services::progress::ProgressTracker;
use crate::domain::entities::{
    BundleArchive, BundleManifest, BundleOptions, BundledCollection, StoreEnvironment,
    BUNDLE_EXTENSION, FOLDERS_FILE, MANIFEST_FILE, SCHEMA_VERSION,
};
use crate::domain::value_objects::{sanitize_filename, BundleId, DocumentKind};

/// An archive built in memory, not yet encoded
#[derive(Debug)]
pub struct WrittenBundle {
    pub archive: BundleArchive,
    pub manifest: BundleManifest,
    pub summary: ExportSummary,
}

/// Name used when the caller gave none
pub fn default_adventure_name() -> String {
    format!("Adventure {}", Utc::now().timestamp_millis())
}

/// Suggested download filename for a bundle
pub fn bundle_filename(name: &str) -> String {
    format!("{}.{}", sanitize_filename(name, "_"), BUNDLE_EXTENSION)
}

pub struct BundleWriter<'a> {
    store: &'a dyn ContentStorePort,
    registry: &'a KindRegistry,
    folders: FolderTreeBuilder,
    progress: &'a ProgressTracker,
}

impl<'a> BundleWriter<'a> {
    pub fn new(
        store: &'a dyn ContentStorePort,
        registry: &'a KindRegistry,
        folders: FolderTreeBuilder,
        progress: &'a ProgressTracker,
    ) -> Self {
        Self {
            store,
            registry,
            folders,
            progress,
        }
    }

    #[instrument(skip(self, request), fields(documents = request.document_count(), collections = request.collections.len()))]
    pub async fn write(&self, request: &ExportRequest) -> Result<WrittenBundle, AdventureError> {
        let environment = self.store.environment();
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_adventure_name);

        let mut archive = BundleArchive::new();
        let mut assets = AssetExporter::new();
        let mut written: BTreeMap<DocumentKind, usize> = BTreeMap::new();

        self.progress
            .add_work(request.document_count() + request.collections.len());

        for (&kind, ids) in &request.documents {
            let Some(strategy) = self.registry.get(kind) else {
                warn!(kind = %kind, "Kind cannot be exported as documents, skipping selection");
                for _ in ids {
                    self.progress.advance();
                }
                continue;
            };
            for id in ids {
                match self
                    .write_document(strategy.as_ref(), id, &environment, request.preserve_folders, &mut archive, &mut assets)
                    .await
                {
                    Ok(true) => *written.entry(kind).or_default() += 1,
                    Ok(false) => warn!(kind = %kind, id = %id, "Selected document not found, skipping"),
                    Err(e) => warn!(kind = %kind, id = %id, error = %e, "Failed to export document"),
                }
                self.progress.advance();
            }
        }

        let mut collections = 0;
        for pack_id in &request.collections {
            match self
                .write_collection(pack_id, &environment, &mut archive, &mut assets)
                .await
            {
                Ok(true) => collections += 1,
                Ok(false) => {}
                Err(e) => warn!(pack = %pack_id, error = %e, "Failed to export collection"),
            }
            self.progress.advance();
        }

        let folders = if request.preserve_folders {
            self.write_folders(request, &mut archive).await?
        } else {
            0
        };

        let manifest = BundleManifest {
            id: BundleId::new().to_string(),
            name: name.clone(),
            description: request.description.clone(),
            system: environment.system_id.clone(),
            modules: environment.active_modules.clone(),
            version: SCHEMA_VERSION,
            options: BundleOptions {
                folders: request.preserve_folders,
            },
            exported_at: Some(Utc::now()),
        };
        archive
            .insert_json(MANIFEST_FILE, &manifest)
            .map_err(|e| AdventureError::Archive(e.to_string()))?;

        let summary = ExportSummary {
            bundle_id: manifest.id.clone(),
            filename: bundle_filename(&name),
            name,
            documents: written,
            collections,
            folders,
            assets: assets.stats(),
            progress: self.progress.snapshot(),
        };
        info!(
            bundle = %summary.name,
            documents = summary.document_total(),
            assets = summary.assets.copied,
            "Adventure exported"
        );

        Ok(WrittenBundle {
            archive,
            manifest,
            summary,
        })
    }

    async fn write_document(
        &self,
        strategy: &dyn KindStrategy,
        id: &str,
        environment: &StoreEnvironment,
        keep_folder: bool,
        archive: &mut BundleArchive,
        assets: &mut AssetExporter,
    ) -> anyhow::Result<bool> {
        let kind = strategy.kind();
        let Some(mut document) = self.store.get(kind, id).await? else {
            return Ok(false);
        };

        let owner_id = document.id.clone();
        self.relocate_assets(strategy, kind, &owner_id, &mut document.payload, archive, assets)
            .await;

        let value = strategy.serialize(document, environment, keep_folder);
        archive.insert_json(format!("{}/{}.json", kind.folder_name(), owner_id), &value)?;
        debug!(kind = %kind, id = %owner_id, "Document written");
        Ok(true)
    }

    async fn write_collection(
        &self,
        pack_id: &str,
        environment: &StoreEnvironment,
        archive: &mut BundleArchive,
        assets: &mut AssetExporter,
    ) -> anyhow::Result<bool> {
        let Some(info) = self.store.get_collection(pack_id).await? else {
            warn!(pack = %pack_id, "Selected collection not found, skipping");
            return Ok(false);
        };
        if !info.is_world_owned() {
            warn!(pack = %pack_id, package = %info.package, "Only world-owned collections can be exported");
            return Ok(false);
        }
        let Some(strategy) = self.registry.get(info.kind) else {
            warn!(pack = %pack_id, kind = %info.kind, "Collection holds a kind that cannot be exported");
            return Ok(false);
        };

        let mut items = Vec::new();
        for mut entry in self.store.collection_content(pack_id).await? {
            let owner_id = entry.id.clone();
            self.relocate_assets(
                strategy.as_ref(),
                DocumentKind::Compendium,
                &owner_id,
                &mut entry.payload,
                archive,
                assets,
            )
            .await;
            items.push(strategy.serialize(entry, environment, false));
        }

        let path = format!("{}/{}.json", DocumentKind::Compendium.folder_name(), info.id);
        archive.insert_json(path, &BundledCollection { info, items })?;
        Ok(true)
    }

    async fn write_folders(&self, request: &ExportRequest, archive: &mut BundleArchive) -> Result<usize, AdventureError> {
        let kinds: HashSet<DocumentKind> = request
            .documents
            .keys()
            .copied()
            .filter(DocumentKind::supports_folders)
            .collect();
        let live = self.store.list_folders().await?;
        let records = self.folders.flatten(&live, &kinds);
        archive
            .insert_json(FOLDERS_FILE, &records)
            .map_err(|e| AdventureError::Archive(e.to_string()))?;
        Ok(records.len())
    }

    /// Route every asset field of `payload` through the relocator.
    ///
    /// Nested fields grow the progress total as they are discovered.
    async fn relocate_assets(
        &self,
        strategy: &dyn KindStrategy,
        bundle_kind: DocumentKind,
        owner_id: &str,
        payload: &mut Value,
        archive: &mut BundleArchive,
        assets: &mut AssetExporter,
    ) {
        let fields = strategy.collect_asset_fields(owner_id, payload);
        self.progress
            .add_work(fields.iter().filter(|field| field.nested).count());

        for field in fields {
            let Some(path) = payload
                .pointer(&field.pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            let relocated = assets
                .relocate(self.store, archive, &path, bundle_kind, &field)
                .await;
            if let Some(slot) = payload.pointer_mut(&field.pointer) {
                *slot = Value::String(relocated);
            }
            if field.nested {
                self.progress.advance();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CollectionInfo, NewFolder};
    use crate::infrastructure::persistence::InMemoryContentStore;
    use serde_json::json;

    async fn write(store: &InMemoryContentStore, request: &ExportRequest) -> WrittenBundle {
        let registry = KindRegistry::standard();
        let progress = ProgressTracker::new();
        BundleWriter::new(store, &registry, FolderTreeBuilder::new(3), &progress)
            .write(request)
            .await
            .unwrap()
    }

    fn json_at(archive: &BundleArchive, path: &str) -> Value {
        serde_json::from_slice(archive.get(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_writes_documents_assets_and_manifest() {
        let store = InMemoryContentStore::default();
        store.insert_file("worlds/w/goblin.png", b"png".to_vec()).await;
        let actor = store
            .insert_document(
                DocumentKind::Actor,
                json!({
                    "name": "Goblin",
                    "img": "worlds/w/goblin.png",
                    "folder": "f1",
                    "permission": { "default": 0 },
                    "token": { "img": "icons/svg/mystery-man.svg" }
                }),
            )
            .await;

        let bundle = write(
            &store,
            &ExportRequest::named("Goblin Den").with_documents(DocumentKind::Actor, [actor.id.clone()]),
        )
        .await;

        let written = json_at(&bundle.archive, &format!("actor/{}.json", actor.id));
        assert_eq!(written["img"], json!(format!("actor/images/{}/goblin.png", actor.id)));
        assert_eq!(written["token"]["img"], json!("*icons/svg/mystery-man.svg"));
        assert!(written.get("folder").is_none());
        assert!(written.get("permission").is_none());

        let manifest: BundleManifest = serde_json::from_value(json_at(&bundle.archive, MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.name, "Goblin Den");
        assert_eq!(manifest.system, "dnd5e");
        assert!(!manifest.options.folders);
        assert!(!bundle.archive.contains(FOLDERS_FILE));
        assert_eq!(bundle.summary.filename, "Goblin Den.fvttadv");
        assert_eq!(bundle.archive.paths().last(), Some(MANIFEST_FILE));
    }

    #[tokio::test]
    async fn test_nested_assets_grow_progress_total() {
        let store = InMemoryContentStore::default();
        store.insert_file("maps/cave.webp", b"map".to_vec()).await;
        store.insert_file("tokens/goblin.png", b"tok".to_vec()).await;
        let scene = store
            .insert_document(
                DocumentKind::Scene,
                json!({
                    "name": "Cave",
                    "img": "maps/cave.webp",
                    "tokens": [
                        { "_id": "t1", "img": "tokens/goblin.png" },
                        { "_id": "t2", "img": "tokens/goblin.png" }
                    ]
                }),
            )
            .await;

        let bundle = write(
            &store,
            &ExportRequest::named("Cave").with_documents(DocumentKind::Scene, [scene.id.clone()]),
        )
        .await;

        let written = json_at(&bundle.archive, &format!("scene/{}.json", scene.id));
        assert_eq!(written["tokens"][0]["img"], json!("scene/tokenimage/t1/goblin.png"));
        // second token hits the cache and reuses the first bundle path
        assert_eq!(written["tokens"][1]["img"], json!("scene/tokenimage/t1/goblin.png"));
        assert_eq!(bundle.summary.progress.total, 3);
        assert_eq!(bundle.summary.progress.processed, 3);
        assert_eq!(bundle.summary.assets.copied, 2);
    }

    #[tokio::test]
    async fn test_preserved_folders_are_flattened_with_import_keys() {
        let store = InMemoryContentStore::default();
        let root = store
            .insert_folder(NewFolder {
                name: "Monsters".to_string(),
                kind: DocumentKind::Actor,
                parent_id: None,
                import_id: None,
                color: None,
            })
            .await;
        let child = store
            .insert_folder(NewFolder {
                name: "Goblins".to_string(),
                kind: DocumentKind::Actor,
                parent_id: Some(root.id.clone()),
                import_id: None,
                color: None,
            })
            .await;
        let actor = store
            .insert_document(DocumentKind::Actor, json!({ "name": "Boss", "folder": child.id }))
            .await;

        let bundle = write(
            &store,
            &ExportRequest::named("Den")
                .with_documents(DocumentKind::Actor, [actor.id.clone()])
                .preserving_folders(),
        )
        .await;

        let folders = json_at(&bundle.archive, FOLDERS_FILE);
        assert_eq!(folders.as_array().unwrap().len(), 2);
        assert_eq!(folders[1]["parentId"], json!(root.id));
        let written = json_at(&bundle.archive, &format!("actor/{}.json", actor.id));
        assert_eq!(written["folder"], json!(child.id));
        assert_eq!(bundle.summary.folders, 2);
    }

    #[tokio::test]
    async fn test_only_world_collections_are_exported() {
        let store = InMemoryContentStore::default();
        let world = store
            .insert_collection(CollectionInfo {
                id: "world.loot".to_string(),
                label: "Loot".to_string(),
                kind: DocumentKind::Item,
                package: "world".to_string(),
                locked: false,
            })
            .await;
        store
            .insert_collection_entry(&world.id, json!({ "name": "Gem", "folder": "x" }))
            .await;
        store
            .insert_collection(CollectionInfo {
                id: "dnd5e.items".to_string(),
                label: "Items".to_string(),
                kind: DocumentKind::Item,
                package: "dnd5e".to_string(),
                locked: true,
            })
            .await;

        let bundle = write(
            &store,
            &ExportRequest::named("Loot")
                .with_collection("world.loot")
                .with_collection("dnd5e.items"),
        )
        .await;

        let pack: BundledCollection =
            serde_json::from_value(json_at(&bundle.archive, "compendium/world.loot.json")).unwrap();
        assert_eq!(pack.items.len(), 1);
        assert!(pack.items[0].get("folder").is_none());
        assert!(!bundle.archive.contains("compendium/dnd5e.items.json"));
        assert_eq!(bundle.summary.collections, 1);
    }

    #[tokio::test]
    async fn test_blank_name_gets_timestamped_default() {
        let store = InMemoryContentStore::default();
        let bundle = write(&store, &ExportRequest::named("   ")).await;
        assert!(bundle.manifest.name.starts_with("Adventure "));
    }
}
