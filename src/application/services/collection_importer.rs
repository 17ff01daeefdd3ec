//! Collection importer - materializes bundled compendium packs
//!
//! Each bundled pack lands in the destination pack with the same label, which
//! is created when absent. Entries are deduplicated by display name against
//! the destination index, so a second import of the same pack adds nothing.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::application::ports::outbound::ContentStorePort;
use crate::application::services::bundle_reader::ImportContext;
use crate::application::services::errors::AdventureError;
use crate::application::services::kind_strategy::{DocumentStrategy, KindRegistry, KindStrategy};
use crate::application::services::revisit_queue::DocumentAddress;
use crate::domain::entities::{
    payload_has_reference, stamp_import_id, BundleArchive, BundledCollection, CollectionInfo,
    DocumentSummary,
};
use crate::domain::value_objects::DocumentKind;

pub struct CollectionImporter<'a> {
    store: &'a dyn ContentStorePort,
    registry: &'a KindRegistry,
}

impl<'a> CollectionImporter<'a> {
    pub fn new(store: &'a dyn ContentStorePort, registry: &'a KindRegistry) -> Self {
        Self { store, registry }
    }

    /// Import every `compendium/*.json` file of the bundle
    pub async fn import_all(&self, archive: &BundleArchive, ctx: &mut ImportContext) {
        for path in archive.document_files(DocumentKind::Compendium.folder_name()) {
            let parsed = archive
                .get(path)
                .map(serde_json::from_slice::<BundledCollection>)
                .transpose();
            match parsed {
                Ok(Some(bundled)) => self.import_pack(archive, bundled, ctx).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        error = %AdventureError::MalformedBundle(format!("{}: {}", path, e)),
                        "Skipping collection"
                    );
                    ctx.summary.record_failed(DocumentKind::Compendium);
                }
            }
        }
    }

    async fn import_pack(&self, archive: &BundleArchive, bundled: BundledCollection, ctx: &mut ImportContext) {
        let BundledCollection { info, items } = bundled;
        let Some(destination) = self.destination_for(&info).await else {
            ctx.summary.record_failed(DocumentKind::Compendium);
            return;
        };
        if destination.locked {
            warn!(pack = %destination.id, "Destination collection is locked, skipping its entries");
            return;
        }
        ctx.collections
            .insert(info.id.clone(), destination.id.clone());

        let mut index: Vec<DocumentSummary> = match self.store.collection_index(&destination.id).await {
            Ok(index) => index,
            Err(e) => {
                warn!(pack = %destination.id, error = %e, "Failed to read collection index");
                Vec::new()
            }
        };
        let strategy: Arc<dyn KindStrategy> = self
            .registry
            .get(info.kind)
            .unwrap_or_else(|| Arc::new(DocumentStrategy::new(info.kind)));

        let (mut created, mut skipped) = (0, 0);
        for item in items {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if index.iter().any(|entry| entry.name == name) {
                warn!(
                    pack = %destination.id,
                    name = %name,
                    "Collection already holds an entry with this name, skipping"
                );
                ctx.summary.record_skipped(DocumentKind::Compendium);
                skipped += 1;
                continue;
            }

            match self
                .import_entry(archive, strategy.as_ref(), &destination, item, ctx)
                .await
            {
                Some(entry) => {
                    index.push(entry);
                    ctx.summary.record_created(DocumentKind::Compendium);
                    created += 1;
                }
                None => ctx.summary.record_failed(DocumentKind::Compendium),
            }
        }
        info!(pack = %destination.id, created, skipped, "Collection imported");
    }

    /// Find the destination pack by label, creating it when absent
    async fn destination_for(&self, info: &CollectionInfo) -> Option<CollectionInfo> {
        match self.store.find_collection_by_label(&info.label).await {
            Ok(Some(existing)) => {
                debug!(label = %info.label, pack = %existing.id, "Reusing collection");
                return Some(existing);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(label = %info.label, error = %e, "Failed to look up collection");
                return None;
            }
        }
        match self.store.create_collection(info.kind, &info.label).await {
            Ok(created) => Some(created),
            Err(e) => {
                warn!(label = %info.label, error = %e, "Failed to create collection");
                None
            }
        }
    }

    async fn import_entry(
        &self,
        archive: &BundleArchive,
        strategy: &dyn KindStrategy,
        destination: &CollectionInfo,
        mut item: Value,
        ctx: &mut ImportContext,
    ) -> Option<DocumentSummary> {
        let needs_revisit = payload_has_reference(&item);
        let import_id = item
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let owner_id = import_id.clone().unwrap_or_default();

        for field in strategy.collect_asset_fields(&owner_id, &item) {
            let Some(bundle_path) = item
                .pointer(&field.pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            let live = ctx.assets.materialize(self.store, archive, &bundle_path).await;
            if let Some(slot) = item.pointer_mut(&field.pointer) {
                *slot = Value::String(live);
            }
        }

        if let Some(import_id) = &import_id {
            stamp_import_id(&mut item, import_id);
        }
        if let Some(object) = item.as_object_mut() {
            object.remove("_id");
            object.remove("folder");
        }

        let name = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match self.store.collection_import(&destination.id, item).await {
            Ok(created) => {
                if needs_revisit {
                    ctx.revisit.push(DocumentAddress::Collection {
                        pack_id: destination.id.clone(),
                        entry_id: created.id.clone(),
                    });
                }
                Some(created.summary())
            }
            Err(e) => {
                error!(
                    error = %AdventureError::DocumentCreate {
                        kind: DocumentKind::Compendium,
                        name,
                        reason: e.to_string(),
                    },
                    "Collection entry skipped"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::ImportOptions;
    use crate::application::services::bundle_reader::BundleReader;
    use crate::application::services::folder_tree::FolderTreeBuilder;
    use crate::domain::entities::{BundleManifest, BundleOptions, MANIFEST_FILE, SCHEMA_VERSION};
    use crate::infrastructure::persistence::InMemoryContentStore;
    use serde_json::json;

    fn pack_archive() -> BundleArchive {
        let mut archive = BundleArchive::new();
        archive
            .insert_json(
                "compendium/world.loot.json",
                &json!({
                    "info": { "id": "world.loot", "label": "Loot", "kind": "Item", "package": "world" },
                    "items": [
                        { "_id": "e1", "name": "Gem", "img": "compendium/images/e1/gem.png" },
                        { "_id": "e2", "name": "Map", "data": { "description": "Leads to @Compendium[world.loot.e1]{Gem}" } }
                    ]
                }),
            )
            .unwrap();
        archive.insert("compendium/images/e1/gem.png", b"gem".to_vec());
        archive
            .insert_json(
                MANIFEST_FILE,
                &BundleManifest {
                    id: "b1".to_string(),
                    name: "Treasure".to_string(),
                    description: String::new(),
                    system: "dnd5e".to_string(),
                    modules: vec![],
                    version: SCHEMA_VERSION,
                    options: BundleOptions::default(),
                    exported_at: None,
                },
            )
            .unwrap();
        archive
    }

    async fn import(store: &InMemoryContentStore, archive: &BundleArchive) -> ImportContext {
        let registry = KindRegistry::standard();
        let reader = BundleReader::new(store, &registry, FolderTreeBuilder::new(3), "adventures");
        let mut ctx = reader.begin(archive, ImportOptions::default()).unwrap();
        CollectionImporter::new(store, &registry)
            .import_all(archive, &mut ctx)
            .await;
        ctx
    }

    #[tokio::test]
    async fn test_pack_is_created_and_entries_imported() {
        let store = InMemoryContentStore::default();
        let ctx = import(&store, &pack_archive()).await;

        let pack = store.find_collection_by_label("Loot").await.unwrap().unwrap();
        let entries = store.collection_content(&pack.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        let gem = entries.iter().find(|e| e.name == "Gem").unwrap();
        assert_eq!(gem.import_id(), Some("e1"));
        assert_eq!(
            gem.payload["img"],
            json!("adventures/world/Treasure/compendium/images/e1/gem.png")
        );
        assert_eq!(ctx.collections.get("world.loot"), Some(&pack.id));
        assert_eq!(ctx.revisit.len(), 1);
        assert_eq!(ctx.summary.created_count(DocumentKind::Compendium), 2);
    }

    #[tokio::test]
    async fn test_entries_with_existing_names_are_skipped() {
        let store = InMemoryContentStore::default();
        let archive = pack_archive();
        import(&store, &archive).await;
        let again = import(&store, &archive).await;

        let pack = store.find_collection_by_label("Loot").await.unwrap().unwrap();
        assert_eq!(store.collection_content(&pack.id).await.unwrap().len(), 2);
        assert_eq!(again.summary.created_count(DocumentKind::Compendium), 0);
        assert_eq!(again.summary.skipped_total(), 2);
    }
}
