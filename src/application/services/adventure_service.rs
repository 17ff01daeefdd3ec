//! Adventure Service - Application service for adventure export and import
//!
//! This service ties the bundle writer, bundle reader and reference resolver
//! together behind one facade. Export and import calls are serialized through
//! an async mutex; no state survives from one call to the next.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::application::dto::{ExportRequest, ExportedBundle, ImportOptions, ImportSummary};
use crate::application::ports::outbound::{ArchiveCodecPort, ContentStorePort};
use crate::application::services::bundle_reader::{BundleReader, ImportContext};
use crate::application::services::bundle_writer::{BundleWriter, WrittenBundle};
use crate::application::services::errors::AdventureError;
use crate::application::services::folder_tree::FolderTreeBuilder;
use crate::application::services::kind_strategy::KindRegistry;
use crate::application::services::progress::ProgressTracker;
use crate::application::services::reference_resolver::ReferenceResolver;
use crate::domain::entities::{CollectionInfo, DocumentSummary};
use crate::domain::value_objects::DocumentKind;

/// Tunables of the export/import engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Root directory of materialized assets
    pub asset_root: String,
    /// Deepest folder nesting the destination accepts
    pub max_folder_depth: usize,
    /// Ceiling of the reference-resolution pass
    pub revisit_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            asset_root: "adventures".to_string(),
            max_folder_depth: 3,
            revisit_timeout: Duration::from_secs(60),
        }
    }
}

/// Adventure service trait defining the application use cases
#[async_trait]
pub trait AdventureService: Send + Sync {
    /// List documents of a kind, for building an export selection
    async fn list_documents(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>, AdventureError>;

    /// List collection packs, for building an export selection
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdventureError>;

    /// Export the selected documents as an encoded bundle
    async fn export(&self, request: ExportRequest) -> Result<ExportedBundle, AdventureError>;

    /// Import an encoded bundle
    async fn import(&self, bytes: &[u8], options: ImportOptions) -> Result<ImportSummary, AdventureError>;
}

/// Default implementation of AdventureService over a content store port
pub struct AdventureServiceImpl {
    store: Arc<dyn ContentStorePort>,
    codec: Arc<dyn ArchiveCodecPort>,
    registry: KindRegistry,
    settings: EngineSettings,
    lock: Mutex<()>,
}

impl AdventureServiceImpl {
    /// Create a new AdventureServiceImpl with the built-in kind strategies
    pub fn new(store: Arc<dyn ContentStorePort>, codec: Arc<dyn ArchiveCodecPort>, settings: EngineSettings) -> Self {
        Self::with_registry(store, codec, KindRegistry::standard(), settings)
    }

    pub fn with_registry(
        store: Arc<dyn ContentStorePort>,
        codec: Arc<dyn ArchiveCodecPort>,
        registry: KindRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            codec,
            registry,
            settings,
            lock: Mutex::new(()),
        }
    }

    fn folder_builder(&self) -> FolderTreeBuilder {
        FolderTreeBuilder::new(self.settings.max_folder_depth)
    }

    /// Export, reporting progress through `progress`
    #[instrument(skip(self, request, progress))]
    pub async fn export_with_progress(
        &self,
        request: ExportRequest,
        progress: &ProgressTracker,
    ) -> Result<ExportedBundle, AdventureError> {
        let _guard = self.lock.lock().await;

        let writer = BundleWriter::new(self.store.as_ref(), &self.registry, self.folder_builder(), progress);
        let WrittenBundle { archive, summary, .. } = writer.write(&request).await?;
        let bytes = self
            .codec
            .encode(&archive)
            .map_err(|e| AdventureError::Archive(e.to_string()))?;

        Ok(ExportedBundle {
            filename: summary.filename.clone(),
            bytes,
            summary,
        })
    }
}

#[async_trait]
impl AdventureService for AdventureServiceImpl {
    async fn list_documents(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>, AdventureError> {
        Ok(self.store.list(kind).await?)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdventureError> {
        Ok(self.store.list_collections().await?)
    }

    async fn export(&self, request: ExportRequest) -> Result<ExportedBundle, AdventureError> {
        self.export_with_progress(request, &ProgressTracker::new()).await
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn import(&self, bytes: &[u8], options: ImportOptions) -> Result<ImportSummary, AdventureError> {
        let _guard = self.lock.lock().await;

        let archive = self
            .codec
            .decode(bytes)
            .map_err(|e| AdventureError::Archive(e.to_string()))?;
        let reader = BundleReader::new(
            self.store.as_ref(),
            &self.registry,
            self.folder_builder(),
            &self.settings.asset_root,
        );
        let ImportContext {
            id_map,
            collections,
            mut revisit,
            mut summary,
            ..
        } = reader.read(&archive, options).await?;

        let resolver = ReferenceResolver::new(self.store.as_ref(), &self.registry, &id_map, &collections);
        let resolver = &resolver;
        let report = revisit
            .drain(self.settings.revisit_timeout, move |address| resolver.resolve(address))
            .await;

        summary.revisits = report.counts();
        summary.revisit_timed_out = report.timed_out;
        summary.revisit_outcomes = report.outcomes;
        info!(
            bundle = %summary.name,
            created = summary.created_total(),
            skipped = summary.skipped_total(),
            timed_out = summary.revisit_timed_out,
            "Adventure imported"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::domain::entities::{NewFolder, StoreEnvironment};
    use crate::infrastructure::archive::ZipArchiveCodec;
    use crate::infrastructure::persistence::InMemoryContentStore;
    use serde_json::json;

    fn service(store: &Arc<InMemoryContentStore>) -> AdventureServiceImpl {
        AdventureServiceImpl::new(store.clone(), Arc::new(ZipArchiveCodec::default()), EngineSettings::default())
    }

    fn destination(world_id: &str, system_id: &str) -> Arc<InMemoryContentStore> {
        Arc::new(InMemoryContentStore::with_environment(StoreEnvironment {
            world_id: world_id.to_string(),
            system_id: system_id.to_string(),
            system_version: "1.0.0".to_string(),
            core_version: "0.7.9".to_string(),
            active_modules: vec![],
        }))
    }

    async fn name_multiset(store: &InMemoryContentStore, kinds: &[DocumentKind]) -> BTreeMap<(DocumentKind, String), usize> {
        let mut names = BTreeMap::new();
        for kind in kinds {
            for document in store.documents(*kind).await {
                *names.entry((*kind, document.name)).or_default() += 1;
            }
        }
        names
    }

    /// (name, parent name) pairs describing a folder tree's shape
    async fn folder_shape(store: &InMemoryContentStore) -> Vec<(String, Option<String>)> {
        let folders = store.folders().await;
        let mut shape: Vec<_> = folders
            .iter()
            .map(|folder| {
                let parent = folder
                    .parent_id
                    .as_ref()
                    .and_then(|id| folders.iter().find(|f| &f.id == id))
                    .map(|f| f.name.clone());
                (folder.name.clone(), parent)
            })
            .collect();
        shape.sort();
        shape
    }

    #[tokio::test]
    async fn test_round_trip_preserves_documents_and_folder_shape() {
        let source = Arc::new(InMemoryContentStore::default());
        let monsters = source
            .insert_folder(NewFolder {
                name: "Monsters".to_string(),
                kind: DocumentKind::Actor,
                parent_id: None,
                import_id: None,
                color: None,
            })
            .await;
        let goblins = source
            .insert_folder(NewFolder {
                name: "Goblins".to_string(),
                kind: DocumentKind::Actor,
                parent_id: Some(monsters.id.clone()),
                import_id: None,
                color: None,
            })
            .await;
        source.insert_file("worlds/w/boss.png", b"boss".to_vec()).await;
        let boss = source
            .insert_document(
                DocumentKind::Actor,
                json!({ "name": "Boss", "folder": goblins.id, "img": "worlds/w/boss.png" }),
            )
            .await;
        let grunt = source
            .insert_document(DocumentKind::Actor, json!({ "name": "Grunt", "folder": monsters.id }))
            .await;
        let sword = source
            .insert_document(DocumentKind::Item, json!({ "name": "Sword" }))
            .await;

        let bundle = service(&source)
            .export(
                ExportRequest::named("Goblin Den")
                    .with_documents(DocumentKind::Actor, [boss.id.clone(), grunt.id.clone()])
                    .with_documents(DocumentKind::Item, [sword.id.clone()])
                    .preserving_folders(),
            )
            .await
            .unwrap();

        let target = destination("w2", "dnd5e");
        let summary = service(&target)
            .import(&bundle.bytes, ImportOptions::default())
            .await
            .unwrap();

        let kinds = [DocumentKind::Actor, DocumentKind::Item];
        assert_eq!(name_multiset(&source, &kinds).await, name_multiset(&target, &kinds).await);
        assert_eq!(folder_shape(&source).await, folder_shape(&target).await);
        assert_eq!(summary.created_total(), 3);

        let imported_boss = target
            .documents(DocumentKind::Actor)
            .await
            .into_iter()
            .find(|d| d.name == "Boss")
            .unwrap();
        let live_path = imported_boss.payload["img"].as_str().unwrap().to_string();
        assert!(live_path.starts_with("adventures/w2/Goblin Den/actor/images/"));
        assert_eq!(target.file(&live_path).await, Some(b"boss".to_vec()));
    }

    #[tokio::test]
    async fn test_importing_twice_creates_nothing_the_second_time() {
        let source = Arc::new(InMemoryContentStore::default());
        let actor = source
            .insert_document(DocumentKind::Actor, json!({ "name": "Wolf" }))
            .await;
        let note = source
            .insert_document(
                DocumentKind::JournalEntry,
                json!({ "name": "Den", "content": format!("Beware @Actor[{}]{{Wolf}}", actor.id) }),
            )
            .await;
        let bundle = service(&source)
            .export(
                ExportRequest::named("Wolves")
                    .with_documents(DocumentKind::Actor, [actor.id.clone()])
                    .with_documents(DocumentKind::JournalEntry, [note.id.clone()]),
            )
            .await
            .unwrap();

        let target = destination("w2", "dnd5e");
        let svc = service(&target);
        svc.import(&bundle.bytes, ImportOptions::default()).await.unwrap();
        let count_after_first = target.document_count().await;
        let second = svc.import(&bundle.bytes, ImportOptions::default()).await.unwrap();

        assert_eq!(second.created_total(), 0);
        assert_eq!(second.skipped_total(), 2);
        assert_eq!(target.document_count().await, count_after_first);
        assert_eq!(target.folders().await.len(), 2);
    }

    #[tokio::test]
    async fn test_note_token_points_at_imported_character() {
        let source = Arc::new(InMemoryContentStore::default());
        let hero = source
            .insert_document(DocumentKind::Actor, json!({ "name": "Hero" }))
            .await;
        let note = source
            .insert_document(
                DocumentKind::JournalEntry,
                json!({
                    "name": "Briefing",
                    "content": format!(
                        "Talk to @Actor[{id}]{{Hero}} or <a class=\"entity-link\" data-entity=\"Actor\" data-id=\"{id}\">Hero</a>",
                        id = hero.id
                    )
                }),
            )
            .await;
        let bundle = service(&source)
            .export(
                ExportRequest::named("Briefing")
                    .with_documents(DocumentKind::JournalEntry, [note.id.clone()])
                    .with_documents(DocumentKind::Actor, [hero.id.clone()]),
            )
            .await
            .unwrap();

        let target = destination("w2", "dnd5e");
        let summary = service(&target)
            .import(&bundle.bytes, ImportOptions::default())
            .await
            .unwrap();

        let new_hero = &target.documents(DocumentKind::Actor).await[0];
        let imported_note = &target.documents(DocumentKind::JournalEntry).await[0];
        let content = imported_note.payload["content"].as_str().unwrap();
        assert_eq!(
            content,
            format!(
                "Talk to @Actor[{id}]{{Hero}} or <a class=\"entity-link\" data-entity=\"Actor\" data-id=\"{id}\">Hero</a>",
                id = new_hero.id
            )
        );
        assert!(!content.contains(&hero.id));
        assert_eq!(summary.revisits.resolved, 1);
    }

    #[tokio::test]
    async fn test_scene_placements_follow_exported_actors_only() {
        let source = Arc::new(InMemoryContentStore::default());
        let a1 = source.insert_document(DocumentKind::Actor, json!({ "name": "Orc" })).await;
        let a2 = source.insert_document(DocumentKind::Actor, json!({ "name": "Ogre" })).await;
        let a3 = source.insert_document(DocumentKind::Actor, json!({ "name": "Troll" })).await;
        let scene = source
            .insert_document(
                DocumentKind::Scene,
                json!({
                    "name": "Bridge",
                    "tokens": [
                        { "_id": "tok1", "name": "Orc", "actorId": a1.id },
                        { "_id": "tok2", "name": "Ogre", "actorId": a2.id },
                        { "_id": "tok3", "name": "Troll", "actorId": a3.id }
                    ]
                }),
            )
            .await;
        let bundle = service(&source)
            .export(
                ExportRequest::named("Bridge")
                    .with_documents(DocumentKind::Scene, [scene.id.clone()])
                    .with_documents(DocumentKind::Actor, [a1.id.clone(), a2.id.clone()]),
            )
            .await
            .unwrap();

        let target = destination("w2", "dnd5e");
        let summary = service(&target)
            .import(&bundle.bytes, ImportOptions::default())
            .await
            .unwrap();

        let actors = target.documents(DocumentKind::Actor).await;
        let id_of = |name: &str| actors.iter().find(|a| a.name == name).unwrap().id.clone();
        let imported = &target.documents(DocumentKind::Scene).await[0];
        let tokens = imported.payload["tokens"].as_array().unwrap();
        assert_eq!(tokens[0]["actorId"], json!(id_of("Orc")));
        assert_eq!(tokens[1]["actorId"], json!(id_of("Ogre")));
        assert_eq!(tokens[2]["actorId"], json!(a3.id));
        assert_eq!(summary.revisits.partially_resolved, 1);
    }

    #[tokio::test]
    async fn test_bundle_for_other_system_is_rejected() {
        let source = Arc::new(InMemoryContentStore::default());
        let item = source.insert_document(DocumentKind::Item, json!({ "name": "Wand" })).await;
        let bundle = service(&source)
            .export(ExportRequest::named("Wands").with_documents(DocumentKind::Item, [item.id.clone()]))
            .await
            .unwrap();

        let target = destination("w2", "pf2e");
        let err = service(&target)
            .import(&bundle.bytes, ImportOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AdventureError::SystemMismatch { .. }));
        assert_eq!(target.document_count().await, 0);
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_an_archive_error() {
        let target = destination("w2", "dnd5e");
        let err = service(&target)
            .import(b"not a zip", ImportOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdventureError::Archive(_)));
    }
}
