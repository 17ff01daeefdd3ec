//! Bundle reader - import orchestration up to the revisit pass
//!
//! Validates the manifest, replays folders, then materializes documents kind
//! by kind in the fixed import order. Everything the pass learns (id map,
//! folder map, asset cache, pack remapping, revisit queue) lives on one
//! [`ImportContext`] that is dropped when the import ends.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::application::dto::{ImportOptions, ImportSummary};
use crate::application::ports::outbound::ContentStorePort;
use crate::application::services::asset_relocator::AssetImporter;
use crate::application::services::collection_importer::CollectionImporter;
use crate::application::services::errors::AdventureError;
use crate::application::services::folder_tree::{FolderMap, FolderTreeBuilder};
use crate::application::services::id_map::IdMap;
use crate::application::services::kind_strategy::{KindRegistry, KindStrategy};
use crate::application::services::revisit_queue::{DocumentAddress, RevisitQueue};
use crate::domain::entities::{
    stamp_import_id, BundleArchive, BundleManifest, FolderRecord, StoreEnvironment, FOLDERS_FILE,
    MANIFEST_FILE, SCHEMA_VERSION,
};
use crate::domain::value_objects::{DocumentKind, IMPORT_ORDER};

/// State of one import, threaded through every step
#[derive(Debug)]
pub struct ImportContext {
    pub manifest: BundleManifest,
    pub id_map: IdMap,
    pub folders: FolderMap,
    pub assets: AssetImporter,
    /// Source pack id to destination pack id
    pub collections: HashMap<String, String>,
    pub revisit: RevisitQueue,
    pub summary: ImportSummary,
}

/// Parse `adventure.json`
pub fn read_manifest(archive: &BundleArchive) -> Result<BundleManifest, AdventureError> {
    let bytes = archive
        .get(MANIFEST_FILE)
        .ok_or_else(|| AdventureError::MalformedBundle(format!("{} is missing", MANIFEST_FILE)))?;
    serde_json::from_slice(bytes)
        .map_err(|e| AdventureError::MalformedBundle(format!("{}: {}", MANIFEST_FILE, e)))
}

/// Check that a bundle may be imported into `environment`
pub fn validate(manifest: &BundleManifest, environment: &StoreEnvironment) -> Result<(), AdventureError> {
    if manifest.system != environment.system_id {
        return Err(AdventureError::SystemMismatch {
            adventure: manifest.name.clone(),
            expected: manifest.system.clone(),
            actual: environment.system_id.clone(),
        });
    }
    if manifest.version > SCHEMA_VERSION {
        warn!(
            bundle_version = manifest.version,
            supported = SCHEMA_VERSION,
            "Bundle was written by a newer exporter"
        );
    }
    let missing: Vec<&str> = manifest
        .modules
        .iter()
        .filter(|module| !environment.active_modules.contains(module))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        warn!(modules = ?missing, "Bundle was exported with modules that are not active here");
    }
    Ok(())
}

pub struct BundleReader<'a> {
    store: &'a dyn ContentStorePort,
    registry: &'a KindRegistry,
    folders: FolderTreeBuilder,
    asset_root: &'a str,
}

impl<'a> BundleReader<'a> {
    pub fn new(
        store: &'a dyn ContentStorePort,
        registry: &'a KindRegistry,
        folders: FolderTreeBuilder,
        asset_root: &'a str,
    ) -> Self {
        Self {
            store,
            registry,
            folders,
            asset_root,
        }
    }

    /// Validate the bundle and set up the operation context.
    ///
    /// Fails before anything is written when the game system differs.
    pub fn begin(&self, archive: &BundleArchive, options: ImportOptions) -> Result<ImportContext, AdventureError> {
        let manifest = read_manifest(archive)?;
        let environment = self.store.environment();
        validate(&manifest, &environment)?;

        let preserve = options.preserve_folders.unwrap_or(manifest.options.folders);
        Ok(ImportContext {
            id_map: IdMap::new(),
            folders: FolderMap::new(manifest.name.clone(), preserve),
            assets: AssetImporter::new(self.asset_root, &environment.world_id, &manifest.name),
            collections: HashMap::new(),
            revisit: RevisitQueue::new(),
            summary: ImportSummary {
                bundle_id: manifest.id.clone(),
                name: manifest.name.clone(),
                ..ImportSummary::default()
            },
            manifest,
        })
    }

    /// Materialize every folder, document and collection of the bundle
    #[instrument(skip(self, archive, options), fields(entries = archive.len()))]
    pub async fn read(&self, archive: &BundleArchive, options: ImportOptions) -> Result<ImportContext, AdventureError> {
        let mut ctx = self.begin(archive, options)?;
        info!(bundle = %ctx.manifest.name, system = %ctx.manifest.system, "Importing adventure");

        self.read_folders(archive, &mut ctx).await;

        for kind in IMPORT_ORDER {
            if !archive.has_folder(kind.folder_name()) {
                continue;
            }
            if kind == DocumentKind::Compendium {
                CollectionImporter::new(self.store, self.registry)
                    .import_all(archive, &mut ctx)
                    .await;
                continue;
            }
            let Some(strategy) = self.registry.get(kind) else {
                warn!(kind = %kind, "No strategy for bundled kind, skipping");
                continue;
            };
            for path in archive.document_files(kind.folder_name()) {
                self.materialize_document(archive, strategy.as_ref(), path, &mut ctx)
                    .await;
            }
            debug!(kind = %kind, created = ctx.summary.created_count(kind), "Kind materialized");
        }

        ctx.summary.folders = ctx.folders.stats();
        ctx.summary.assets = ctx.assets.stats();
        Ok(ctx)
    }

    async fn read_folders(&self, archive: &BundleArchive, ctx: &mut ImportContext) {
        let Some(bytes) = archive.get(FOLDERS_FILE) else {
            return;
        };
        match serde_json::from_slice::<Vec<FolderRecord>>(bytes) {
            Ok(records) => self.folders.replay(self.store, &records, &mut ctx.folders).await,
            Err(e) => warn!(
                error = %AdventureError::MalformedBundle(format!("{}: {}", FOLDERS_FILE, e)),
                "Ignoring folder list"
            ),
        }
    }

    async fn materialize_document(
        &self,
        archive: &BundleArchive,
        strategy: &dyn KindStrategy,
        path: &str,
        ctx: &mut ImportContext,
    ) {
        let kind = strategy.kind();
        let parsed = archive
            .get(path)
            .map(serde_json::from_slice::<Value>)
            .transpose();
        let mut payload = match parsed {
            Ok(Some(payload)) if payload.is_object() => payload,
            Ok(_) => {
                warn!(error = %AdventureError::MalformedBundle(format!("{} is not an object", path)), "Skipping document");
                ctx.summary.record_failed(kind);
                return;
            }
            Err(e) => {
                warn!(error = %AdventureError::MalformedBundle(format!("{}: {}", path, e)), "Skipping document");
                ctx.summary.record_failed(kind);
                return;
            }
        };

        let Some(import_id) = payload.get("_id").and_then(Value::as_str).map(str::to_string) else {
            warn!(path = %path, "Document has no original id, skipping");
            ctx.summary.record_failed(kind);
            return;
        };
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match self.store.find_by_import_id(kind, &import_id).await {
            Ok(Some(existing)) => {
                debug!(kind = %kind, name = %name, "Already imported, skipping");
                ctx.id_map.insert(kind, import_id, existing.id);
                ctx.summary.record_skipped(kind);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    error = %AdventureError::DocumentCreate { kind, name, reason: e.to_string() },
                    "Failed to check for an earlier import"
                );
                ctx.summary.record_failed(kind);
                return;
            }
        }

        let needs_revisit = strategy.needs_revisit(&payload);

        for field in strategy.collect_asset_fields(&import_id, &payload) {
            let Some(bundle_path) = payload
                .pointer(&field.pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            let live = ctx.assets.materialize(self.store, archive, &bundle_path).await;
            if let Some(slot) = payload.pointer_mut(&field.pointer) {
                *slot = Value::String(live);
            }
        }

        stamp_import_id(&mut payload, &import_id);

        let mapped_folder = payload
            .get("folder")
            .and_then(Value::as_str)
            .and_then(|key| ctx.folders.folder_for(key))
            .map(str::to_string);
        let folder_id = match mapped_folder {
            Some(id) => Some(id),
            None => self.folders.kind_root(self.store, &mut ctx.folders, kind).await,
        };
        strategy.materialize(&mut payload, folder_id.as_deref());
        if let Some(object) = payload.as_object_mut() {
            object.remove("_id");
        }

        let created = match self.store.create(kind, payload).await {
            Ok(created) => created,
            Err(e) => {
                error!(
                    error = %AdventureError::DocumentCreate { kind, name, reason: e.to_string() },
                    "Document skipped"
                );
                ctx.summary.record_failed(kind);
                return;
            }
        };
        ctx.id_map.insert(kind, import_id, created.id.clone());
        ctx.summary.record_created(kind);

        if let Some(update) = strategy.post_create(&created) {
            if let Err(e) = self.store.update(kind, &created.id, &update).await {
                warn!(kind = %kind, id = %created.id, error = %e, "Failed to apply post-create update");
            }
        }
        if needs_revisit {
            ctx.revisit.push(DocumentAddress::World {
                kind,
                id: created.id,
            });
        }
    }
}
