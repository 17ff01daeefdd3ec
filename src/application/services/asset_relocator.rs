//! Asset relocator - moves binary assets between the live store and a bundle
//!
//! [`AssetExporter`] copies files out of the store into the archive under the
//! deterministic `{kind}/{class}/{owner}/{file}` layout; [`AssetImporter`]
//! copies them back out into the destination store. Both keep an
//! operation-scoped cache so an asset referenced many times is copied once.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::application::ports::outbound::{BrowseOptions, ContentStorePort, StorageArea};
use crate::application::services::errors::AdventureError;
use crate::application::services::kind_strategy::AssetField;
use crate::domain::entities::BundleArchive;
use crate::domain::value_objects::{
    bundle_asset_path, file_name, glob_name, is_wildcard, parent_dir, sanitize_filename,
    unwrap_passthrough, wildcard_matches, wrap_passthrough, DocumentKind,
};

/// Counters for one export or import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetStats {
    /// Files copied into the bundle (export) or into the store (import)
    pub copied: usize,
    /// Paths encoded or decoded as passthrough
    pub passthrough: usize,
    /// Lookups served from the operation cache
    pub reused: usize,
    /// Bundle entries referenced but absent (import only)
    pub missing: usize,
}

// =============================================================================
// Export
// =============================================================================

/// Export side of the relocator
#[derive(Debug, Default)]
pub struct AssetExporter {
    cache: HashMap<String, String>,
    stats: AssetStats,
}

impl AssetExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> AssetStats {
        self.stats
    }

    /// Relocate the asset at `path` for `field` of a `kind` document and return
    /// the value the field should carry in the bundle
    pub async fn relocate(
        &mut self,
        store: &dyn ContentStorePort,
        archive: &mut BundleArchive,
        path: &str,
        kind: DocumentKind,
        field: &AssetField,
    ) -> String {
        if path.is_empty() {
            return String::new();
        }
        if let Some(cached) = self.cache.get(path) {
            self.stats.reused += 1;
            return cached.clone();
        }

        let relocated = if field.wildcard {
            self.relocate_family(store, archive, path, kind, field).await
        } else {
            self.relocate_file(store, archive, path, kind, field).await
        };
        self.cache.insert(path.to_string(), relocated.clone());
        relocated
    }

    async fn relocate_file(
        &mut self,
        store: &dyn ContentStorePort,
        archive: &mut BundleArchive,
        path: &str,
        kind: DocumentKind,
        field: &AssetField,
    ) -> String {
        match store.read_binary(path).await {
            Ok(bytes) => {
                let target = bundle_asset_path(kind, field.class, &field.owner_id, file_name(path));
                archive.insert(target.clone(), bytes);
                self.stats.copied += 1;
                target
            }
            Err(e) => {
                debug!(
                    error = %AdventureError::AssetUnavailable(path.to_string()),
                    cause = %e,
                    "Asset not in the data area, keeping it as a core asset"
                );
                self.stats.passthrough += 1;
                wrap_passthrough(path)
            }
        }
    }

    /// Expand a glob through the store and bundle every member file
    async fn relocate_family(
        &mut self,
        store: &dyn ContentStorePort,
        archive: &mut BundleArchive,
        pattern: &str,
        kind: DocumentKind,
        field: &AssetField,
    ) -> String {
        let members = match store
            .browse(StorageArea::Data, pattern, &BrowseOptions::wildcard())
            .await
        {
            Ok(members) => members,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Failed to expand wildcard asset");
                Vec::new()
            }
        };

        let mut bundled = 0;
        for member in &members {
            match store.read_binary(member).await {
                Ok(bytes) => {
                    let target = bundle_asset_path(kind, field.class, &field.owner_id, file_name(member));
                    archive.insert(target, bytes);
                    bundled += 1;
                }
                Err(e) => {
                    warn!(
                        error = %AdventureError::AssetUnavailable(member.clone()),
                        cause = %e,
                        "Skipping unreadable wildcard member"
                    );
                }
            }
        }

        if bundled == 0 {
            debug!(pattern = %pattern, "Wildcard matched nothing in the data area");
            self.stats.passthrough += 1;
            return wrap_passthrough(pattern);
        }
        self.stats.copied += bundled;
        bundle_asset_path(kind, field.class, &field.owner_id, glob_name(pattern))
    }
}

// =============================================================================
// Import
// =============================================================================

/// Import side of the relocator
#[derive(Debug)]
pub struct AssetImporter {
    destination_root: String,
    materialized: HashMap<String, String>,
    ensured_dirs: HashSet<String>,
    stats: AssetStats,
}

impl AssetImporter {
    /// Assets land under `<asset_root>/<world_id>/<sanitized adventure name>/`
    pub fn new(asset_root: &str, world_id: &str, adventure_name: &str) -> Self {
        let mut segments: Vec<String> = asset_root
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        segments.push(world_id.to_string());
        segments.push(sanitize_filename(adventure_name, "_"));
        Self {
            destination_root: segments.join("/"),
            materialized: HashMap::new(),
            ensured_dirs: HashSet::new(),
            stats: AssetStats::default(),
        }
    }

    pub fn destination_root(&self) -> &str {
        &self.destination_root
    }

    pub fn stats(&self) -> AssetStats {
        self.stats
    }

    pub fn destination_for(&self, bundle_path: &str) -> String {
        format!("{}/{}", self.destination_root, bundle_path)
    }

    /// Copy the asset at `bundle_path` into the store and return its live path
    pub async fn materialize(
        &mut self,
        store: &dyn ContentStorePort,
        archive: &BundleArchive,
        bundle_path: &str,
    ) -> String {
        if bundle_path.is_empty() {
            return String::new();
        }
        if let Some(bare) = unwrap_passthrough(bundle_path) {
            self.stats.passthrough += 1;
            return bare.to_string();
        }
        if let Some(done) = self.materialized.get(bundle_path) {
            self.stats.reused += 1;
            return done.clone();
        }

        let copied = if is_wildcard(bundle_path) {
            let pattern = glob_name(bundle_path);
            let members: Vec<String> = archive
                .files_in(parent_dir(bundle_path))
                .into_iter()
                .filter(|member| wildcard_matches(pattern, file_name(member)))
                .map(str::to_string)
                .collect();
            if members.is_empty() {
                self.record_missing(bundle_path);
            }
            let mut any = false;
            for member in members {
                any |= self.copy(store, archive, &member).await;
            }
            any
        } else {
            self.copy(store, archive, bundle_path).await
        };

        if !copied {
            return bundle_path.to_string();
        }
        let destination = self.destination_for(bundle_path);
        self.materialized
            .insert(bundle_path.to_string(), destination.clone());
        destination
    }

    async fn copy(&mut self, store: &dyn ContentStorePort, archive: &BundleArchive, bundle_path: &str) -> bool {
        let Some(bytes) = archive.get(bundle_path) else {
            self.record_missing(bundle_path);
            return false;
        };
        let destination = self.destination_for(bundle_path);
        if let Err(e) = self.ensure_parents(store, parent_dir(&destination)).await {
            warn!(path = %destination, error = %e, "Failed to create asset directory");
            return false;
        }
        match store.upload_binary(&destination, bytes.to_vec()).await {
            Ok(()) => {
                self.stats.copied += 1;
                true
            }
            Err(e) => {
                warn!(path = %destination, error = %e, "Failed to upload asset");
                false
            }
        }
    }

    async fn ensure_parents(&mut self, store: &dyn ContentStorePort, dir: &str) -> anyhow::Result<()> {
        let mut prefix = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self.ensured_dirs.contains(&prefix) {
                continue;
            }
            store.ensure_directory(&prefix).await?;
            self.ensured_dirs.insert(prefix.clone());
        }
        Ok(())
    }

    fn record_missing(&mut self, bundle_path: &str) {
        self.stats.missing += 1;
        warn!(
            error = %AdventureError::AssetUnavailable(bundle_path.to_string()),
            "Bundled asset missing, keeping the path as authored"
        );
    }
}
