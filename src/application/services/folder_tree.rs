//! Folder tree builder - flattens folders on export, replays them on import
//!
//! Replay is strictly top-down: roots first, then the children of every folder
//! resolved in the previous round, breadth first. A record whose parent never
//! resolves is reported and left out; it is never reordered any other way.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::application::ports::outbound::ContentStorePort;
use crate::domain::entities::{Folder, FolderRecord, NewFolder};
use crate::domain::value_objects::DocumentKind;

/// Colour of the synthetic adventure folder
pub const ADVENTURE_FOLDER_COLOR: &str = "#FF0000";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FolderStats {
    pub created: usize,
    pub reused: usize,
    /// Folders attached higher up because the destination depth cap was hit
    pub flattened: usize,
    pub failed: usize,
    /// Folders whose parent never resolved
    pub orphaned: usize,
}

/// Where one bundled folder ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFolder {
    pub id: String,
    pub parent_id: Option<String>,
    pub depth: usize,
}

/// Operation-scoped folder state: import key to destination folder
#[derive(Debug)]
pub struct FolderMap {
    adventure_name: String,
    preserve: bool,
    resolved: HashMap<String, ResolvedFolder>,
    kind_roots: HashMap<DocumentKind, ResolvedFolder>,
    known: Option<Vec<Folder>>,
    trace: Vec<String>,
    stats: FolderStats,
}

impl FolderMap {
    pub fn new(adventure_name: impl Into<String>, preserve: bool) -> Self {
        Self {
            adventure_name: adventure_name.into(),
            preserve,
            resolved: HashMap::new(),
            kind_roots: HashMap::new(),
            known: None,
            trace: Vec::new(),
            stats: FolderStats::default(),
        }
    }

    /// Destination folder id for a bundled folder key
    pub fn folder_for(&self, import_key: &str) -> Option<&str> {
        self.resolved.get(import_key).map(|folder| folder.id.as_str())
    }

    pub fn resolved(&self, import_key: &str) -> Option<&ResolvedFolder> {
        self.resolved.get(import_key)
    }

    /// Import keys in the order their folders were placed
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn stats(&self) -> FolderStats {
        self.stats
    }

    pub fn preserves_structure(&self) -> bool {
        self.preserve
    }
}

/// Builds and replays flattened folder lists
#[derive(Debug, Clone, Copy)]
pub struct FolderTreeBuilder {
    max_depth: usize,
}

impl FolderTreeBuilder {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    /// Flatten the live folders of the exported kinds.
    ///
    /// A parent outside the exported set is dropped so the record becomes a root.
    pub fn flatten(&self, folders: &[Folder], kinds: &HashSet<DocumentKind>) -> Vec<FolderRecord> {
        let included: HashSet<&str> = folders
            .iter()
            .filter(|folder| kinds.contains(&folder.kind))
            .map(|folder| folder.id.as_str())
            .collect();

        folders
            .iter()
            .filter(|folder| kinds.contains(&folder.kind))
            .map(|folder| FolderRecord {
                id: folder.id.clone(),
                name: folder.name.clone(),
                kind: folder.kind,
                parent_id: folder
                    .parent_id
                    .clone()
                    .filter(|parent| included.contains(parent.as_str())),
                color: folder.color.clone(),
            })
            .collect()
    }

    /// Recreate `records` in the destination, parents before children
    #[instrument(skip(self, store, records, map), fields(records = records.len()))]
    pub async fn replay(&self, store: &dyn ContentStorePort, records: &[FolderRecord], map: &mut FolderMap) {
        self.load_known(store, map).await;

        let mut frontier: VecDeque<&FolderRecord> = records.iter().filter(|r| r.is_root()).collect();
        while let Some(record) = frontier.pop_front() {
            if map.resolved.contains_key(&record.id) {
                continue;
            }
            if !self.place(store, record, map).await {
                continue;
            }
            frontier.extend(
                records
                    .iter()
                    .filter(|child| child.parent_id.as_deref() == Some(record.id.as_str())),
            );
        }

        for record in records {
            if !map.resolved.contains_key(&record.id) {
                map.stats.orphaned += 1;
                warn!(
                    folder = %record.name,
                    parent = ?record.parent_id,
                    "Folder parent never resolved, leaving it out"
                );
            }
        }
        info!(
            created = map.stats.created,
            reused = map.stats.reused,
            "Folder tree replayed"
        );
    }

    /// The synthetic adventure folder for `kind`, created on first use.
    ///
    /// Returns `None` when the original structure is preserved or the kind has
    /// no folders.
    pub async fn kind_root(
        &self,
        store: &dyn ContentStorePort,
        map: &mut FolderMap,
        kind: DocumentKind,
    ) -> Option<String> {
        self.kind_root_folder(store, map, kind)
            .await
            .map(|folder| folder.id)
    }

    async fn kind_root_folder(
        &self,
        store: &dyn ContentStorePort,
        map: &mut FolderMap,
        kind: DocumentKind,
    ) -> Option<ResolvedFolder> {
        if map.preserve || !kind.supports_folders() {
            return None;
        }
        if let Some(root) = map.kind_roots.get(&kind) {
            return Some(root.clone());
        }
        self.load_known(store, map).await;

        let existing = map.known.as_ref().and_then(|known| {
            known
                .iter()
                .find(|f| f.kind == kind && f.parent_id.is_none() && f.name == map.adventure_name)
                .map(|f| f.id.clone())
        });
        let id = match existing {
            Some(id) => {
                debug!(kind = %kind, folder_id = %id, "Reusing adventure folder");
                id
            }
            None => {
                let created = store
                    .create_folder(NewFolder {
                        name: map.adventure_name.clone(),
                        kind,
                        parent_id: None,
                        import_id: None,
                        color: Some(ADVENTURE_FOLDER_COLOR.to_string()),
                    })
                    .await;
                match created {
                    Ok(folder) => {
                        map.stats.created += 1;
                        if let Some(known) = map.known.as_mut() {
                            known.push(folder.clone());
                        }
                        folder.id
                    }
                    Err(e) => {
                        warn!(kind = %kind, error = %e, "Failed to create adventure folder");
                        return None;
                    }
                }
            }
        };

        let root = ResolvedFolder {
            id,
            parent_id: None,
            depth: 1,
        };
        map.kind_roots.insert(kind, root.clone());
        Some(root)
    }

    async fn load_known(&self, store: &dyn ContentStorePort, map: &mut FolderMap) {
        if map.known.is_some() {
            return;
        }
        let known = match store.list_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                warn!(error = %e, "Failed to list destination folders");
                Vec::new()
            }
        };
        map.known = Some(known);
    }

    /// Resolve one record whose parent (if any) is already placed
    async fn place(&self, store: &dyn ContentStorePort, record: &FolderRecord, map: &mut FolderMap) -> bool {
        let (parent_id, depth) = match record.parent_id.as_deref() {
            None => match self.kind_root_folder(store, map, record.kind).await {
                Some(root) => (Some(root.id), root.depth + 1),
                None => (None, 1),
            },
            Some(parent_key) => match map.resolved.get(parent_key) {
                Some(parent) => (Some(parent.id.clone()), parent.depth + 1),
                None => return false,
            },
        };

        let (parent_id, depth) = if depth > self.max_depth {
            map.stats.flattened += 1;
            warn!(
                folder = %record.name,
                max_depth = self.max_depth,
                "Folder too deep for the destination, attaching it one level up"
            );
            self.lift(map, parent_id, depth)
        } else {
            (parent_id, depth)
        };

        let reused = map.known.as_ref().and_then(|known| {
            known
                .iter()
                .find(|f| f.kind == record.kind && f.import_id.as_deref() == Some(record.id.as_str()))
                .map(|f| f.id.clone())
        });

        let id = match reused {
            Some(id) => {
                map.stats.reused += 1;
                id
            }
            None => {
                let created = store
                    .create_folder(NewFolder {
                        name: record.name.clone(),
                        kind: record.kind,
                        parent_id: parent_id.clone(),
                        import_id: Some(record.id.clone()),
                        color: record.color.clone(),
                    })
                    .await;
                match created {
                    Ok(folder) => {
                        map.stats.created += 1;
                        folder.id
                    }
                    Err(e) => {
                        map.stats.failed += 1;
                        warn!(folder = %record.name, error = %e, "Failed to create folder");
                        return false;
                    }
                }
            }
        };

        map.resolved.insert(
            record.id.clone(),
            ResolvedFolder {
                id,
                parent_id,
                depth,
            },
        );
        map.trace.push(record.id.clone());
        true
    }

    /// Re-home a folder under its would-be grandparent until it fits the cap
    fn lift(&self, map: &FolderMap, mut parent_id: Option<String>, mut depth: usize) -> (Option<String>, usize) {
        while depth > self.max_depth {
            let Some(current) = parent_id.as_deref() else {
                break;
            };
            let grandparent = map
                .resolved
                .values()
                .chain(map.kind_roots.values())
                .find(|folder| folder.id == current)
                .and_then(|folder| folder.parent_id.clone());
            parent_id = grandparent;
            depth -= 1;
        }
        (parent_id, depth)
    }
}
