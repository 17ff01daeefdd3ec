//! Bundle archive - the in-memory file set of an adventure bundle
//!
//! Layout:
//! ```text
//! adventure.json                               manifest
//! folders.json                                 flattened folder list (optional)
//! {kind}/{documentId}.json                     one file per top-level document
//! {kind}/{assetClass}/{documentId}/{filename}  relocated binary assets
//! ```

use std::collections::HashMap;

use serde::Serialize;

pub const MANIFEST_FILE: &str = "adventure.json";
pub const FOLDERS_FILE: &str = "folders.json";
pub const BUNDLE_EXTENSION: &str = "fvttadv";

/// Ordered set of archive entries, addressable by path
#[derive(Debug, Clone, Default)]
pub struct BundleArchive {
    entries: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl BundleArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry; replaced entries keep their position
    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        let path = path.into();
        match self.index.get(&path) {
            Some(&position) => self.entries[position].1 = bytes,
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path, bytes));
            }
        }
    }

    /// Serialize `value` as pretty JSON at `path`
    pub fn insert_json<T: Serialize>(&mut self, path: impl Into<String>, value: &T) -> serde_json::Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.insert(path, bytes);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.index
            .get(path)
            .map(|&position| self.entries[position].1.as_slice())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(path, bytes)| (path.as_str(), bytes.as_slice()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    /// Document files directly under `folder` (`{folder}/{id}.json`), in archive order
    pub fn document_files(&self, folder: &str) -> Vec<&str> {
        let prefix = format!("{}/", folder);
        self.paths()
            .filter(|path| {
                path.strip_prefix(&prefix)
                    .map(|rest| !rest.contains('/') && rest.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Files directly inside directory `dir`
    pub fn files_in(&self, dir: &str) -> Vec<&str> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.paths()
            .filter(|path| {
                path.strip_prefix(&prefix)
                    .map(|rest| !rest.is_empty() && !rest.contains('/'))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Whether any entry lives under `folder/`
    pub fn has_folder(&self, folder: &str) -> bool {
        let prefix = format!("{}/", folder);
        self.paths().any(|path| path.starts_with(&prefix))
    }
}
