//! Collection packs - named groups of entries of one kind

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::DocumentKind;

/// Package name owning collections created inside a world
pub const WORLD_PACKAGE: &str = "world";

/// Metadata of a collection pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Pack id, `<package>.<name>`
    pub id: String,
    pub label: String,
    /// Kind of document the pack holds
    pub kind: DocumentKind,
    pub package: String,
    #[serde(default)]
    pub locked: bool,
}

impl CollectionInfo {
    pub fn is_world_owned(&self) -> bool {
        self.package == WORLD_PACKAGE
    }
}

/// A collection as written to `compendium/<pack-id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundledCollection {
    pub info: CollectionInfo,
    pub items: Vec<Value>,
}
