//! Document kinds and asset classes, with their archive naming

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of a top-level document in the content store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentKind {
    Scene,
    Actor,
    Item,
    JournalEntry,
    RollTable,
    Playlist,
    Compendium,
    Macro,
    Folder,
}

/// Order in which kinds are materialized during import.
///
/// Scenes come first so their placements are queued before the revisit pass.
pub const IMPORT_ORDER: [DocumentKind; 8] = [
    DocumentKind::Scene,
    DocumentKind::Actor,
    DocumentKind::Item,
    DocumentKind::JournalEntry,
    DocumentKind::RollTable,
    DocumentKind::Playlist,
    DocumentKind::Compendium,
    DocumentKind::Macro,
];

impl DocumentKind {
    /// Directory name used for this kind inside a bundle
    pub fn folder_name(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Actor => "actor",
            Self::Item => "item",
            Self::JournalEntry => "journal",
            Self::RollTable => "table",
            Self::Playlist => "playlist",
            Self::Compendium => "compendium",
            Self::Macro => "macro",
            Self::Folder => "folder",
        }
    }

    /// Name used by reference tokens and table result collections
    pub fn document_name(&self) -> &'static str {
        match self {
            Self::Scene => "Scene",
            Self::Actor => "Actor",
            Self::Item => "Item",
            Self::JournalEntry => "JournalEntry",
            Self::RollTable => "RollTable",
            Self::Playlist => "Playlist",
            Self::Compendium => "Compendium",
            Self::Macro => "Macro",
            Self::Folder => "Folder",
        }
    }

    pub fn from_folder_name(name: &str) -> Option<Self> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|kind| kind.folder_name().eq_ignore_ascii_case(name))
    }

    pub fn from_document_name(name: &str) -> Option<Self> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|kind| kind.document_name().eq_ignore_ascii_case(name))
    }

    /// Whether documents of this kind live inside folders
    pub fn supports_folders(&self) -> bool {
        !matches!(self, Self::Compendium | Self::Folder)
    }
}

const ALL_KINDS: [DocumentKind; 9] = [
    DocumentKind::Scene,
    DocumentKind::Actor,
    DocumentKind::Item,
    DocumentKind::JournalEntry,
    DocumentKind::RollTable,
    DocumentKind::Playlist,
    DocumentKind::Compendium,
    DocumentKind::Macro,
    DocumentKind::Folder,
];

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown document kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for DocumentKind {
    type Err = UnknownKind;

    /// Accepts both the document name (`JournalEntry`) and the bundle folder name (`journal`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_document_name(s)
            .or_else(|| Self::from_folder_name(s))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Class of a relocated asset, used as a path segment in the bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Images,
    Thumb,
    Token,
    TokenImage,
    SceneSound,
    SceneNote,
    Tile,
    TableResult,
    PlaylistSound,
}

impl AssetClass {
    pub fn folder_name(&self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Thumb => "thumb",
            Self::Token => "token",
            Self::TokenImage => "tokenimage",
            Self::SceneSound => "scenesound",
            Self::SceneNote => "scenenote",
            Self::Tile => "tile",
            Self::TableResult => "table",
            Self::PlaylistSound => "sounds",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}
