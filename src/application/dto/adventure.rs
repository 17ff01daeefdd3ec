use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::application::services::asset_relocator::AssetStats;
use crate::application::services::folder_tree::FolderStats;
use crate::application::services::progress::Progress;
use crate::application::services::revisit_queue::{RevisitCounts, RevisitOutcome};
use crate::domain::entities::DocumentSummary;
use crate::domain::value_objects::DocumentKind;

/// What to put in a bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Adventure name; a timestamped default is used when blank
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Selected document ids, grouped by kind
    #[serde(default)]
    pub documents: BTreeMap<DocumentKind, Vec<String>>,
    /// Selected world-owned collection pack ids
    #[serde(default)]
    pub collections: Vec<String>,
    /// Write `folders.json` and keep folder links in document payloads
    #[serde(default)]
    pub preserve_folders: bool,
}

impl ExportRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_documents(mut self, kind: DocumentKind, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.documents
            .entry(kind)
            .or_default()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_collection(mut self, pack_id: impl Into<String>) -> Self {
        self.collections.push(pack_id.into());
        self
    }

    pub fn preserving_folders(mut self) -> Self {
        self.preserve_folders = true;
        self
    }

    pub fn document_count(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }
}

/// Import options; unset fields fall back to what the bundle recorded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub preserve_folders: Option<bool>,
}

/// Result of an export, after the archive was encoded.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub bundle_id: String,
    pub name: String,
    pub filename: String,
    pub documents: BTreeMap<DocumentKind, usize>,
    pub collections: usize,
    pub folders: usize,
    pub assets: AssetStats,
    pub progress: Progress,
}

impl ExportSummary {
    pub fn document_total(&self) -> usize {
        self.documents.values().sum()
    }
}

/// Encoded bundle ready to be handed to the caller.
#[derive(Debug, Clone)]
pub struct ExportedBundle {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub summary: ExportSummary,
}

/// Result of an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub bundle_id: String,
    pub name: String,
    pub created: BTreeMap<DocumentKind, usize>,
    pub skipped: BTreeMap<DocumentKind, usize>,
    pub failed: BTreeMap<DocumentKind, usize>,
    pub folders: FolderStats,
    pub assets: AssetStats,
    pub revisits: RevisitCounts,
    pub revisit_timed_out: bool,
    pub revisit_outcomes: Vec<RevisitOutcome>,
}

impl ImportSummary {
    pub fn record_created(&mut self, kind: DocumentKind) {
        *self.created.entry(kind).or_default() += 1;
    }

    pub fn record_skipped(&mut self, kind: DocumentKind) {
        *self.skipped.entry(kind).or_default() += 1;
    }

    pub fn record_failed(&mut self, kind: DocumentKind) {
        *self.failed.entry(kind).or_default() += 1;
    }

    pub fn created_count(&self, kind: DocumentKind) -> usize {
        self.created.get(&kind).copied().unwrap_or_default()
    }

    pub fn created_total(&self) -> usize {
        self.created.values().sum()
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Documents of one kind, for selection lists.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentListResponseDto {
    pub kind: DocumentKind,
    pub documents: Vec<DocumentSummary>,
}
