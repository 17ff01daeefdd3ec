//! Kind strategies - per-kind knowledge of assets, references and lifecycle hooks
//!
//! Every document kind the codec handles is registered in a [`KindRegistry`].
//! Adding a kind means registering another [`KindStrategy`]; the writer,
//! reader and resolver only ever talk to the trait.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::entities::{payload_has_reference, Document, StoreEnvironment};
use crate::domain::value_objects::{is_wildcard, AssetClass, DocumentKind, PartialUpdate};

/// A payload field holding an asset path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetField {
    /// JSON pointer to the field
    pub pointer: String,
    /// Id used in the deterministic bundle path (the document or nested member)
    pub owner_id: String,
    pub class: AssetClass,
    /// The path names a family of files rather than a single file
    pub wildcard: bool,
    /// The field sits inside a nested sub-structure
    pub nested: bool,
}

/// Result type tag of a table result entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTag {
    Text,
    WorldDocument,
    CollectionEntry,
}

impl ResultTag {
    /// Accepts the numeric (`0`, `1`, `2`) and named forms of the tag
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_u64() {
                Some(1) => Self::WorldDocument,
                Some(2) => Self::CollectionEntry,
                _ => Self::Text,
            },
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "document" | "entity" => Self::WorldDocument,
                "pack" | "compendium" => Self::CollectionEntry,
                _ => Self::Text,
            },
            _ => Self::Text,
        }
    }
}

/// A structured cross-document reference, remapped after import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceField {
    /// Foreign key on a member of an embedded collection (a token's actor)
    Placement {
        collection: &'static str,
        member_id: String,
        field: &'static str,
        target_kind: DocumentKind,
        original_id: String,
    },
    /// Foreign key on the document itself (a scene's linked journal)
    Link {
        field: &'static str,
        target_kind: DocumentKind,
        original_id: String,
    },
    /// A table result pointing at a document or collection entry
    TableResult {
        result_id: String,
        tag: ResultTag,
        /// Kind name or pack id, depending on the tag
        collection: String,
        original_id: String,
    },
}

/// How the reference resolver treats a queued document of this kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Remap placement foreign keys and link fields
    Placements,
    /// Remap table result targets by tag
    TableResults,
    /// Rewrite reference tokens inside text fields
    TextTokens,
}

pub trait KindStrategy: Send + Sync {
    fn kind(&self) -> DocumentKind;

    fn resolution_mode(&self) -> ResolutionMode {
        ResolutionMode::TextTokens
    }

    /// Asset-bearing fields, top-level and nested
    fn collect_asset_fields(&self, document_id: &str, payload: &Value) -> Vec<AssetField> {
        top_level_assets(document_id, payload)
    }

    /// Structured references remapped in the placement and table modes
    fn collect_reference_fields(&self, _payload: &Value) -> Vec<ReferenceField> {
        Vec::new()
    }

    /// Embedded member collections updated one member at a time
    fn member_collections(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether a freshly created document must be revisited once the bundle is in
    fn needs_revisit(&self, payload: &Value) -> bool {
        payload_has_reference(payload)
    }

    /// Canonical bundle form of a document whose assets are already relocated
    fn serialize(&self, document: Document, environment: &StoreEnvironment, keep_folder: bool) -> Value {
        export_payload(document, environment, keep_folder)
    }

    /// Prepare a bundled payload for creation in the destination
    fn materialize(&self, payload: &mut Value, folder_id: Option<&str>) {
        place_in_folder(self.kind(), payload, folder_id);
    }

    /// Follow-up update once the document exists
    fn post_create(&self, _created: &Document) -> Option<PartialUpdate> {
        None
    }
}

/// Strip store-local fields and stamp provenance
pub fn export_payload(document: Document, environment: &StoreEnvironment, keep_folder: bool) -> Value {
    let Document { id, name, mut payload, .. } = document;
    if let Some(object) = payload.as_object_mut() {
        object.insert("_id".to_string(), Value::String(id));
        object.insert("name".to_string(), Value::String(name));
        if !keep_folder {
            object.remove("folder");
        }
        object.remove("permission");
        object.remove("ownership");

        if let Some(flags) = object.get_mut("flags").and_then(Value::as_object_mut) {
            let has_source = flags
                .get("exportSource")
                .map(|source| !source.is_null())
                .unwrap_or(false);
            if has_source {
                flags.insert("exportSource".to_string(), environment.export_source());
            }
        }
    }
    payload
}

fn place_in_folder(kind: DocumentKind, payload: &mut Value, folder_id: Option<&str>) {
    let Some(object) = payload.as_object_mut() else {
        return;
    };
    match folder_id {
        Some(folder) if kind.supports_folders() => {
            object.insert("folder".to_string(), Value::String(folder.to_string()));
        }
        _ => {
            object.remove("folder");
        }
    }
}

fn non_empty_str<'v>(value: Option<&'v Value>) -> Option<&'v str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn top_level_assets(document_id: &str, payload: &Value) -> Vec<AssetField> {
    [("/img", AssetClass::Images), ("/thumb", AssetClass::Thumb)]
        .into_iter()
        .filter_map(|(pointer, class)| {
            let path = non_empty_str(payload.pointer(pointer))?;
            Some(AssetField {
                pointer: pointer.to_string(),
                owner_id: document_id.to_string(),
                class,
                wildcard: is_wildcard(path),
                nested: false,
            })
        })
        .collect()
}

/// Asset fields of every member of an embedded collection
fn nested_assets(
    payload: &Value,
    collection: &str,
    field: &str,
    class: AssetClass,
    random_flag: Option<&str>,
) -> Vec<AssetField> {
    let Some(members) = payload.get(collection).and_then(Value::as_array) else {
        return Vec::new();
    };
    members
        .iter()
        .enumerate()
        .filter_map(|(index, member)| {
            let member_id = non_empty_str(member.get("_id"))?;
            let path = non_empty_str(member.get(field))?;
            let random = random_flag
                .and_then(|flag| member.get(flag))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(AssetField {
                pointer: format!("/{}/{}/{}", collection, index, field),
                owner_id: member_id.to_string(),
                class,
                wildcard: random || is_wildcard(path),
                nested: true,
            })
        })
        .collect()
}

fn placements(
    payload: &Value,
    collection: &'static str,
    field: &'static str,
    target_kind: DocumentKind,
) -> Vec<ReferenceField> {
    let Some(members) = payload.get(collection).and_then(Value::as_array) else {
        return Vec::new();
    };
    members
        .iter()
        .filter_map(|member| {
            Some(ReferenceField::Placement {
                collection,
                member_id: non_empty_str(member.get("_id"))?.to_string(),
                field,
                target_kind,
                original_id: non_empty_str(member.get(field))?.to_string(),
            })
        })
        .collect()
}

fn link(payload: &Value, field: &'static str, target_kind: DocumentKind) -> Option<ReferenceField> {
    Some(ReferenceField::Link {
        field,
        target_kind,
        original_id: non_empty_str(payload.get(field))?.to_string(),
    })
}

// =============================================================================
// Strategies
// =============================================================================

/// Scenes: placed tokens, sounds, notes and tiles
pub struct SceneStrategy;

impl KindStrategy for SceneStrategy {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Scene
    }

    fn resolution_mode(&self) -> ResolutionMode {
        ResolutionMode::Placements
    }

    fn collect_asset_fields(&self, document_id: &str, payload: &Value) -> Vec<AssetField> {
        let mut fields = top_level_assets(document_id, payload);
        fields.extend(nested_assets(payload, "tokens", "img", AssetClass::TokenImage, Some("randomImg")));
        fields.extend(nested_assets(payload, "sounds", "path", AssetClass::SceneSound, None));
        fields.extend(nested_assets(payload, "notes", "icon", AssetClass::SceneNote, None));
        fields.extend(nested_assets(payload, "tiles", "img", AssetClass::Tile, None));
        fields
    }

    fn collect_reference_fields(&self, payload: &Value) -> Vec<ReferenceField> {
        let mut fields = placements(payload, "tokens", "actorId", DocumentKind::Actor);
        fields.extend(placements(payload, "notes", "entryId", DocumentKind::JournalEntry));
        fields.extend(link(payload, "journal", DocumentKind::JournalEntry));
        fields.extend(link(payload, "playlist", DocumentKind::Playlist));
        fields
    }

    fn needs_revisit(&self, _payload: &Value) -> bool {
        true
    }
}

/// Actors: prototype token art and owned items
pub struct ActorStrategy;

impl KindStrategy for ActorStrategy {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Actor
    }

    fn collect_asset_fields(&self, document_id: &str, payload: &Value) -> Vec<AssetField> {
        let mut fields = top_level_assets(document_id, payload);
        if let Some(path) = non_empty_str(payload.pointer("/token/img")) {
            let random = payload
                .pointer("/token/randomImg")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            fields.push(AssetField {
                pointer: "/token/img".to_string(),
                owner_id: document_id.to_string(),
                class: AssetClass::Token,
                wildcard: random || is_wildcard(path),
                nested: false,
            });
        }
        fields.extend(nested_assets(payload, "items", "img", AssetClass::Images, None));
        fields
    }

    fn member_collections(&self) -> &'static [&'static str] {
        &["items"]
    }

    fn post_create(&self, created: &Document) -> Option<PartialUpdate> {
        Some(PartialUpdate::single("token.actorId", created.id.clone()))
    }
}

/// Roll tables: result art and result targets
pub struct TableStrategy;

impl KindStrategy for TableStrategy {
    fn kind(&self) -> DocumentKind {
        DocumentKind::RollTable
    }

    fn resolution_mode(&self) -> ResolutionMode {
        ResolutionMode::TableResults
    }

    fn collect_asset_fields(&self, document_id: &str, payload: &Value) -> Vec<AssetField> {
        let mut fields = top_level_assets(document_id, payload);
        fields.extend(nested_assets(payload, "results", "img", AssetClass::TableResult, None));
        fields
    }

    fn collect_reference_fields(&self, payload: &Value) -> Vec<ReferenceField> {
        let Some(results) = payload.get("results").and_then(Value::as_array) else {
            return Vec::new();
        };
        results
            .iter()
            .filter_map(|result| {
                let tag = ResultTag::parse(result.get("type").unwrap_or(&Value::Null));
                Some(ReferenceField::TableResult {
                    result_id: non_empty_str(result.get("_id"))?.to_string(),
                    tag,
                    collection: non_empty_str(result.get("collection"))
                        .unwrap_or_default()
                        .to_string(),
                    original_id: non_empty_str(result.get("resultId"))
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect()
    }

    fn needs_revisit(&self, payload: &Value) -> bool {
        self.collect_reference_fields(payload).iter().any(|field| {
            matches!(field, ReferenceField::TableResult { tag, .. } if *tag != ResultTag::Text)
        })
    }
}

/// Playlists: sound files
pub struct PlaylistStrategy;

impl KindStrategy for PlaylistStrategy {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Playlist
    }

    fn collect_asset_fields(&self, document_id: &str, payload: &Value) -> Vec<AssetField> {
        let mut fields = top_level_assets(document_id, payload);
        fields.extend(nested_assets(payload, "sounds", "path", AssetClass::PlaylistSound, None));
        fields
    }
}

/// Kinds with only top-level art and text references (items, journal entries, macros)
pub struct DocumentStrategy {
    kind: DocumentKind,
}

impl DocumentStrategy {
    pub fn new(kind: DocumentKind) -> Self {
        Self { kind }
    }
}

impl KindStrategy for DocumentStrategy {
    fn kind(&self) -> DocumentKind {
        self.kind
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Strategy table keyed by document kind
#[derive(Clone, Default)]
pub struct KindRegistry {
    strategies: HashMap<DocumentKind, Arc<dyn KindStrategy>>,
}

impl KindRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SceneStrategy));
        registry.register(Arc::new(ActorStrategy));
        registry.register(Arc::new(DocumentStrategy::new(DocumentKind::Item)));
        registry.register(Arc::new(DocumentStrategy::new(DocumentKind::JournalEntry)));
        registry.register(Arc::new(TableStrategy));
        registry.register(Arc::new(PlaylistStrategy));
        registry.register(Arc::new(DocumentStrategy::new(DocumentKind::Macro)));
        registry
    }

    /// Register (or replace) the strategy for its kind
    pub fn register(&mut self, strategy: Arc<dyn KindStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: DocumentKind) -> Option<Arc<dyn KindStrategy>> {
        self.strategies.get(&kind).cloned()
    }

    pub fn contains(&self, kind: DocumentKind) -> bool {
        self.strategies.contains_key(&kind)
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.strategies.keys().collect();
        kinds.sort();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}
