//! Reference resolver - rewrites source ids to destination ids after import
//!
//! Runs over the revisit queue once every document of the bundle exists.
//! Only changed leaves are written back, as partial updates; members of
//! embedded collections get one update each.

use std::collections::HashMap;

use anyhow::anyhow;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::application::ports::outbound::ContentStorePort;
use crate::application::services::errors::AdventureError;
use crate::application::services::id_map::IdMap;
use crate::application::services::kind_strategy::{
    KindRegistry, KindStrategy, ReferenceField, ResolutionMode, ResultTag,
};
use crate::application::services::revisit_queue::{DocumentAddress, ResolutionTally};
use crate::domain::entities::Document;
use crate::domain::value_objects::{
    contains_reference, tokenize, DocumentKind, PartialUpdate, ReferenceToken, Span, TokenTarget,
};

/// Read-only view over the finished materialization pass
pub struct ReferenceResolver<'a> {
    store: &'a dyn ContentStorePort,
    registry: &'a KindRegistry,
    id_map: &'a IdMap,
    /// Source pack id to destination pack id
    collections: &'a HashMap<String, String>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(
        store: &'a dyn ContentStorePort,
        registry: &'a KindRegistry,
        id_map: &'a IdMap,
        collections: &'a HashMap<String, String>,
    ) -> Self {
        Self {
            store,
            registry,
            id_map,
            collections,
        }
    }

    /// Resolve every reference held by the document at `address`
    #[instrument(skip(self, address), fields(document = %address))]
    pub async fn resolve(&self, address: DocumentAddress) -> Result<ResolutionTally, AdventureError> {
        match address {
            DocumentAddress::World { kind, id } => {
                let strategy = self
                    .registry
                    .get(kind)
                    .ok_or_else(|| anyhow!("No strategy registered for {}", kind))?;
                let document = self
                    .store
                    .get(kind, &id)
                    .await?
                    .ok_or_else(|| anyhow!("{} {} disappeared before its references were resolved", kind, id))?;

                match strategy.resolution_mode() {
                    ResolutionMode::Placements => self.resolve_placements(strategy.as_ref(), &document).await,
                    ResolutionMode::TableResults => self.resolve_table(strategy.as_ref(), &document).await,
                    ResolutionMode::TextTokens => self.resolve_text(strategy.as_ref(), &document).await,
                }
            }
            DocumentAddress::Collection { pack_id, entry_id } => {
                self.resolve_collection_entry(&pack_id, &entry_id).await
            }
        }
    }

    // =========================================================================
    // Placements
    // =========================================================================

    async fn resolve_placements(
        &self,
        strategy: &dyn KindStrategy,
        document: &Document,
    ) -> Result<ResolutionTally, AdventureError> {
        let mut tally = ResolutionTally::default();
        let mut links = PartialUpdate::new();

        for field in strategy.collect_reference_fields(&document.payload) {
            match field {
                ReferenceField::Placement {
                    collection,
                    member_id,
                    field,
                    target_kind,
                    original_id,
                } => match self.id_map.get(target_kind, &original_id) {
                    Some(new_id) => {
                        self.store
                            .update_nested_member(
                                document.kind,
                                &document.id,
                                collection,
                                &member_id,
                                &PartialUpdate::single(field, new_id),
                            )
                            .await?;
                        tally.hit();
                    }
                    None => {
                        self.report_miss(document, &format!("{}.{}", target_kind.document_name(), original_id));
                        tally.miss();
                    }
                },
                ReferenceField::Link {
                    field,
                    target_kind,
                    original_id,
                } => match self.id_map.get(target_kind, &original_id) {
                    Some(new_id) => {
                        links.set(field, new_id);
                        tally.hit();
                    }
                    None => {
                        self.report_miss(document, &format!("{}.{}", target_kind.document_name(), original_id));
                        tally.miss();
                    }
                },
                ReferenceField::TableResult { .. } => {}
            }
        }

        if !links.is_empty() {
            self.store.update(document.kind, &document.id, &links).await?;
        }
        Ok(tally)
    }

    // =========================================================================
    // Table results
    // =========================================================================

    async fn resolve_table(
        &self,
        strategy: &dyn KindStrategy,
        document: &Document,
    ) -> Result<ResolutionTally, AdventureError> {
        let mut tally = ResolutionTally::default();

        for field in strategy.collect_reference_fields(&document.payload) {
            let ReferenceField::TableResult {
                result_id,
                tag,
                collection,
                original_id,
            } = field
            else {
                continue;
            };

            let update = match tag {
                ResultTag::Text => continue,
                ResultTag::WorldDocument => collection
                    .parse::<DocumentKind>()
                    .ok()
                    .and_then(|kind| self.id_map.get(kind, &original_id))
                    .map(|new_id| PartialUpdate::single("resultId", new_id)),
                ResultTag::CollectionEntry => self
                    .lookup_collection_entry(&collection, &original_id, None)
                    .await
                    .map(|(pack_id, entry_id)| {
                        let mut update = PartialUpdate::single("resultId", entry_id);
                        update.set("collection", pack_id);
                        update
                    }),
            };

            match update {
                Some(update) => {
                    self.store
                        .update_nested_member(document.kind, &document.id, "results", &result_id, &update)
                        .await?;
                    tally.hit();
                }
                None => {
                    self.report_miss(document, &format!("{}.{}", collection, original_id));
                    tally.miss();
                }
            }
        }
        Ok(tally)
    }

    // =========================================================================
    // Text tokens
    // =========================================================================

    async fn resolve_text(
        &self,
        strategy: &dyn KindStrategy,
        document: &Document,
    ) -> Result<ResolutionTally, AdventureError> {
        let (rewritten, tally) = self.rewrite_payload(&document.payload).await;
        let members = strategy.member_collections();

        let top = PartialUpdate::diff_excluding(&document.payload, &rewritten, members);
        if !top.is_empty() {
            self.store.update(document.kind, &document.id, &top).await?;
        }

        for collection in members {
            let (Some(before), Some(after)) = (
                document.payload.get(*collection).and_then(Value::as_array),
                rewritten.get(*collection).and_then(Value::as_array),
            ) else {
                continue;
            };
            for (before, after) in before.iter().zip(after) {
                let Some(member_id) = after.get("_id").and_then(Value::as_str) else {
                    continue;
                };
                let changes = PartialUpdate::diff_excluding(before, after, &["_id"]);
                if changes.is_empty() {
                    continue;
                }
                self.store
                    .update_nested_member(document.kind, &document.id, collection, member_id, &changes)
                    .await?;
            }
        }
        Ok(tally)
    }

    async fn resolve_collection_entry(&self, pack_id: &str, entry_id: &str) -> Result<ResolutionTally, AdventureError> {
        let entry = self
            .store
            .collection_get(pack_id, entry_id)
            .await?
            .ok_or_else(|| anyhow!("Entry {} missing from {}", entry_id, pack_id))?;

        let (rewritten, tally) = self.rewrite_payload(&entry.payload).await;
        let changes = PartialUpdate::diff(&entry.payload, &rewritten);
        if !changes.is_empty() {
            self.store.collection_update(pack_id, entry_id, &changes).await?;
        }
        Ok(tally)
    }

    /// Rewrite every string leaf of `payload` holding a reference token
    async fn rewrite_payload(&self, payload: &Value) -> (Value, ResolutionTally) {
        let mut leaves = Vec::new();
        collect_text_leaves(payload, String::new(), &mut leaves);

        let mut rewritten = payload.clone();
        let mut tally = ResolutionTally::default();
        for (pointer, text) in leaves {
            let (replacement, leaf_tally) = self.rewrite_text(&text).await;
            tally += leaf_tally;
            if replacement != text {
                if let Some(slot) = rewritten.pointer_mut(&pointer) {
                    *slot = Value::String(replacement);
                }
            }
        }
        (rewritten, tally)
    }

    /// Tokenize, resolve tokens concurrently, reassemble
    pub async fn rewrite_text(&self, text: &str) -> (String, ResolutionTally) {
        let spans = tokenize(text);
        let resolutions = join_all(spans.iter().map(|span| async move {
            match span {
                Span::Literal(_) => None,
                Span::Token(token) => self.resolve_token(token).await,
            }
        }))
        .await;

        let mut tally = ResolutionTally::default();
        let mut out = String::with_capacity(text.len());
        for (span, resolution) in spans.iter().zip(resolutions) {
            match (span, resolution) {
                (Span::Literal(literal), _) => out.push_str(literal),
                (Span::Token(_), Some(replacement)) => {
                    tally.hit();
                    out.push_str(&replacement);
                }
                (Span::Token(token), None) => {
                    warn!(
                        error = %AdventureError::ReferenceUnresolved(token.raw().to_string()),
                        "Leaving reference as authored"
                    );
                    tally.miss();
                    out.push_str(token.raw());
                }
            }
        }
        (out, tally)
    }

    async fn resolve_token(&self, token: &ReferenceToken) -> Option<String> {
        match &token.target {
            TokenTarget::Document { kind, id } => self
                .id_map
                .get(*kind, id)
                .map(|new_id| token.rewrite(None, new_id)),
            TokenTarget::CollectionEntry { pack_id, entry_id } => self
                .lookup_collection_entry(pack_id, entry_id, token.label.as_deref())
                .await
                .map(|(pack, entry)| token.rewrite(Some(&pack), &entry)),
        }
    }

    /// Destination (pack id, entry id) of a collection entry.
    ///
    /// Searches the pack's content for the stamped import id, then falls back
    /// to the first index entry whose name equals `label`.
    async fn lookup_collection_entry(
        &self,
        pack_id: &str,
        entry_id: &str,
        label: Option<&str>,
    ) -> Option<(String, String)> {
        let destination = self
            .collections
            .get(pack_id)
            .cloned()
            .unwrap_or_else(|| pack_id.to_string());

        let info = match self.store.get_collection(&destination).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!(pack = %destination, "Collection not present in destination");
                return None;
            }
            Err(e) => {
                warn!(pack = %destination, error = %e, "Failed to look up collection");
                return None;
            }
        };
        if info.locked {
            debug!(pack = %destination, "Collection is locked, skipping lookup");
            return None;
        }

        match self.store.collection_content(&destination).await {
            Ok(content) => {
                if let Some(entry) = content.iter().find(|entry| entry.import_id() == Some(entry_id)) {
                    return Some((destination, entry.id.clone()));
                }
            }
            Err(e) => warn!(pack = %destination, error = %e, "Failed to read collection content"),
        }

        let label = label?;
        let index = match self.store.collection_index(&destination).await {
            Ok(index) => index,
            Err(e) => {
                warn!(pack = %destination, error = %e, "Failed to read collection index");
                return None;
            }
        };
        index
            .into_iter()
            .find(|entry| entry.name == label)
            .map(|entry| (destination, entry.id))
    }

    fn report_miss(&self, document: &Document, reference: &str) {
        warn!(
            error = %AdventureError::ReferenceUnresolved(reference.to_string()),
            document = %document.name,
            "Leaving reference as authored"
        );
    }
}

fn collect_text_leaves(value: &Value, pointer: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::String(text) if contains_reference(text) => out.push((pointer, text.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_text_leaves(item, format!("{}/{}", pointer, index), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let escaped = key.replace('~', "~0").replace('/', "~1");
                collect_text_leaves(item, format!("{}/{}", pointer, escaped), out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{stamp_import_id, CollectionInfo};
    use crate::infrastructure::persistence::InMemoryContentStore;
    use serde_json::json;

    struct Fixture {
        store: InMemoryContentStore,
        registry: KindRegistry,
        id_map: IdMap,
        collections: HashMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: InMemoryContentStore::default(),
                registry: KindRegistry::standard(),
                id_map: IdMap::new(),
                collections: HashMap::new(),
            }
        }

        fn resolver(&self) -> ReferenceResolver<'_> {
            ReferenceResolver::new(&self.store, &self.registry, &self.id_map, &self.collections)
        }
    }

    #[tokio::test]
    async fn test_text_tokens_point_at_destination_ids() {
        let mut fx = Fixture::new();
        fx.id_map.insert(DocumentKind::Actor, "a1", "NEWa1");
        let journal = fx
            .store
            .insert_document(
                DocumentKind::JournalEntry,
                json!({ "name": "Notes", "content": "Meet @Actor[a1]{Goblin} and @Actor[zz]{Ghost}." }),
            )
            .await;

        let tally = fx
            .resolver()
            .resolve(DocumentAddress::World {
                kind: DocumentKind::JournalEntry,
                id: journal.id.clone(),
            })
            .await
            .unwrap();

        let after = fx.store.document(DocumentKind::JournalEntry, &journal.id).await.unwrap();
        assert_eq!(
            after.payload["content"],
            json!("Meet @Actor[NEWa1]{Goblin} and @Actor[zz]{Ghost}.")
        );
        assert_eq!(tally, ResolutionTally { resolved: 1, unresolved: 1 });
    }

    #[tokio::test]
    async fn test_tokens_under_dotted_flag_scopes_resolve_in_place() {
        let mut fx = Fixture::new();
        fx.id_map.insert(DocumentKind::Actor, "a1", "NEWa1");
        let journal = fx
            .store
            .insert_document(
                DocumentKind::JournalEntry,
                json!({ "name": "Notes", "flags": { "my.module": { "note": "see @Actor[a1]" } } }),
            )
            .await;

        fx.resolver()
            .resolve(DocumentAddress::World {
                kind: DocumentKind::JournalEntry,
                id: journal.id.clone(),
            })
            .await
            .unwrap();

        let after = fx.store.document(DocumentKind::JournalEntry, &journal.id).await.unwrap();
        assert_eq!(after.payload["flags"]["my.module"]["note"], json!("see @Actor[NEWa1]"));
        assert!(after.payload["flags"].get("my").is_none());
    }

    #[tokio::test]
    async fn test_actor_items_are_updated_member_by_member() {
        let mut fx = Fixture::new();
        fx.id_map.insert(DocumentKind::JournalEntry, "j1", "NEWj1");
        let actor = fx
            .store
            .insert_document(
                DocumentKind::Actor,
                json!({
                    "name": "Sage",
                    "items": [
                        { "_id": "i1", "name": "Tome", "data": { "description": "See @JournalEntry[j1]" } },
                        { "_id": "i2", "name": "Staff", "data": { "description": "Plain" } }
                    ]
                }),
            )
            .await;

        fx.resolver()
            .resolve(DocumentAddress::World {
                kind: DocumentKind::Actor,
                id: actor.id.clone(),
            })
            .await
            .unwrap();

        let after = fx.store.document(DocumentKind::Actor, &actor.id).await.unwrap();
        assert_eq!(
            after.payload["items"][0]["data"]["description"],
            json!("See @JournalEntry[NEWj1]")
        );
        assert_eq!(fx.store.nested_update_count().await, 1);
    }

    #[tokio::test]
    async fn test_scene_placements_resolve_known_actors_only() {
        let mut fx = Fixture::new();
        fx.id_map.insert(DocumentKind::Actor, "a1", "NEWa1");
        fx.id_map.insert(DocumentKind::JournalEntry, "j1", "NEWj1");
        let scene = fx
            .store
            .insert_document(
                DocumentKind::Scene,
                json!({
                    "name": "Cave",
                    "journal": "j1",
                    "tokens": [
                        { "_id": "t1", "actorId": "a1" },
                        { "_id": "t2", "actorId": "a3" }
                    ]
                }),
            )
            .await;

        let tally = fx
            .resolver()
            .resolve(DocumentAddress::World {
                kind: DocumentKind::Scene,
                id: scene.id.clone(),
            })
            .await
            .unwrap();

        let after = fx.store.document(DocumentKind::Scene, &scene.id).await.unwrap();
        assert_eq!(after.payload["tokens"][0]["actorId"], json!("NEWa1"));
        assert_eq!(after.payload["tokens"][1]["actorId"], json!("a3"));
        assert_eq!(after.payload["journal"], json!("NEWj1"));
        assert_eq!(tally, ResolutionTally { resolved: 2, unresolved: 1 });
    }

    #[tokio::test]
    async fn test_table_results_branch_on_tag() {
        let mut fx = Fixture::new();
        fx.id_map.insert(DocumentKind::Item, "i1", "NEWi1");
        let pack = fx
            .store
            .insert_collection(CollectionInfo {
                id: "world.loot".to_string(),
                label: "Loot".to_string(),
                kind: DocumentKind::Item,
                package: "world".to_string(),
                locked: false,
            })
            .await;
        let mut gem = json!({ "name": "Gem" });
        stamp_import_id(&mut gem, "e1");
        let entry = fx.store.insert_collection_entry(&pack.id, gem).await;
        fx.collections.insert("world.oldloot".to_string(), pack.id.clone());

        let table = fx
            .store
            .insert_document(
                DocumentKind::RollTable,
                json!({
                    "name": "Hoard",
                    "results": [
                        { "_id": "r1", "type": 0, "text": "Nothing" },
                        { "_id": "r2", "type": 1, "collection": "Item", "resultId": "i1" },
                        { "_id": "r3", "type": 2, "collection": "world.oldloot", "resultId": "e1" }
                    ]
                }),
            )
            .await;

        let tally = fx
            .resolver()
            .resolve(DocumentAddress::World {
                kind: DocumentKind::RollTable,
                id: table.id.clone(),
            })
            .await
            .unwrap();

        let after = fx.store.document(DocumentKind::RollTable, &table.id).await.unwrap();
        assert_eq!(after.payload["results"][0]["text"], json!("Nothing"));
        assert_eq!(after.payload["results"][1]["resultId"], json!("NEWi1"));
        assert_eq!(after.payload["results"][2]["resultId"], json!(entry.id));
        assert_eq!(after.payload["results"][2]["collection"], json!("world.loot"));
        assert_eq!(tally.resolved, 2);
    }

    #[tokio::test]
    async fn test_anchor_to_remapped_pack_rewrites_pack_and_entry() {
        let mut fx = Fixture::new();
        let pack = fx
            .store
            .insert_collection(CollectionInfo {
                id: "world.bestiary".to_string(),
                label: "Bestiary".to_string(),
                kind: DocumentKind::Actor,
                package: "world".to_string(),
                locked: false,
            })
            .await;
        let mut wolf = json!({ "name": "Wolf" });
        stamp_import_id(&mut wolf, "w1");
        let entry = fx.store.insert_collection_entry(&pack.id, wolf).await;
        fx.collections.insert("world.monsters".to_string(), pack.id.clone());

        let text = r#"<a class="entity-link" data-pack="world.monsters" data-id="w1">Wolf</a>"#;
        let (out, tally) = fx.resolver().rewrite_text(text).await;

        assert_eq!(
            out,
            format!(r#"<a class="entity-link" data-pack="world.bestiary" data-id="{}">Wolf</a>"#, entry.id)
        );
        assert_eq!(tally.resolved, 1);
    }

    #[tokio::test]
    async fn test_locked_collection_is_not_searched() {
        let fx = Fixture::new();
        let pack = fx
            .store
            .insert_collection(CollectionInfo {
                id: "dnd5e.items".to_string(),
                label: "Items".to_string(),
                kind: DocumentKind::Item,
                package: "dnd5e".to_string(),
                locked: true,
            })
            .await;
        let mut sword = json!({ "name": "Sword" });
        stamp_import_id(&mut sword, "s1");
        fx.store.insert_collection_entry(&pack.id, sword).await;

        let text = "@Compendium[dnd5e.items.s1]{Sword}";
        let (out, tally) = fx.resolver().rewrite_text(text).await;

        assert_eq!(out, text);
        assert_eq!(tally.unresolved, 1);
    }

    #[tokio::test]
    async fn test_bracket_falls_back_to_display_text() {
        let fx = Fixture::new();
        let pack = fx
            .store
            .insert_collection(CollectionInfo {
                id: "world.spells".to_string(),
                label: "Spells".to_string(),
                kind: DocumentKind::Item,
                package: "world".to_string(),
                locked: false,
            })
            .await;
        let fireball = fx
            .store
            .insert_collection_entry(&pack.id, json!({ "name": "Fireball" }))
            .await;

        let (out, _) = fx
            .resolver()
            .rewrite_text("Cast @Compendium[world.spells.old1]{Fireball}")
            .await;

        assert_eq!(out, format!("Cast @Compendium[world.spells.{}]{{Fireball}}", fireball.id));
    }
}
