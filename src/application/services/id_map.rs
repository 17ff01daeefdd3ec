//! ID map - original import keys to destination ids, scoped to one import

use std::collections::HashMap;

use crate::domain::value_objects::DocumentKind;

/// Mapping from (kind, import key) to the id assigned by the destination store
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    entries: HashMap<(DocumentKind, String), String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping, returning the previous destination id if there was one
    pub fn insert(
        &mut self,
        kind: DocumentKind,
        import_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Option<String> {
        self.entries
            .insert((kind, import_id.into()), destination_id.into())
    }

    pub fn get(&self, kind: DocumentKind, import_id: &str) -> Option<&str> {
        self.entries
            .get(&(kind, import_id.to_string()))
            .map(String::as_str)
    }

    pub fn contains(&self, kind: DocumentKind, import_id: &str) -> bool {
        self.get(kind, import_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of mappings recorded for one kind
    pub fn count_for(&self, kind: DocumentKind) -> usize {
        self.entries.keys().filter(|(k, _)| *k == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_scoped_by_kind() {
        let mut map = IdMap::new();
        assert!(map.insert(DocumentKind::Actor, "a1", "new-a1").is_none());
        map.insert(DocumentKind::Item, "a1", "new-i1");

        assert_eq!(map.get(DocumentKind::Actor, "a1"), Some("new-a1"));
        assert_eq!(map.get(DocumentKind::Item, "a1"), Some("new-i1"));
        assert_eq!(map.get(DocumentKind::Scene, "a1"), None);
        assert_eq!(map.count_for(DocumentKind::Actor), 1);
        assert_eq!(map.len(), 2);
    }
}
