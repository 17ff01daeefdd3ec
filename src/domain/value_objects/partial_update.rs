//! Partial updates - leaf field changes applied to a payload

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A set of leaf changes keyed by field path.
///
/// Paths are stored as key segments, so payload keys that themselves contain
/// a `.` (module flag scopes such as `my.module`) are addressed exactly.
/// Hand-written paths passed to [`PartialUpdate::set`] use dotted notation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialUpdate(BTreeMap<Vec<String>, Value>);

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-field update
    pub fn single(path: &str, value: impl Into<Value>) -> Self {
        let mut update = Self::new();
        update.set(path, value);
        update
    }

    /// Set the field at a dotted path such as `token.actorId`
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        self.set_segments(split_dotted(path), value);
    }

    pub fn set_segments(&mut self, segments: Vec<String>, value: impl Into<Value>) {
        if segments.is_empty() {
            return;
        }
        self.0.insert(segments, value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(&split_dotted(path))
    }

    pub fn get_segments(&self, segments: &[&str]) -> Option<&Value> {
        let key: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
        self.0.get(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[String], &Value)> {
        self.0.iter().map(|(path, value)| (path.as_slice(), value))
    }

    /// Write every change into `target`, creating intermediate objects as needed
    pub fn apply_to(&self, target: &mut Value) {
        for (path, value) in &self.0 {
            let Some((leaf, parents)) = path.split_last() else {
                continue;
            };
            let mut cursor = &mut *target;
            for segment in parents {
                if !cursor.is_object() {
                    *cursor = Value::Object(Map::new());
                }
                cursor = match { cursor } {
                    Value::Object(object) => object
                        .entry(segment.clone())
                        .or_insert_with(|| Value::Object(Map::new())),
                    other => {
                        cursor = other;
                        break;
                    }
                };
            }
            if !cursor.is_object() {
                *cursor = Value::Object(Map::new());
            }
            if let Some(object) = cursor.as_object_mut() {
                object.insert(leaf.clone(), value.clone());
            }
        }
    }

    /// The changed leaves between two payloads.
    ///
    /// Objects are walked key by key; any other differing value (arrays included)
    /// is emitted whole at its path. Keys only present in `before` are ignored.
    pub fn diff(before: &Value, after: &Value) -> Self {
        Self::diff_excluding(before, after, &[])
    }

    /// Like [`PartialUpdate::diff`] but skips the given top-level keys
    pub fn diff_excluding(before: &Value, after: &Value, excluded: &[&str]) -> Self {
        let mut update = Self::new();
        if let (Value::Object(b), Value::Object(a)) = (before, after) {
            for (key, after_value) in a {
                if excluded.contains(&key.as_str()) {
                    continue;
                }
                let path = vec![key.clone()];
                match b.get(key) {
                    Some(before_value) => collect_changes(path, before_value, after_value, &mut update),
                    None => update.set_segments(path, after_value.clone()),
                }
            }
        } else if before != after {
            tracing::debug!("Diff of non-object payloads produces no field changes");
        }
        update
    }
}

fn split_dotted(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn collect_changes(path: Vec<String>, before: &Value, after: &Value, out: &mut PartialUpdate) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            for (key, after_value) in a {
                let mut child = path.clone();
                child.push(key.clone());
                match b.get(key) {
                    Some(before_value) => collect_changes(child, before_value, after_value, out),
                    None => out.set_segments(child, after_value.clone()),
                }
            }
        }
        _ => out.set_segments(path, after.clone()),
    }
}
