//! Structured-document utilities.
//!
//! Catalog definitions and dataset metadata are arbitrary JSON documents.
//! This module provides offset-based access into them and the structural
//! comparison used to enforce the "stored definitions never silently
//! change" invariant: re-registration with identical content is a no-op,
//! re-registration with different content must fail loudly, naming the
//! fields that differ.

use serde_json::{Map, Value};

/// A path into a nested document: a sequence of object keys.
pub type Offset = [String];

/// One field-level difference between two documents.
#[derive(Debug, Clone, PartialEq)]
pub struct DocChange {
    /// Path of the differing field, as object keys from the root.
    pub path: Vec<String>,
    /// Value at the path in the original document, if present.
    pub original: Option<Value>,
    /// Value at the path in the new document, if present.
    pub updated: Option<Value>,
}

impl std::fmt::Display for DocChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() {
            ".".to_string()
        } else {
            self.path.join(".")
        };
        let render = |v: &Option<Value>| match v {
            Some(v) => v.to_string(),
            None => "<missing>".to_string(),
        };
        write!(
            f,
            "{path}: {} != {}",
            render(&self.original),
            render(&self.updated)
        )
    }
}

/// A document differs from its stored counterpart.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{label} differs from the stored document: {}", render_changes(changes))]
pub struct DocMismatch {
    /// Human-readable label of the entity being compared (e.g. `metadata type eo`).
    pub label: String,
    /// The field-level differences found.
    pub changes: Vec<DocChange>,
}

fn render_changes(changes: &[DocChange]) -> String {
    changes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads the value at `offset`, if every intermediate key exists.
#[must_use]
pub fn get_offset<'a>(doc: &'a Value, offset: &Offset) -> Option<&'a Value> {
    let mut current = doc;
    for key in offset {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Writes `value` at `offset`, creating intermediate objects as needed.
///
/// Intermediate non-object values are replaced by objects; an empty offset
/// replaces the whole document.
pub fn set_offset(doc: &mut Value, offset: &Offset, value: Value) {
    let Some((last, parents)) = offset.split_last() else {
        *doc = value;
        return;
    };

    let mut current = doc;
    for key in parents {
        current = ensure_object(current)
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.clone(), value);
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("non-object was just replaced"),
    }
}

/// Computes the field-level differences between two documents.
///
/// Objects are compared key-by-key (recursively); every other value kind,
/// arrays included, is compared wholesale. Number comparison is by value,
/// so `1` and `1.0` are considered equal.
#[must_use]
pub fn doc_changes(original: &Value, updated: &Value) -> Vec<DocChange> {
    let mut changes = Vec::new();
    collect_changes(original, updated, &mut Vec::new(), &mut changes);
    changes
}

fn collect_changes(
    original: &Value,
    updated: &Value,
    path: &mut Vec<String>,
    out: &mut Vec<DocChange>,
) {
    match (original, updated) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                path.push(key.clone());
                match (a.get(key), b.get(key)) {
                    (Some(av), Some(bv)) => collect_changes(av, bv, path, out),
                    (av, bv) => out.push(DocChange {
                        path: path.clone(),
                        original: av.cloned(),
                        updated: bv.cloned(),
                    }),
                }
                path.pop();
            }
        }
        (Value::Number(a), Value::Number(b)) => {
            if a.as_f64() != b.as_f64() {
                out.push(DocChange {
                    path: path.clone(),
                    original: Some(original.clone()),
                    updated: Some(updated.clone()),
                });
            }
        }
        (a, b) => {
            if a != b {
                out.push(DocChange {
                    path: path.clone(),
                    original: Some(a.clone()),
                    updated: Some(b.clone()),
                });
            }
        }
    }
}

/// Verifies that `updated` is structurally identical to `original`.
///
/// # Errors
///
/// Returns [`DocMismatch`] listing every differing field if the documents
/// are not identical.
pub fn check_doc_unchanged(
    original: &Value,
    updated: &Value,
    label: impl Into<String>,
) -> Result<(), DocMismatch> {
    let changes = doc_changes(original, updated);
    if changes.is_empty() {
        Ok(())
    } else {
        Err(DocMismatch {
            label: label.into(),
            changes,
        })
    }
}
