//! Path operations on a JSON document tree.
//!
//! The tree never stores nulls or empty objects: writing `null` deletes a
//! node, and a parent whose last child was removed disappears with it.

use serde_json::{Map, Value};

use crate::path::DataPath;

/// Look up the node at `path`. Absent nodes (and paths through leaves) read as `None`.
#[must_use]
pub fn get<'a>(root: &'a Value, path: &DataPath) -> Option<&'a Value> {
    let mut node = root;
    for key in path.segments() {
        node = node.as_object()?.get(key)?;
    }
    if is_empty(node) {
        None
    } else {
        Some(node)
    }
}

/// Replace the node at `path`. `Value::Null` (or an empty object) deletes it.
pub fn set(root: &mut Value, path: &DataPath, value: Value) {
    let value = normalize(value);
    let segments = path.segments();

    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    if value.is_null() {
        remove(root, parents, last);
        return;
    }

    let mut node = root;
    for key in parents {
        node = ensure_object(node)
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.clone(), value);
}

/// Replace several descendants of `base` in order.
pub fn merge(root: &mut Value, base: &DataPath, children: &[(DataPath, Value)]) {
    for (relative, value) in children {
        set(root, &base.join(relative), value.clone());
    }
}

/// Strip nulls and empty objects, recursively.
#[must_use]
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

/// Remove `parents/last` and prune ancestors left empty. Returns true if `root`
/// itself became empty.
fn remove(node: &mut Value, parents: &[String], last: &str) -> bool {
    let Value::Object(map) = node else {
        return false;
    };
    match parents.split_first() {
        None => {
            map.remove(last);
        }
        Some((head, rest)) => {
            let Some(child) = map.get_mut(head) else {
                return map.is_empty();
            };
            if remove(child, rest, last) {
                map.remove(head);
            }
        }
    }
    map.is_empty()
}
