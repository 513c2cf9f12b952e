//! Dotted-path access into `serde_json::Value` trees.
//!
//! Paths are `.`-separated segments; a segment that parses as an index
//! addresses array elements. Shared by step execution and the condition
//! evaluator.

use serde_json::{Map, Value};

use crate::DslError;

/// Resolve `path` inside `root`, returning `None` when any segment is
/// missing.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Assign `value` at `path`, creating intermediate objects as needed.
///
/// # Errors
/// [`DslError::PathUnassignable`] if an existing intermediate segment is
/// neither an object nor absent.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<(), DslError> {
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();

    for (i, segment) in segments.iter().enumerate() {
        let map = current
            .as_object_mut()
            .ok_or_else(|| DslError::PathUnassignable(path.to_string()))?;

        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return Ok(());
        }

        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    // Unreachable: split always yields at least one segment.
    Err(DslError::PathUnassignable(path.to_string()))
}

/// Remove the value at `path`, returning it if present.
pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };

    let parent = match parent_path {
        Some(p) => get_mut(root, p)?,
        None => root,
    };

    parent.as_object_mut()?.remove(leaf)
}

fn get_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
