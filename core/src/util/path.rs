//! 点分路径解析与状态树读写

use crate::error::StateError;
use serde_json::{Map, Value};

/// Split a dot path into segments, rejecting empty paths and empty segments.
pub fn split_path(path: &str) -> Result<Vec<&str>, StateError> {
    if path.is_empty() {
        return Err(StateError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StateError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// True when `a` and `b` are the same path or one is nested under the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    fn nested(long: &str, short: &str) -> bool {
        long.len() > short.len()
            && long.starts_with(short)
            && long.as_bytes()[short.len()] == b'.'
    }
    a == b || nested(a, b) || nested(b, a)
}

pub fn lookup<'a>(tree: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(tree, |node, seg| node.as_object()?.get(*seg))
}

/// Write `value` at `segments`, creating (or replacing non-object) intermediates.
pub fn insert(tree: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut cursor = tree;
    for seg in parents {
        cursor = ensure_object(cursor)
            .entry((*seg).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(cursor).insert((*last).to_string(), value);
}

pub fn remove(tree: &mut Value, segments: &[&str]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let mut cursor = tree;
    for seg in parents {
        cursor = cursor.as_object_mut()?.get_mut(*seg)?;
    }
    cursor.as_object_mut()?.remove(*last)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}
