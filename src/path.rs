//! Dotted-path access into JSON values (`"cart.items.0.qty"`).
//!
//! Object members are addressed by key and array elements by decimal index.
//! Assignment requires the parent to exist; it never creates intermediate
//! containers.

#[cfg(test)]
#[path = "path_test.rs"]
mod path_test;

use serde_json::Value;

/// Error returned by [`set`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("no value at '{0}'")]
    Missing(String),
    #[error("'{segment}' does not index the value at '{parent}'")]
    NotIndexable { parent: String, segment: String },
}

/// Read the value at `path`, if present.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(root, child)
}

/// Assign `value` at `path`, returning the value it replaced.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<Option<Value>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };

    let parent = match parent_path {
        Some(parent_path) => {
            let mut cursor = root;
            for segment in parent_path.split('.') {
                cursor = child_mut(cursor, segment).ok_or_else(|| PathError::Missing(parent_path.to_owned()))?;
            }
            cursor
        }
        None => root,
    };

    let not_indexable = || PathError::NotIndexable {
        parent: parent_path.unwrap_or_default().to_owned(),
        segment: last.to_owned(),
    };
    match parent {
        Value::Object(map) => Ok(map.insert(last.to_owned(), value)),
        Value::Array(items) => {
            let index = parse_index(last).ok_or_else(not_indexable)?;
            let slot = items.get_mut(index).ok_or_else(not_indexable)?;
            Ok(Some(std::mem::replace(slot, value)))
        }
        _ => Err(not_indexable()),
    }
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => parse_index(segment).and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => parse_index(segment).and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match segment.parse::<usize>() {
        Ok(index) => Some(index),
        Err(_) => None,
    }
}
