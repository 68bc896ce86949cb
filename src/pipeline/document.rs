use serde_json::Value;

use crate::model::apperror::ApplicationError;
use crate::pipeline::Document;

static NULL: Value = Value::Null;

/**
 * Resolves a dotted path inside a document.
 *
 * Walking through a `null` yields `null`, and an out of range array index yields `null`.
 * Returns `None` when an object along the path lacks the requested key.
 */
pub fn find_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(object) => object.get(segment)?,
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(index) => items.get(index).unwrap_or(&NULL),
                Err(_) => return None,
            },
            Value::Null => return Some(&NULL),
            _ => return None,
        };
    }
    Some(current)
}

/**
 * Like `find_path`, but a missing field is an error.
 */
pub fn get_path<'a>(document: &'a Document, path: &str) -> Result<&'a Value, ApplicationError> {
    find_path(document, path).ok_or_else(|| ApplicationError::field_not_found(path))
}

/**
 * Sets the value at a dotted path, creating intermediate objects as needed.
 */
pub fn set_path(document: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = document.entry(head.to_string()).or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}
