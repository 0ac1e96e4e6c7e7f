//! JSON Pointer (RFC 6901) helpers over [`serde_json::Value`] documents.
//!
//! Pointers are handled in their URI fragment form (`#/a/b~1c/0`). A path is the decoded sequence
//! of segments (`["a", "b/c", "0"]`). Array segments are decimal indices.

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::error::ResolverError;

/// The pointer addressing a whole document.
pub const ROOT_POINTER: &str = "#";

/// Escape a single path segment for inclusion in a pointer.
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Reverse of [`escape_segment`]. Order matters: `~1` must be unescaped before `~0`.
pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Decode `%XX` escapes in a URI fragment. Stray `%` signs are kept; a result that is not UTF-8
/// is an error.
fn percent_decode(fragment: &str) -> Result<String, ResolverError> {
    percent_decode_str(fragment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ResolverError::InvalidPointer(format!("'{fragment}' is not utf-8: {e}")))
}

/// True when `reference` is a same-document pointer (a bare fragment).
pub fn is_pointer(reference: &str) -> bool {
    reference.starts_with('#')
}

/// Parse a pointer (with or without the leading `#`) into its path segments.
///
/// `""` and `"#"` address the whole document and yield an empty path.
pub fn pointer_to_path(pointer: &str) -> Result<Vec<String>, ResolverError> {
    let fragment = pointer.strip_prefix('#').unwrap_or(pointer);
    let decoded = percent_decode(fragment)?;
    if decoded.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = decoded.strip_prefix('/') else {
        return Err(ResolverError::InvalidPointer(format!(
            "'{pointer}' must start with '/'"
        )));
    };
    Ok(rest.split('/').map(unescape_segment).collect())
}

/// Render a path as a fragment pointer. The empty path is `#`.
pub fn path_to_pointer<S: AsRef<str>>(path: &[S]) -> String {
    let mut pointer = String::from(ROOT_POINTER);
    for segment in path {
        pointer.push('/');
        pointer.push_str(&escape_segment(segment.as_ref()));
    }
    pointer
}

/// Append one segment to a pointer.
pub fn append_segment(pointer: &str, segment: &str) -> String {
    let base = if pointer.is_empty() { ROOT_POINTER } else { pointer };
    format!("{}/{}", base.trim_end_matches('/'), escape_segment(segment))
}

/// True when `prefix` is an ancestor-or-self of `path`.
pub fn starts_with<A: AsRef<str>, B: AsRef<str>>(path: &[A], prefix: &[B]) -> bool {
    prefix.len() <= path.len()
        && prefix
            .iter()
            .zip(path.iter())
            .all(|(p, s)| p.as_ref() == s.as_ref())
}

/// Number of leading segments `a` and `b` share.
pub fn common_prefix_len<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> usize {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x.as_ref() == y.as_ref())
        .count()
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    segment.parse::<usize>().ok()
}

/// Look up the node at `path`.
pub fn get<'a, S: AsRef<str>>(doc: &'a Value, path: &[S]) -> Option<&'a Value> {
    let pointer = path_to_pointer(path);
    doc.pointer(pointer.strip_prefix(ROOT_POINTER).unwrap_or(&pointer))
}

/// Write `value` at `path`, creating intermediate containers as needed.
///
/// Missing intermediates become arrays when the following segment is an index and objects
/// otherwise. A scalar standing in the way is replaced. The empty path replaces the document.
pub fn set<S: AsRef<str>>(doc: &mut Value, path: &[S], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *doc = value;
        return;
    };
    let mut node = doc;
    for (idx, segment) in parents.iter().enumerate() {
        let next_is_index = parse_index(path[idx + 1].as_ref()).is_some();
        node = child_mut(node, segment.as_ref(), next_is_index);
    }
    *child_mut(node, last.as_ref(), false) = value;
}

fn empty_container(as_array: bool) -> Value {
    if as_array {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str, next_is_index: bool) -> &'a mut Value {
    let index = parse_index(segment);
    let addressable = matches!(
        (&*node, index),
        (Value::Array(_), Some(_)) | (Value::Object(_), _)
    );
    if !addressable {
        *node = Value::Object(Map::new());
    }
    match (node, index) {
        (Value::Array(items), Some(idx)) => {
            if items.len() <= idx {
                items.resize(idx + 1, Value::Null);
            }
            let slot = &mut items[idx];
            if !is_composite(slot) && next_is_index {
                *slot = empty_container(true);
            }
            slot
        }
        (Value::Object(map), _) => map
            .entry(segment.to_string())
            .or_insert_with(|| empty_container(next_is_index)),
        (other, _) => other,
    }
}

/// True for objects and arrays.
pub fn is_composite(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}
