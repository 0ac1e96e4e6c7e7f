//! Soft errors and the result record returned by every resolve call.
//!
//! Nothing recoverable aborts resolution. A missing pointer, a failed fetch or a failing hook
//! becomes a [`ResolveError`] in [`ResolveResult::errors`] and the rest of the document is still
//! resolved.

use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::{collections::HashMap, fmt};
use thiserror::Error;

use crate::pointer::path_to_pointer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveErrorKind {
    /// No node exists at a requested pointer.
    PointerMissing,
    /// A reference's pointer could not be parsed.
    ResolvePointer,
    /// The pointer passed to a resolve call could not be parsed.
    ParsePointer,
    /// A reference could not be turned into an absolute URI.
    ParseUri,
    /// Fetch failure, missing fetcher for a scheme, or the depth ceiling was reached.
    ResolveUri,
    /// The dereference transform hook failed.
    TransformDereferenced,
}

impl ResolveErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ResolveErrorKind::PointerMissing => "POINTER_MISSING",
            ResolveErrorKind::ResolvePointer => "RESOLVE_POINTER",
            ResolveErrorKind::ParsePointer => "PARSE_POINTER",
            ResolveErrorKind::ParseUri => "PARSE_URI",
            ResolveErrorKind::ResolveUri => "RESOLVE_URI",
            ResolveErrorKind::TransformDereferenced => "TRANSFORM_DEREFERENCED",
        }
    }
}

impl fmt::Display for ResolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind} at {}: {message}", path_to_pointer(.path))]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    pub message: String,
    /// Document path of the offending location.
    pub path: Vec<String>,
    /// Authorities visited on the external-reference chain that led here.
    pub authority_stack: Vec<String>,
    /// Pointers followed inside the current document to reach the offending reference.
    pub pointer_stack: Vec<String>,
}

impl ResolveError {
    pub fn new<M: Into<String>>(kind: ResolveErrorKind, message: M, path: Vec<String>) -> Self {
        ResolveError {
            kind,
            message: message.into(),
            path,
            authority_stack: Vec::new(),
            pointer_stack: Vec::new(),
        }
    }

    pub fn with_authority_stack(mut self, authority_stack: &[String]) -> Self {
        self.authority_stack = authority_stack.to_vec();
        self
    }

    pub fn with_pointer_stack(mut self, pointer_stack: &[String]) -> Self {
        self.pointer_stack = pointer_stack.to_vec();
        self
    }
}

/// Resolved location (a root-relative pointer) to the reference it was satisfied from.
///
/// Iterates in insertion order. Re-inserting a key updates its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl RefMap {
    pub fn new() -> Self {
        RefMap::default()
    }

    pub fn insert(&mut self, pointer: String, reference: String) {
        match self.index.get(&pointer) {
            Some(idx) => self.entries[*idx].1 = reference,
            None => {
                self.index.insert(pointer.clone(), self.entries.len());
                self.entries.push((pointer, reference));
            }
        }
    }

    pub fn get(&self, pointer: &str) -> Option<&str> {
        self.index
            .get(pointer)
            .map(|idx| self.entries[*idx].1.as_str())
    }

    pub fn contains_key(&self, pointer: &str) -> bool {
        self.index.contains_key(pointer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for RefMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (pointer, reference) in self.entries.iter() {
            map.serialize_entry(pointer, reference)?;
        }
        map.end()
    }
}

/// Identity of the resolution context that produced a [`ResolveResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub id: usize,
    pub depth: usize,
    pub base_uri: String,
    pub authority_stack: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub result: Value,
    pub ref_map: RefMap,
    pub errors: Vec<ResolveError>,
    pub context: ContextSummary,
}

impl ResolveResult {
    pub fn new(result: Value, context: ContextSummary) -> Self {
        ResolveResult {
            result,
            ref_map: RefMap::new(),
            errors: Vec::new(),
            context,
        }
    }

    /// Errors of one kind.
    pub fn errors_of(&self, kind: ResolveErrorKind) -> impl Iterator<Item = &ResolveError> + '_ {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}
