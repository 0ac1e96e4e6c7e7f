//! Injection points for callers that need more than `$ref` objects resolved as-is.
//!
//! All hooks are plain closures stored behind `Arc` so a configured
//! [`Resolver`](super::Resolver) can be cloned freely and handed to concurrent lookups.

use serde_json::Value;
use std::sync::Arc;

use crate::{error::ResolverError, uri::RefUri};

/// A node offered to the reference predicate.
#[derive(Debug, Clone, Copy)]
pub struct RefCandidate<'a> {
    /// Property name the node sits under; `None` for array items and the crawl root.
    pub key: Option<&'a str>,
    pub value: &'a Value,
    /// Pointer of `value` within its document.
    pub pointer: &'a str,
    /// Pointers already followed to reach this node.
    pub pointer_stack: &'a [String],
}

/// Decides whether a node is a reference and, if so, what it points at.
pub type RefPredicate = Arc<dyn Fn(&RefCandidate<'_>) -> Option<String> + Send + Sync>;

/// Rewrites an absolutized reference before it is used.
pub type RefTransform = Arc<dyn Fn(RefUri, &RefCandidate<'_>, &RefUri) -> RefUri + Send + Sync>;

/// A freshly fetched payload and where it came from.
#[derive(Debug)]
pub struct ParseInput<'a> {
    pub result: Value,
    pub target_authority: &'a RefUri,
    pub parent_authority: &'a RefUri,
    pub parent_path: &'a [String],
    pub fragment: Option<&'a str>,
}

/// Runs once per successful fetch, before the payload is cached.
pub type ParseResultHook = Arc<dyn Fn(ParseInput<'_>) -> Result<Value, ResolverError> + Send + Sync>;

/// The outcome of one resolve call, offered for a final rewrite.
#[derive(Debug)]
pub struct DereferenceInput<'a> {
    /// The document as it was before any substitution.
    pub source: &'a Value,
    pub result: Value,
    pub target_authority: &'a RefUri,
    pub parent_authority: &'a RefUri,
    pub parent_path: &'a [String],
    pub fragment: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub result: Value,
    /// Reported as a soft error while `result` is still used.
    pub error: Option<String>,
}

impl From<Value> for Transformed {
    fn from(result: Value) -> Self {
        Transformed {
            result,
            error: None,
        }
    }
}

/// Runs once per resolve call on its final result.
pub type DereferenceTransform =
    Arc<dyn Fn(DereferenceInput<'_>) -> Result<Transformed, ResolverError> + Send + Sync>;

/// Recognizes `{ "$ref": "<string>" }`.
pub fn dollar_ref(candidate: &RefCandidate<'_>) -> Option<String> {
    candidate
        .value
        .as_object()?
        .get("$ref")?
        .as_str()
        .map(str::to_string)
}

pub fn default_ref_predicate() -> RefPredicate {
    Arc::new(dollar_ref)
}
