//! Synchronous discovery pass over one document.
//!
//! The crawler never mutates the document and never awaits. It classifies every node it visits,
//! records internal references as pointer-graph edges and collects external references as
//! [`LookupTask`]s for the owning [`ResolutionContext`] to run afterwards.

use serde_json::Value;

use super::{
    context::ResolutionContext,
    diagnostic::{ResolveError, ResolveErrorKind},
    hooks::RefCandidate,
};
use crate::{
    graph::PointerGraph,
    pointer::{append_segment, common_prefix_len, get, path_to_pointer, pointer_to_path, starts_with},
    uri::RefUri,
};

/// An external reference waiting to be fetched and resolved.
#[derive(Debug, Clone)]
pub struct LookupTask {
    pub uri: RefUri,
    /// The referencing node, substituted back when the lookup has to give up softly.
    pub value: Value,
    pub pointer_stack: Vec<String>,
    /// Where the resolved value is merged into the referencing document.
    pub parent_path: Vec<String>,
    pub parent_pointer: String,
}

#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub pointer_graph: PointerGraph,
    /// Edges from the ancestors of a cycle-closing reference to its target.
    pub stem_graph: PointerGraph,
    pub lookups: Vec<LookupTask>,
    pub errors: Vec<ResolveError>,
}

pub struct Crawler<'a> {
    context: &'a ResolutionContext,
    /// Set when only a sub-tree is being resolved; targets outside it are then crawled as well.
    resolving_pointer: Option<String>,
    outcome: CrawlOutcome,
}

impl<'a> Crawler<'a> {
    pub fn new(context: &'a ResolutionContext, resolving_pointer: Option<String>) -> Self {
        Crawler {
            context,
            resolving_pointer,
            outcome: CrawlOutcome::default(),
        }
    }

    pub fn finish(self) -> CrawlOutcome {
        self.outcome
    }

    pub fn crawl(
        &mut self,
        node: &Value,
        key: Option<&str>,
        parent_path: &[String],
        parent_pointer: &str,
        pointer_stack: &[String],
    ) {
        let candidate = RefCandidate {
            key,
            value: node,
            pointer: parent_pointer,
            pointer_stack,
        };
        match self.context.compute_ref(&candidate) {
            Ok(Some(uri)) => {
                if uri.is_pointer() {
                    if self.context.options().dereference_inline {
                        self.add_pointer_ref(&uri, parent_path, parent_pointer, pointer_stack);
                    }
                } else if self.context.options().dereference_remote
                    && self.context.authority_stack().len() <= self.context.options().max_uri_depth
                {
                    tracing::debug!("[Crawler] queueing lookup of '{uri}' at {parent_pointer}");
                    self.outcome.lookups.push(LookupTask {
                        uri,
                        value: node.clone(),
                        pointer_stack: pointer_stack.to_vec(),
                        parent_path: parent_path.to_vec(),
                        parent_pointer: parent_pointer.to_string(),
                    });
                }
                return;
            }
            Ok(None) => {}
            Err(e) => {
                self.outcome.errors.push(
                    ResolveError::new(ResolveErrorKind::ParseUri, e.to_string(), parent_path.to_vec())
                        .with_authority_stack(self.context.authority_stack())
                        .with_pointer_stack(pointer_stack),
                );
                return;
            }
        }

        match node {
            Value::Object(map) => {
                for (child_key, child) in map.iter() {
                    let mut path = parent_path.to_vec();
                    path.push(child_key.clone());
                    let pointer = append_segment(parent_pointer, child_key);
                    self.crawl(child, Some(child_key), &path, &pointer, pointer_stack);
                }
            }
            Value::Array(items) => {
                for (idx, child) in items.iter().enumerate() {
                    let segment = idx.to_string();
                    let mut path = parent_path.to_vec();
                    path.push(segment.clone());
                    let pointer = append_segment(parent_pointer, &segment);
                    self.crawl(child, None, &path, &pointer, pointer_stack);
                }
            }
            _ => {}
        }
    }

    fn add_pointer_ref(
        &mut self,
        uri: &RefUri,
        parent_path: &[String],
        parent_pointer: &str,
        pointer_stack: &[String],
    ) {
        let target_path = match pointer_to_path(&uri.pointer()) {
            Ok(path) => path,
            Err(e) => {
                self.outcome.errors.push(
                    ResolveError::new(
                        ResolveErrorKind::ResolvePointer,
                        e.to_string(),
                        parent_path.to_vec(),
                    )
                    .with_authority_stack(self.context.authority_stack())
                    .with_pointer_stack(pointer_stack),
                );
                return;
            }
        };
        // Canonical form, so differently escaped spellings share one graph node.
        let target_pointer = path_to_pointer(&target_path);

        let shared = common_prefix_len(parent_path, &target_path);
        if shared == target_path.len() {
            tracing::trace!("[Crawler] {parent_pointer} refers to its ancestor {target_pointer}");
            return;
        }

        if self.closes_cycle(parent_path, &target_path) {
            tracing::debug!("[Crawler] {parent_pointer} -> {target_pointer} closes a cycle");
            for depth in (shared + 1)..=parent_path.len() {
                let stem = path_to_pointer(&parent_path[..depth]);
                self.outcome.stem_graph.add_edge(&stem, &target_pointer);
            }
        }
        self.outcome
            .pointer_graph
            .add_edge(parent_pointer, &target_pointer);

        let context = self.context;
        if self.resolving_pointer.is_some() && !pointer_stack.contains(&target_pointer) {
            if let Some(target) = get(context.document(), &target_path) {
                let mut stack = pointer_stack.to_vec();
                stack.push(target_pointer.clone());
                let key = target_path.last().map(String::as_str);
                self.crawl(target, key, &target_path, &target_pointer, &stack);
            }
        }
    }

    /// True when something at or below `target_path` already depends on `parent_path` or one of
    /// its ancestors, so that an edge `parent -> target` would make the substitution feed itself.
    fn closes_cycle(&self, parent_path: &[String], target_path: &[String]) -> bool {
        self.outcome
            .pointer_graph
            .reaches_from_within(target_path, |dependency| starts_with(parent_path, dependency))
    }
}
