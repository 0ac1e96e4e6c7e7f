//! One document being resolved.
//!
//! A [`ResolutionContext`] owns a private copy of its document. Resolving it runs in two phases:
//! `discover` crawls the document and lists its external lookups,
//! and `settle` merges what those lookups produced before
//! substituting internal pointers. Every external document that is fetched gets a child context
//! of its own, one hop deeper. A work queue runs the phases for the whole family of
//! contexts.

use futures::{
    future::{self, BoxFuture},
    FutureExt,
};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::{
    crawler::{Crawler, LookupTask},
    diagnostic::{ContextSummary, ResolveError, ResolveErrorKind, ResolveResult},
    hooks::{DereferenceInput, ParseInput, RefCandidate},
    queue::ResolveQueue,
    ResolverOptions,
};
use crate::{
    error::ResolverError,
    fetch::FetchContext,
    graph::PointerGraph,
    pointer::{self, path_to_pointer, pointer_to_path, starts_with, ROOT_POINTER},
    uri::{normalize_path, RefUri},
};

/// What every context spawned from one resolve call shares.
pub(crate) struct ResolverEnv {
    pub options: ResolverOptions,
    pub ids: Arc<AtomicUsize>,
}

impl ResolverEnv {
    fn next_id(&self) -> usize {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }
}

/// The result of one external lookup, ready to be merged.
pub(super) struct LookupOutcome {
    uri: RefUri,
    target_path: Vec<String>,
    resolved: Option<ResolveResult>,
    error: Option<ResolveError>,
}

pub(super) enum LookupStep {
    /// Nothing to fetch: the lookup was cut short by a cycle or the depth ceiling.
    Settled(LookupOutcome),
    /// Fetch through the cache under this key.
    Fetch(String),
}

/// A crawled resolve waiting for its external lookups.
pub(super) struct PendingResolve {
    result: ResolveResult,
    json_pointer: Option<String>,
    parent_path: Vec<String>,
    path: Vec<String>,
    pointer_graph: PointerGraph,
    stem_graph: PointerGraph,
}

pub(super) enum Discovery {
    /// The requested pointer could not be used; nothing left to do.
    Done(ResolveResult),
    Waiting(PendingResolve, Vec<LookupTask>),
}

pub struct ResolutionContext {
    id: usize,
    depth: usize,
    authority_stack: Vec<String>,
    base_uri: RefUri,
    /// The document as handed in or fetched. Never mutated.
    source: Value,
    /// Working copy receiving merges and substitutions.
    document: Value,
    env: Arc<ResolverEnv>,
}

impl ResolutionContext {
    pub(crate) fn root(env: Arc<ResolverEnv>, document: Value, base_uri: RefUri) -> Self {
        ResolutionContext {
            id: env.next_id(),
            depth: 0,
            authority_stack: Vec::new(),
            base_uri,
            source: document.clone(),
            document,
            env,
        }
    }

    pub(super) fn child(&self, base_uri: RefUri, document: Value) -> Self {
        ResolutionContext {
            id: self.env.next_id(),
            depth: self.depth + 1,
            authority_stack: self.authority_stack.clone(),
            base_uri,
            source: document.clone(),
            document,
            env: self.env.clone(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn base_uri(&self) -> &RefUri {
        &self.base_uri
    }

    pub fn authority_stack(&self) -> &[String] {
        &self.authority_stack
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub(crate) fn options(&self) -> &ResolverOptions {
        &self.env.options
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            id: self.id,
            depth: self.depth,
            base_uri: self.base_uri.to_string(),
            authority_stack: self.authority_stack.clone(),
        }
    }

    /// Classify `candidate` and, when it is a reference, make its target absolute.
    pub fn compute_ref(&self, candidate: &RefCandidate<'_>) -> Result<Option<RefUri>, ResolverError> {
        let Some(raw) = (self.options().ref_predicate)(candidate) else {
            return Ok(None);
        };
        let mut uri = RefUri::parse(&raw);
        if !uri.is_pointer() {
            uri = uri.absolute_to(&self.base_uri)?;
            if self.names_this_file(&uri) {
                uri = RefUri::parse(&uri.pointer());
            }
        }
        if let Some(transform) = &self.options().transform_ref {
            uri = transform(uri, candidate, &self.base_uri);
        }
        Ok(Some(uri))
    }

    fn names_this_file(&self, uri: &RefUri) -> bool {
        !self.base_uri.authority().is_empty()
            && self.base_uri.is_file()
            && uri.is_file()
            && normalize_path(&self.base_uri.file_path()) == normalize_path(&uri.file_path())
    }

    /// Fetch the document behind `uri` through the shared cache and wrap it in a child context.
    pub async fn lookup_uri(
        &self,
        uri: &RefUri,
        fragment: Option<&str>,
        cache_key: &str,
        parent_path: &[String],
    ) -> Result<ResolutionContext, ResolverError> {
        let payload = self
            .fetch_document(uri, fragment, cache_key, parent_path)
            .await?;
        Ok(self.child(uri.without_fragment(), payload))
    }

    /// The parse-hooked payload behind `uri`. The future owns everything it needs, so the queue can
    /// hold it alongside fetches started by other contexts.
    pub(super) fn fetch_document(
        &self,
        uri: &RefUri,
        fragment: Option<&str>,
        cache_key: &str,
        parent_path: &[String],
    ) -> BoxFuture<'static, Result<Value, ResolverError>> {
        let target = uri.without_fragment();
        let fetcher = match self.options().fetchers.fetcher_for(&target) {
            Ok(fetcher) => fetcher,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        let fetch_ctx = FetchContext {
            base_authority: self.base_uri.authority().to_string(),
            depth: self.depth,
            authority_stack: self.authority_stack.clone(),
        };
        let cache = self.options().cache.clone();
        let parse_hook = self.options().parse_result.clone();
        let parent_authority = self.base_uri.clone();
        let parent_path = parent_path.to_vec();
        let fragment = fragment.map(str::to_string);
        let cache_key = cache_key.to_string();

        async move {
            cache
                .get_or_try_insert_with(&cache_key, move || async move {
                    tracing::debug!("[ResolutionContext] fetching {target}");
                    let fetched = fetcher.fetch(&target, &fetch_ctx).await?;
                    match parse_hook {
                        Some(hook) => hook(ParseInput {
                            result: fetched,
                            target_authority: &target,
                            parent_authority: &parent_authority,
                            parent_path: &parent_path,
                            fragment: fragment.as_deref(),
                        })
                        .map_err(|e| ResolverError::fetch(&target, e)),
                        None => Ok(fetched),
                    }
                })
                .await
        }
        .boxed()
    }

    /// Decide whether `task` needs a fetch at all.
    ///
    /// An authority already on the stack is left as it is. Reaching the depth ceiling is a
    /// `RESOLVE_URI` error.
    pub(super) fn admit_lookup(&self, task: &LookupTask) -> LookupStep {
        let cache_key = task.uri.without_fragment().to_string();

        if self.authority_stack.contains(&cache_key) {
            tracing::debug!("'{cache_key}' is already being resolved further up; leaving the reference");
            let mut resolved = ResolveResult::new(task.value.clone(), self.summary());
            resolved.context.base_uri = cache_key;
            return LookupStep::Settled(LookupOutcome {
                uri: task.uri.clone(),
                target_path: task.parent_path.clone(),
                resolved: Some(resolved),
                error: None,
            });
        }

        let max_depth = self.options().max_uri_depth;
        if self.authority_stack.len() >= max_depth {
            tracing::warn!("max uri depth ({max_depth}) reached at '{cache_key}'");
            return LookupStep::Settled(self.lookup_failed(
                task,
                format!("Max uri depth ({max_depth}) reached. Halting, this is probably a circular loop."),
            ));
        }
        LookupStep::Fetch(cache_key)
    }

    /// A child context for a fetched document, with this context on its lineage.
    pub(super) fn lineage_child(&self, target: RefUri, payload: Value) -> ResolutionContext {
        let mut child = self.child(target, payload);
        if self.depth != 0 && !self.base_uri.authority().is_empty() {
            child
                .authority_stack
                .push(self.base_uri.authority().to_string());
        }
        child
    }

    pub(super) fn lookup_failed(&self, task: &LookupTask, message: String) -> LookupOutcome {
        tracing::debug!("lookup of '{}' failed: {message}", task.uri);
        LookupOutcome {
            uri: task.uri.clone(),
            target_path: task.parent_path.clone(),
            resolved: None,
            error: Some(
                ResolveError::new(ResolveErrorKind::ResolveUri, message, task.parent_path.clone())
                    .with_authority_stack(&self.authority_stack)
                    .with_pointer_stack(&task.pointer_stack),
            ),
        }
    }

    /// Wrap up a lookup whose document was resolved by a child context. A fragment missing from
    /// that document leaves the original reference in place.
    pub(super) fn complete_lookup(task: LookupTask, mut resolved: ResolveResult) -> LookupOutcome {
        let fragment_path = pointer_to_path(&task.uri.pointer()).unwrap_or_default();
        let fragment_missing = resolved
            .errors_of(ResolveErrorKind::PointerMissing)
            .any(|e| e.path == fragment_path);
        if fragment_missing {
            tracing::debug!("'{}' not found; keeping the reference", task.uri);
            resolved.result = task.value;
        }
        LookupOutcome {
            uri: task.uri,
            target_path: task.parent_path,
            resolved: Some(resolved),
            error: None,
        }
    }

    /// Resolve the whole document, or only the node at `json_pointer`.
    ///
    /// `parent_path` is where the caller will place the result; it is only passed on to the
    /// dereference transform. External documents are resolved by a work queue in child
    /// contexts of their own.
    pub async fn resolve(&mut self, json_pointer: Option<String>, parent_path: Vec<String>) -> ResolveResult {
        ResolveQueue::run(self, json_pointer, parent_path).await
    }

    /// Move the documents into a context the queue can own. `reattach` puts
    /// them back.
    pub(super) fn detach(&mut self) -> ResolutionContext {
        ResolutionContext {
            id: self.id,
            depth: self.depth,
            authority_stack: self.authority_stack.clone(),
            base_uri: self.base_uri.clone(),
            source: std::mem::take(&mut self.source),
            document: std::mem::take(&mut self.document),
            env: self.env.clone(),
        }
    }

    pub(super) fn reattach(&mut self, detached: &mut ResolutionContext) {
        self.source = std::mem::take(&mut detached.source);
        self.document = std::mem::take(&mut detached.document);
    }

    /// Locate the node to resolve and crawl it.
    pub(super) fn discover(&self, json_pointer: Option<String>, parent_path: Vec<String>) -> Discovery {
        let mut result = ResolveResult::new(Value::Null, self.summary());

        let requested = json_pointer
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != ROOT_POINTER && *p != "#/");
        let target_path = match requested.map(pointer_to_path).transpose() {
            Ok(path) => path,
            Err(e) => {
                result.errors.push(
                    ResolveError::new(ResolveErrorKind::ParsePointer, e.to_string(), Vec::new())
                        .with_authority_stack(&self.authority_stack),
                );
                result.result = self.source.clone();
                return Discovery::Done(result);
            }
        };
        let path = target_path.clone().unwrap_or_default();

        let Some(target) = pointer::get(&self.document, &path) else {
            result.errors.push(
                ResolveError::new(
                    ResolveErrorKind::PointerMissing,
                    self.missing_message(requested.unwrap_or(ROOT_POINTER)),
                    path,
                )
                .with_authority_stack(&self.authority_stack),
            );
            result.result = self.source.clone();
            return Discovery::Done(result);
        };
        let scoped = target_path.as_ref().map(|p| path_to_pointer(p));
        let root_pointer = scoped.clone().unwrap_or_else(|| ROOT_POINTER.to_string());
        let mut crawler = Crawler::new(self, scoped);
        crawler.crawl(
            target,
            path.last().map(String::as_str),
            &path,
            &root_pointer,
            &[],
        );
        let crawled = crawler.finish();
        result.errors.extend(crawled.errors);

        Discovery::Waiting(
            PendingResolve {
                result,
                json_pointer,
                parent_path,
                path,
                pointer_graph: crawled.pointer_graph,
                stem_graph: crawled.stem_graph,
            },
            crawled.lookups,
        )
    }

    /// Merge the lookup outcomes, substitute internal pointers and run the dereference transform.
    pub(super) fn settle(&mut self, pending: PendingResolve, outcomes: Vec<LookupOutcome>) -> ResolveResult {
        let PendingResolve {
            mut result,
            json_pointer,
            parent_path,
            path,
            pointer_graph,
            stem_graph,
        } = pending;

        for outcome in outcomes {
            result
                .ref_map
                .insert(path_to_pointer(&outcome.target_path), outcome.uri.to_string());
            if let Some(error) = outcome.error {
                result.errors.push(error);
            }
            if let Some(resolved) = outcome.resolved {
                result.errors.extend(resolved.errors);
                pointer::set(&mut self.document, &outcome.target_path, resolved.result);
            }
        }

        if self.options().dereference_inline && pointer::is_composite(&self.document) {
            self.substitute(&pointer_graph, &stem_graph, &mut result);
        }

        result.result = match pointer::get(&self.document, &path) {
            Some(value) => value.clone(),
            None => {
                tracing::warn!("{} vanished while resolving", path_to_pointer(&path));
                Value::Null
            }
        };

        if let Some(transform) = self.options().transform_dereferenced.clone() {
            let target_authority = RefUri::parse(json_pointer.as_deref().unwrap_or_default());
            let input = DereferenceInput {
                source: &self.source,
                result: result.result.clone(),
                target_authority: &target_authority,
                parent_authority: &self.base_uri,
                parent_path: &parent_path,
                fragment: target_authority.fragment(),
            };
            match transform(input) {
                Ok(transformed) => {
                    result.result = transformed.result;
                    if let Some(message) = transformed.error {
                        result.errors.push(self.transform_error(&target_authority, message, &path));
                    }
                }
                Err(e) => {
                    result
                        .errors
                        .push(self.transform_error(&target_authority, e.to_string(), &path));
                }
            }
        }

        tracing::debug!(
            "resolved with {} substitutions and {} errors",
            result.ref_map.len(),
            result.errors.len()
        );
        result
    }

    fn missing_message(&self, pointer: &str) -> String {
        if self.base_uri.authority().is_empty() {
            format!("'{pointer}' does not exist")
        } else {
            format!("'{pointer}' does not exist @ '{}'", self.base_uri)
        }
    }

    fn transform_error(&self, target: &RefUri, message: String, path: &[String]) -> ResolveError {
        ResolveError::new(
            ResolveErrorKind::TransformDereferenced,
            format!("Could not transform dereferenced result for '{target}' - {message}"),
            path.to_vec(),
        )
        .with_authority_stack(&self.authority_stack)
    }

    /// Copy each referenced value into the locations that point at it.
    fn substitute(&mut self, pointers: &PointerGraph, stems: &PointerGraph, result: &mut ResolveResult) {
        for target in substitution_order(pointers) {
            let dependants = pointers.dependants_of(&target);
            if dependants.is_empty() {
                continue;
            }
            let Some(target_path) = pointers.path_of(&target) else {
                continue;
            };
            let value = pointer::get(&self.document, target_path).cloned();
            let stem_paths: Vec<&[String]> = stems
                .dependants_of(&target)
                .iter()
                .filter_map(|stem| stems.path_of(stem))
                .collect();

            for dependant in dependants {
                let Some(dependant_path) = pointers.path_of(&dependant) else {
                    continue;
                };
                if stem_paths
                    .iter()
                    .any(|stem| starts_with(dependant_path, *stem))
                {
                    tracing::trace!("not copying {target} into {dependant}: it would feed itself");
                    continue;
                }
                match &value {
                    Some(value) => {
                        pointer::set(&mut self.document, dependant_path, value.clone());
                        result.ref_map.insert(dependant, target.clone());
                    }
                    None => result.errors.push(
                        ResolveError::new(
                            ResolveErrorKind::PointerMissing,
                            self.missing_message(&target),
                            dependant_path.to_vec(),
                        )
                        .with_authority_stack(&self.authority_stack),
                    ),
                }
            }
        }
    }
}

/// Dependencies first. A node also waits for the nearest reference nested inside it, so a
/// container is copied only after its own contents were substituted.
fn substitution_order(pointers: &PointerGraph) -> Vec<String> {
    let mut ordering = pointers.clone();
    for node in pointers.nodes() {
        let Some(path) = pointers.path_of(node) else {
            continue;
        };
        if let Some(outer) = pointers.nearest_enclosing(path) {
            ordering.add_edge(outer, node);
        }
    }
    ordering.topological_order()
}
