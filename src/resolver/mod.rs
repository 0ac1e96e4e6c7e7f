//! Resolving `$ref` references in JSON/YAML documents.
//!
//! [`Resolver`] is the entry point. It holds the configuration shared by every resolve call: the
//! fetchers per URI scheme, the [`Cache`] of fetched documents, and the optional hooks. Each call
//! creates a root [`ResolutionContext`] for the document handed in; every external document
//! reached from it gets a child context of its own.
//!
//! ```rust
//! use ref_resolver::resolver::{ResolveOptions, Resolver};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let resolver = Resolver::default();
//! let resolved = resolver
//!     .resolve(
//!         json!({"a": {"$ref": "#/b"}, "b": {"c": 1}}),
//!         ResolveOptions::default(),
//!     )
//!     .await;
//! assert_eq!(resolved.result, json!({"a": {"c": 1}, "b": {"c": 1}}));
//! assert_eq!(resolved.ref_map.get("#/a"), Some("#/b"));
//! assert!(resolved.errors.is_empty());
//! # }
//! ```

use serde_json::Value;
use std::{
    fmt,
    sync::{atomic::AtomicUsize, Arc},
    time::Duration,
};

use crate::{
    cache::Cache,
    config::ResolverConfig,
    fetch::{Fetcher, FetcherRegistry},
    uri::RefUri,
};

pub mod context;
pub mod crawler;
pub mod diagnostic;
pub mod hooks;
mod queue;

pub use context::ResolutionContext;
pub use diagnostic::{ContextSummary, RefMap, ResolveError, ResolveErrorKind, ResolveResult};
pub use hooks::{
    default_ref_predicate, DereferenceInput, DereferenceTransform, ParseInput, ParseResultHook,
    RefCandidate, RefPredicate, RefTransform, Transformed,
};

use context::ResolverEnv;

pub const DEFAULT_MAX_URI_DEPTH: usize = 100;

/// Everything a [`Resolver`] shares between resolve calls.
#[derive(Clone)]
pub struct ResolverOptions {
    pub fetchers: FetcherRegistry,
    pub cache: Cache,
    pub ref_predicate: RefPredicate,
    pub transform_ref: Option<RefTransform>,
    pub parse_result: Option<ParseResultHook>,
    pub transform_dereferenced: Option<DereferenceTransform>,
    /// Substitute same-document pointers.
    pub dereference_inline: bool,
    /// Fetch and merge external documents.
    pub dereference_remote: bool,
    /// Longest authority chain followed before giving up with a `RESOLVE_URI` error.
    pub max_uri_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            fetchers: FetcherRegistry::default(),
            cache: Cache::new(),
            ref_predicate: default_ref_predicate(),
            transform_ref: None,
            parse_result: None,
            transform_dereferenced: None,
            dereference_inline: true,
            dereference_remote: true,
            max_uri_depth: DEFAULT_MAX_URI_DEPTH,
        }
    }
}

impl fmt::Debug for ResolverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverOptions")
            .field("fetchers", &self.fetchers)
            .field("cache", &self.cache)
            .field("transform_ref", &self.transform_ref.is_some())
            .field("parse_result", &self.parse_result.is_some())
            .field("transform_dereferenced", &self.transform_dereferenced.is_some())
            .field("dereference_inline", &self.dereference_inline)
            .field("dereference_remote", &self.dereference_remote)
            .field("max_uri_depth", &self.max_uri_depth)
            .finish()
    }
}

impl From<&ResolverConfig> for ResolverOptions {
    fn from(config: &ResolverConfig) -> Self {
        ResolverOptions {
            cache: match config.cache_ttl_ms {
                Some(ms) => Cache::with_ttl(Duration::from_millis(ms)),
                None => Cache::new(),
            },
            dereference_inline: config.dereference_inline,
            dereference_remote: config.dereference_remote,
            max_uri_depth: config.max_uri_depth,
            ..ResolverOptions::default()
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Resolve only the node at this pointer. The rest of the document is still available as a
    /// reference target.
    pub json_pointer: Option<String>,
    /// Where the document came from; relative external references are joined against it.
    pub base_uri: Option<String>,
}

impl ResolveOptions {
    pub fn at_pointer<S: Into<String>>(json_pointer: S) -> Self {
        ResolveOptions {
            json_pointer: Some(json_pointer.into()),
            base_uri: None,
        }
    }

    pub fn with_base_uri<S: Into<String>>(mut self, base_uri: S) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    options: ResolverOptions,
    ids: Arc<AtomicUsize>,
}

impl Resolver {
    pub fn new(options: ResolverOptions) -> Self {
        Resolver {
            options,
            ids: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn cache(&self) -> &Cache {
        &self.options.cache
    }

    pub fn fetchers(&self) -> &FetcherRegistry {
        &self.options.fetchers
    }

    /// Serve `scheme` with `fetcher`. Path-like references without a registered scheme use the
    /// `file` entry.
    pub fn with_fetcher<T: Fetcher + 'static>(self, scheme: &str, fetcher: T) -> Self {
        self.options.fetchers.insert(scheme, fetcher);
        self
    }

    /// Share `cache` with other resolvers, or keep it across runs.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.options.cache = cache;
        self
    }

    pub fn with_ref_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RefCandidate<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.options.ref_predicate = Arc::new(predicate);
        self
    }

    /// `transform(computed, candidate, base_uri)` may rewrite each absolutized reference.
    pub fn with_ref_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(RefUri, &RefCandidate<'_>, &RefUri) -> RefUri + Send + Sync + 'static,
    {
        self.options.transform_ref = Some(Arc::new(transform));
        self
    }

    pub fn with_parse_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(ParseInput<'_>) -> Result<Value, crate::ResolverError> + Send + Sync + 'static,
    {
        self.options.parse_result = Some(Arc::new(hook));
        self
    }

    pub fn with_dereference_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(DereferenceInput<'_>) -> Result<Transformed, crate::ResolverError>
            + Send
            + Sync
            + 'static,
    {
        self.options.transform_dereferenced = Some(Arc::new(transform));
        self
    }

    pub fn dereference_inline(mut self, enabled: bool) -> Self {
        self.options.dereference_inline = enabled;
        self
    }

    pub fn dereference_remote(mut self, enabled: bool) -> Self {
        self.options.dereference_remote = enabled;
        self
    }

    pub fn max_uri_depth(mut self, depth: usize) -> Self {
        self.options.max_uri_depth = depth;
        self
    }

    /// Resolve every reference in `document`, or under `options.json_pointer` only.
    ///
    /// Never fails: problems with individual references are reported in
    /// [`ResolveResult::errors`] next to the partially resolved document.
    #[tracing::instrument(skip(self, document))]
    pub async fn resolve(&self, document: Value, options: ResolveOptions) -> ResolveResult {
        let env = Arc::new(ResolverEnv {
            options: self.options.clone(),
            ids: self.ids.clone(),
        });
        let base_uri = options
            .base_uri
            .as_deref()
            .map(|base| RefUri::parse(base).without_fragment())
            .unwrap_or_default();
        let mut root = ResolutionContext::root(env, document, base_uri);
        root.resolve(options.json_pointer, Vec::new()).await
    }
}
