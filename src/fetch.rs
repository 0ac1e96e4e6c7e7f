//! Fetching remote documents.
//!
//! The resolver never performs I/O itself. Each URI scheme is served by a [`Fetcher`] registered
//! in a [`FetcherRegistry`]. References without a registered scheme that look like filesystem
//! paths fall back to the `file` entry.
//!
//! ```rust
//! use ref_resolver::fetch::{FetchContext, FetcherRegistry, FnFetcher};
//! use ref_resolver::{uri::RefUri, ResolverError};
//! use serde_json::json;
//!
//! let registry = FetcherRegistry::default();
//! registry.insert(
//!     "mem",
//!     FnFetcher(|uri: RefUri, _ctx: FetchContext| async move {
//!         Ok::<_, ResolverError>(json!({ "fetched": uri.authority() }))
//!     }),
//! );
//! assert!(registry.get("mem").is_some());
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{future::Future, sync::Arc};

use crate::{error::ResolverError, uri::RefUri};

/// What a fetcher learns about the lookup it serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchContext {
    /// Authority of the document containing the reference (empty for the root document).
    pub base_authority: String,
    /// Number of external hops already taken to reach that document.
    pub depth: usize,
    pub authority_stack: Vec<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Produce the document named by `uri` (fragment already stripped).
    async fn fetch(&self, uri: &RefUri, ctx: &FetchContext) -> Result<Value, ResolverError>;
}

/// Adapts an async closure into a [`Fetcher`].
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(RefUri, FetchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ResolverError>> + Send + 'static,
{
    async fn fetch(&self, uri: &RefUri, ctx: &FetchContext) -> Result<Value, ResolverError> {
        (self.0)(uri.clone(), ctx.clone()).await
    }
}

// Registration is rare and lookups are frequent, hence the RwLock over a small vec.
#[allow(clippy::type_complexity)]
#[derive(Clone, Default)]
pub struct FetcherRegistry(Arc<RwLock<Vec<(String, Arc<dyn Fetcher>)>>>);

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FetcherRegistry").field(&self.schemes()).finish()
    }
}

impl FetcherRegistry {
    /// Register `fetcher` for `scheme`, replacing any previous entry.
    pub fn insert<T: Fetcher + 'static>(&self, scheme: &str, fetcher: T) {
        self.insert_arc(scheme, Arc::new(fetcher));
    }

    pub fn insert_arc(&self, scheme: &str, fetcher: Arc<dyn Fetcher>) {
        let scheme = scheme.to_lowercase();
        let mut writer = self.0.write();
        if let Some(entry) = writer.iter_mut().find(|(s, _)| *s == scheme) {
            entry.1 = fetcher;
        } else {
            writer.push((scheme, fetcher));
        }
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Fetcher>> {
        let scheme = scheme.to_lowercase();
        self.0
            .read()
            .iter()
            .find(|(s, _)| *s == scheme)
            .map(|(_, fetcher)| fetcher.clone())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.get(scheme).is_some()
    }

    pub fn schemes(&self) -> Vec<String> {
        self.0.read().iter().map(|(s, _)| s.clone()).collect()
    }

    /// Pick the fetcher for `uri`: its own scheme first, then `file` for path-like references.
    pub fn fetcher_for(&self, uri: &RefUri) -> Result<Arc<dyn Fetcher>, ResolverError> {
        let scheme = uri.scheme().unwrap_or_default();
        if let Some(fetcher) = self.get(&scheme) {
            return Ok(fetcher);
        }
        if uri.is_file() {
            if let Some(fetcher) = self.get("file") {
                return Ok(fetcher);
            }
        }
        Err(ResolverError::NoResolver {
            scheme,
            uri: uri.to_string(),
        })
    }
}

/// Parse fetched text as JSON when the path says so, YAML otherwise (YAML accepts JSON too).
pub fn parse_content(path: &str, content: &str) -> Result<Value, ResolverError> {
    if path.to_lowercase().ends_with(".json") {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Reads JSON or YAML documents from the local filesystem.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, uri: &RefUri, _ctx: &FetchContext) -> Result<Value, ResolverError> {
        let path = uri.file_path();
        tracing::debug!("[FileFetcher] reading {path}");
        let content = tokio::fs::read_to_string(&path).await?;
        parse_content(&path, &content)
    }
}
