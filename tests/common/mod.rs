//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use ref_resolver::{
    fetch::{FetchContext, Fetcher},
    uri::RefUri,
    ResolverError,
};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

type Generator = Arc<dyn Fn(&RefUri) -> Option<Value> + Send + Sync>;

/// In-memory fetcher that records every fetch it serves.
#[derive(Clone)]
pub struct CountingFetcher {
    docs: Arc<Mutex<HashMap<String, Value>>>,
    generator: Option<Generator>,
    calls: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl CountingFetcher {
    pub fn new() -> Self {
        CountingFetcher {
            docs: Arc::new(Mutex::new(HashMap::new())),
            generator: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Produce documents on demand for URIs without a stored document.
    pub fn generating<F>(generator: F) -> Self
    where
        F: Fn(&RefUri) -> Option<Value> + Send + Sync + 'static,
    {
        CountingFetcher {
            generator: Some(Arc::new(generator)),
            ..CountingFetcher::new()
        }
    }

    pub fn with_doc(self, uri: &str, doc: Value) -> Self {
        self.docs.lock().insert(uri.to_string(), doc);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, uri: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == uri).count()
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, uri: &RefUri, _ctx: &FetchContext) -> Result<Value, ResolverError> {
        self.calls.lock().push(uri.to_string());
        // Let sibling lookups start before this one completes.
        tokio::task::yield_now().await;
        let stored = self.docs.lock().get(uri.authority()).cloned();
        stored
            .or_else(|| self.generator.as_ref().and_then(|generate| generate(uri)))
            .ok_or_else(|| ResolverError::NotFound(uri.to_string()))
    }
}
