//! Shared test utilities for resolver scenario tests

use crate::{
    error::ResolverError,
    fetch::{FetchContext, Fetcher},
    resolver::{context::ResolverEnv, ResolutionContext, ResolverOptions},
    uri::RefUri,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{atomic::AtomicUsize, Arc},
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Serves documents from memory and counts fetches per URI.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    docs: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemoryFetcher {
    pub fn with_doc(self, uri: &str, doc: Value) -> Self {
        self.docs.lock().insert(uri.to_string(), doc);
        self
    }

    pub fn calls(&self, uri: &str) -> usize {
        self.calls.lock().get(uri).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, uri: &RefUri, _ctx: &FetchContext) -> Result<Value, ResolverError> {
        *self.calls.lock().entry(uri.to_string()).or_insert(0) += 1;
        tokio::task::yield_now().await;
        self.docs
            .lock()
            .get(uri.authority())
            .cloned()
            .ok_or_else(|| ResolverError::NotFound(uri.to_string()))
    }
}

/// A root context over `document` with `options`.
pub fn root_context(options: ResolverOptions, document: Value, base_uri: &str) -> ResolutionContext {
    let env = Arc::new(ResolverEnv {
        options,
        ids: Arc::new(AtomicUsize::new(0)),
    });
    ResolutionContext::root(env, document, RefUri::parse(base_uri))
}
