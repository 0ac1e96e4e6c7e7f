//! # ref-resolver
//!
//! Resolves JSON Reference (`$ref`) nodes in JSON and YAML documents.
//!
//! ## Overview
//!
//! A document is a [`serde_json::Value`]. Any node the reference predicate recognizes (by default
//! an object with a string `$ref` member) is replaced with the value it points at:
//!
//! - **Internal references** (`#/definitions/Pet`) are substituted in dependency order, so chains
//!   of references settle before their dependants are copied.
//! - **External references** (`./models.yaml#/Pet`, `https://example.com/api.json`) are fetched
//!   through the [`fetch::Fetcher`] registered for their scheme, resolved in a context of their
//!   own and merged back.
//! - **Cycles** never hang or fail. Self and ancestor references are left alone, circular pairs
//!   are substituted one level deep and circular chains of documents stop at the first repeated
//!   authority.
//!
//! Problems with single references are reported as [`resolver::ResolveError`] entries next to the
//! partially resolved document. A resolve call has no failure return path.
//!
//! ## Architecture
//!
//! - **[`resolver`]**: `Resolver` entry point, `ResolutionContext` (one per document), the work queue
//!   driving them, the crawler and the injectable hooks
//! - **[`cache`]**: memo of fetched documents that collapses concurrent fetches of one URI
//! - **[`graph`]**: cycle tolerant dependency graph over JSON pointers
//! - **[`fetch`]**: `Fetcher` trait, per-scheme registry and a filesystem fetcher
//! - **[`pointer`]** and **[`uri`]**: JSON Pointer and reference URI arithmetic
//! - **[`config`]**: TOML backed resolver settings
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ref_resolver::{
//!     fetch::FileFetcher,
//!     resolver::{ResolveOptions, Resolver},
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::default().with_fetcher("file", FileFetcher);
//!     let document = serde_json::json!({
//!         "pet": { "$ref": "./models/pet.yaml#/Pet" },
//!         "owner": { "$ref": "#/definitions/Owner" },
//!         "definitions": { "Owner": { "type": "object" } }
//!     });
//!
//!     let resolved = resolver
//!         .resolve(document, ResolveOptions::default().with_base_uri("/specs/api.json"))
//!         .await;
//!     for error in resolved.errors.iter() {
//!         eprintln!("{error}");
//!     }
//!     for (location, reference) in resolved.ref_map.iter() {
//!         println!("{location} <- {reference}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Sharing a cache
//!
//! Fetched documents are memoized per authority in a [`cache::Cache`]. Handing the same cache to
//! several resolvers (or keeping one resolver around) avoids refetching across runs:
//!
//! ```rust
//! use ref_resolver::{cache::Cache, resolver::Resolver};
//!
//! let cache = Cache::new();
//! let first = Resolver::default().with_cache(cache.clone());
//! let second = Resolver::default().with_cache(cache.clone());
//! assert_eq!(first.cache().stats(), second.cache().stats());
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and spans and installs no subscriber. Set one up in the
//! application, for example with `tracing-subscriber` and `RUST_LOG=ref_resolver=debug`.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod pointer;
pub mod resolver;
#[cfg(test)]
mod tests;
pub mod uri;

pub use error::*;
pub use resolver::{ResolveOptions, ResolveResult, Resolver, ResolverOptions};
