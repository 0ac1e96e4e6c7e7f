//! Tests for resolution contexts: lookups, merging and substitution

use super::helpers::*;
use crate::{
    error::ResolverError,
    fetch::FetcherRegistry,
    resolver::{hooks::Transformed, ResolveErrorKind, Resolver, ResolverOptions},
    uri::RefUri,
};
use serde_json::json;
use test_log::test;

fn options_with(fetcher: &MemoryFetcher) -> ResolverOptions {
    let fetchers = FetcherRegistry::default();
    fetchers.insert("mem", fetcher.clone());
    ResolverOptions {
        fetchers,
        ..Default::default()
    }
}

#[test(tokio::test)]
async fn test_lookup_uri_spawns_child_context() {
    let fetcher = MemoryFetcher::default().with_doc("mem://pets", json!({"Pet": {"type": "object"}}));
    let options = options_with(&fetcher);
    let cache = options.cache.clone();
    let root = root_context(options, json!({}), "");

    let uri = RefUri::parse("mem://pets#/Pet");
    let child = root
        .lookup_uri(&uri, uri.fragment(), "mem://pets", &[])
        .await
        .unwrap();
    assert_eq!(child.depth(), 1);
    assert_eq!(child.base_uri().to_string(), "mem://pets");
    assert!(child.id() > root.id());
    assert_eq!(child.document(), &json!({"Pet": {"type": "object"}}));
    assert!(cache.has("mem://pets"));

    // The second lookup is served from the cache.
    let again = root
        .lookup_uri(&uri, uri.fragment(), "mem://pets", &[])
        .await
        .unwrap();
    assert_eq!(again.document(), child.document());
    assert_eq!(fetcher.calls("mem://pets"), 1);
}

#[test(tokio::test)]
async fn test_lookup_uri_without_fetcher() {
    let root = root_context(ResolverOptions::default(), json!({}), "");
    let uri = RefUri::parse("ftp://host/x.json");
    let err = root.lookup_uri(&uri, None, "ftp://host/x.json", &[]).await.err();
    assert_eq!(
        err,
        Some(ResolverError::NoResolver {
            scheme: "ftp".to_string(),
            uri: "ftp://host/x.json".to_string()
        })
    );
}

#[test(tokio::test)]
async fn test_remote_cycle_is_broken_without_errors() {
    let fetcher = MemoryFetcher::default()
        .with_doc("mem://a", json!({"x": {"$ref": "mem://b"}}))
        .with_doc("mem://b", json!({"y": {"$ref": "mem://a"}}));
    let mut root = root_context(
        options_with(&fetcher),
        json!({"start": {"$ref": "mem://a"}}),
        "",
    );
    let resolved = root.resolve(None, Vec::new()).await;

    assert!(resolved.errors.is_empty(), "{:?}", resolved.errors);
    assert_eq!(
        resolved.result,
        json!({"start": {"x": {"y": {"$ref": "mem://a"}}}})
    );
    assert_eq!(resolved.ref_map.get("#/start"), Some("mem://a"));
    assert_eq!(fetcher.calls("mem://a"), 1);
    assert_eq!(fetcher.calls("mem://b"), 1);
}

#[test(tokio::test)]
async fn test_missing_remote_fragment_keeps_reference() {
    let fetcher = MemoryFetcher::default().with_doc("mem://a", json!({"there": 1}));
    let mut root = root_context(
        options_with(&fetcher),
        json!({"p": {"$ref": "mem://a#/missing"}, "q": {"$ref": "mem://a#/there"}}),
        "",
    );
    let resolved = root.resolve(None, Vec::new()).await;

    assert_eq!(
        resolved.result,
        json!({"p": {"$ref": "mem://a#/missing"}, "q": 1})
    );
    assert_eq!(resolved.errors.len(), 1);
    assert_eq!(resolved.errors[0].kind, ResolveErrorKind::PointerMissing);
    assert_eq!(resolved.errors[0].path, vec!["missing"]);
    assert_eq!(resolved.ref_map.get("#/p"), Some("mem://a#/missing"));
    assert_eq!(resolved.ref_map.get("#/q"), Some("mem://a#/there"));
}

#[test(tokio::test)]
async fn test_failed_lookups_become_resolve_uri_errors() {
    let fetcher = MemoryFetcher::default();
    let mut root = root_context(
        options_with(&fetcher),
        json!({"gone": {"$ref": "mem://nowhere"}, "ftp": {"$ref": "ftp://h/x.json"}}),
        "",
    );
    let resolved = root.resolve(None, Vec::new()).await;

    assert_eq!(
        resolved.result,
        json!({"gone": {"$ref": "mem://nowhere"}, "ftp": {"$ref": "ftp://h/x.json"}})
    );
    let mut paths: Vec<_> = resolved
        .errors_of(ResolveErrorKind::ResolveUri)
        .map(|e| e.path.join("/"))
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["ftp", "gone"]);
    assert!(resolved
        .errors
        .iter()
        .any(|e| e.message.contains("No resolver defined for scheme 'ftp'")));
}

#[test(tokio::test)]
async fn test_parse_hook_failures_are_wrapped() {
    let fetcher = MemoryFetcher::default().with_doc("mem://a", json!({"v": 1}));
    let options = Resolver::new(options_with(&fetcher))
        .with_parse_hook(|_input| Err(ResolverError::Custom("not a schema".to_string())))
        .options()
        .clone();
    let mut root = root_context(options, json!({"p": {"$ref": "mem://a"}}), "");
    let resolved = root.resolve(None, Vec::new()).await;

    assert_eq!(resolved.errors.len(), 1);
    let error = &resolved.errors[0];
    assert_eq!(error.kind, ResolveErrorKind::ResolveUri);
    assert!(error.message.contains("Fetch failed for 'mem://a'"));
    assert!(error.message.contains("not a schema"));
}

#[test(tokio::test)]
async fn test_parse_hook_rewrites_payload() {
    let fetcher = MemoryFetcher::default().with_doc("mem://a", json!({"v": 1}));
    let options = Resolver::new(options_with(&fetcher))
        .with_parse_hook(|input| Ok(json!({"wrapped": input.result})))
        .options()
        .clone();
    let mut root = root_context(options, json!({"p": {"$ref": "mem://a#/wrapped/v"}}), "");
    let resolved = root.resolve(None, Vec::new()).await;
    assert!(resolved.errors.is_empty());
    assert_eq!(resolved.result, json!({"p": 1}));
}

#[test(tokio::test)]
async fn test_dereference_transform() {
    let options = Resolver::default()
        .with_dereference_transform(|input| {
            Ok(Transformed {
                result: json!({"wrapped": input.result, "had_source": !input.source.is_null()}),
                error: Some("partially transformed".to_string()),
            })
        })
        .options()
        .clone();
    let mut root = root_context(options, json!({"a": {"$ref": "#/b"}, "b": 2}), "");
    let resolved = root.resolve(None, Vec::new()).await;
    assert_eq!(
        resolved.result,
        json!({"wrapped": {"a": 2, "b": 2}, "had_source": true})
    );
    assert_eq!(resolved.errors.len(), 1);
    assert_eq!(resolved.errors[0].kind, ResolveErrorKind::TransformDereferenced);

    let failing = Resolver::default()
        .with_dereference_transform(|_input| Err(ResolverError::Custom("boom".to_string())))
        .options()
        .clone();
    let mut root = root_context(failing, json!({"a": 1}), "");
    let resolved = root.resolve(None, Vec::new()).await;
    assert_eq!(resolved.result, json!({"a": 1}));
    assert_eq!(resolved.errors.len(), 1);
    assert!(resolved.errors[0].message.contains("boom"));
}

#[test(tokio::test)]
async fn test_scoped_resolution_follows_chains() {
    let mut root = root_context(
        ResolverOptions::default(),
        json!({"a": {"$ref": "#/b"}, "b": {"$ref": "#/c"}, "c": 5}),
        "",
    );
    let resolved = root.resolve(Some("#/a".to_string()), Vec::new()).await;
    assert!(resolved.errors.is_empty());
    assert_eq!(resolved.result, json!(5));
    assert_eq!(resolved.ref_map.get("#/a"), Some("#/b"));
    assert_eq!(resolved.ref_map.get("#/b"), Some("#/c"));
}

#[test(tokio::test)]
async fn test_nested_references_settle_before_their_container_is_copied() {
    let mut root = root_context(
        ResolverOptions::default(),
        json!({"a": {"$ref": "#/b"}, "b": {"x": {"$ref": "#/c"}}, "c": 1}),
        "",
    );
    let resolved = root.resolve(None, Vec::new()).await;
    assert!(resolved.errors.is_empty());
    assert_eq!(
        resolved.result,
        json!({"a": {"x": 1}, "b": {"x": 1}, "c": 1})
    );
}

#[test(tokio::test)]
async fn test_bad_pointers() {
    let document = json!({"a": 1});
    let mut root = root_context(ResolverOptions::default(), document.clone(), "");
    let missing = root.resolve(Some("#/zzz".to_string()), Vec::new()).await;
    assert_eq!(missing.result, document);
    assert_eq!(missing.errors.len(), 1);
    assert_eq!(missing.errors[0].kind, ResolveErrorKind::PointerMissing);
    assert_eq!(missing.errors[0].path, vec!["zzz"]);
    assert_eq!(missing.errors[0].message, "'#/zzz' does not exist");

    let mut fetched = root_context(ResolverOptions::default(), document.clone(), "mem://doc.json");
    let missing = fetched.resolve(Some("#/zzz".to_string()), Vec::new()).await;
    assert_eq!(
        missing.errors[0].message,
        "'#/zzz' does not exist @ 'mem://doc.json'"
    );

    let mut root = root_context(ResolverOptions::default(), document.clone(), "");
    let unparsable = root.resolve(Some("zzz".to_string()), Vec::new()).await;
    assert_eq!(unparsable.result, document);
    assert_eq!(unparsable.errors[0].kind, ResolveErrorKind::ParsePointer);

    // Root pointers address the whole document.
    for pointer in ["#", "#/", ""] {
        let mut root = root_context(ResolverOptions::default(), document.clone(), "");
        let whole = root.resolve(Some(pointer.to_string()), Vec::new()).await;
        assert!(whole.errors.is_empty());
        assert_eq!(whole.result, document);
    }
}
