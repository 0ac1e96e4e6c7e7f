//! Resolving documents spread over several files on disk.

mod common;

use common::init_logging;
use ref_resolver::{
    config::ResolverConfig,
    fetch::FileFetcher,
    resolver::{ResolveErrorKind, ResolveOptions, Resolver, ResolverOptions},
};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

/// Lay out `root.json` referencing `models/pet.yaml`, which references `shared/owner.json`.
fn write_specs(dir: &TempDir) -> String {
    let root = dir.path();
    std::fs::create_dir_all(root.join("models")).unwrap();
    std::fs::create_dir_all(root.join("shared")).unwrap();

    std::fs::write(
        root.join("root.json"),
        r##"{
  "pet": {"$ref": "./models/pet.yaml#/Pet"},
  "local": {"$ref": "root.json#/definitions/id"},
  "definitions": {"id": {"type": "integer"}}
}"##,
    )
    .unwrap();
    std::fs::write(
        root.join("models/pet.yaml"),
        r##"Pet:
  type: object
  properties:
    owner:
      $ref: '../shared/owner.json'
    tag:
      $ref: '#/Tag'
Tag:
  type: string
"##,
    )
    .unwrap();
    std::fs::write(
        root.join("shared/owner.json"),
        r#"{"type": "object", "properties": {"name": {"type": "string"}}}"#,
    )
    .unwrap();

    path_string(&root.join("root.json"))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[tokio::test]
async fn test_resolves_across_files() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let root_path = write_specs(&dir);
    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&root_path).unwrap()).unwrap();

    let resolver = Resolver::default().with_fetcher("file", FileFetcher);
    let resolved = resolver
        .resolve(document, ResolveOptions::default().with_base_uri(root_path.clone()))
        .await;

    assert!(resolved.errors.is_empty(), "{:?}", resolved.errors);
    assert_eq!(
        resolved.result,
        json!({
            "pet": {
                "type": "object",
                "properties": {
                    "owner": {"type": "object", "properties": {"name": {"type": "string"}}},
                    "tag": {"type": "string"}
                }
            },
            "local": {"type": "integer"},
            "definitions": {"id": {"type": "integer"}}
        })
    );

    let pet_uri = format!("{}/models/pet.yaml#/Pet", path_string(dir.path()));
    assert_eq!(resolved.ref_map.get("#/pet"), Some(pet_uri.as_str()));
    assert_eq!(resolved.ref_map.get("#/local"), Some("#/definitions/id"));
    assert_eq!(resolved.context.base_uri, root_path);
    assert_eq!(resolver.cache().len(), 2);
}

#[tokio::test]
async fn test_missing_file_is_reported() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let base = path_string(&dir.path().join("root.json"));

    let resolved = Resolver::default()
        .with_fetcher("file", FileFetcher)
        .resolve(
            json!({"gone": {"$ref": "./nope.json#/x"}}),
            ResolveOptions::default().with_base_uri(base),
        )
        .await;

    assert_eq!(resolved.result, json!({"gone": {"$ref": "./nope.json#/x"}}));
    assert_eq!(resolved.errors.len(), 1);
    assert_eq!(resolved.errors[0].kind, ResolveErrorKind::ResolveUri);
    assert!(resolved.errors[0].message.contains("Not Found"));
}

#[tokio::test]
async fn test_resolver_from_config_file() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("resolver.toml");
    std::fs::write(&config_path, "dereference_remote = false\nmax_uri_depth = 5\n").unwrap();

    let config = ResolverConfig::load(&config_path).unwrap();
    let resolver = Resolver::new(ResolverOptions::from(&config)).with_fetcher("file", FileFetcher);
    assert_eq!(resolver.options().max_uri_depth, 5);

    let document = json!({"a": {"$ref": "./elsewhere.json"}, "b": {"$ref": "#/c"}, "c": 1});
    let resolved = resolver.resolve(document, ResolveOptions::default()).await;
    assert_eq!(
        resolved.result,
        json!({"a": {"$ref": "./elsewhere.json"}, "b": 1, "c": 1})
    );
    assert!(resolved.errors.is_empty());
}
