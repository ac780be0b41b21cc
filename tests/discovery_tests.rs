//! Discovery over real package trees on disk

use package_services::package::policy::CollectingSink;
use package_services::package::registry::DiscoveredPackages;
use package_services::{
    DiscoveryContext, DiscoveryError, DiscoveryOptions, ErrorPolicy, PackageDiscovery,
};
use serde_json::json;
use std::sync::Arc;
mod common;
use common::*;

fn discovery(policy: ErrorPolicy, options: DiscoveryOptions) -> PackageDiscovery {
    PackageDiscovery::new(DiscoveryContext::new(test_registry(), policy), options)
}

/// root -> a, b; a -> c; b -> c
fn diamond() -> PackageTree {
    let tree = PackageTree::new().unwrap();
    let root = tree.root_package("root", &["a", "b"]);
    write_module(&root, "routes.toml", &route_module("/home", "h"));
    for (name, deps) in [("a", vec!["c"]), ("b", vec!["c"]), ("c", vec![])] {
        let dir = tree.dependency(name, &deps);
        write_module(&dir, "routes.toml", &route_module("x", "h"));
    }
    tree
}

fn route_count(discovered: &DiscoveredPackages, package: &str) -> usize {
    discovered.routes.get(package).map_or(0, <[_]>::len)
}

#[test]
fn test_diamond_visits_shared_dependency_once() {
    let tree = diamond();
    let discovered = discovery(
        ErrorPolicy::FailFast,
        DiscoveryOptions::default().with_main(tree.root()),
    )
    .discover_all()
    .unwrap();

    assert_eq!(discovered.visited.len(), 4);
    assert_eq!(discovered.manifests.len(), 4);
    assert_eq!(route_count(&discovered, "c"), 1);
    assert_eq!(
        discovered.routes.packages().collect::<Vec<_>>(),
        vec!["root", "a", "c", "b"]
    );
    assert_eq!(discovered.routes.get("c").unwrap()[0].path, "/c/x");
}

#[tokio::test]
async fn test_async_diamond_matches_blocking_result() {
    let tree = diamond();
    let discovered = discovery(
        ErrorPolicy::FailFast,
        DiscoveryOptions::default().with_main(tree.root()),
    )
    .discover_all_async()
    .await
    .unwrap();

    assert_eq!(discovered.visited.len(), 4);
    assert_eq!(route_count(&discovered, "c"), 1);
    let mut packages: Vec<_> = discovered.routes.packages().collect();
    packages.sort();
    assert_eq!(packages, vec!["a", "b", "c", "root"]);
}

#[test]
fn test_missing_dependency_names_dependency_and_path() {
    let tree = PackageTree::new().unwrap();
    tree.root_package("root", &["ghost"]);

    let err = discovery(
        ErrorPolicy::FailFast,
        DiscoveryOptions::default().with_main(tree.root()),
    )
    .discover_all()
    .err()
    .unwrap();

    match err {
        DiscoveryError::DependencyMissing { name, path } => {
            assert_eq!(name, "ghost");
            assert!(path.ends_with("node_modules/ghost"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_report_policy_keeps_sibling_branches() {
    let tree = PackageTree::new().unwrap();
    tree.root_package("root", &["ghost", "real"]);
    let real = tree.dependency("real", &[]);
    write_module(&real, "routes.toml", &route_module("x", "h"));

    let sink = Arc::new(CollectingSink::new());
    let discovered = discovery(
        ErrorPolicy::Report(sink.clone()),
        DiscoveryOptions::default().with_main(tree.root()),
    )
    .discover_all()
    .unwrap();

    assert_eq!(route_count(&discovered, "real"), 1);
    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("\"ghost\""));
}

#[tokio::test]
async fn test_async_walk_aggregates_every_failed_branch() {
    let tree = PackageTree::new().unwrap();
    tree.root_package("root", &["ghost", "phantom", "real"]);
    tree.dependency("real", &[]);

    let err = discovery(
        ErrorPolicy::FailFast,
        DiscoveryOptions::default().with_main(tree.root()),
    )
    .discover_all_async()
    .await
    .err()
    .unwrap();

    let errors = err.into_errors();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e, DiscoveryError::DependencyMissing { .. })));
}

#[test]
fn test_ignored_package_contributes_nothing_but_is_walked_through() {
    let tree = PackageTree::new().unwrap();
    tree.root_package("root", &["legacy"]);
    let legacy = tree.dependency("legacy", &["leaf"]);
    write_module(&legacy, "routes.toml", &route_module("old", "h"));
    let leaf = tree.dependency("leaf", &[]);
    write_module(&leaf, "routes.toml", &route_module("x", "h"));

    let options = DiscoveryOptions {
        ignore: vec!["legacy".to_string()],
        ..DiscoveryOptions::default().with_main(tree.root())
    };
    let discovered = discovery(ErrorPolicy::FailFast, options).discover_all().unwrap();

    assert!(!discovered.routes.contains("legacy"));
    assert!(discovered.manifests.get("legacy").is_none());
    assert_eq!(route_count(&discovered, "leaf"), 1);
}

#[test]
fn test_extra_directories_come_before_main() {
    let tree = PackageTree::new().unwrap();
    let root = tree.root_package("root", &[]);
    write_module(&root, "routes.toml", &route_module("x", "h"));
    let extra = tree.standalone("plugins", "plugin");
    write_module(&extra, "routes.toml", &route_module("x", "h"));

    let options = DiscoveryOptions {
        directories: vec![extra],
        ..DiscoveryOptions::default().with_main(tree.root())
    };
    let discovered = discovery(ErrorPolicy::FailFast, options).discover_all().unwrap();
    assert_eq!(
        discovered.routes.packages().collect::<Vec<_>>(),
        vec!["plugin", "root"]
    );
}

#[test]
fn test_invalid_route_message_lists_every_missing_field() {
    let tree = PackageTree::new().unwrap();
    let root = tree.root_package("root", &[]);
    write_module(&root, "broken.json", r#"{"routes": [{"accessLevel": "user"}]}"#);

    let sink = Arc::new(CollectingSink::new());
    discovery(
        ErrorPolicy::Report(sink.clone()),
        DiscoveryOptions::default().with_main(tree.root()),
    )
    .discover_all()
    .unwrap();

    let message = &sink.messages()[0];
    assert!(message.contains("path is required"));
    assert!(message.contains("httpMethod is required"));
    assert!(message.contains("middlewareChain is required"));
    assert!(message.contains("from package \"root\""));
}

#[test]
fn test_factory_modules_resolve_through_registry() {
    let tree = PackageTree::new().unwrap();
    let root = tree.root_package("root", &[]);
    write_module(&root, "generated.json", r#"{"factory": "generated"}"#);

    let mut registry = test_registry();
    registry.register_factory(
        "generated",
        Arc::new(|| json!({"Routes": [{"path": "/gen", "httpMethod": ["GET", "POST"], "middleware": "h"}]})),
    );
    let discovered = PackageDiscovery::new(
        DiscoveryContext::new(registry, ErrorPolicy::FailFast),
        DiscoveryOptions::default().with_main(tree.root()),
    )
    .discover_all()
    .unwrap();

    let routes = discovered.routes.get("root").unwrap();
    assert_eq!(routes[0].path, "/root/gen");
    assert_eq!(routes[0].methods, vec!["GET", "POST"]);
}

#[test]
fn test_repeated_discovery_reuses_cached_modules_unchanged() {
    let tree = diamond();
    let context = DiscoveryContext::new(test_registry(), ErrorPolicy::FailFast);
    let options = DiscoveryOptions::default().with_main(tree.root());

    let first = PackageDiscovery::new(context.clone(), options.clone())
        .discover_all()
        .unwrap();
    let cached = context.cache.len();
    let second = PackageDiscovery::new(context.clone(), options)
        .discover_all()
        .unwrap();

    assert_eq!(context.cache.len(), cached);
    assert_eq!(
        first.routes.get("a").unwrap()[0].path,
        second.routes.get("a").unwrap()[0].path
    );
}
