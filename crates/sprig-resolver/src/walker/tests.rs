use super::*;
use sprig_core::types::{PackageId, Version, VersionReq};
use sprig_registry::{InMemoryFeed, SourceKind};
use std::time::Duration;

fn req(raw: &str) -> Option<VersionReq> {
    Some(VersionReq::parse(raw).unwrap())
}

fn names(node: &GraphNode) -> Vec<String> {
    node.dependencies
        .iter()
        .map(|child| child.library.name.clone())
        .collect()
}

fn project_feed(deps: &[(&str, &str)]) -> Arc<InMemoryFeed> {
    let feed = InMemoryFeed::new("projects").with_kind(SourceKind::Project);
    feed.add_package("App", "1.0.0", deps).unwrap();
    Arc::new(feed)
}

#[tokio::test]
async fn test_tiers_resolve_in_precedence_order() {
    let projects = project_feed(&[("A", "1.0")]);
    let local = Arc::new(InMemoryFeed::new("local"));
    local.add_package("A", "1.0.0", &[("B", "1.0")]).unwrap();
    let remote = Arc::new(InMemoryFeed::new("remote").with_kind(SourceKind::Http));
    remote.add_package("A", "2.0.0", &[]).unwrap();
    remote.add_package("B", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_local_provider(local)
            .with_remote_provider(remote.clone()),
    );
    let walker = GraphWalker::new();
    let root = walker
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    assert_eq!(root.item.as_ref().unwrap().tier(), ProviderTier::Project);
    let a = &root.dependencies[0];
    assert_eq!(a.item.as_ref().unwrap().tier(), ProviderTier::Local);
    assert_eq!(a.item.as_ref().unwrap().id(), &PackageId::new("A", Version::new(1, 0, 0)));
    let b = &a.dependencies[0];
    assert_eq!(b.item.as_ref().unwrap().tier(), ProviderTier::Remote);

    // A matched locally, so the remote feed was only asked for B
    assert_eq!(remote.lookup_count(), 1);
}

#[tokio::test]
async fn test_missing_dependency_is_unresolved_node() {
    let projects = project_feed(&[("Missing", "[2.0,3.0)"), ("Present", "1.0")]);
    let remote = Arc::new(InMemoryFeed::new("remote"));
    remote.add_package("Present", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_remote_provider(remote),
    );
    let root = GraphWalker::new()
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    assert_eq!(names(&root), vec!["Missing", "Present"]);
    assert!(root.dependencies[0].item.is_none());
    assert!(!root.dependencies[0].is_resolved());
    assert!(root.dependencies[1].is_resolved());
}

#[tokio::test]
async fn test_diamond_shares_one_lookup() {
    let projects = project_feed(&[("B", "1.0"), ("C", "1.0")]);
    let local = Arc::new(InMemoryFeed::new("local").with_latency(Duration::from_millis(20)));
    local.add_package("B", "1.0.0", &[("D", "1.0")]).unwrap();
    local.add_package("C", "1.0.0", &[("D", "1.0")]).unwrap();
    let remote = Arc::new(InMemoryFeed::new("remote").with_latency(Duration::from_millis(20)));
    remote.add_package("D", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_local_provider(local.clone())
            .with_remote_provider(remote.clone()),
    );
    let walker = GraphWalker::new();
    let root = walker
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    let d_via_b = root.dependencies[0].dependencies[0].item.clone().unwrap();
    let d_via_c = root.dependencies[1].dependencies[0].item.clone().unwrap();
    assert!(Arc::ptr_eq(&d_via_b, &d_via_c));

    // B, C and D once each
    assert_eq!(local.lookup_count(), 3);
    assert_eq!(remote.lookup_count(), 1);
    assert_eq!(walker.lookup_count(), 4);
}

#[tokio::test]
async fn test_cycle_terminates() {
    let projects = project_feed(&[("A", "1.0")]);
    let local = Arc::new(InMemoryFeed::new("local"));
    local.add_package("A", "1.0.0", &[("B", "1.0")]).unwrap();
    local.add_package("B", "1.0.0", &[("A", "1.0")]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_local_provider(local),
    );
    let root = GraphWalker::new()
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    let a = &root.dependencies[0];
    let b = &a.dependencies[0];
    let a_again = &b.dependencies[0];
    assert!(a_again.is_resolved());
    assert!(a_again.dependencies.is_empty());
}

#[tokio::test]
async fn test_failing_provider_falls_through() {
    let projects = project_feed(&[("A", "1.0")]);
    let broken = Arc::new(InMemoryFeed::new("broken").failing());
    let remote = Arc::new(InMemoryFeed::new("remote"));
    remote.add_package("A", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_local_provider(broken)
            .with_remote_provider(remote),
    );
    let walker = GraphWalker::new();
    let root = walker
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    assert_eq!(
        root.dependencies[0].item.as_ref().unwrap().tier(),
        ProviderTier::Remote
    );

    // The failure is kept for the caller instead of being swallowed
    let failures = walker.source_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].provider, "broken");
    assert!(failures[0].message.contains("broken is unavailable"));
}

#[tokio::test]
async fn test_healthy_walk_has_no_source_failures() {
    let projects = project_feed(&[("A", "1.0")]);
    let remote = Arc::new(InMemoryFeed::new("remote"));
    remote.add_package("A", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_remote_provider(remote),
    );
    let walker = GraphWalker::new();
    walker
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    assert!(walker.source_failures().is_empty());
}

#[tokio::test]
async fn test_case_mismatch_is_not_expanded() {
    let projects = project_feed(&[("json", "1.0")]);
    let remote = Arc::new(InMemoryFeed::new("remote"));
    remote.add_package("Json", "1.0.0", &[("Text", "1.0")]).unwrap();
    remote.add_package("Text", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_remote_provider(remote),
    );
    let root = GraphWalker::new()
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    let json = &root.dependencies[0];
    assert!(!json.is_resolved());
    assert_eq!(json.case_mismatch(), Some("Json"));
    assert!(json.dependencies.is_empty());
}

#[tokio::test]
async fn test_children_keep_declared_order() {
    let declared = ["E", "D", "C", "B", "A"];
    let deps: Vec<(&str, &str)> = declared.iter().map(|name| (*name, "1.0")).collect();
    let projects = project_feed(&deps);
    let remote = Arc::new(InMemoryFeed::new("remote").with_latency(Duration::from_millis(5)));
    for name in declared {
        remote.add_package(name, "1.0.0", &[]).unwrap();
    }

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_remote_provider(remote),
    );
    let root = GraphWalker::new()
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    assert_eq!(names(&root), declared);
}

#[tokio::test]
async fn test_predicate_stops_expansion() {
    let projects = project_feed(&[("A", "1.0")]);
    let local = Arc::new(InMemoryFeed::new("local"));
    local.add_package("A", "1.0.0", &[("B", "1.0")]).unwrap();
    local.add_package("B", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_local_provider(local),
    );
    let only_root: ExpandPredicate = Arc::new(|_, path| path.is_empty());
    let root = GraphWalker::new()
        .resolve(context, Library::any("App"), only_root)
        .await
        .unwrap();

    assert_eq!(names(&root), vec!["A"]);
    assert!(root.dependencies[0].is_resolved());
    assert!(root.dependencies[0].dependencies.is_empty());
}

#[tokio::test]
async fn test_find_library_cached() {
    let remote = Arc::new(InMemoryFeed::new("remote"));
    remote.add_package("Json", "1.5.0", &[]).unwrap();
    let context = RestoreContext::new(Platform::default()).with_remote_provider(remote.clone());

    let walker = GraphWalker::new();
    let library = Library::new("Json", req("[1.5.0]"));
    let first = walker.find_library_cached(&context, &library).await.unwrap();
    let second = walker
        .find_library_cached(&context, &Library::new("JSON", req("[1.5.0]")))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(remote.lookup_count(), 1);
}

#[tokio::test]
async fn test_render_tree() {
    let projects = project_feed(&[("A", "1.0"), ("Missing", "1.0")]);
    let local = Arc::new(InMemoryFeed::new("local"));
    local.add_package("A", "1.0.0", &[("B", "1.0")]).unwrap();
    local.add_package("B", "1.0.0", &[]).unwrap();

    let context = Arc::new(
        RestoreContext::new(Platform::default())
            .with_project_provider(projects)
            .with_local_provider(local),
    );
    let root = GraphWalker::new()
        .resolve(context, Library::any("App"), expand_all())
        .await
        .unwrap();

    let expected = "\
App 1.0.0 [project]
├── A 1.0.0 [local]
│   └── B 1.0.0 [local]
└── Missing >= 1.0.0 (unresolved)
";
    assert_eq!(root.render_tree(), expected);
    assert_eq!(root.descendants().len(), 4);
}
