//! Common utilities for benchmarks

use criterion::Criterion;
use sprig_registry::InMemoryFeed;
use std::time::Duration;

/// Criterion settings shared by every bench target
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(3))
        .measurement_time(Duration::from_secs(10))
        .sample_size(50)
}

/// Name of the package at `index` within `layer`
pub fn layered_name(layer: usize, index: usize) -> String {
    format!("L{}P{}", layer, index)
}

/// A feed of `depth` layers with `width` packages each.
///
/// Every package depends on all packages of the next layer, so the walk
/// visits `width^depth` paths while only `width * depth` distinct lookups
/// are needed. The single root is `Root 1.0.0`.
pub fn layered_feed(width: usize, depth: usize) -> InMemoryFeed {
    let feed = InMemoryFeed::new("bench");
    let first: Vec<String> = (0..width).map(|index| layered_name(0, index)).collect();
    add(&feed, "Root", &first);

    for layer in 0..depth {
        let next: Vec<String> = if layer + 1 < depth {
            (0..width).map(|index| layered_name(layer + 1, index)).collect()
        } else {
            Vec::new()
        };
        for index in 0..width {
            add(&feed, &layered_name(layer, index), &next);
        }
    }

    feed
}

/// A feed where package `i` depends on package `i + 1`, `length` packages long
pub fn chain_feed(length: usize) -> InMemoryFeed {
    let feed = InMemoryFeed::new("bench");
    for index in 0..length {
        let next = if index + 1 < length {
            vec![format!("C{}", index + 1)]
        } else {
            Vec::new()
        };
        add(&feed, &format!("C{}", index), &next);
    }
    feed
}

fn add(feed: &InMemoryFeed, name: &str, dependencies: &[String]) {
    let dependencies: Vec<(&str, &str)> = dependencies
        .iter()
        .map(|dependency| (dependency.as_str(), "1.0"))
        .collect();
    if let Err(e) = feed.add_package(name, "1.0.0", &dependencies) {
        panic!("Failed to add {} to the bench feed: {}", name, e);
    }
}

/// Deterministic filler content of `size` bytes
pub fn create_test_content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}
