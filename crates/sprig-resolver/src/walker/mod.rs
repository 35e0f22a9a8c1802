//! Concurrent dependency graph walker
//!
//! Starting from a root library, every declared dependency is looked up in
//! the context's providers and expanded on its own tokio task. Lookups are
//! memoized per walker, so a library reachable along several paths is asked
//! for once.

use dashmap::DashMap;
use sprig_core::error::{SprigError, SprigResult};
use sprig_core::types::{Library, Platform};
use sprig_registry::{GraphItem, ProviderTier, WalkProvider};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

/// Decides whether a resolved library's dependencies are walked.
///
/// Receives the library and the path of libraries leading to it.
pub type ExpandPredicate = Arc<dyn Fn(&Library, &[Library]) -> bool + Send + Sync>;

/// Predicate that expands everything
pub fn expand_all() -> ExpandPredicate {
    Arc::new(|_, _| true)
}

/// Providers for one (manifest, platform) restore, by precedence tier
#[derive(Debug, Clone)]
pub struct RestoreContext {
    pub platform: Platform,
    pub project_providers: Vec<Arc<dyn WalkProvider>>,
    pub local_providers: Vec<Arc<dyn WalkProvider>>,
    pub remote_providers: Vec<Arc<dyn WalkProvider>>,
}

impl RestoreContext {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            project_providers: Vec::new(),
            local_providers: Vec::new(),
            remote_providers: Vec::new(),
        }
    }

    pub fn with_project_provider(mut self, provider: Arc<dyn WalkProvider>) -> Self {
        self.project_providers.push(provider);
        self
    }

    pub fn with_local_provider(mut self, provider: Arc<dyn WalkProvider>) -> Self {
        self.local_providers.push(provider);
        self
    }

    pub fn with_remote_provider(mut self, provider: Arc<dyn WalkProvider>) -> Self {
        self.remote_providers.push(provider);
        self
    }

    /// Providers in the order they are consulted
    fn tiers(&self) -> [(ProviderTier, &[Arc<dyn WalkProvider>]); 3] {
        [
            (ProviderTier::Project, self.project_providers.as_slice()),
            (ProviderTier::Local, self.local_providers.as_slice()),
            (ProviderTier::Remote, self.remote_providers.as_slice()),
        ]
    }
}

/// One requested library in the walked tree
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub library: Library,
    /// The provider match, if any. May differ from the request in name casing.
    pub item: Option<Arc<GraphItem>>,
    /// Children in declared order
    pub dependencies: Vec<GraphNode>,
}

impl GraphNode {
    /// Matched with exactly the requested name
    pub fn is_resolved(&self) -> bool {
        self.item
            .as_ref()
            .is_some_and(|item| self.library.accepts_name(&item.id().name))
    }

    /// Name a provider offered that differs from the request only in casing
    pub fn case_mismatch(&self) -> Option<&str> {
        self.item
            .as_ref()
            .map(|item| item.id().name.as_str())
            .filter(|name| !self.library.accepts_name(name))
    }

    /// This node and all its descendants, depth first
    pub fn descendants(&self) -> Vec<&GraphNode> {
        let mut nodes = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            nodes.push(node);
            stack.extend(node.dependencies.iter().rev());
        }
        nodes
    }

    /// Tree rendering for debug output
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.label());
        out.push('\n');
        let count = self.dependencies.len();
        for (index, child) in self.dependencies.iter().enumerate() {
            child.render_into(&mut out, "", index + 1 == count);
        }
        out
    }

    fn render_into(&self, out: &mut String, prefix: &str, last: bool) {
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&self.label());
        out.push('\n');

        let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
        let count = self.dependencies.len();
        for (index, child) in self.dependencies.iter().enumerate() {
            child.render_into(out, &child_prefix, index + 1 == count);
        }
    }

    fn label(&self) -> String {
        match (&self.item, self.case_mismatch()) {
            (Some(item), None) => format!("{} [{}]", item.id(), item.tier()),
            (Some(_), Some(found)) => format!("{} (unresolved, found {})", self.library, found),
            (None, _) => format!("{} (unresolved)", self.library),
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

type LookupCell = Arc<OnceCell<Option<Arc<GraphItem>>>>;
type NodeFuture = Pin<Box<dyn Future<Output = SprigResult<GraphNode>> + Send>>;

/// Walks dependency graphs, sharing lookups across everything it walks
#[derive(Debug, Default)]
pub struct GraphWalker {
    /// In-flight and finished lookups by request and platform
    lookups: DashMap<String, LookupCell>,
    /// First error each failing provider returned, by provider name
    failures: DashMap<String, String>,
}

/// A provider that failed while answering a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub provider: String,
    pub message: String,
}

impl GraphWalker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Walk the graph below `root`.
    ///
    /// Missing libraries become unresolved nodes; the walk itself only fails
    /// if a walking task panics.
    pub async fn resolve(
        self: &Arc<Self>,
        context: Arc<RestoreContext>,
        root: Library,
        should_expand: ExpandPredicate,
    ) -> SprigResult<GraphNode> {
        debug!("Walking dependencies of {} for {}", root, context.platform);
        Arc::clone(self)
            .walk_node(context, root, Vec::new(), should_expand)
            .await
    }

    /// Memoized lookup of a single library, without expansion
    pub async fn find_library_cached(
        &self,
        context: &RestoreContext,
        library: &Library,
    ) -> Option<Arc<GraphItem>> {
        let key = format!("{}|{}", library.lookup_key(), context.platform);
        // Clone the cell out so the map shard is not held across the await
        let cell = self
            .lookups
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_init(|| self.find_library(context, library))
            .await
            .clone()
    }

    /// Number of distinct lookups performed or in flight
    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }

    /// Providers that failed during lookups, sorted by provider name.
    ///
    /// A failing provider counts as "no match" so the walk can go on and
    /// report everything else; callers decide whether the failure is fatal.
    pub fn source_failures(&self) -> Vec<SourceFailure> {
        let mut failures: Vec<SourceFailure> = self
            .failures
            .iter()
            .map(|entry| SourceFailure {
                provider: entry.key().clone(),
                message: entry.value().clone(),
            })
            .collect();
        failures.sort_by(|a, b| a.provider.cmp(&b.provider));
        failures
    }

    async fn find_library(
        &self,
        context: &RestoreContext,
        library: &Library,
    ) -> Option<Arc<GraphItem>> {
        for (tier, providers) in context.tiers() {
            for provider in providers {
                match provider.find_library(library, &context.platform).await {
                    Ok(Some(description)) => {
                        trace!("{} matched {} in {}", library, description.id, provider.name());
                        return Some(Arc::new(GraphItem::new(description, tier, provider.clone())));
                    },
                    Ok(None) => {},
                    Err(e) => {
                        warn!("Failed to look up {} in {}: {}", library, provider.name(), e);
                        self.failures
                            .entry(provider.name().to_string())
                            .or_insert_with(|| e.to_string());
                    },
                }
            }
        }
        None
    }

    fn walk_node(
        self: Arc<Self>,
        context: Arc<RestoreContext>,
        library: Library,
        path: Vec<Library>,
        should_expand: ExpandPredicate,
    ) -> NodeFuture {
        Box::pin(async move {
            let item = self.find_library_cached(&context, &library).await;
            let mut node = GraphNode {
                library,
                item,
                dependencies: Vec::new(),
            };

            let Some(item) = node.item.clone() else {
                return Ok(node);
            };
            if !node.is_resolved() {
                return Ok(node);
            }
            if path.iter().any(|seen| seen.same_name(&node.library.name)) {
                debug!("Cycle detected at {}", node.library);
                return Ok(node);
            }
            if !should_expand(&node.library, &path) {
                return Ok(node);
            }

            let mut child_path = path;
            child_path.push(node.library.clone());

            let handles: Vec<_> = item
                .dependencies
                .iter()
                .map(|dependency| {
                    tokio::spawn(Arc::clone(&self).walk_node(
                        context.clone(),
                        dependency.clone(),
                        child_path.clone(),
                        should_expand.clone(),
                    ))
                })
                .collect();

            // Joined in declared order, whatever order they finish in
            for handle in handles {
                node.dependencies
                    .push(handle.await.map_err(SprigError::task)??);
            }

            Ok(node)
        })
    }
}

#[cfg(test)]
mod tests;
