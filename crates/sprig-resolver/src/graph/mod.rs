//! Flattened dependency graph using petgraph
//!
//! The walker produces a tree where a package reachable along several paths
//! appears several times. Flattening gives each resolved package one node,
//! which is what installation and cycle reporting work on.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use sprig_core::error::{SprigError, SprigResult};
use sprig_core::types::{Library, PackageId};
use sprig_registry::GraphItem;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::walker::GraphNode;

/// One node per resolved package; edges carry the dependent's request
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<Arc<GraphItem>, Library>,
    node_map: HashMap<PackageId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a walked tree. Unresolved nodes are left out.
    pub fn from_tree(root: &GraphNode) -> Self {
        let mut graph = Self::new();
        graph.add_subtree(root);
        graph
    }

    fn add_subtree(&mut self, node: &GraphNode) -> Option<NodeIndex> {
        if !node.is_resolved() {
            return None;
        }
        let item = node.item.as_ref()?;
        let index = self.add_package(item.clone());

        for child in &node.dependencies {
            if let Some(child_index) = self.add_subtree(child) {
                self.graph.update_edge(index, child_index, child.library.clone());
            }
        }
        Some(index)
    }

    /// Add a package, keeping the first item seen for an identity
    pub fn add_package(&mut self, item: Arc<GraphItem>) -> NodeIndex {
        if let Some(existing) = self.node_map.get(item.id()) {
            return *existing;
        }
        let id = item.id().clone();
        let index = self.graph.add_node(item);
        self.node_map.insert(id, index);
        index
    }

    /// Record that `from` depends on `to` through `request`
    pub fn add_dependency(
        &mut self,
        from: &PackageId,
        to: &PackageId,
        request: Library,
    ) -> SprigResult<()> {
        let (Some(&from_index), Some(&to_index)) = (self.node_map.get(from), self.node_map.get(to))
        else {
            return Err(SprigError::PackageNotFound {
                name: format!("{} or {}", from, to),
            });
        };
        if !self.graph.contains_edge(from_index, to_index) {
            self.graph.add_edge(from_index, to_index, request);
        }
        Ok(())
    }

    pub fn contains_dependency(&self, from: &PackageId, to: &PackageId) -> bool {
        match (self.node_map.get(from), self.node_map.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    pub fn get(&self, id: &PackageId) -> Option<&Arc<GraphItem>> {
        let index = self.node_map.get(id)?;
        self.graph.node_weight(*index)
    }

    /// Packages in the order they were first encountered
    pub fn items(&self) -> impl Iterator<Item = &Arc<GraphItem>> {
        self.graph.node_weights()
    }

    pub fn package_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Every dependency cycle, each closed: `[a, b, a]`
    pub fn detect_cycles(&self) -> Vec<Vec<PackageId>> {
        let mut cycles = Vec::new();
        for component in tarjan_scc(&self.graph) {
            // Start from the earliest package so reports are stable
            let Some(&start) = component.iter().min() else {
                continue;
            };
            if component.len() == 1 && !self.graph.contains_edge(start, start) {
                continue;
            }
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            let mut path = vec![start];
            let mut visited = HashSet::from([start]);
            if component.len() == 1 || self.path_back(start, start, &members, &mut visited, &mut path) {
                path.push(start);
                cycles.push(path.iter().map(|index| self.graph[*index].id().clone()).collect());
            }
        }
        cycles
    }

    fn path_back(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        members: &HashSet<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        for next in self.graph.neighbors(current) {
            if !members.contains(&next) {
                continue;
            }
            if next == target {
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if self.path_back(next, target, members, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    /// Format a closed cycle as "a -> b -> a"
    pub fn format_cycle(cycle: &[PackageId]) -> String {
        cycle
            .iter()
            .map(|id| id.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Packages ordered so every package comes after its dependencies
    pub fn install_order(&self) -> SprigResult<Vec<PackageId>> {
        match toposort(&self.graph, None) {
            Ok(sorted) => Ok(sorted
                .into_iter()
                .rev()
                .map(|index| self.graph[index].id().clone())
                .collect()),
            Err(cycle) => Err(SprigError::ConfigValidation {
                field: "dependencies".to_string(),
                reason: format!(
                    "Circular dependency detected at {}",
                    self.graph[cycle.node_id()].id()
                ),
            }),
        }
    }
}
