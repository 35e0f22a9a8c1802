//! Dependency resolution for sprig restores
//!
//! [`GraphWalker`] expands a project's dependencies against a
//! [`RestoreContext`] into a tree of [`GraphNode`]s; [`DependencyGraph`]
//! flattens that tree for installation and cycle reporting.

pub mod graph;
pub mod walker;

// Re-export main types
pub use graph::DependencyGraph;
pub use walker::{
    expand_all, ExpandPredicate, GraphNode, GraphWalker, RestoreContext, SourceFailure,
};

use sprig_core::error::SprigError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, SprigError>;
