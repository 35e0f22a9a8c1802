//! Package providers for sprig
//!
//! A restore asks providers, in a fixed precedence order, for the libraries
//! a project needs. This crate defines that contract ([`WalkProvider`]) and
//! the providers sprig ships with:
//! - [`ProjectReferenceProvider`] for sibling projects in the same tree
//! - [`InstalledPackagesFeed`] for the local package cache
//! - [`PackageFolderFeed`] for directories of `.pkg` archives
//! - [`HttpFeed`] for packages served over HTTP

pub mod cache;
pub mod folder;
pub mod http;
pub mod installed;
pub mod memory;
pub mod project;
pub mod provider;

// Re-export main types
pub use cache::{CacheEntry, CacheStats, IndexCache};
pub use folder::PackageFolderFeed;
pub use http::{AuthConfig, HttpFeed, RetryConfig};
pub use installed::InstalledPackagesFeed;
pub use memory::InMemoryFeed;
pub use project::ProjectReferenceProvider;
pub use provider::{
    select_version, GraphItem, LibraryDescription, LibraryMatch, ProviderTier, SourceKind,
    WalkProvider,
};

use sprig_core::error::SprigError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, SprigError>;
