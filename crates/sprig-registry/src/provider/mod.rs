//! The contract between the graph walker and package sources
//!
//! A provider answers one question: which package satisfies this library
//! request on this platform, and what does it depend on. The walker wraps
//! the answer in a [`LibraryMatch`] that remembers which provider produced
//! it, so content can be fetched later from the same place.

use async_trait::async_trait;
use sprig_cache::ContentSource;
use sprig_config::PackageSpec;
use sprig_core::error::SprigResult;
use sprig_core::types::{Library, PackageId, Platform, Version, VersionSelector};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::RegistryResult;

/// Where a provider's packages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Projects in the same source tree
    Project,
    /// The local package cache
    Installed,
    /// A package source on a local or mounted filesystem
    FileSystem,
    /// A package source reached over the network
    Http,
}

/// Precedence tier a provider is consulted in, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderTier {
    Project,
    Local,
    Remote,
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderTier::Project => "project",
            ProviderTier::Local => "local",
            ProviderTier::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// A provider's answer to a library request
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryDescription {
    /// Exact identity, with the casing the source uses
    pub id: PackageId,
    /// Declared dependencies for the requested platform, in order
    pub dependencies: Vec<Library>,
}

impl LibraryDescription {
    /// Describe a package from its `.pkgspec`
    pub fn from_spec(spec: &PackageSpec, platform: &Platform) -> RegistryResult<Self> {
        Ok(Self {
            id: spec.package_id(),
            dependencies: spec.dependencies_for(platform)?,
        })
    }
}

/// A source of packages the graph walker can query.
///
/// Lookups may run concurrently on one instance.
#[async_trait]
pub trait WalkProvider: Send + Sync + fmt::Debug {
    /// Name used in logs and diagnostics
    fn name(&self) -> &str;

    fn source_kind(&self) -> SourceKind;

    /// Whether content is downloaded rather than copied
    fn is_http(&self) -> bool {
        self.source_kind() == SourceKind::Http
    }

    /// Find the package satisfying `library` on `platform`.
    ///
    /// Names are matched case-insensitively; the returned identity carries the
    /// source's own casing. `Ok(None)` means this provider has no match.
    async fn find_library(
        &self,
        library: &Library,
        platform: &Platform,
    ) -> SprigResult<Option<LibraryDescription>>;

    /// Full archive content of a package this provider returned
    async fn fetch_content(&self, id: &PackageId) -> SprigResult<Vec<u8>>;

    /// Archive on the local filesystem for a package this provider returned
    fn local_path(&self, _id: &PackageId) -> Option<PathBuf> {
        None
    }
}

/// A resolved package together with the provider that resolved it
#[derive(Debug, Clone)]
pub struct LibraryMatch {
    pub id: PackageId,
    pub tier: ProviderTier,
    pub provider: Arc<dyn WalkProvider>,
}

impl LibraryMatch {
    pub async fn fetch_content(&self) -> SprigResult<Vec<u8>> {
        self.provider.fetch_content(&self.id).await
    }
}

/// A node's resolved content: the match plus its declared dependencies
#[derive(Debug, Clone)]
pub struct GraphItem {
    pub matched: LibraryMatch,
    pub dependencies: Vec<Library>,
}

impl GraphItem {
    pub fn new(description: LibraryDescription, tier: ProviderTier, provider: Arc<dyn WalkProvider>) -> Self {
        Self {
            matched: LibraryMatch {
                id: description.id,
                tier,
                provider,
            },
            dependencies: description.dependencies,
        }
    }

    pub fn id(&self) -> &PackageId {
        &self.matched.id
    }

    pub fn tier(&self) -> ProviderTier {
        self.matched.tier
    }
}

#[async_trait]
impl ContentSource for GraphItem {
    fn package_id(&self) -> &PackageId {
        &self.matched.id
    }

    fn is_http(&self) -> bool {
        self.matched.provider.is_http()
    }

    fn local_path(&self) -> Option<PathBuf> {
        self.matched.provider.local_path(&self.matched.id)
    }

    async fn fetch_content(&self) -> SprigResult<Vec<u8>> {
        self.matched.fetch_content().await
    }
}

/// Version a provider should offer for a request.
///
/// The highest stable version satisfying the constraint wins; prereleases are
/// only picked when nothing stable matches.
pub fn select_version<'a>(
    available: impl IntoIterator<Item = &'a Version>,
    library: &Library,
) -> Option<Version> {
    VersionSelector::new(available.into_iter().cloned()).select_preferred(library.version.as_ref())
}
