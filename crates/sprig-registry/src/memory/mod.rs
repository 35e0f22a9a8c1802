//! A feed held entirely in memory
//!
//! Handy wherever a restore has to run without touching disk or network:
//! tests and benchmarks build their package universe with it.

use async_trait::async_trait;
use dashmap::DashMap;
use sprig_cache::archive_from_entries;
use sprig_config::PackageSpec;
use sprig_core::error::{SprigError, SprigResult};
use sprig_core::types::{Library, PackageId, Platform};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::provider::{select_version, LibraryDescription, SourceKind, WalkProvider};
use crate::RegistryResult;

#[derive(Debug, Clone)]
struct MemoryPackage {
    spec: PackageSpec,
    archive: Arc<Vec<u8>>,
}

/// In-memory package feed
#[derive(Debug)]
pub struct InMemoryFeed {
    name: String,
    kind: SourceKind,
    /// Packages by lowercase name
    packages: DashMap<String, Vec<MemoryPackage>>,
    latency: Option<Duration>,
    failing: bool,
    lookups: AtomicUsize,
    fetches: AtomicUsize,
}

impl InMemoryFeed {
    /// An empty feed that presents itself as a filesystem source
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::FileSystem,
            packages: DashMap::new(),
            latency: None,
            failing: false,
            lookups: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Delay every lookup, to exercise concurrent walks
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every lookup and fetch fail as an unreachable source would
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Add a package with shared dependencies given as `(name, requirement)`
    pub fn add_package(
        &self,
        name: &str,
        version: &str,
        dependencies: &[(&str, &str)],
    ) -> RegistryResult<()> {
        let dependencies: serde_json::Map<String, serde_json::Value> = dependencies
            .iter()
            .map(|(dep, req)| (dep.to_string(), serde_json::Value::from(*req)))
            .collect();
        let document = serde_json::json!({
            "id": name,
            "version": version,
            "dependencies": dependencies,
        });
        let origin = PackageSpec::file_name(name);
        let spec = PackageSpec::parse(document.to_string().as_bytes(), &origin)?;
        self.add_spec(spec)
    }

    /// Add a package described by a full spec
    pub fn add_spec(&self, spec: PackageSpec) -> RegistryResult<()> {
        let spec_file = PackageSpec::file_name(&spec.id);
        let spec_json = spec.to_json()?;
        let archive = archive_from_entries(&[
            (spec_file.as_str(), spec_json.as_bytes()),
            ("content.txt", spec.id.as_bytes()),
        ])?;

        self.packages
            .entry(spec.id.to_ascii_lowercase())
            .or_default()
            .push(MemoryPackage {
                spec,
                archive: Arc::new(archive),
            });
        Ok(())
    }

    /// Number of `find_library` calls served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of `fetch_content` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> SprigError {
        SprigError::Network {
            message: format!("{} is unavailable", self.name),
            source: None,
        }
    }
}

#[async_trait]
impl WalkProvider for InMemoryFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_kind(&self) -> SourceKind {
        self.kind
    }

    async fn find_library(
        &self,
        library: &Library,
        platform: &Platform,
    ) -> SprigResult<Option<LibraryDescription>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing {
            return Err(self.unavailable());
        }

        // Clone out so no map guard is held past this point
        let Some(candidates) = self
            .packages
            .get(&library.name.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };

        let Some(version) = select_version(candidates.iter().map(|p| &p.spec.version), library)
        else {
            return Ok(None);
        };

        match candidates.iter().find(|p| p.spec.version == version) {
            Some(package) => LibraryDescription::from_spec(&package.spec, platform).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_content(&self, id: &PackageId) -> SprigResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(self.unavailable());
        }

        self.packages
            .get(&id.name.to_ascii_lowercase())
            .and_then(|entry| {
                entry
                    .iter()
                    .find(|p| p.spec.version == id.version)
                    .map(|p| p.archive.as_ref().clone())
            })
            .ok_or_else(|| SprigError::PackageNotFound {
                name: id.to_string(),
            })
    }
}
