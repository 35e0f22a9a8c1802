//! The local package cache as a provider
//!
//! Only complete records (hash marker present) are offered. Identity and
//! dependencies are read from the record's `.pkgspec`, whose casing the
//! installer has already normalized.

use async_trait::async_trait;
use camino::Utf8Path;
use sprig_cache::layout::find_spec_file;
use sprig_cache::PackagePathResolver;
use sprig_config::PackageSpec;
use sprig_core::error::{SprigError, SprigResult};
use sprig_core::types::{Library, PackageId, Platform};
use std::path::PathBuf;
use tracing::warn;

use crate::provider::{select_version, LibraryDescription, SourceKind, WalkProvider};

/// Provider over already installed packages
#[derive(Debug, Clone)]
pub struct InstalledPackagesFeed {
    name: String,
    layout: PackagePathResolver,
}

impl InstalledPackagesFeed {
    pub fn new(layout: PackagePathResolver) -> Self {
        Self {
            name: format!("installed packages in {}", layout.root()),
            layout,
        }
    }

    async fn read_spec(directory: &Utf8Path) -> SprigResult<Option<PackageSpec>> {
        let Some(spec_path) = find_spec_file(directory).await? else {
            return Ok(None);
        };
        let content = tokio::fs::read(&spec_path)
            .await
            .map_err(|e| SprigError::io(format!("Failed to read {}", spec_path), e))?;
        PackageSpec::parse(&content, spec_path.as_str()).map(Some)
    }
}

#[async_trait]
impl WalkProvider for InstalledPackagesFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Installed
    }

    async fn find_library(
        &self,
        library: &Library,
        platform: &Platform,
    ) -> SprigResult<Option<LibraryDescription>> {
        let records = self.layout.installed_records(&library.name).await?;
        let Some(version) = select_version(records.iter().map(|r| &r.version), library) else {
            return Ok(None);
        };
        let Some(record) = records.iter().find(|r| r.version == version) else {
            return Ok(None);
        };

        match Self::read_spec(&record.directory).await? {
            Some(spec) => LibraryDescription::from_spec(&spec, platform).map(Some),
            None => {
                warn!("Installed package at {} has no .pkgspec", record.directory);
                Ok(None)
            },
        }
    }

    async fn fetch_content(&self, id: &PackageId) -> SprigResult<Vec<u8>> {
        let path = self.layout.archive_path(id);
        tokio::fs::read(&path)
            .await
            .map_err(|e| SprigError::io(format!("Failed to read {}", path), e))
    }

    fn local_path(&self, id: &PackageId) -> Option<PathBuf> {
        Some(self.layout.archive_path(id).into_std_path_buf())
    }
}
