//! Package installation into the shared cache
//!
//! Each item is fetched, hashed and offered to an `accept` predicate before
//! anything touches the disk. Accepted items are materialized under the
//! package lock in a staging directory that is renamed onto the record once
//! complete, so readers never see a partial install.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use sprig_config::PackageSpec;
use sprig_core::error::{RestoreDiagnostic, SprigError, SprigResult};
use sprig_core::types::PackageId;
use sprig_core::utils::sha512_base64;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::archive::extract_archive;
use crate::layout::{find_spec_file, PackagePathResolver};
use crate::lock::PackageLock;
use crate::CacheResult;

#[cfg(test)]
mod tests;

/// Fetchable content of a resolved package
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Identity the content is installed as
    fn package_id(&self) -> &PackageId;

    /// Whether the bytes come over the network
    fn is_http(&self) -> bool;

    /// Archive on the local filesystem, when the source has one
    fn local_path(&self) -> Option<PathBuf> {
        None
    }

    /// Full archive content
    async fn fetch_content(&self) -> SprigResult<Vec<u8>>;
}

/// What happened to each item of an install run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InstallReport {
    /// Materialized by this run
    pub installed: Vec<PackageId>,
    /// Already complete, or completed by a concurrent installer
    pub skipped: Vec<PackageId>,
    /// Refused by the `accept` predicate
    pub rejected: Vec<PackageId>,
    /// Items whose fetch or materialization failed
    pub failed: Vec<RestoreDiagnostic>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallOutcome {
    Installed,
    Skipped,
    Rejected,
}

/// Installs resolved packages into a cache root
#[derive(Debug, Clone)]
pub struct PackageInstaller {
    layout: PackagePathResolver,
    permits: Arc<Semaphore>,
}

impl PackageInstaller {
    pub fn new(layout: PackagePathResolver, max_concurrent_installs: usize) -> Self {
        Self {
            layout,
            permits: Arc::new(Semaphore::new(max_concurrent_installs.max(1))),
        }
    }

    pub fn layout(&self) -> &PackagePathResolver {
        &self.layout
    }

    /// Install every item, concurrently.
    ///
    /// `items` must already be deduplicated. `accept(id, hash)` decides
    /// whether fetched content may be installed; reporting a refusal is up to
    /// the predicate. A failing item never affects the others.
    pub async fn install<I, F>(&self, items: Vec<Arc<I>>, accept: F) -> InstallReport
    where
        I: ContentSource + ?Sized + 'static,
        F: Fn(&PackageId, &str) -> bool + Send + Sync + 'static,
    {
        let accept = Arc::new(accept);
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let installer = self.clone();
            let accept = accept.clone();
            let id = item.package_id().clone();
            let handle = tokio::spawn(async move {
                let _permit = installer
                    .permits
                    .acquire()
                    .await
                    .map_err(SprigError::task)?;
                installer.install_one(item.as_ref(), accept.as_ref()).await
            });
            handles.push((id, handle));
        }

        let mut report = InstallReport::default();
        for (id, handle) in handles {
            let outcome = handle.await.map_err(SprigError::task).and_then(|result| result);
            match outcome {
                Ok(InstallOutcome::Installed) => report.installed.push(id),
                Ok(InstallOutcome::Skipped) => report.skipped.push(id),
                Ok(InstallOutcome::Rejected) => report.rejected.push(id),
                Err(e) => {
                    warn!("Failed to install {}: {}", id, e);
                    report.failed.push(RestoreDiagnostic::InstallFailed {
                        package: id,
                        message: e.to_string(),
                    });
                },
            }
        }

        report
    }

    async fn install_one<I, F>(&self, item: &I, accept: &F) -> CacheResult<InstallOutcome>
    where
        I: ContentSource + ?Sized,
        F: Fn(&PackageId, &str) -> bool,
    {
        let id = item.package_id();
        if self.layout.is_installed(id).await {
            debug!("{} is already installed", id);
            return Ok(InstallOutcome::Skipped);
        }

        let content = item.fetch_content().await?;
        let (content, hash) = tokio::task::spawn_blocking(move || {
            let hash = sha512_base64(&content);
            (content, hash)
        })
        .await
        .map_err(SprigError::task)?;

        if !accept(id, &hash) {
            debug!("Install of {} was not accepted", id);
            return Ok(InstallOutcome::Rejected);
        }

        let lock = PackageLock::acquire(&self.layout.lock_path(id), &self.layout.hash_path(id))
            .await?;
        if !lock.is_owner() {
            debug!("{} was installed concurrently", id);
            return Ok(InstallOutcome::Skipped);
        }

        info!("Installing {}", id);
        let local_archive = if item.is_http() {
            None
        } else {
            item.local_path()
        };
        self.materialize(id, content, &hash, local_archive).await?;
        drop(lock);

        Ok(InstallOutcome::Installed)
    }

    /// Build the record in a staging directory and move it into place.
    ///
    /// Must be called with the package lock held.
    async fn materialize(
        &self,
        id: &PackageId,
        content: Vec<u8>,
        hash: &str,
        local_archive: Option<PathBuf>,
    ) -> CacheResult<()> {
        let package_root = self.layout.package_root(&id.name);
        tokio::fs::create_dir_all(&package_root)
            .await
            .map_err(|e| SprigError::io(format!("Failed to create {}", package_root), e))?;

        let target = self.layout.install_path(id);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            warn!("Removing unfinished install at {}", target);
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(|e| SprigError::io(format!("Failed to remove {}", target), e))?;
        }

        // Removed on drop unless renamed into place first
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&package_root)
            .map_err(|e| SprigError::io(format!("Failed to stage in {}", package_root), e))?;
        let staging_dir = Utf8PathBuf::from_path_buf(staging.path().to_path_buf()).map_err(|p| {
            SprigError::io(
                format!("Staging path {} is not UTF-8", p.display()),
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })?;

        let archive_path = staging_dir.join(PackagePathResolver::archive_file_name(id));
        match local_archive {
            Some(source) => {
                tokio::fs::copy(&source, &archive_path).await.map_err(|e| {
                    SprigError::io(format!("Failed to copy {}", source.display()), e)
                })?;
            },
            None => {
                tokio::fs::write(&archive_path, &content)
                    .await
                    .map_err(|e| SprigError::io(format!("Failed to write {}", archive_path), e))?;
            },
        }

        let extract_dir = staging_dir.clone().into_std_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(Cursor::new(content), &extract_dir))
            .await
            .map_err(SprigError::task)??;

        fix_spec_casing(&staging_dir, id).await?;

        let marker = staging_dir.join(PackagePathResolver::hash_file_name(id));
        tokio::fs::write(&marker, hash)
            .await
            .map_err(|e| SprigError::io(format!("Failed to write {}", marker), e))?;

        tokio::fs::rename(&staging_dir, &target)
            .await
            .map_err(|e| SprigError::io(format!("Failed to move {} into place", target), e))?;

        Ok(())
    }
}

/// Make the extracted `.pkgspec` carry the canonical name.
///
/// Sources don't always agree on casing, and later lookups compare names
/// exactly. The file is renamed to `<name>.pkgspec` and its `id` rewritten;
/// every other field is kept as is.
async fn fix_spec_casing(dir: &Utf8Path, id: &PackageId) -> CacheResult<()> {
    let Some(spec_path) = find_spec_file(dir).await? else {
        return Err(SprigError::ManifestParse {
            path: id.to_string(),
            message: "The package archive has no .pkgspec at its root".to_string(),
        });
    };

    let content = tokio::fs::read(&spec_path)
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", spec_path), e))?;
    let mut document: serde_json::Value =
        serde_json::from_slice(&content).map_err(|e| SprigError::ManifestParse {
            path: spec_path.to_string(),
            message: e.to_string(),
        })?;

    let canonical_path = dir.join(PackageSpec::file_name(&id.name));
    let declared = document
        .get("id")
        .and_then(|value| value.as_str())
        .map(str::to_string);

    let rewritten = match declared.as_deref() {
        Some(declared) if declared == id.name => None,
        Some(declared) if declared.eq_ignore_ascii_case(&id.name) => {
            document["id"] = serde_json::Value::String(id.name.clone());
            let bytes = serde_json::to_vec_pretty(&document).map_err(|e| {
                SprigError::ManifestParse {
                    path: spec_path.to_string(),
                    message: e.to_string(),
                }
            })?;
            Some(bytes)
        },
        other => {
            return Err(SprigError::IntegrityFailure {
                package: id.to_string(),
                expected: format!("package id {}", id.name),
                actual: format!("package id {}", other.unwrap_or("<missing>")),
            })
        },
    };

    if rewritten.is_none() && spec_path == canonical_path {
        return Ok(());
    }

    debug!("Normalizing {} to {}", spec_path, canonical_path);

    // Go through a temporary name: on case-insensitive filesystems the old
    // and the canonical path are the same file
    let temporary = dir.join(".pkgspec.tmp");
    tokio::fs::write(&temporary, rewritten.as_deref().unwrap_or(content.as_slice()))
        .await
        .map_err(|e| SprigError::io(format!("Failed to write {}", temporary), e))?;
    tokio::fs::remove_file(&spec_path)
        .await
        .map_err(|e| SprigError::io(format!("Failed to remove {}", spec_path), e))?;
    tokio::fs::rename(&temporary, &canonical_path)
        .await
        .map_err(|e| SprigError::io(format!("Failed to write {}", canonical_path), e))?;

    Ok(())
}
