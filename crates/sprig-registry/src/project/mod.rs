//! Projects in the same source tree as a package source
//!
//! A reference `Name` resolves to `<search path>/<Name>/sprig.toml`. Project
//! references are restored in place; they have no archive to install.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use sprig_config::manifest::load_from_file;
use sprig_config::{ProjectManifest, MANIFEST_FILE_NAME};
use sprig_core::error::{SprigError, SprigResult};
use sprig_core::types::{Library, PackageId, Platform};
use std::sync::Arc;
use tracing::debug;

use crate::provider::{LibraryDescription, SourceKind, WalkProvider};

/// Directories below the root searched when none are configured
pub const DEFAULT_PROJECT_DIRS: &[&str] = &["src", "test"];

/// Provider resolving references to sibling projects
#[derive(Debug)]
pub struct ProjectReferenceProvider {
    name: String,
    current: Arc<ProjectManifest>,
    search_paths: Vec<Utf8PathBuf>,
    /// Loaded manifests by lowercase name; `None` records a miss
    loaded: DashMap<String, Option<Arc<ProjectManifest>>>,
}

impl ProjectReferenceProvider {
    /// Provider for the project whose manifest lives at `manifest_path`
    pub fn new(
        manifest_path: &Utf8Path,
        current: Arc<ProjectManifest>,
        root: &Utf8Path,
        project_dirs: &[String],
    ) -> Self {
        let mut search_paths: Vec<Utf8PathBuf> = Vec::new();
        // The directory holding the project directory
        if let Some(parent) = manifest_path.parent().and_then(Utf8Path::parent) {
            search_paths.push(parent.to_path_buf());
        }
        search_paths.push(root.to_path_buf());
        if project_dirs.is_empty() {
            search_paths.extend(DEFAULT_PROJECT_DIRS.iter().map(|dir| root.join(dir)));
        } else {
            search_paths.extend(project_dirs.iter().map(|dir| root.join(dir)));
        }

        let mut unique = Vec::with_capacity(search_paths.len());
        for path in search_paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }

        Self {
            name: format!("projects near {}", manifest_path),
            current,
            search_paths: unique,
            loaded: DashMap::new(),
        }
    }

    pub fn search_paths(&self) -> &[Utf8PathBuf] {
        &self.search_paths
    }

    async fn load(&self, name: &str) -> SprigResult<Option<Arc<ProjectManifest>>> {
        let key = name.to_ascii_lowercase();
        if let Some(entry) = self.loaded.get(&key) {
            return Ok(entry.value().clone());
        }

        let mut found = None;
        for search_path in &self.search_paths {
            if let Some(manifest_path) = locate_manifest(search_path, name).await? {
                debug!("Project reference {} resolved to {}", name, manifest_path);
                found = Some(Arc::new(load_from_file(&manifest_path).await?));
                break;
            }
        }

        self.loaded.insert(key, found.clone());
        Ok(found)
    }
}

/// `<dir>/<name>/sprig.toml`, matching the project directory case-insensitively
async fn locate_manifest(dir: &Utf8Path, name: &str) -> SprigResult<Option<Utf8PathBuf>> {
    let exact = dir.join(name).join(MANIFEST_FILE_NAME);
    if tokio::fs::metadata(&exact).await.is_ok_and(|m| m.is_file()) {
        return Ok(Some(exact));
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SprigError::io(format!("Failed to read {}", dir), e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", dir), e))?
    {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !file_name.eq_ignore_ascii_case(name) {
            continue;
        }
        let candidate = dir.join(file_name).join(MANIFEST_FILE_NAME);
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

fn describe(manifest: &ProjectManifest, platform: &Platform) -> SprigResult<LibraryDescription> {
    Ok(LibraryDescription {
        id: PackageId::new(manifest.package.name.clone(), manifest.package.version.clone()),
        dependencies: manifest.dependencies_for(platform)?,
    })
}

#[async_trait]
impl WalkProvider for ProjectReferenceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Project
    }

    async fn find_library(
        &self,
        library: &Library,
        platform: &Platform,
    ) -> SprigResult<Option<LibraryDescription>> {
        if library.same_name(&self.current.package.name) {
            return describe(&self.current, platform).map(Some);
        }

        match self.load(&library.name).await? {
            Some(manifest) => describe(&manifest, platform).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_content(&self, _id: &PackageId) -> SprigResult<Vec<u8>> {
        Err(SprigError::Unsupported {
            operation: "fetch_content".to_string(),
            provider: self.name.clone(),
        })
    }
}
