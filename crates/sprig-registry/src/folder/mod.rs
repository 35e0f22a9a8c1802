//! A directory tree of `.pkg` archives as a package source

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use sprig_cache::read_spec;
use sprig_config::PackageSpec;
use sprig_core::error::{SprigError, SprigResult};
use sprig_core::types::{Library, PackageId, Platform};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::provider::{select_version, LibraryDescription, SourceKind, WalkProvider};

#[derive(Debug, Clone)]
struct FolderEntry {
    spec: PackageSpec,
    path: Utf8PathBuf,
}

/// Packages by lowercase name
type FolderIndex = HashMap<String, Vec<FolderEntry>>;

/// Package source backed by a local directory.
///
/// The directory is scanned once, on first lookup; every `.pkg` below it is
/// indexed by the `.pkgspec` it carries.
#[derive(Debug)]
pub struct PackageFolderFeed {
    name: String,
    root: Utf8PathBuf,
    index: OnceCell<FolderIndex>,
}

impl PackageFolderFeed {
    pub fn new(name: impl Into<String>, root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            index: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    async fn index(&self) -> SprigResult<&FolderIndex> {
        self.index
            .get_or_try_init(|| async {
                let root = self.root.clone();
                tokio::task::spawn_blocking(move || build_index(&root))
                    .await
                    .map_err(SprigError::task)?
            })
            .await
    }

    async fn entry(&self, id: &PackageId) -> SprigResult<Option<FolderEntry>> {
        let index = self.index().await?;
        Ok(index
            .get(&id.name.to_ascii_lowercase())
            .and_then(|entries| entries.iter().find(|e| e.spec.version == id.version))
            .cloned())
    }
}

fn build_index(root: &Utf8Path) -> SprigResult<FolderIndex> {
    let mut index = FolderIndex::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root, e);
                continue;
            },
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
            continue;
        };
        if path.extension() != Some("pkg") {
            continue;
        }

        let content = std::fs::read(&path)
            .map_err(|e| SprigError::io(format!("Failed to read {}", path), e))?;
        match read_spec(&content, path.as_str()) {
            Ok(spec) => {
                debug!("Indexed {} {} from {}", spec.id, spec.version, path);
                index
                    .entry(spec.id.to_ascii_lowercase())
                    .or_default()
                    .push(FolderEntry { spec, path });
            },
            Err(e) => warn!("Ignoring {}: {}", path, e),
        }
    }

    Ok(index)
}

#[async_trait]
impl WalkProvider for PackageFolderFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::FileSystem
    }

    async fn find_library(
        &self,
        library: &Library,
        platform: &Platform,
    ) -> SprigResult<Option<LibraryDescription>> {
        let index = self.index().await?;
        let Some(entries) = index.get(&library.name.to_ascii_lowercase()) else {
            return Ok(None);
        };
        let Some(version) = select_version(entries.iter().map(|e| &e.spec.version), library)
        else {
            return Ok(None);
        };

        match entries.iter().find(|e| e.spec.version == version) {
            Some(entry) => LibraryDescription::from_spec(&entry.spec, platform).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_content(&self, id: &PackageId) -> SprigResult<Vec<u8>> {
        let Some(entry) = self.entry(id).await? else {
            return Err(SprigError::PackageNotFound {
                name: id.to_string(),
            });
        };
        tokio::fs::read(&entry.path)
            .await
            .map_err(|e| SprigError::io(format!("Failed to read {}", entry.path), e))
    }

    fn local_path(&self, id: &PackageId) -> Option<PathBuf> {
        let index = self.index.get()?;
        index
            .get(&id.name.to_ascii_lowercase())?
            .iter()
            .find(|e| e.spec.version == id.version)
            .map(|e| e.path.clone().into_std_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_cache::archive_from_entries;
    use sprig_core::types::{Version, VersionReq};
    use tempfile::tempdir;

    fn write_package(dir: &Utf8Path, file: &str, spec: &str) {
        let archive = archive_from_entries(&[("pkg.pkgspec", spec.as_bytes())]).unwrap();
        std::fs::create_dir_all(dir.join(file).parent().unwrap()).unwrap();
        std::fs::write(dir.join(file), archive).unwrap();
    }

    #[tokio::test]
    async fn test_indexes_nested_archives() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        write_package(&root, "Json.1.0.0.pkg", r#"{"id":"Json","version":"1.0.0"}"#);
        write_package(
            &root,
            "nested/Json.1.5.0.pkg",
            r#"{"id":"Json","version":"1.5.0","platforms":{"net45":{"dependencies":{"Legacy":"1.0"}}}}"#,
        );
        std::fs::write(root.join("broken.pkg"), b"garbage").unwrap();
        std::fs::write(root.join("notes.txt"), b"ignored").unwrap();

        let feed = PackageFolderFeed::new("folder", root.clone());
        let library = Library::new("JSON", Some(VersionReq::parse("1.0").unwrap()));

        let net45 = feed
            .find_library(&library, &Platform::new("net45"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(net45.id, PackageId::new("Json", Version::new(1, 5, 0)));
        assert_eq!(net45.dependencies[0].name, "Legacy");

        let local = feed.local_path(&net45.id).unwrap();
        assert!(local.ends_with("nested/Json.1.5.0.pkg"));
        assert_eq!(
            feed.fetch_content(&net45.id).await.unwrap(),
            std::fs::read(local).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_package() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let feed = PackageFolderFeed::new("folder", root);

        assert!(feed
            .find_library(&Library::any("Json"), &Platform::default())
            .await
            .unwrap()
            .is_none());
        let id = PackageId::new("Json", Version::new(1, 0, 0));
        assert!(matches!(
            feed.fetch_content(&id).await,
            Err(SprigError::PackageNotFound { .. })
        ));
        assert!(feed.local_path(&id).is_none());
    }
}
