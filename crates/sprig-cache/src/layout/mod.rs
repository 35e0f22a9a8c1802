//! Package cache layout
//!
//! ```text
//! <root>/
//!   .locks/<blake3 of archive path>.lock
//!   <name>/<version>/
//!     <name>.pkgspec
//!     <name>.<version>.pkg
//!     <name>.<version>.pkg.sha512
//!     ...extracted contents
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use sprig_config::pkgspec::PKGSPEC_EXTENSION;
use sprig_config::PackageSpec;
use sprig_core::error::SprigError;
use sprig_core::types::{PackageId, Version};
use sprig_core::utils::blake3_hash;

use crate::CacheResult;

/// Suffix appended to the archive file name to form the hash marker
pub const HASH_MARKER_SUFFIX: &str = ".sha512";

const ARCHIVE_EXTENSION: &str = "pkg";
const LOCKS_DIR: &str = ".locks";

/// Maps package identities to paths inside the cache root
#[derive(Debug, Clone)]
pub struct PackagePathResolver {
    root: Utf8PathBuf,
}

/// A complete installed record found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledRecord {
    /// `<root>/<name>/<version>`
    pub directory: Utf8PathBuf,
    /// Version parsed from the directory name
    pub version: Version,
}

impl PackagePathResolver {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory holding every installed version of a package
    pub fn package_root(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Directory of one installed record
    pub fn install_path(&self, id: &PackageId) -> Utf8PathBuf {
        self.package_root(&id.name).join(id.version.to_string())
    }

    /// `<name>.<version>.pkg`
    pub fn archive_file_name(id: &PackageId) -> String {
        format!("{}.{}.{}", id.name, id.version, ARCHIVE_EXTENSION)
    }

    /// `<name>.<version>.pkg.sha512`
    pub fn hash_file_name(id: &PackageId) -> String {
        format!("{}{}", Self::archive_file_name(id), HASH_MARKER_SUFFIX)
    }

    pub fn archive_path(&self, id: &PackageId) -> Utf8PathBuf {
        self.install_path(id).join(Self::archive_file_name(id))
    }

    pub fn spec_path(&self, id: &PackageId) -> Utf8PathBuf {
        self.install_path(id).join(PackageSpec::file_name(&id.name))
    }

    pub fn hash_path(&self, id: &PackageId) -> Utf8PathBuf {
        self.install_path(id).join(Self::hash_file_name(id))
    }

    /// Lock file guarding the install of one package.
    ///
    /// Keyed by a digest of the archive path so the name is filesystem safe
    /// whatever the package name looks like.
    pub fn lock_path(&self, id: &PackageId) -> Utf8PathBuf {
        let key = blake3_hash(self.archive_path(id).as_str().as_bytes());
        self.root.join(LOCKS_DIR).join(format!("{}.lock", key))
    }

    /// A record is complete once its hash marker exists
    pub async fn is_installed(&self, id: &PackageId) -> bool {
        tokio::fs::try_exists(self.hash_path(id)).await.unwrap_or(false)
    }

    /// Hash recorded by a complete install
    pub async fn read_hash(&self, id: &PackageId) -> CacheResult<Option<String>> {
        let path = self.hash_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(hash) => Ok(Some(hash.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SprigError::io(format!("Failed to read {}", path), e)),
        }
    }

    /// Package directory for a name, matched case-insensitively.
    ///
    /// An exact match is preferred over a case-insensitive one.
    pub async fn find_package_root(&self, name: &str) -> CacheResult<Option<Utf8PathBuf>> {
        let exact = self.package_root(name);
        if tokio::fs::metadata(&exact).await.is_ok_and(|m| m.is_dir()) {
            return Ok(Some(exact));
        }

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SprigError::io(format!("Failed to read {}", self.root), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SprigError::io(format!("Failed to read {}", self.root), e))?
        {
            let file_name = entry.file_name();
            let Some(candidate) = file_name.to_str() else {
                continue;
            };
            if candidate.eq_ignore_ascii_case(name) && entry.path().is_dir() {
                return Ok(Some(self.root.join(candidate)));
            }
        }

        Ok(None)
    }

    /// Complete installed records of a package, in no particular order.
    ///
    /// Directories without a hash marker are unfinished installs and skipped.
    pub async fn installed_records(&self, name: &str) -> CacheResult<Vec<InstalledRecord>> {
        let Some(package_root) = self.find_package_root(name).await? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&package_root)
            .await
            .map_err(|e| SprigError::io(format!("Failed to read {}", package_root), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SprigError::io(format!("Failed to read {}", package_root), e))?
        {
            let file_name = entry.file_name();
            let Some(dir_name) = file_name.to_str() else {
                continue;
            };
            let Ok(version) = Version::parse(dir_name) else {
                continue;
            };
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let directory = package_root.join(dir_name);
            if has_hash_marker(&directory).await? {
                records.push(InstalledRecord { directory, version });
            }
        }

        Ok(records)
    }
}

async fn has_hash_marker(directory: &Utf8Path) -> CacheResult<bool> {
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", directory), e))?;

    let marker_suffix = format!(".{}{}", ARCHIVE_EXTENSION, HASH_MARKER_SUFFIX);
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", directory), e))?
    {
        if entry.file_name().to_string_lossy().ends_with(&marker_suffix) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// The single `.pkgspec` file at the top of a directory.
///
/// More than one spec is an error; none yields `None`.
pub async fn find_spec_file(directory: &Utf8Path) -> CacheResult<Option<Utf8PathBuf>> {
    let mut found: Option<Utf8PathBuf> = None;
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", directory), e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", directory), e))?
    {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let is_spec = Utf8Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PKGSPEC_EXTENSION));
        if !is_spec {
            continue;
        }

        if let Some(previous) = &found {
            return Err(SprigError::ManifestParse {
                path: directory.to_string(),
                message: format!(
                    "Expected a single .{} file, found {} and {}",
                    PKGSPEC_EXTENSION,
                    previous.file_name().unwrap_or_default(),
                    file_name
                ),
            });
        }
        found = Some(directory.join(file_name));
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn resolver(dir: &tempfile::TempDir) -> PackagePathResolver {
        PackagePathResolver::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap())
    }

    #[test]
    fn test_record_paths() {
        let layout = PackagePathResolver::new("/cache");
        let id = PackageId::new("Json", Version::new(1, 5, 0));

        assert_eq!(layout.install_path(&id), Utf8PathBuf::from("/cache/Json/1.5.0"));
        assert_eq!(
            layout.archive_path(&id),
            Utf8PathBuf::from("/cache/Json/1.5.0/Json.1.5.0.pkg")
        );
        assert_eq!(
            layout.hash_path(&id),
            Utf8PathBuf::from("/cache/Json/1.5.0/Json.1.5.0.pkg.sha512")
        );
        assert_eq!(layout.spec_path(&id), Utf8PathBuf::from("/cache/Json/1.5.0/Json.pkgspec"));
    }

    #[test]
    fn test_lock_path_is_stable_and_distinct() {
        let layout = PackagePathResolver::new("/cache");
        let a = PackageId::new("Json", Version::new(1, 0, 0));
        let b = PackageId::new("Json", Version::new(2, 0, 0));

        assert_eq!(layout.lock_path(&a), layout.lock_path(&a));
        assert_ne!(layout.lock_path(&a), layout.lock_path(&b));
        assert!(layout.lock_path(&a).starts_with("/cache/.locks"));
    }

    #[tokio::test]
    async fn test_installed_records_require_marker() {
        let dir = tempdir().unwrap();
        let layout = resolver(&dir);
        let complete = PackageId::new("Json", Version::new(1, 0, 0));
        let partial = PackageId::new("Json", Version::new(2, 0, 0));

        std::fs::create_dir_all(layout.install_path(&complete)).unwrap();
        std::fs::write(layout.hash_path(&complete), "abc=").unwrap();
        std::fs::create_dir_all(layout.install_path(&partial)).unwrap();
        std::fs::create_dir_all(layout.package_root("Json").join("not-a-version")).unwrap();

        let records = layout.installed_records("json").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, Version::new(1, 0, 0));

        assert!(layout.is_installed(&complete).await);
        assert!(!layout.is_installed(&partial).await);
        assert_eq!(layout.read_hash(&complete).await.unwrap().as_deref(), Some("abc="));
        assert_eq!(layout.read_hash(&partial).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_root_has_no_records() {
        let dir = tempdir().unwrap();
        let layout = PackagePathResolver::new(
            Utf8PathBuf::from_path_buf(dir.path().join("absent")).unwrap(),
        );
        assert!(layout.installed_records("Json").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_spec_file() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        assert_eq!(find_spec_file(&root).await.unwrap(), None);

        std::fs::write(root.join("json.pkgspec"), "{}").unwrap();
        assert_eq!(find_spec_file(&root).await.unwrap(), Some(root.join("json.pkgspec")));

        std::fs::write(root.join("other.PKGSPEC"), "{}").unwrap();
        assert!(find_spec_file(&root).await.is_err());
    }
}
