//! Package archive handling
//!
//! A package archive (`.pkg`) is a gzipped tarball whose root holds exactly
//! one `.pkgspec` next to the package contents.

use flate2::read::GzDecoder;
use sprig_config::pkgspec::PKGSPEC_EXTENSION;
use sprig_config::PackageSpec;
use sprig_core::error::SprigError;
use std::io::Read;
use std::path::{Component, Path};
use tar::Archive;

use crate::CacheResult;

pub mod create;
pub mod extract;

// Re-export main functions
pub use create::{archive_from_entries, create_archive, create_archive_bytes};
pub use extract::extract_archive;

/// Read the root `.pkgspec` of an archive without extracting it
pub fn read_spec(archive: &[u8], origin: &str) -> CacheResult<PackageSpec> {
    let mut tarball = Archive::new(GzDecoder::new(archive));
    let entries = tarball.entries().map_err(|e| archive_error(origin, e))?;

    let mut found: Option<(String, Vec<u8>)> = None;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error(origin, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path().map_err(|e| archive_error(origin, e))?.into_owned();
        let Some(file_name) = root_file_name(&path) else {
            continue;
        };
        let is_spec = Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PKGSPEC_EXTENSION));
        if !is_spec {
            continue;
        }

        if let Some((previous, _)) = &found {
            return Err(SprigError::ManifestParse {
                path: origin.to_string(),
                message: format!(
                    "Expected a single .{} file, found {} and {}",
                    PKGSPEC_EXTENSION, previous, file_name
                ),
            });
        }

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| archive_error(origin, e))?;
        found = Some((file_name, content));
    }

    let Some((file_name, content)) = found else {
        return Err(SprigError::ManifestParse {
            path: origin.to_string(),
            message: format!("No .{} file at the archive root", PKGSPEC_EXTENSION),
        });
    };

    PackageSpec::parse(&content, &format!("{}!{}", origin, file_name))
}

/// File name of an entry sitting directly at the archive root
fn root_file_name(path: &Path) -> Option<String> {
    let mut normal = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir));
    match (normal.next(), normal.next()) {
        (Some(Component::Normal(name)), None) => name.to_str().map(str::to_string),
        _ => None,
    }
}

fn archive_error(origin: &str, source: std::io::Error) -> SprigError {
    SprigError::io(format!("Failed to read archive {}", origin), source)
}
