//! Archive extraction
//!
//! Entries are validated before anything is written so an archive can never
//! place files outside the destination directory. Link entries are skipped,
//! so every directory below the destination is one the archive created.

use flate2::read::GzDecoder;
use sprig_core::error::SprigError;
use sprig_core::utils::is_safe_path;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;

use crate::CacheResult;

/// Extract a gzipped package archive into `dest_dir`
pub fn extract_archive<R: Read>(reader: R, dest_dir: &Path) -> CacheResult<()> {
    let mut archive = Archive::new(GzDecoder::new(reader));

    fs::create_dir_all(dest_dir).map_err(|e| {
        SprigError::io(format!("Failed to create {}", dest_dir.display()), e)
    })?;

    let entries = archive
        .entries()
        .map_err(|e| SprigError::io("Failed to read archive entries".to_string(), e))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| SprigError::io("Failed to read archive entry".to_string(), e))?;

        let entry_path = entry
            .path()
            .map_err(|e| SprigError::io("Invalid archive entry path".to_string(), e))?
            .into_owned();
        // The archive root itself (`./`) has nothing to extract
        let Some(safe_path) = validate_extract_path(&entry_path, dest_dir)? else {
            continue;
        };

        let mode = entry.header().mode().ok();
        match entry.header().entry_type() {
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                extract_regular_file(&mut entry, &safe_path)?;
            },
            tar::EntryType::Directory => {
                fs::create_dir_all(&safe_path).map_err(|e| {
                    SprigError::io(format!("Failed to create {}", safe_path.display()), e)
                })?;
            },
            // Links are never created, so no later entry is written through one
            tar::EntryType::Symlink | tar::EntryType::Link => {
                debug!("Skipping link entry {}", entry_path.display());
                continue;
            },
            // Devices and fifos have no place in a package
            _ => continue,
        }

        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            // Keep the owner able to clean the cache up later
            let permissions = fs::Permissions::from_mode(mode | 0o600);
            let _ = fs::set_permissions(&safe_path, permissions);
        }
        #[cfg(not(unix))]
        let _ = mode;
    }

    Ok(())
}

/// Resolve an entry path under `dest_dir`, rejecting traversal.
///
/// Returns `None` for an entry naming the destination itself.
fn validate_extract_path(entry_path: &Path, dest_dir: &Path) -> CacheResult<Option<PathBuf>> {
    if !is_safe_path(entry_path) {
        return Err(unsafe_entry(entry_path, "path escapes the destination"));
    }

    let mut safe_path = dest_dir.to_path_buf();
    for component in entry_path.components() {
        match component {
            Component::Normal(name) => safe_path.push(name),
            Component::CurDir => {},
            // is_safe_path allows `a/../b`; refuse it anyway
            _ => return Err(unsafe_entry(entry_path, "relative components are not allowed")),
        }
    }

    if safe_path == dest_dir {
        return Ok(None);
    }

    Ok(Some(safe_path))
}

fn unsafe_entry(entry_path: &Path, reason: &str) -> SprigError {
    SprigError::IntegrityFailure {
        package: "archive".to_string(),
        expected: "entry inside the destination".to_string(),
        actual: format!("{}: {}", entry_path.display(), reason),
    }
}

fn extract_regular_file<R: Read>(entry: &mut tar::Entry<R>, dest_path: &Path) -> CacheResult<()> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SprigError::io(format!("Failed to create {}", parent.display()), e))?;
    }

    let mut file = fs::File::create(dest_path)
        .map_err(|e| SprigError::io(format!("Failed to create {}", dest_path.display()), e))?;

    // Stream instead of buffering the entry
    std::io::copy(entry, &mut file)
        .map_err(|e| SprigError::io(format!("Failed to write {}", dest_path.display()), e))?;

    Ok(())
}
