//! Archive creation
//!
//! Used to pack project directories into `.pkg` files and to build archives
//! in memory for feeds and tests.

use flate2::write::GzEncoder;
use flate2::Compression;
use sprig_core::error::SprigError;
use std::io::Write;
use std::path::Path;
use tar::Builder;
use walkdir::WalkDir;

use crate::CacheResult;

/// Pack the contents of `source_dir` into a gzipped archive.
///
/// Paths are stored relative to `source_dir`; symlinks are skipped.
pub fn create_archive<W: Write>(writer: W, source_dir: &Path) -> CacheResult<()> {
    let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let message = format!("Failed to walk {}", source_dir.display());
            match e.into_io_error() {
                Some(source) => SprigError::io(message, source),
                None => SprigError::io(message, std::io::Error::other("filesystem loop")),
            }
        })?;

        let path = entry.path();
        let Ok(relative_path) = path.strip_prefix(source_dir) else {
            continue;
        };
        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let result = if entry.file_type().is_file() {
            builder.append_path_with_name(path, relative_path)
        } else if entry.file_type().is_dir() {
            builder.append_dir(relative_path, path)
        } else {
            continue;
        };
        result.map_err(|e| SprigError::io(format!("Failed to add {}", path.display()), e))?;
    }

    finish(builder)
}

/// Pack a directory and return the archive bytes
pub fn create_archive_bytes(source_dir: &Path) -> CacheResult<Vec<u8>> {
    let mut buffer = Vec::new();
    create_archive(&mut buffer, source_dir)?;
    Ok(buffer)
}

/// Build an archive from `(path, content)` pairs held in memory
pub fn archive_from_entries(entries: &[(&str, &[u8])]) -> CacheResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut builder = Builder::new(GzEncoder::new(&mut buffer, Compression::default()));

    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, path, *content)
            .map_err(|e| SprigError::io(format!("Failed to add {}", path), e))?;
    }

    finish(builder)?;
    Ok(buffer)
}

fn finish<W: Write>(builder: Builder<GzEncoder<W>>) -> CacheResult<()> {
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map(|_| ())
        .map_err(|e| SprigError::io("Failed to finish archive".to_string(), e))
}
