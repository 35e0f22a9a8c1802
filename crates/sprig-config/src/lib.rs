//! Configuration parsing for sprig
//!
//! This crate handles the three files a restore reads:
//! - `sprig.toml`, the project manifest with its per-platform dependencies
//! - `sprig.lock.json`, the pinned dependency set with expected hashes
//! - `sprig.config.toml`, settings such as the packages directory and sources
//!
//! It also reads `.pkgspec` files, the manifest shipped inside every package.

pub mod lock;
pub mod manifest;
pub mod pkgspec;
pub mod settings;

// Re-export main types
pub use lock::{LockEntry, LockManifest, LOCK_FILE_NAME};
pub use manifest::{DependencySpec, PackageSection, PlatformSection, ProjectManifest, MANIFEST_FILE_NAME};
pub use pkgspec::{PackageSpec, PKGSPEC_EXTENSION};
pub use settings::{
    effective_sources, ConfigLayering, ConfigLoader, PackageSource, Settings, SettingsFile,
    SourceLocation, SETTINGS_FILE_NAME,
};

use sprig_core::error::SprigError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, SprigError>;

/// Translate a byte offset into a 1-based line and column
pub(crate) fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(content.len());
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    let prefix = &content[..end];
    let line = prefix.matches('\n').count() + 1;
    let column = prefix.rfind('\n').map_or(prefix.len(), |nl| prefix.len() - nl - 1) + 1;
    (line, column)
}
