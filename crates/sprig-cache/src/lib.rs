//! On-disk package cache for sprig
//!
//! Installed packages live under `<root>/<name>/<version>/`, next to the raw
//! archive and a hash marker whose presence means the record is complete.
//! [`PackageInstaller`] fills the cache; concurrent writers, in this process
//! or another, are serialized per package by [`PackageLock`].

pub mod archive;
pub mod install;
pub mod layout;
pub mod lock;

// Re-export main types
pub use archive::{archive_from_entries, create_archive, extract_archive, read_spec};
pub use install::{ContentSource, InstallReport, PackageInstaller};
pub use layout::{InstalledRecord, PackagePathResolver};
pub use lock::PackageLock;

use sprig_core::error::SprigError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, SprigError>;
