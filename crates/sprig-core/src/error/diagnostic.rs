//! Per-library restore outcomes.

use thiserror::Error;

use crate::types::{Library, PackageId};

/// A problem with one library found while restoring a manifest.
///
/// Diagnostics never abort a restore. They are collected while the graph is
/// walked and the install set is materialized, then reported together. Any
/// diagnostic makes the manifest's restore unsuccessful.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreDiagnostic {
    /// No provider could satisfy the request
    #[error("Unable to locate {library}")]
    NotFound { library: Library },

    /// A provider matched the name only case-insensitively
    #[error("Unable to locate {requested}. Do you mean {suggested}?")]
    CaseMismatch { requested: Library, suggested: String },

    /// Fetched content did not match the pinned hash
    #[error("SHA of downloaded package {package} doesn't match expected value.")]
    HashMismatch { package: PackageId },

    /// Fetching or materializing a package failed
    #[error("Failed to install {package}: {message}")]
    InstallFailed { package: PackageId, message: String },

    /// A package source could not be queried
    #[error("Failed to retrieve information from source '{provider}': {message}")]
    SourceFailed { provider: String, message: String },
}

impl RestoreDiagnostic {
    /// Library or source name this diagnostic is about
    pub fn name(&self) -> &str {
        match self {
            RestoreDiagnostic::NotFound { library } => &library.name,
            RestoreDiagnostic::CaseMismatch { requested, .. } => &requested.name,
            RestoreDiagnostic::HashMismatch { package } => &package.name,
            RestoreDiagnostic::InstallFailed { package, .. } => &package.name,
            RestoreDiagnostic::SourceFailed { provider, .. } => provider,
        }
    }
}
