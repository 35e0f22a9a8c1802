//! # sprig-core
//!
//! Core types and utilities shared across all sprig crates.
//!
//! This crate provides:
//! - `Version`, `VersionReq` and `VersionSelector` for version matching
//! - `Library`, `PackageId` and `Platform` identities used by the resolver
//! - `SprigError` for infrastructure failures and `RestoreDiagnostic` for
//!   per-library outcomes
//! - Content hashing and path safety helpers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Version, Library, PackageId, etc.)
//! - `error`: Error types, diagnostics and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{RestoreDiagnostic, SprigError, SprigResult};
pub use types::{Library, PackageId, Platform, Version, VersionReq, VersionSelector};
