//! Core data types for sprig.
//!
//! This module provides the fundamental types used throughout the workspace:
//! - Version types and version requirements
//! - Library requests and resolved package identities
//! - Version selection

pub mod library;
pub mod selector;
pub mod version;

// Re-export all public types
pub use library::{Library, PackageId, Platform, DEFAULT_PLATFORM};
pub use selector::VersionSelector;
pub use version::{Comparator, Op, PartialVersion, Version, VersionError, VersionReq};
