//! Library requests and resolved package identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::version::{Version, VersionReq};

/// Platform used when a manifest declares none
pub const DEFAULT_PLATFORM: &str = "any";

/// A requested library: a name plus an optional version constraint.
///
/// Lookups treat the name case-insensitively; acceptance of a match
/// compares it exactly (see [`Library::accepts_name`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Library {
    pub name: String,
    pub version: Option<VersionReq>,
}

impl Library {
    /// Create a new library request
    pub fn new(name: impl Into<String>, version: Option<VersionReq>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Request any version of a library
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// Key identifying this request during traversal.
    ///
    /// Two requests whose names differ only in ASCII casing share a key, the
    /// same rule [`Library::same_name`] applies.
    pub fn lookup_key(&self) -> String {
        match &self.version {
            Some(req) => format!("{}|{}", self.name.to_ascii_lowercase(), req),
            None => self.name.to_ascii_lowercase(),
        }
    }

    /// Same library name, ignoring case
    pub fn same_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }

    /// Whether a resolved name is an exact (case-sensitive) match
    pub fn accepts_name(&self, resolved: &str) -> bool {
        self.name == resolved
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(req) => write!(f, "{} {}", self.name, req),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Exact identity of a resolved package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    /// Package name with its canonical casing
    pub name: String,
    /// Resolved version
    pub version: Version,
}

impl PackageId {
    /// Create a new package ID
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Request pinning exactly this identity
    pub fn to_library(&self) -> Library {
        Library::new(self.name.clone(), Some(VersionReq::exact(&self.version)))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Target platform descriptor a restore context is built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    /// Create a platform descriptor
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Platform name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Platform {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
