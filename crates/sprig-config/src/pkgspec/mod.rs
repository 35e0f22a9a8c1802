//! `.pkgspec` package manifests
//!
//! Every package archive carries one `<name>.pkgspec` JSON document at its
//! root. It names the package, its version and its dependencies, with the
//! same per-platform overlay as a project manifest:
//!
//! ```json
//! {
//!   "id": "Json",
//!   "version": "1.5.0",
//!   "dependencies": { "Text": "1.0" },
//!   "platforms": { "net45": { "dependencies": { "Legacy": "[1.0,2.0)" } } }
//! }
//! ```
//!
//! Unknown fields are kept so a spec can be rewritten without losing data.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sprig_core::error::SprigError;
use sprig_core::types::{Library, PackageId, Platform, Version};

use crate::manifest::{is_valid_package_name, merge_dependencies, DependencySpec, PlatformSection};
use crate::ConfigResult;

/// File extension of a package manifest, without the dot
pub const PKGSPEC_EXTENSION: &str = "pkgspec";

/// Parsed `.pkgspec` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name as published
    pub id: String,

    /// Package version
    pub version: Version,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, DependencySpec>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub platforms: IndexMap<String, PlatformSection>,

    /// Fields sprig doesn't interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageSpec {
    /// Parse a spec. `origin` names the source in error messages.
    pub fn parse(content: &[u8], origin: &str) -> ConfigResult<Self> {
        let spec: PackageSpec =
            serde_json::from_slice(content).map_err(|e| SprigError::ManifestParse {
                path: origin.to_string(),
                message: e.to_string(),
            })?;

        if !is_valid_package_name(&spec.id) {
            return Err(SprigError::ConfigValidation {
                field: format!("{}: id", origin),
                reason: format!("Invalid package id '{}'", spec.id),
            });
        }

        for (name, dependency) in spec
            .dependencies
            .iter()
            .chain(spec.platforms.values().flat_map(|section| section.dependencies.iter()))
        {
            if !is_valid_package_name(name) {
                return Err(SprigError::ConfigValidation {
                    field: format!("{}: dependencies", origin),
                    reason: format!("Invalid dependency name '{}'", name),
                });
            }
            dependency.version_req()?;
        }

        Ok(spec)
    }

    /// Identity this spec describes
    pub fn package_id(&self) -> PackageId {
        PackageId::new(self.id.clone(), self.version.clone())
    }

    /// Dependencies the package declares for one platform
    pub fn dependencies_for(&self, platform: &Platform) -> ConfigResult<Vec<Library>> {
        merge_dependencies(&self.dependencies, &self.platforms, platform)
    }

    /// File name of the spec for a package, `<name>.pkgspec`
    pub fn file_name(name: &str) -> String {
        format!("{}.{}", name, PKGSPEC_EXTENSION)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SprigError::ConfigValidation {
            field: "pkgspec".to_string(),
            reason: e.to_string(),
        })
    }
}
