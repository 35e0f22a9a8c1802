//! sprig.lock.json pinned dependency sets
//!
//! A lock manifest pins exact versions together with the base64 SHA-512 of
//! each package archive:
//!
//! ```json
//! { "dependencies": { "Json": { "version": "1.5.0", "sha": "..." } } }
//! ```

use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sprig_core::error::SprigError;
use sprig_core::types::{PackageId, Version};

use crate::ConfigResult;

/// File name of a lock manifest
pub const LOCK_FILE_NAME: &str = "sprig.lock.json";

/// Complete sprig.lock.json document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LockManifest {
    /// Pinned packages by name, in file order
    #[serde(default)]
    pub dependencies: IndexMap<String, LockEntry>,
}

/// One pinned package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Exact version to restore
    pub version: Version,
    /// Expected base64 SHA-512 of the package archive
    pub sha: String,
}

impl LockManifest {
    /// Pinned identities with their expected hashes
    pub fn pins(&self) -> Vec<(PackageId, String)> {
        self.dependencies
            .iter()
            .map(|(name, entry)| {
                (
                    PackageId::new(name.clone(), entry.version.clone()),
                    entry.sha.clone(),
                )
            })
            .collect()
    }

    /// Serialize back to pretty JSON
    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SprigError::ConfigValidation {
            field: "lock".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Parse a lock manifest. `origin` names the source in error messages.
pub fn parse_lock(content: &str, origin: &str) -> ConfigResult<LockManifest> {
    let lock: LockManifest = serde_json::from_str(content).map_err(|e| {
        SprigError::ManifestParse {
            path: origin.to_string(),
            message: e.to_string(),
        }
    })?;

    for (name, entry) in &lock.dependencies {
        if entry.sha.trim().is_empty() {
            return Err(SprigError::ConfigValidation {
                field: format!("dependencies.{}.sha", name),
                reason: "A pinned dependency needs the expected sha".to_string(),
            });
        }
    }

    Ok(lock)
}

/// Load and parse sprig.lock.json from file path
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<LockManifest> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", path), e))?;

    parse_lock(&content, path.as_str())
}
