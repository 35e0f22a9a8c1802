//! sprig.toml project manifest parsing

use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sprig_core::error::SprigError;
use sprig_core::types::{Library, Platform, Version, VersionReq};

use crate::{line_column, ConfigResult};

/// File name of a project manifest
pub const MANIFEST_FILE_NAME: &str = "sprig.toml";

/// Complete sprig.toml manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    /// Package metadata section
    pub package: PackageSection,

    /// Dependencies shared by every platform, in declaration order
    #[serde(default)]
    pub dependencies: IndexMap<String, DependencySpec>,

    /// Platform-specific sections, in declaration order
    #[serde(default)]
    pub platforms: IndexMap<String, PlatformSection>,
}

/// Package metadata section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name (required)
    pub name: String,

    /// Package version (required)
    pub version: Version,

    /// Package description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Authors
    #[serde(default)]
    pub authors: Vec<String>,
}

/// Dependencies added when restoring for one platform
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlatformSection {
    #[serde(default)]
    pub dependencies: IndexMap<String, DependencySpec>,
}

/// Dependency specification (simple string or detailed table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Simple version requirement string
    Simple(String),

    /// Detailed dependency specification
    Detailed {
        /// Version requirement; any version when absent
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl DependencySpec {
    /// Get the version requirement, `None` meaning any version
    pub fn version_req(&self) -> ConfigResult<Option<VersionReq>> {
        let raw = match self {
            DependencySpec::Simple(version) => version.as_str(),
            DependencySpec::Detailed { version: Some(version) } => version.as_str(),
            DependencySpec::Detailed { version: None } => return Ok(None),
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        VersionReq::parse(raw)
            .map(Some)
            .map_err(|e| SprigError::ConfigValidation {
                field: "dependencies".to_string(),
                reason: format!("Invalid version requirement '{}': {}", raw, e),
            })
    }
}

impl ProjectManifest {
    /// Library request that resolves this project itself
    pub fn root_library(&self) -> Library {
        Library::new(
            self.package.name.clone(),
            Some(VersionReq::exact(&self.package.version)),
        )
    }

    /// Platforms this manifest restores for, in declaration order
    pub fn target_platforms(&self) -> Vec<Platform> {
        self.platforms.keys().map(|name| Platform::new(name.as_str())).collect()
    }

    /// Dependencies for one platform.
    ///
    /// Shared dependencies come first in declaration order; a platform entry
    /// with the same name replaces the shared one in place, other platform
    /// entries are appended.
    pub fn dependencies_for(&self, platform: &Platform) -> ConfigResult<Vec<Library>> {
        merge_dependencies(&self.dependencies, &self.platforms, platform)
    }
}

/// Shared dependencies overlaid with one platform's section
pub(crate) fn merge_dependencies(
    shared: &IndexMap<String, DependencySpec>,
    platforms: &IndexMap<String, PlatformSection>,
    platform: &Platform,
) -> ConfigResult<Vec<Library>> {
    let mut libraries = to_libraries(shared)?;

    let Some(section) = platforms.get(platform.as_str()) else {
        return Ok(libraries);
    };

    for library in to_libraries(&section.dependencies)? {
        match libraries.iter_mut().find(|existing| existing.same_name(&library.name)) {
            Some(existing) => *existing = library,
            None => libraries.push(library),
        }
    }

    Ok(libraries)
}

fn to_libraries(dependencies: &IndexMap<String, DependencySpec>) -> ConfigResult<Vec<Library>> {
    dependencies
        .iter()
        .map(|(name, spec)| Ok(Library::new(name.clone(), spec.version_req()?)))
        .collect()
}

/// Parse a manifest. `origin` names the source in error messages.
pub fn parse_manifest(content: &str, origin: &str) -> ConfigResult<ProjectManifest> {
    // toml_edit first for syntax errors with locations
    if let Err(e) = content.parse::<toml_edit::DocumentMut>() {
        return Err(located_error(origin, content, e.message(), e.span()));
    }

    let manifest: ProjectManifest = toml::from_str(content)
        .map_err(|e| located_error(origin, content, e.message(), e.span()))?;

    validate_manifest(&manifest)?;

    Ok(manifest)
}

fn located_error(
    origin: &str,
    content: &str,
    message: &str,
    span: Option<std::ops::Range<usize>>,
) -> SprigError {
    let message = match span {
        Some(span) => {
            let (line, column) = line_column(content, span.start);
            format!("{} at line {}, column {}", message.trim(), line, column)
        },
        None => message.trim().to_string(),
    };
    SprigError::ManifestParse {
        path: origin.to_string(),
        message,
    }
}

/// Validate manifest completeness
pub fn validate_manifest(manifest: &ProjectManifest) -> ConfigResult<()> {
    if manifest.package.name.is_empty() {
        return Err(SprigError::ConfigValidation {
            field: "package.name".to_string(),
            reason: "Package name is required in [package] section".to_string(),
        });
    }

    if !is_valid_package_name(&manifest.package.name) {
        return Err(SprigError::ConfigValidation {
            field: "package.name".to_string(),
            reason: format!(
                "Invalid package name '{}'. Names start with a letter or digit and may contain letters, digits, '.', '-' or '_'",
                manifest.package.name
            ),
        });
    }

    let sections = std::iter::once(&manifest.dependencies)
        .chain(manifest.platforms.values().map(|section| &section.dependencies));

    for dependencies in sections {
        for (name, spec) in dependencies {
            if !is_valid_package_name(name) {
                return Err(SprigError::ConfigValidation {
                    field: "dependencies".to_string(),
                    reason: format!("Invalid dependency name '{}'", name),
                });
            }
            spec.version_req()?;
        }
    }

    Ok(())
}

/// Load and parse sprig.toml from file path
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<ProjectManifest> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SprigError::io(format!("Failed to read {}", path), e))?;

    parse_manifest(&content, path.as_str())
}

/// Check if a package name is valid
pub fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 128 {
        return false;
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
