//! Settings layering, package sources and root directory resolution
//!
//! Settings come from up to four layers, later layers winning:
//! `~/.sprig/config.toml`, the workspace `sprig.config.toml`, `SPRIG_*`
//! environment variables and command line flags.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use sprig_core::error::SprigError;
use sprig_core::types::Platform;
use tracing::debug;
use url::Url;

use crate::lock::LOCK_FILE_NAME;
use crate::{line_column, ConfigResult};

/// File name of workspace and global settings
pub const SETTINGS_FILE_NAME: &str = "sprig.config.toml";

const DEFAULT_MAX_CONCURRENT_INSTALLS: usize = 8;

/// One settings file as written on disk
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SettingsFile {
    /// Packages directory (the local cache root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<String>,

    /// Platform used for manifests that declare none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_platform: Option<String>,

    /// Upper bound on packages materialized at once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_installs: Option<usize>,

    /// Directories, relative to the root, searched for project references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_dirs: Option<Vec<String>>,

    /// Configured package sources
    #[serde(default)]
    pub sources: Vec<PackageSource>,
}

/// A configured package source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSource {
    /// Display name, also accepted on the command line
    pub name: String,
    /// Folder path, file:// URL or http(s) URL
    pub url: String,
    /// Disabled sources are only used when named explicitly
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Where a package source lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// A directory of package archives
    Folder(Utf8PathBuf),
    /// An HTTP feed
    Http(Url),
}

impl PackageSource {
    /// Source with the same value as name and URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            username: None,
            password: None,
        }
    }

    /// Classify the source. Relative folder paths resolve against `base_dir`.
    pub fn location(&self, base_dir: &Utf8Path) -> ConfigResult<SourceLocation> {
        let invalid = |reason: String| SprigError::ConfigValidation {
            field: format!("sources.{}", self.name),
            reason,
        };

        match Url::parse(&self.url) {
            // Single-letter schemes are Windows drive letters
            Ok(url) if url.scheme().len() > 1 => match url.scheme() {
                "http" | "https" => Ok(SourceLocation::Http(url)),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| invalid(format!("Invalid file URL '{}'", self.url)))?;
                    let path = Utf8PathBuf::try_from(path)
                        .map_err(|e| invalid(format!("Non UTF-8 path: {}", e)))?;
                    Ok(SourceLocation::Folder(path))
                },
                scheme => Err(invalid(format!("Unsupported source scheme '{}'", scheme))),
            },
            _ => {
                let path = Utf8Path::new(&self.url);
                if path.is_absolute() {
                    Ok(SourceLocation::Folder(path.to_path_buf()))
                } else {
                    Ok(SourceLocation::Folder(base_dir.join(path)))
                }
            },
        }
    }
}

/// Sources used for one restore.
///
/// Explicit sources replace the enabled configured sources; fallback sources
/// are appended after them. A value naming a configured source, by name
/// (ignoring case) or by URL, resolves to that source; anything else is taken
/// as a URL or path. Duplicates keep their first position.
pub fn effective_sources(
    configured: &[PackageSource],
    explicit: &[String],
    fallback: &[String],
) -> Vec<PackageSource> {
    let resolve = |value: &String| {
        configured
            .iter()
            .find(|source| source.name.eq_ignore_ascii_case(value) || source.url == *value)
            .cloned()
            .unwrap_or_else(|| PackageSource::new(value.clone(), value.clone()))
    };

    let primary: Vec<PackageSource> = if explicit.is_empty() {
        configured.iter().filter(|source| source.enabled).cloned().collect()
    } else {
        explicit.iter().map(resolve).collect()
    };

    let mut sources: Vec<PackageSource> = Vec::new();
    for source in primary.into_iter().chain(fallback.iter().map(resolve)) {
        if !sources.iter().any(|existing| existing.url == source.url) {
            sources.push(source);
        }
    }
    sources
}

/// Fully layered settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Packages directory (the local cache root)
    pub packages_dir: Utf8PathBuf,
    /// Platform used for manifests that declare none
    pub default_platform: Platform,
    /// Upper bound on packages materialized at once
    pub max_concurrent_installs: usize,
    /// Directories, relative to the root, searched for project references
    pub project_dirs: Vec<String>,
    /// Configured sources, global ones first
    pub sources: Vec<PackageSource>,
}

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> Option<Utf8PathBuf> {
        self.cwd
            .ancestors()
            .map(|dir| dir.join(filename))
            .find(|candidate| candidate.is_file())
    }

    /// Root directory for a restore starting at `cwd`.
    ///
    /// The nearest ancestor holding a lock manifest or a settings file, or
    /// `cwd` itself when there is none.
    pub fn resolve_root_directory(&self) -> Utf8PathBuf {
        self.cwd
            .ancestors()
            .find(|dir| dir.join(LOCK_FILE_NAME).is_file() || dir.join(SETTINGS_FILE_NAME).is_file())
            .unwrap_or(&self.cwd)
            .to_path_buf()
    }

    /// Path of the global settings file
    pub fn global_settings_path() -> ConfigResult<Utf8PathBuf> {
        Ok(sprig_home()?.join("config.toml"))
    }

    /// Load all settings layers for a root directory
    pub async fn load_settings(
        &self,
        root: &Utf8Path,
        cli_overrides: &HashMap<String, String>,
    ) -> ConfigResult<Settings> {
        let global_path = Self::global_settings_path()?;
        let global = load_settings_file(&global_path).await?;
        let workspace_path = root.join(SETTINGS_FILE_NAME);
        let workspace = load_settings_file(&workspace_path).await?;

        ConfigLayering::merge_settings(
            global,
            workspace.map(|file| (file, root.to_path_buf())),
            &ConfigLayering::collect_env_overrides(),
            cli_overrides,
        )
    }
}

/// Parse a settings file. `origin` names the source in error messages.
pub fn parse_settings(content: &str, origin: &str) -> ConfigResult<SettingsFile> {
    toml::from_str(content).map_err(|e| {
        let message = match e.span() {
            Some(span) => {
                let (line, column) = line_column(content, span.start);
                format!("{} at line {}, column {}", e.message().trim(), line, column)
            },
            None => e.message().trim().to_string(),
        };
        SprigError::ManifestParse {
            path: origin.to_string(),
            message,
        }
    })
}

/// Load a settings file if it exists
pub async fn load_settings_file(path: &Utf8Path) -> ConfigResult<Option<SettingsFile>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            debug!("Loaded settings from {}", path);
            parse_settings(&content, path.as_str()).map(Some)
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SprigError::io(format!("Failed to read {}", path), e)),
    }
}

/// The per-user sprig directory, `~/.sprig`
pub fn sprig_home() -> ConfigResult<Utf8PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| SprigError::ConfigValidation {
        field: "home_dir".to_string(),
        reason: "Could not determine home directory".to_string(),
    })?;

    let home = Utf8PathBuf::try_from(home_dir).map_err(|e| SprigError::ConfigValidation {
        field: "home_dir".to_string(),
        reason: format!("Invalid home directory path: {}", e),
    })?;

    Ok(home.join(".sprig"))
}

/// Configuration layering and merging
pub struct ConfigLayering;

impl ConfigLayering {
    /// Merge settings layers.
    ///
    /// `workspace` carries the directory its relative paths resolve against.
    pub fn merge_settings(
        global: Option<SettingsFile>,
        workspace: Option<(SettingsFile, Utf8PathBuf)>,
        env_overrides: &HashMap<String, String>,
        cli_overrides: &HashMap<String, String>,
    ) -> ConfigResult<Settings> {
        let mut packages_dir = None;
        let mut default_platform = None;
        let mut max_concurrent_installs = None;
        let mut project_dirs = None;
        let mut sources = Vec::new();

        let home = sprig_home();
        let layers = global
            .map(|file| (file, home.as_ref().ok().cloned()))
            .into_iter()
            .chain(workspace.map(|(file, dir)| (file, Some(dir))));

        for (file, base_dir) in layers {
            if let Some(packages) = file.packages {
                packages_dir = Some(resolve_dir(&packages, base_dir.as_deref()));
            }
            default_platform = file.default_platform.or(default_platform);
            max_concurrent_installs = file.max_concurrent_installs.or(max_concurrent_installs);
            project_dirs = file.project_dirs.or(project_dirs);
            sources.extend(file.sources);
        }

        let overrides = [
            ("SPRIG_PACKAGES", "packages"),
            ("SPRIG_DEFAULT_PLATFORM", "default-platform"),
            ("SPRIG_MAX_CONCURRENT_INSTALLS", "max-concurrent-installs"),
        ];

        // Environment first, then CLI flags (highest priority)
        let flattened = overrides
            .iter()
            .filter_map(|(env, key)| env_overrides.get(*env).map(|value| (*key, env.to_string(), value)))
            .chain(
                overrides
                    .iter()
                    .filter_map(|(_, key)| cli_overrides.get(*key).map(|value| (*key, format!("--{}", key), value))),
            )
            .collect::<Vec<_>>();

        for (key, origin, value) in flattened {
            match key {
                "packages" => packages_dir = Some(Utf8PathBuf::from(value)),
                "default-platform" => default_platform = Some(value.clone()),
                "max-concurrent-installs" => {
                    let parsed = value.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                        SprigError::ConfigValidation {
                            field: origin.clone(),
                            reason: format!("Expected a positive number, got '{}'", value),
                        }
                    })?;
                    max_concurrent_installs = Some(parsed);
                },
                _ => {},
            }
        }

        let packages_dir = match packages_dir {
            Some(dir) => dir,
            None => home?.join("packages"),
        };

        Ok(Settings {
            packages_dir,
            default_platform: default_platform.map(Platform::new).unwrap_or_default(),
            max_concurrent_installs: max_concurrent_installs.unwrap_or(DEFAULT_MAX_CONCURRENT_INSTALLS),
            project_dirs: project_dirs.unwrap_or_else(|| vec!["src".to_string(), "test".to_string()]),
            sources,
        })
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with("SPRIG_")).collect()
    }
}

fn resolve_dir(value: &str, base_dir: Option<&Utf8Path>) -> Utf8PathBuf {
    let path = Utf8Path::new(value);
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
