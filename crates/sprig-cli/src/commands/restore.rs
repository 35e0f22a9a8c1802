//! `sprig restore` command implementation.
//!
//! Walks each project's dependency graph against the project tree, the local
//! package cache and the configured sources, then installs everything that
//! had to come from a source. Per-library problems are collected and
//! reported together once a project is done.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use sprig_cache::{PackageInstaller, PackagePathResolver};
use sprig_config::{
    effective_sources, lock, manifest, ConfigLoader, Settings, SourceLocation, LOCK_FILE_NAME,
    MANIFEST_FILE_NAME,
};
use sprig_core::error::{RestoreDiagnostic, SprigError, SprigResult};
use sprig_core::types::{PackageId, Platform};
use sprig_registry::{
    AuthConfig, GraphItem, HttpFeed, InstalledPackagesFeed, PackageFolderFeed,
    ProjectReferenceProvider, ProviderTier, RetryConfig, WalkProvider,
};
use sprig_resolver::{expand_all, DependencyGraph, GraphNode, GraphWalker, RestoreContext};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::output::Reporter;

/// Arguments of `sprig restore`
#[derive(Args, Debug, Clone, Default)]
pub struct RestoreArgs {
    /// A sprig.toml, a sprig.lock.json or a directory to search for projects
    #[arg(value_name = "TARGET")]
    pub target: Option<Utf8PathBuf>,

    /// Directory packages are restored into
    #[arg(long, value_name = "DIR")]
    pub packages: Option<Utf8PathBuf>,

    /// Package source to use instead of the configured ones (repeatable)
    #[arg(long = "source", value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Package source consulted after the others (repeatable)
    #[arg(long = "fallback-source", value_name = "SOURCE")]
    pub fallback_sources: Vec<String>,

    /// Do not reuse package index responses
    #[arg(long)]
    pub no_cache: bool,

    /// Treat unreachable sources as having no packages
    #[arg(long)]
    pub ignore_failed_sources: bool,

    /// Platform for projects that declare none
    #[arg(long, value_name = "PLATFORM")]
    pub default_platform: Option<String>,

    /// Upper bound on packages installed at once
    #[arg(long, value_name = "N")]
    pub max_concurrent_installs: Option<usize>,
}

/// What one restore target asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// Restore a project manifest and everything it depends on
    Manifest(Utf8PathBuf),
    /// Restore exactly the pinned packages of a lock manifest
    Lock(Utf8PathBuf),
}

impl RestoreTarget {
    fn path(&self) -> &Utf8Path {
        match self {
            RestoreTarget::Manifest(path) | RestoreTarget::Lock(path) => path,
        }
    }
}

/// State shared by every target of one run
struct RestoreEnvironment {
    settings: Settings,
    root: Utf8PathBuf,
    installer: PackageInstaller,
    local_providers: Vec<Arc<dyn WalkProvider>>,
    remote_providers: Vec<Arc<dyn WalkProvider>>,
}

impl RestoreEnvironment {
    fn context(&self, platform: Platform, project: Option<Arc<dyn WalkProvider>>) -> RestoreContext {
        RestoreContext {
            platform,
            project_providers: project.into_iter().collect(),
            local_providers: self.local_providers.clone(),
            remote_providers: self.remote_providers.clone(),
        }
    }
}

/// One invocation of `sprig restore`
pub struct RestoreCommand {
    args: RestoreArgs,
    cwd: Utf8PathBuf,
    reporter: Arc<dyn Reporter>,
}

impl RestoreCommand {
    pub fn new(args: RestoreArgs, cwd: Utf8PathBuf, reporter: Arc<dyn Reporter>) -> Self {
        Self { args, cwd, reporter }
    }

    /// Restore every target. Returns whether all of them succeeded.
    ///
    /// Errors are reserved for problems that stop the whole run, such as an
    /// invalid target or a packages directory that cannot be created.
    pub async fn execute(&self) -> SprigResult<bool> {
        let started = Instant::now();
        let (restore_dir, targets) = self.collect_targets().await?;

        let loader = ConfigLoader::new(restore_dir);
        let root = loader.resolve_root_directory();
        let settings = loader.load_settings(&root, &self.cli_overrides()).await?;
        debug!("Root directory {}, packages in {}", root, settings.packages_dir);

        tokio::fs::create_dir_all(&settings.packages_dir)
            .await
            .map_err(|e| {
                SprigError::io(
                    format!("Failed to create packages directory {}", settings.packages_dir),
                    e,
                )
            })?;

        let layout = PackagePathResolver::new(settings.packages_dir.clone());
        let installed: Arc<dyn WalkProvider> = Arc::new(InstalledPackagesFeed::new(layout.clone()));
        let environment = RestoreEnvironment {
            installer: PackageInstaller::new(layout, settings.max_concurrent_installs),
            local_providers: vec![installed],
            remote_providers: self.remote_providers(&settings, &root)?,
            settings,
            root,
        };

        if targets.is_empty() {
            self.inform("No projects to restore");
            return Ok(true);
        }

        let mut succeeded = true;
        for target in &targets {
            let outcome = match target {
                RestoreTarget::Manifest(path) => self.restore_manifest(&environment, path).await,
                RestoreTarget::Lock(path) => self.restore_lock(&environment, path).await,
            };
            match outcome {
                Ok(true) => {},
                Ok(false) => succeeded = false,
                Err(e) => {
                    self.report_error(&format!("Failed to restore {}: {}", target.path(), e));
                    succeeded = false;
                },
            }
        }

        self.inform(&format!(
            "Restore finished in {}ms",
            started.elapsed().as_millis()
        ));
        Ok(succeeded)
    }

    /// The directory a restore runs from, and what to restore there
    async fn collect_targets(&self) -> SprigResult<(Utf8PathBuf, Vec<RestoreTarget>)> {
        let path = match &self.args.target {
            Some(target) if target.is_absolute() => target.clone(),
            Some(target) => self.cwd.join(target),
            None => self.cwd.clone(),
        };
        let invalid = || SprigError::InvalidRoot {
            path: path.to_string(),
        };

        if path.is_file() {
            let directory = path.parent().map(Utf8Path::to_path_buf).ok_or_else(invalid)?;
            let file_name = path.file_name().unwrap_or_default();
            let target = if file_name.eq_ignore_ascii_case(MANIFEST_FILE_NAME) {
                RestoreTarget::Manifest(path.clone())
            } else if file_name.eq_ignore_ascii_case(LOCK_FILE_NAME) {
                RestoreTarget::Lock(path.clone())
            } else {
                return Err(invalid());
            };
            return Ok((directory, vec![target]));
        }

        if path.is_dir() {
            let directory = path.clone();
            let manifests = tokio::task::spawn_blocking(move || find_manifests(&directory))
                .await
                .map_err(SprigError::task)?;
            debug!("Found {} projects under {}", manifests.len(), path);
            let targets = manifests.into_iter().map(RestoreTarget::Manifest).collect();
            return Ok((path, targets));
        }

        Err(invalid())
    }

    fn cli_overrides(&self) -> HashMap<String, String> {
        let mut overrides = HashMap::new();
        if let Some(packages) = &self.args.packages {
            let packages = if packages.is_absolute() {
                packages.clone()
            } else {
                self.cwd.join(packages)
            };
            overrides.insert("packages".to_string(), packages.to_string());
        }
        if let Some(platform) = &self.args.default_platform {
            overrides.insert("default-platform".to_string(), platform.clone());
        }
        if let Some(max) = self.args.max_concurrent_installs {
            overrides.insert("max-concurrent-installs".to_string(), max.to_string());
        }
        overrides
    }

    fn remote_providers(
        &self,
        settings: &Settings,
        root: &Utf8Path,
    ) -> SprigResult<Vec<Arc<dyn WalkProvider>>> {
        let sources =
            effective_sources(&settings.sources, &self.args.sources, &self.args.fallback_sources);

        let mut providers: Vec<Arc<dyn WalkProvider>> = Vec::with_capacity(sources.len());
        for source in sources {
            match source.location(root)? {
                SourceLocation::Folder(path) => {
                    if !path.is_dir() {
                        self.inform(&format!("Package source {} doesn't exist", path));
                        continue;
                    }
                    providers.push(Arc::new(PackageFolderFeed::new(source.name.clone(), path)));
                },
                SourceLocation::Http(url) => {
                    let auth = match (&source.username, &source.password) {
                        (Some(username), Some(password)) => Some(AuthConfig {
                            username: username.clone(),
                            password: password.clone(),
                        }),
                        _ => None,
                    };
                    let mut feed =
                        HttpFeed::with_config(source.name.clone(), url, auth, RetryConfig::default())?
                            .ignore_failure(self.args.ignore_failed_sources);
                    if self.args.no_cache {
                        feed = feed.no_cache();
                    }
                    providers.push(Arc::new(feed));
                },
            }
        }

        Ok(providers)
    }

    async fn restore_manifest(
        &self,
        environment: &RestoreEnvironment,
        path: &Utf8Path,
    ) -> SprigResult<bool> {
        let started = Instant::now();
        self.inform(&format!("Restoring packages for {}", path));

        let manifest = Arc::new(manifest::load_from_file(path).await?);
        let project: Arc<dyn WalkProvider> = Arc::new(ProjectReferenceProvider::new(
            path,
            manifest.clone(),
            &environment.root,
            &environment.settings.project_dirs,
        ));

        let mut platforms = manifest.target_platforms();
        if platforms.is_empty() {
            platforms.push(environment.settings.default_platform.clone());
        }

        // One walker per project: lookups are shared across its platforms
        let walker = GraphWalker::new();
        let handles: Vec<_> = platforms
            .iter()
            .map(|platform| {
                let context = Arc::new(environment.context(platform.clone(), Some(project.clone())));
                let walker = walker.clone();
                let root = manifest.root_library();
                tokio::spawn(async move { walker.resolve(context, root, expand_all()).await })
            })
            .collect();

        let mut trees = Vec::with_capacity(handles.len());
        for handle in handles {
            trees.push(handle.await.map_err(SprigError::task)??);
        }

        let mut diagnostics = Vec::new();
        let mut reported = HashSet::new();
        let mut install_set: Vec<Arc<GraphItem>> = Vec::new();
        let mut queued = HashSet::new();

        for (platform, tree) in platforms.iter().zip(&trees) {
            debug!(
                "Dependency graph of {} for {}:\n{}",
                manifest.package.name,
                platform,
                tree.render_tree()
            );
            collect_unresolved(tree, &mut reported, &mut diagnostics);

            let graph = DependencyGraph::from_tree(tree);
            for cycle in graph.detect_cycles() {
                warn!("Circular dependency detected: {}", DependencyGraph::format_cycle(&cycle));
            }
            for item in graph.items() {
                if item.tier() == ProviderTier::Remote && queued.insert(item.id().clone()) {
                    install_set.push(item.clone());
                }
            }
        }

        diagnostics.extend(source_failures(&walker));

        let report = environment.installer.install(install_set, |_, _| true).await;
        for id in &report.installed {
            self.inform(&format!("Installed {}", id));
        }
        diagnostics.extend(report.failed);

        self.finish(&manifest.package.name, diagnostics, started)
    }

    async fn restore_lock(&self, environment: &RestoreEnvironment, path: &Utf8Path) -> SprigResult<bool> {
        let started = Instant::now();
        self.inform(&format!("Restoring pinned packages from {}", path));

        let lock = lock::load_from_file(path).await?;
        let context = Arc::new(environment.context(environment.settings.default_platform.clone(), None));
        let walker = GraphWalker::new();

        let pins = lock.pins();
        let handles: Vec<_> = pins
            .iter()
            .map(|(id, _)| {
                let walker = walker.clone();
                let context = context.clone();
                let library = id.to_library();
                tokio::spawn(async move { walker.find_library_cached(&context, &library).await })
            })
            .collect();

        let mut diagnostics = Vec::new();
        let mut install_set: Vec<Arc<GraphItem>> = Vec::new();
        let mut expected: HashMap<PackageId, String> = HashMap::new();

        for ((id, sha), handle) in pins.into_iter().zip(handles) {
            match handle.await.map_err(SprigError::task)? {
                Some(item) if item.id() == &id => {
                    if item.tier() == ProviderTier::Remote {
                        expected.insert(id, sha);
                        install_set.push(item);
                    }
                },
                found => diagnostics.push(pin_mismatch(&id, found.as_ref().map(|item| item.id()))),
            }
        }

        diagnostics.extend(source_failures(&walker));

        let accept = move |id: &PackageId, hash: &str| {
            expected.get(id).map_or(true, |pinned| pinned == hash)
        };
        let report = environment.installer.install(install_set, accept).await;
        for id in &report.installed {
            self.inform(&format!("Installed {}", id));
        }
        diagnostics.extend(
            report
                .rejected
                .into_iter()
                .map(|package| RestoreDiagnostic::HashMismatch { package }),
        );
        diagnostics.extend(report.failed);

        self.finish(path.as_str(), diagnostics, started)
    }

    fn finish(&self, name: &str, diagnostics: Vec<RestoreDiagnostic>, started: Instant) -> SprigResult<bool> {
        for diagnostic in &diagnostics {
            self.report_error(&diagnostic.to_string());
        }

        let elapsed = started.elapsed().as_millis();
        if diagnostics.is_empty() {
            self.inform(&format!("Restored {} in {}ms", name, elapsed));
            Ok(true)
        } else {
            self.inform(&format!("Failed to restore {} ({}ms)", name, elapsed));
            Ok(false)
        }
    }

    fn inform(&self, message: &str) {
        info!("{}", message);
        self.reporter.information(message);
    }

    fn report_error(&self, message: &str) {
        error!("{}", message);
        self.reporter.error(message);
    }
}

/// Unresolved and case-mismatched nodes, each library reported once
/// Diagnostic for a lock entry whose lookup did not return the pinned
/// identity. Only a name differing in case alone is a case mismatch.
pub(crate) fn pin_mismatch(pinned: &PackageId, found: Option<&PackageId>) -> RestoreDiagnostic {
    match found {
        Some(found) if found.name != pinned.name && found.version == pinned.version => {
            RestoreDiagnostic::CaseMismatch {
                requested: pinned.to_library(),
                suggested: found.name.clone(),
            }
        },
        _ => RestoreDiagnostic::NotFound {
            library: pinned.to_library(),
        },
    }
}

/// Sources that failed while walking; `--ignore-failed-sources` downgrades
/// HTTP failures to warnings before they get here
fn source_failures(walker: &GraphWalker) -> Vec<RestoreDiagnostic> {
    walker
        .source_failures()
        .into_iter()
        .map(|failure| RestoreDiagnostic::SourceFailed {
            provider: failure.provider,
            message: failure.message,
        })
        .collect()
}

fn collect_unresolved(
    tree: &GraphNode,
    reported: &mut HashSet<String>,
    diagnostics: &mut Vec<RestoreDiagnostic>,
) {
    for node in tree.descendants() {
        if node.is_resolved() || !reported.insert(node.library.lookup_key()) {
            continue;
        }
        let diagnostic = match node.case_mismatch() {
            Some(found) => RestoreDiagnostic::CaseMismatch {
                requested: node.library.clone(),
                suggested: found.to_string(),
            },
            None => RestoreDiagnostic::NotFound {
                library: node.library.clone(),
            },
        };
        diagnostics.push(diagnostic);
    }
}

/// Every project manifest below `dir`, skipping hidden directories
fn find_manifests(dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir, e);
                None
            },
        })
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE_NAME)
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        .collect()
}
