//! HTTP package feed with connection pooling and retry logic
//!
//! Layout served by a feed rooted at `{base}`:
//! - `{base}/{name}/index.json` lists every version as `{"versions": [<pkgspec>...]}`
//! - `{base}/{name}/{version}/{name}.{version}.pkg` is the archive
//!
//! Names in URLs are lowercased.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use sprig_config::PackageSpec;
use sprig_core::error::{SprigError, SprigResult};
use sprig_core::types::{Library, PackageId, Platform};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::cache::IndexCache;
use crate::provider::{select_version, LibraryDescription, SourceKind, WalkProvider};
use crate::RegistryResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Credentials for a feed
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    versions: Vec<PackageSpec>,
}

/// Package feed served over HTTP
#[derive(Debug)]
pub struct HttpFeed {
    name: String,
    base_url: Url,
    /// Underlying HTTP client with connection pooling
    client: Client,
    retry_config: RetryConfig,
    /// `None` when index caching is disabled
    cache: Option<IndexCache>,
    ignore_failure: bool,
}

impl HttpFeed {
    pub fn new(name: impl Into<String>, base_url: Url) -> RegistryResult<Self> {
        Self::with_config(name, base_url, None, RetryConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        base_url: Url,
        auth: Option<AuthConfig>,
        retry_config: RetryConfig,
    ) -> RegistryResult<Self> {
        let mut builder = ClientBuilder::new()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .user_agent(concat!("sprig/", env!("CARGO_PKG_VERSION")));

        if let Some(auth) = auth {
            use base64::{engine::general_purpose, Engine as _};
            let credentials =
                general_purpose::STANDARD.encode(format!("{}:{}", auth.username, auth.password));
            let mut value: reqwest::header::HeaderValue = format!("Basic {}", credentials)
                .parse()
                .map_err(|e| SprigError::network("Invalid basic auth credentials".to_string(), e))?;
            value.set_sensitive(true);

            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| SprigError::network("Failed to create HTTP client".to_string(), e))?;

        Ok(Self {
            name: name.into(),
            base_url,
            client,
            retry_config,
            cache: Some(IndexCache::default()),
            ignore_failure: false,
        })
    }

    /// Always ask the feed instead of reusing index responses
    pub fn no_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Treat an unreachable feed as having no packages
    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.ignore_failure = ignore;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn package_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            name.to_ascii_lowercase()
        )
    }

    fn index_url(&self, name: &str) -> String {
        format!("{}/index.json", self.package_url(name))
    }

    fn archive_url(&self, id: &PackageId) -> String {
        let lower = id.name.to_ascii_lowercase();
        format!(
            "{}/{}/{}.{}.pkg",
            self.package_url(&id.name),
            id.version,
            lower,
            id.version
        )
    }

    /// Execute HTTP request with exponential backoff retry logic
    async fn with_retry<F, Fut, T>(&self, operation: F) -> RegistryResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = RegistryResult<T>>,
    {
        let mut delay = self.retry_config.initial_delay;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let retryable = matches!(error, SprigError::Network { .. });
                    if !retryable || attempt == self.retry_config.max_retries {
                        return Err(error);
                    }

                    debug!("Retrying after error from {}: {}", self.name, error);
                    tokio::time::sleep(delay).await;

                    delay = std::cmp::min(
                        Duration::from_millis(
                            (delay.as_millis() as f64 * self.retry_config.multiplier) as u64,
                        ),
                        self.retry_config.max_delay,
                    );
                    attempt += 1;
                },
            }
        }
    }

    /// Every version the feed lists for a package; empty when it has none
    pub async fn fetch_index(&self, name: &str) -> RegistryResult<Arc<Vec<PackageSpec>>> {
        if let Some(cached) = self.cache.as_ref().and_then(|cache| cache.get(name)) {
            return Ok(cached);
        }

        let url = self.index_url(name);
        let versions = self
            .with_retry(|| async {
                let response = self.client.get(&url).send().await.map_err(|e| {
                    SprigError::network(format!("Failed to fetch {}", url), e)
                })?;

                match response.status() {
                    StatusCode::OK => {
                        let body = response.bytes().await.map_err(|e| {
                            SprigError::network(format!("Failed to read {}", url), e)
                        })?;
                        let document: IndexDocument =
                            serde_json::from_slice(&body).map_err(|e| {
                                SprigError::ManifestParse {
                                    path: url.clone(),
                                    message: e.to_string(),
                                }
                            })?;
                        Ok(document.versions)
                    },
                    StatusCode::NOT_FOUND => Ok(Vec::new()),
                    status => Err(SprigError::Network {
                        message: format!("{} returned status {}", url, status),
                        source: None,
                    }),
                }
            })
            .await?;

        // An index may list other packages; keep every casing of this name
        let versions: Arc<Vec<PackageSpec>> = Arc::new(
            versions
                .into_iter()
                .filter(|spec| spec.id.eq_ignore_ascii_case(name))
                .collect(),
        );
        if let Some(cache) = &self.cache {
            cache.insert(name, versions.clone());
        }
        Ok(versions)
    }

    /// Download a package archive
    pub async fn download_archive(&self, id: &PackageId) -> RegistryResult<Vec<u8>> {
        let url = self.archive_url(id);
        self.with_retry(|| async {
            let response = self.client.get(&url).send().await.map_err(|e| {
                SprigError::network(format!("Failed to download {}", url), e)
            })?;

            match response.status() {
                status if status.is_success() => {
                    let bytes = response.bytes().await.map_err(|e| {
                        SprigError::network(format!("Failed to read {}", url), e)
                    })?;
                    Ok(bytes.to_vec())
                },
                StatusCode::NOT_FOUND => Err(SprigError::PackageNotFound {
                    name: id.to_string(),
                }),
                status => Err(SprigError::Network {
                    message: format!("{} returned status {}", url, status),
                    source: None,
                }),
            }
        })
        .await
    }
}

#[async_trait]
impl WalkProvider for HttpFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Http
    }

    async fn find_library(
        &self,
        library: &Library,
        platform: &Platform,
    ) -> SprigResult<Option<LibraryDescription>> {
        let versions = match self.fetch_index(&library.name).await {
            Ok(versions) => versions,
            Err(e) if self.ignore_failure => {
                warn!("Failed to retrieve information from remote source '{}': {}", self.name, e);
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        let Some(version) = select_version(versions.iter().map(|spec| &spec.version), library)
        else {
            return Ok(None);
        };

        match versions.iter().find(|spec| spec.version == version) {
            Some(spec) => LibraryDescription::from_spec(spec, platform).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_content(&self, id: &PackageId) -> SprigResult<Vec<u8>> {
        self.download_archive(id).await
    }
}

#[cfg(test)]
mod tests;
