//! In-memory cache of feed index responses with TTL support

use dashmap::DashMap;
use sprig_config::PackageSpec;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Default time an index response stays fresh
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(300);

/// Cached index of one package
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Every version the feed lists; empty when the feed has none
    pub versions: Arc<Vec<PackageSpec>>,
    /// When the entry was stored
    pub stored_at: SystemTime,
    /// Time-to-live duration
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn with_ttl(versions: Arc<Vec<PackageSpec>>, ttl: Duration) -> Self {
        Self {
            versions,
            stored_at: SystemTime::now(),
            ttl,
        }
    }

    /// Check if cache entry is still fresh
    pub fn is_fresh(&self) -> bool {
        match self.stored_at.elapsed() {
            Ok(elapsed) => elapsed < self.ttl,
            // Clock went backwards
            Err(_) => false,
        }
    }
}

/// Index responses keyed by lowercase package name
#[derive(Debug)]
pub struct IndexCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl IndexCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Cached versions if the entry is still fresh
    pub fn get(&self, name: &str) -> Option<Arc<Vec<PackageSpec>>> {
        let key = name.to_ascii_lowercase();
        let fresh = self
            .entries
            .get(&key)
            .map(|entry| entry.is_fresh().then(|| entry.versions.clone()))?;

        // The read guard is gone here, so removing can't deadlock the shard
        if fresh.is_none() {
            self.entries.remove(&key);
        }
        fresh
    }

    pub fn insert(&self, name: &str, versions: Arc<Vec<PackageSpec>>) {
        self.entries
            .insert(name.to_ascii_lowercase(), CacheEntry::with_ttl(versions, self.ttl));
    }

    pub fn stats(&self) -> CacheStats {
        let fresh_entries = self.entries.iter().filter(|entry| entry.is_fresh()).count();
        CacheStats {
            total_entries: self.entries.len(),
            fresh_entries,
            stale_entries: self.entries.len() - fresh_entries,
        }
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_TTL)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}
