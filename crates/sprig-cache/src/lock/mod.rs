//! Cross-process package locks
//!
//! One advisory lock file per package record serializes installers across
//! threads and processes. Whoever takes the lock while the record's hash
//! marker is still missing owns the install; everyone else waited for that
//! owner and finds the record complete.

use camino::{Utf8Path, Utf8PathBuf};
use fs4::fs_std::FileExt;
use sprig_core::error::SprigError;
use std::fs::{File, OpenOptions};

use crate::CacheResult;

/// Exclusive lock on one package record, released on drop
#[derive(Debug)]
pub struct PackageLock {
    file: File,
    path: Utf8PathBuf,
    owner: bool,
}

impl PackageLock {
    /// Block until the lock at `lock_path` is held.
    ///
    /// `marker_path` is checked once the lock is held: the caller owns the
    /// install only if the marker is still absent.
    pub async fn acquire(lock_path: &Utf8Path, marker_path: &Utf8Path) -> CacheResult<Self> {
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SprigError::Lock {
                    path: parent.to_string(),
                    source: e,
                })?;
        }

        let path = lock_path.to_path_buf();
        let marker = marker_path.to_path_buf();

        // Contention is expected, so wait instead of failing fast. The wait
        // happens on a blocking thread so other installs keep going.
        tokio::task::spawn_blocking(move || -> CacheResult<Self> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| SprigError::Lock {
                    path: path.to_string(),
                    source: e,
                })?;

            FileExt::lock_exclusive(&file).map_err(|e| SprigError::Lock {
                path: path.to_string(),
                source: e,
            })?;

            let owner = !marker.exists();
            tracing::trace!("Locked {} (owner: {})", path, owner);

            Ok(Self { file, path, owner })
        })
        .await
        .map_err(SprigError::task)?
    }

    /// Whether this holder has to materialize the record
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        // Closing the file releases the lock too; unlock explicitly so the
        // release doesn't wait on the handle being dropped
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock {}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn paths(dir: &tempfile::TempDir) -> (Utf8PathBuf, Utf8PathBuf) {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (root.join(".locks").join("json.lock"), root.join("Json.1.0.0.pkg.sha512"))
    }

    #[tokio::test]
    async fn test_owner_until_marker_exists() {
        let dir = tempdir().unwrap();
        let (lock_path, marker) = paths(&dir);

        let lock = PackageLock::acquire(&lock_path, &marker).await.unwrap();
        assert!(lock.is_owner());
        assert!(lock_path.exists());
        drop(lock);

        std::fs::write(&marker, "abc=").unwrap();
        let lock = PackageLock::acquire(&lock_path, &marker).await.unwrap();
        assert!(!lock.is_owner());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let (lock_path, marker) = paths(&dir);
        let holders = Arc::new(AtomicUsize::new(0));
        let max_holders = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (lock_path, marker) = (lock_path.clone(), marker.clone());
            let (holders, max_holders) = (holders.clone(), max_holders.clone());
            handles.push(tokio::spawn(async move {
                let _lock = PackageLock::acquire(&lock_path, &marker).await.unwrap();
                let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                max_holders.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                holders.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_holders.load(Ordering::SeqCst), 1);
    }
}
