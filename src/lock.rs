//! Advisory file locks.
//!
//! Two kinds of lock serialize work across processes:
//! - `<locks>/<name>.formula.lock` - held for the whole install or uninstall
//!   of one formula
//! - `<locks>/<entry>.download.lock` - held while one cache entry is fetched
//!
//! Locks are released when the [`FileLock`] is dropped.

use crate::config::Config;
use crate::error::Result;
use anyhow::Context;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until an exclusive lock on `path` is held
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        debug!(path = %path.display(), "lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock only if nobody else holds it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to lock {}", path.display()))
                .into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;
    Ok(file)
}

pub fn formula_lock_path(config: &Config, name: &str) -> PathBuf {
    config.locks_dir().join(format!("{}.formula.lock", name))
}

pub fn download_lock_path(config: &Config, entry: &str) -> PathBuf {
    config.locks_dir().join(format!("{}.download.lock", entry))
}

/// Lock one formula for install/uninstall without blocking the runtime
pub async fn lock_formula(config: &Config, name: &str) -> Result<FileLock> {
    acquire_async(formula_lock_path(config, name)).await
}

pub async fn lock_download(config: &Config, entry: &str) -> Result<FileLock> {
    acquire_async(download_lock_path(config, entry)).await
}

async fn acquire_async(path: PathBuf) -> Result<FileLock> {
    tokio::task::spawn_blocking(move || FileLock::acquire(&path))
        .await
        .context("Lock task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_is_contended_until_drop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("locks/foo.formula.lock");

        let held = FileLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(FileLock::try_acquire(&path).unwrap().is_none());

        drop(held);
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lock_formula_uses_locks_dir() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        let lock = lock_formula(&config, "foo").await.unwrap();
        assert_eq!(
            lock.path(),
            tmp.path().join("var/kettle/locks/foo.formula.lock")
        );
    }
}
