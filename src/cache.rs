//! Download cache.
//!
//! Every fetched artifact lives in the cache directory under a name derived
//! from what it is and what it should hash to:
//!
//! ```text
//! <cache>/
//!   testball--0.1--1dfb13ce0f61.tbz
//!   jq--1.7.1--a1b2c3d4e5f6.arm64_sonoma.bottle.tar.gz
//!   oniguruma--6.9.9--unverified.tar.gz        # formula ships no checksum
//!   jq--1.7.1--a1b2c3d4e5f6.tar.gz.incomplete  # download in progress
//! ```
//!
//! An entry is only renamed into place once its checksum matched, so anything
//! without the `.incomplete` suffix can be trusted (modulo disk corruption,
//! which the installer catches by re-hashing and evicting).

use crate::config::Config;
use crate::download;
use crate::error::{Error, Result};
use crate::formula::{Artifact, ArtifactKind, archive_extension};
use crate::lock;
use crate::registry::Registry;
use anyhow::Context;
use futures::future::join_all;
use indicatif::MultiProgress;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INCOMPLETE_SUFFIX: &str = ".incomplete";
const UNVERIFIED: &str = "unverified";
const FETCH_ATTEMPTS: usize = 2;

/// Which entries a prune removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneScope {
    /// Interrupted downloads and versions nothing installed or current needs
    #[default]
    Stale,
    /// Everything in the cache directory
    All,
}

impl std::str::FromStr for PruneScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(PruneScope::All),
            "stale" => Ok(PruneScope::Stale),
            other => Err(anyhow::anyhow!("Unknown prune scope: {} (expected all or stale)", other).into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub artifact: Artifact,
    pub path: PathBuf,
    /// Served from disk without touching the network
    pub hit: bool,
}

pub struct CacheManager {
    config: Config,
    client: reqwest::Client,
    progress: Option<MultiProgress>,
}

impl CacheManager {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: download::client()?,
            progress: None,
        })
    }

    /// Draw per-download progress bars on `progress`
    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.config.cache
    }

    pub fn entry_path(&self, artifact: &Artifact) -> PathBuf {
        self.config.cache.join(entry_name(artifact))
    }

    /// Existing entry for `artifact`, if one was fetched before
    pub fn lookup(&self, artifact: &Artifact) -> Option<PathBuf> {
        let path = self.entry_path(artifact);
        path.is_file().then_some(path)
    }

    /// Return the cached artifact, downloading and verifying it on a miss
    pub async fn fetch(&self, artifact: &Artifact) -> Result<CacheEntry> {
        if let Some(path) = self.lookup(artifact) {
            debug!(entry = %path.display(), "cache hit");
            return Ok(CacheEntry {
                artifact: artifact.clone(),
                path,
                hit: true,
            });
        }

        let name = entry_name(artifact);
        let _lock = lock::lock_download(&self.config, &name).await?;

        // Another process may have finished the same download while we waited
        if let Some(path) = self.lookup(artifact) {
            debug!(entry = %path.display(), "cache filled while waiting for lock");
            return Ok(CacheEntry {
                artifact: artifact.clone(),
                path,
                hit: true,
            });
        }

        fs::create_dir_all(&self.config.cache).map_err(|source| Error::CacheWriteError {
            path: self.config.cache.clone(),
            source,
        })?;

        let path = self.entry_path(artifact);
        let incomplete = self.config.cache.join(format!("{}{}", name, INCOMPLETE_SUFFIX));
        let pb = download::progress_bar(self.progress.as_ref(), &artifact.name);

        let mut attempt = 1;
        let actual = loop {
            match download::download(&self.client, &artifact.url, &incomplete, pb.as_ref()).await {
                Ok(sha) => break sha,
                Err(e) if e.is_transient() && attempt < FETCH_ATTEMPTS => {
                    warn!(url = %artifact.url, error = %e, "download failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    let _ = fs::remove_file(&incomplete);
                    if let Some(pb) = &pb {
                        pb.abandon_with_message(format!("✗ {}", artifact.name));
                    }
                    return Err(e);
                }
            }
        };

        if let Some(expected) = &artifact.sha256
            && !expected.eq_ignore_ascii_case(&actual)
        {
            let _ = fs::remove_file(&incomplete);
            if let Some(pb) = &pb {
                pb.abandon_with_message(format!("✗ {}", artifact.name));
            }
            return Err(Error::ChecksumMismatch {
                url: artifact.url.clone(),
                expected: expected.clone(),
                actual,
            });
        }

        fs::rename(&incomplete, &path).map_err(|source| Error::CacheWriteError {
            path: path.clone(),
            source,
        })?;

        if let Some(pb) = &pb {
            pb.finish_with_message(format!("✓ {}", artifact.name));
        }
        info!(entry = %path.display(), "cached");

        Ok(CacheEntry {
            artifact: artifact.clone(),
            path,
            hit: false,
        })
    }

    /// Fetch several artifacts concurrently; fails with the first error in
    /// input order once every fetch has settled.
    pub async fn fetch_all(&self, artifacts: &[Artifact]) -> Result<Vec<CacheEntry>> {
        let results = join_all(artifacts.iter().map(|a| self.fetch(a))).await;
        results.into_iter().collect()
    }

    /// Drop an entry that failed verification
    pub fn evict(&self, artifact: &Artifact) -> Result<()> {
        let path = self.entry_path(artifact);
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!(entry = %path.display(), "evicted corrupt cache entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove entries in `scope`, returning what was (or with `dry_run`, would
    /// be) removed. Safe to repeat: a second run over the same state finds
    /// nothing.
    pub fn prune(&self, scope: PruneScope, dry_run: bool) -> Result<Vec<PathBuf>> {
        let cache = &self.config.cache;
        if !cache.is_dir() {
            return Ok(vec![]);
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(cache)
            .with_context(|| format!("Failed to read cache: {}", cache.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();

        let registry = Registry::new(&self.config);
        let mut removed = Vec::new();

        for path in entries {
            let remove = match scope {
                PruneScope::All => true,
                PruneScope::Stale => self.is_stale(&path, &registry),
            };
            if !remove {
                continue;
            }

            if !dry_run {
                let result = if path.is_dir() && !path.is_symlink() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                if let Err(e) = result {
                    warn!(path = %path.display(), error = %e, "failed to remove cache entry");
                    continue;
                }
                debug!(path = %path.display(), "pruned");
            }
            removed.push(path);
        }

        Ok(removed)
    }

    fn is_stale(&self, path: &Path, registry: &Registry) -> bool {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return false;
        };

        if file_name.ends_with(INCOMPLETE_SUFFIX) {
            return true;
        }

        // Only files this cache wrote are candidates
        let Some((name, version)) = parse_entry_name(&file_name) else {
            return false;
        };

        if self.config.keg_path(name, version).is_dir() {
            return false;
        }

        match registry.lookup(name) {
            Ok(formula) => formula.version != version,
            Err(_) => true,
        }
    }
}

/// `<name>--<version>--<sha12><ext>` for one artifact
pub fn entry_name(artifact: &Artifact) -> String {
    let digest = artifact
        .sha256
        .as_deref()
        .map(|s| s.chars().take(12).collect::<String>().to_lowercase())
        .unwrap_or_else(|| UNVERIFIED.to_string());

    let ext = match &artifact.kind {
        ArtifactKind::Source => archive_extension(&artifact.url),
        ArtifactKind::Bottle { tag } => format!(".{}.bottle.tar.gz", tag),
    };

    format!("{}--{}--{}{}", artifact.name, artifact.version, digest, ext)
}

/// Recover (name, version) from an entry file name
fn parse_entry_name(file_name: &str) -> Option<(&str, &str)> {
    let mut parts = file_name.splitn(3, "--");
    let name = parts.next().filter(|s| !s.is_empty())?;
    let version = parts.next().filter(|s| !s.is_empty())?;
    parts.next()?;
    Some((name, version))
}
