//! Cleanup: superseded kegs and stale downloads.

use crate::cache::{CacheManager, PruneScope};
use crate::cellar;
use crate::config::Config;
use crate::error::Result;
use crate::lock::{self, FileLock};
use crate::symlink::Linker;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Also remove a linked version that isn't the newest
    pub force: bool,
    pub prune: PruneScope,
    pub dry_run: bool,
    /// Restrict keg cleanup to these formulae (all when empty)
    pub formulae: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub kegs: Vec<PathBuf>,
    pub cache: Vec<PathBuf>,
    /// Bytes held by the removed kegs
    pub freed: u64,
}

impl CleanupReport {
    pub fn removed(&self) -> impl Iterator<Item = &PathBuf> {
        self.kegs.iter().chain(self.cache.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.kegs.is_empty() && self.cache.is_empty()
    }
}

pub fn cleanup(config: &Config, cache: &CacheManager, options: &CleanupOptions) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let linker = Linker::new(config);

    let names: Vec<String> = if options.formulae.is_empty() {
        let mut names: Vec<String> = cellar::list_installed(config)?
            .into_iter()
            .map(|k| k.name)
            .collect();
        names.dedup();
        names
    } else {
        options.formulae.iter().map(|n| n.to_lowercase()).collect()
    };

    for name in &names {
        let kegs = cellar::installed_versions(config, name)?;
        if kegs.len() <= 1 {
            continue;
        }

        let _lock = if options.dry_run {
            None
        } else {
            Some(FileLock::acquire(&lock::formula_lock_path(config, name))?)
        };

        let linked = linker.linked_version(name);
        // kegs[0] is the newest
        for keg in &kegs[1..] {
            let is_linked = linked.as_deref() == Some(keg.version.as_str());
            if is_linked && !options.force {
                debug!(formula = %name, version = %keg.version, "keeping linked version");
                continue;
            }

            report.freed += keg.disk_usage();
            if !options.dry_run {
                if is_linked {
                    linker.unlink(name)?;
                }
                fs::remove_dir_all(&keg.path)
                    .with_context(|| format!("Failed to remove {}", keg.path.display()))?;
                info!(formula = %name, version = %keg.version, "removed superseded keg");
            }
            report.kegs.push(keg.path.clone());
        }
    }

    report.cache = cache.prune(options.prune, options.dry_run)?;
    Ok(report)
}
