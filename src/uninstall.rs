//! Uninstalling kegs.

use crate::cellar::{self, Keg};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock;
use crate::receipt::ReceiptStore;
use crate::symlink::Linker;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RemovedKeg {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub files: usize,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    pub removed: Vec<RemovedKeg>,
    pub unlinked: Vec<PathBuf>,
}

impl UninstallReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn removed_paths(&self) -> Vec<PathBuf> {
        self.removed.iter().map(|k| k.path.clone()).collect()
    }
}

/// Installed formulae whose receipts list `name` as a runtime dependency
pub fn dependents(config: &Config, name: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = ReceiptStore::new(config)
        .all()?
        .into_iter()
        .filter(|r| r.name != name && r.depends_on(name))
        .map(|r| r.name)
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Remove an installed formula.
///
/// Without `force` the formula must have no installed dependents and only the
/// linked (or else newest) version is removed. With `force` dependents are
/// ignored and every installed version goes. A formula that isn't installed is
/// a successful no-op.
pub async fn uninstall(config: &Config, name: &str, force: bool) -> Result<UninstallReport> {
    let name = name.to_lowercase();
    let _lock = lock::lock_formula(config, &name).await?;

    let kegs = cellar::installed_versions(config, &name)?;
    if kegs.is_empty() {
        debug!(formula = %name, "not installed; nothing to uninstall");
        return Ok(UninstallReport::default());
    }

    if !force {
        let dependents = dependents(config, &name)?;
        if !dependents.is_empty() {
            return Err(Error::DependentsExist {
                formula: name,
                dependents,
            });
        }
    }

    let linker = Linker::new(config);
    let linked = linker.linked_version(&name);

    let targets: Vec<Keg> = if force {
        kegs
    } else {
        let chosen = linked
            .as_ref()
            .and_then(|v| kegs.iter().find(|k| &k.version == v))
            .unwrap_or(&kegs[0])
            .clone();
        vec![chosen]
    };

    let mut report = UninstallReport::default();
    if force || targets.iter().any(|k| Some(&k.version) == linked.as_ref()) {
        report.unlinked = linker.unlink(&name)?;
    }

    let receipts = ReceiptStore::new(config);
    for keg in targets {
        let files = keg.file_count();
        let size = keg.disk_usage();

        receipts.delete(&keg.name, &keg.version)?;
        fs::remove_dir_all(&keg.path)
            .with_context(|| format!("Failed to remove {}", keg.path.display()))?;
        info!(formula = %keg.name, version = %keg.version, "uninstalled");

        report.removed.push(RemovedKeg {
            name: keg.name,
            version: keg.version,
            path: keg.path,
            files,
            size,
        });
    }

    cellar::remove_empty_rack(config, &name)?;

    let opt = config.opt_dir().join(&name);
    if !config.cellar.join(&name).exists() && fs::symlink_metadata(&opt).is_ok() {
        fs::remove_file(&opt)?;
    }

    Ok(report)
}
