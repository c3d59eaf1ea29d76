//! High-level PackageManager API - one entry point over the engine modules.
//!
//! ```no_run
//! use kettle::{Config, InstallOptions, PackageManager};
//!
//! #[tokio::main]
//! async fn main() -> kettle::Result<()> {
//!     let pm = PackageManager::new(Config::from_env());
//!
//!     for outcome in pm.install("testball", &InstallOptions::default()).await? {
//!         println!("{}", outcome.keg.display());
//!     }
//!
//!     pm.uninstall("testball", true).await?;
//!     println!("missing: {:?}", pm.missing(&[])?);
//!     Ok(())
//! }
//! ```
//!
//! Every method re-reads on-disk state; a single instance can serve many
//! operations and observes changes made by other processes in between.

use crate::audit;
use crate::builder::BuildStrategy;
use crate::cache::{CacheEntry, CacheManager};
use crate::cleanup::{self, CleanupOptions, CleanupReport};
use crate::config::Config;
use crate::error::Result;
use crate::formula::Formula;
use crate::installer::{InstallOptions, InstallOutcome, Installer};
use crate::receipt::{InstallReceipt, ReceiptStore};
use crate::registry::Registry;
use crate::resolver::{self, DependencyGraph, ResolveOptions};
use crate::symlink::{LinkReport, Linker};
use crate::uninstall::{self, UninstallReport};
use indicatif::MultiProgress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Result of an upgrade of one formula
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeResult {
    pub name: String,
    pub from_version: String,
    pub to_version: String,
    /// Keg of the new version
    pub path: PathBuf,
    pub linked: bool,
}

/// An installed formula whose registry version moved on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutdatedPackage {
    pub name: String,
    pub installed: String,
    pub latest: String,
}

pub struct PackageManager {
    config: Config,
    registry: Registry,
    progress: Option<MultiProgress>,
    bottle_tag: Option<String>,
}

impl PackageManager {
    pub fn new(config: Config) -> Self {
        Self {
            registry: Registry::new(&config),
            config,
            progress: None,
            bottle_tag: None,
        }
    }

    /// Show download progress bars
    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Select bottles for `tag` rather than the running platform
    pub fn with_bottle_tag(mut self, tag: impl Into<String>) -> Self {
        self.bottle_tag = Some(tag.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn cache(&self) -> Result<CacheManager> {
        let cache = CacheManager::new(&self.config)?;
        Ok(match &self.progress {
            Some(progress) => cache.with_progress(progress.clone()),
            None => cache,
        })
    }

    fn installer(&self) -> Result<Installer<'_>> {
        let installer = Installer::new(&self.config, self.cache()?)?;
        Ok(match &self.bottle_tag {
            Some(tag) => installer.with_bottle_tag(tag.clone()),
            None => installer,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<Formula> {
        self.registry.lookup(name)
    }

    pub fn resolve(&self, name: &str, options: ResolveOptions) -> Result<DependencyGraph> {
        resolver::resolve(&self.registry, name, options)
    }

    /// Install `name` with its dependencies, returning every formula that was
    /// installed (dependencies first, `name` last).
    pub async fn install(&self, name: &str, options: &InstallOptions) -> Result<Vec<InstallOutcome>> {
        self.installer()?.install(name, options).await
    }

    /// Upgrade the named formulae, or every installed formula when `names` is
    /// empty. Old versions stay in the Cellar until cleanup.
    pub async fn upgrade(&self, names: &[String], options: &InstallOptions) -> Result<Vec<UpgradeResult>> {
        let outdated = if names.is_empty() {
            self.outdated()?
        } else {
            let mut selected = Vec::new();
            for name in names {
                match self.outdated_one(name)? {
                    Some(pkg) => selected.push(pkg),
                    None => debug!(formula = %name, "already up to date"),
                }
            }
            selected
        };

        let installer = self.installer()?;
        let mut results = Vec::new();
        for pkg in outdated {
            let outcomes = installer.install(&pkg.name, options).await?;
            let Some(root) = outcomes.into_iter().last() else {
                continue;
            };
            results.push(UpgradeResult {
                name: pkg.name,
                from_version: pkg.installed,
                to_version: root.version,
                path: root.keg,
                linked: root.linked,
            });
        }
        Ok(results)
    }

    /// Installed formulae whose registry version is not installed
    pub fn outdated(&self) -> Result<Vec<OutdatedPackage>> {
        let mut names: Vec<String> = self.list()?.into_iter().map(|r| r.name).collect();
        names.dedup();

        let mut outdated = Vec::new();
        for name in names {
            match self.outdated_one(&name) {
                Ok(Some(pkg)) => outdated.push(pkg),
                Ok(None) => {}
                Err(e) => warn!(formula = %name, error = %e, "skipping; formula unavailable"),
            }
        }
        Ok(outdated)
    }

    fn outdated_one(&self, name: &str) -> Result<Option<OutdatedPackage>> {
        let formula = self.registry.lookup(name)?;
        let receipts = ReceiptStore::new(&self.config);
        let Some(installed) = receipts.installed_version(&formula.name)? else {
            return Ok(None);
        };
        if receipts.exists(&formula.name, &formula.version) {
            return Ok(None);
        }
        Ok(Some(OutdatedPackage {
            name: formula.name,
            installed,
            latest: formula.version,
        }))
    }

    pub async fn uninstall(&self, name: &str, force: bool) -> Result<UninstallReport> {
        uninstall::uninstall(&self.config, name, force).await
    }

    pub fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport> {
        cleanup::cleanup(&self.config, &self.cache()?, options)
    }

    pub fn missing(&self, only: &[String]) -> Result<BTreeSet<String>> {
        audit::missing(&self.config, only)
    }

    /// Download the artifacts an install of each formula would use
    pub async fn fetch(&self, names: &[String], options: &InstallOptions) -> Result<Vec<CacheEntry>> {
        let installer = self.installer()?;
        let mut artifacts = Vec::new();
        for name in names {
            let formula = self.registry.lookup(name)?;
            let artifact = match installer.choose_strategy(&formula, options)? {
                BuildStrategy::Source => formula.source_artifact(),
                BuildStrategy::Bottle { tag } => match formula.bottle_artifact(&tag) {
                    Some(artifact) => artifact,
                    None => formula.source_artifact(),
                },
            };
            artifacts.push(artifact);
        }
        installer.cache().fetch_all(&artifacts).await
    }

    /// Where the artifact for `name` lives (or would live) in the cache
    pub fn cache_path(&self, name: &str) -> Result<PathBuf> {
        let formula = self.registry.lookup(name)?;
        let installer = self.installer()?;
        let artifact = match installer.choose_strategy(&formula, &InstallOptions::default())? {
            BuildStrategy::Bottle { tag } => formula
                .bottle_artifact(&tag)
                .unwrap_or_else(|| formula.source_artifact()),
            BuildStrategy::Source => formula.source_artifact(),
        };
        Ok(installer.cache().entry_path(&artifact))
    }

    /// Link the newest installed version. Keg-only formulae need `force`.
    pub fn link(&self, name: &str, force: bool) -> Result<LinkReport> {
        let name = name.to_lowercase();
        let receipts = ReceiptStore::new(&self.config);
        let version = receipts
            .installed_version(&name)?
            .ok_or_else(|| anyhow::anyhow!("No such keg: {}", self.config.cellar.join(&name).display()))?;

        if !force
            && let Ok(formula) = self.registry.lookup(&name)
            && formula.keg_only
        {
            return Err(anyhow::anyhow!(
                "{} is keg-only and must be linked with --force",
                name
            )
            .into());
        }

        Linker::new(&self.config).link(&name, &version)
    }

    pub fn unlink(&self, name: &str) -> Result<Vec<PathBuf>> {
        Linker::new(&self.config).unlink(&name.to_lowercase())
    }

    /// Receipts of everything installed, sorted by name then version
    pub fn list(&self) -> Result<Vec<InstallReceipt>> {
        ReceiptStore::new(&self.config).all()
    }
}
