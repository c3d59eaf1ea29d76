//! Installation pipeline.
//!
//! Installing a formula resolves its dependency graph, prefetches every
//! artifact that is not cached yet, then walks the install order driving each
//! formula through:
//!
//! ```text
//! Pending → Fetching → Verifying → Building | Extracting → Linking → Installed
//!     \__________\___________\___________\______________\_____→ Failed(reason)
//! ```
//!
//! A failure while building or extracting removes the half-written keg and
//! leaves no receipt behind; the cache entry is kept so a retry skips the
//! download. A forced reinstall keeps the previous keg aside until the new one
//! is built and puts it back if the build fails. Dependencies that are already
//! installed (at any version) are skipped, including ones another invocation
//! finished while this one waited for the formula lock.

use crate::builder::{self, BuildStrategy};
use crate::cache::{CacheEntry, CacheManager};
use crate::config::Config;
use crate::download;
use crate::error::{Error, Result};
use crate::formula::{Artifact, Formula};
use crate::lock;
use crate::platform;
use crate::receipt::{InstallReceipt, ReceiptDependency, ReceiptStore};
use crate::registry::Registry;
use crate::resolver::{self, Edge, ResolveOptions};
use crate::symlink::Linker;
use anyhow::Context;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    Pending,
    Fetching,
    Verifying,
    Building,
    Extracting,
    Linking,
    Installed,
    Failed(String),
}

impl InstallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallState::Installed | InstallState::Failed(_))
    }

    fn can_advance_to(&self, next: &InstallState) -> bool {
        use InstallState::*;
        match (self, next) {
            (from, Failed(_)) => !from.is_terminal(),
            (Pending, Fetching)
            | (Fetching, Verifying)
            | (Verifying, Building)
            | (Verifying, Extracting)
            | (Building, Linking)
            | (Extracting, Linking)
            | (Linking, Installed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::Pending => write!(f, "pending"),
            InstallState::Fetching => write!(f, "fetching"),
            InstallState::Verifying => write!(f, "verifying"),
            InstallState::Building => write!(f, "building"),
            InstallState::Extracting => write!(f, "extracting"),
            InstallState::Linking => write!(f, "linking"),
            InstallState::Installed => write!(f, "installed"),
            InstallState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// State of one formula's install, with the path it took
#[derive(Debug, Clone)]
struct Progress {
    formula: String,
    history: Vec<InstallState>,
}

impl Progress {
    fn new(formula: &str) -> Self {
        Self {
            formula: formula.to_string(),
            history: vec![InstallState::Pending],
        }
    }

    fn state(&self) -> &InstallState {
        // history always starts with Pending
        &self.history[self.history.len() - 1]
    }

    fn advance(&mut self, next: InstallState) -> Result<()> {
        if !self.state().can_advance_to(&next) {
            return Err(anyhow::anyhow!(
                "{}: invalid install transition {} -> {}",
                self.formula,
                self.state(),
                next
            )
            .into());
        }
        debug!(formula = %self.formula, from = %self.state(), to = %next, "install state");
        self.history.push(next);
        Ok(())
    }

    /// Record the failure and hand the error back
    fn fail(&mut self, error: Error) -> Error {
        if !self.state().is_terminal() {
            self.history.push(InstallState::Failed(error.to_string()));
        }
        error
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Reinstall even when this version is already installed
    pub force: bool,
    pub build_from_source: bool,
    /// Build from source, recording that the result is meant for bottling
    pub build_bottle: bool,
    /// Fail instead of building when no bottle exists
    pub force_bottle: bool,
    /// Options for the requested formula (`with-foo`)
    pub options: Vec<String>,
    /// Skip linking into the prefix
    pub no_link: bool,
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub name: String,
    pub version: String,
    pub keg: PathBuf,
    pub receipt: InstallReceipt,
    pub strategy: BuildStrategy,
    pub linked: bool,
    /// Set when linking was attempted and hit existing files
    pub link_conflicts: Vec<PathBuf>,
    pub build_log: String,
    pub history: Vec<InstallState>,
}

pub struct Installer<'a> {
    config: &'a Config,
    registry: Registry,
    receipts: ReceiptStore,
    cache: CacheManager,
    bottle_tag: String,
}

impl<'a> Installer<'a> {
    pub fn new(config: &'a Config, cache: CacheManager) -> Result<Self> {
        Ok(Self {
            config,
            registry: Registry::new(config),
            receipts: ReceiptStore::new(config),
            cache,
            bottle_tag: platform::bottle_tag()?,
        })
    }

    /// Use bottles built for `tag` instead of the running platform's
    pub fn with_bottle_tag(mut self, tag: impl Into<String>) -> Self {
        self.bottle_tag = tag.into();
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn choose_strategy(&self, formula: &Formula, options: &InstallOptions) -> Result<BuildStrategy> {
        if options.build_from_source || options.build_bottle {
            return Ok(BuildStrategy::Source);
        }
        if let Some((tag, _)) = formula.bottle_for(&self.bottle_tag) {
            return Ok(BuildStrategy::Bottle {
                tag: tag.to_string(),
            });
        }
        if options.force_bottle {
            return Err(Error::BottleUnavailable {
                formula: formula.name.clone(),
                tag: self.bottle_tag.clone(),
            });
        }
        Ok(BuildStrategy::Source)
    }

    fn artifact_for(&self, formula: &Formula, strategy: &BuildStrategy) -> Result<Artifact> {
        match strategy {
            BuildStrategy::Source => Ok(formula.source_artifact()),
            BuildStrategy::Bottle { tag } => {
                formula
                    .bottle_artifact(tag)
                    .ok_or_else(|| Error::BottleUnavailable {
                        formula: formula.name.clone(),
                        tag: tag.clone(),
                    })
            }
        }
    }

    /// Install `name` and whatever it needs. Returns one outcome per formula
    /// actually installed, dependencies first.
    pub async fn install(&self, name: &str, options: &InstallOptions) -> Result<Vec<InstallOutcome>> {
        let graph = resolver::resolve(
            &self.registry,
            name,
            ResolveOptions {
                include_build: true,
                options: options.options.clone(),
            },
        )?;
        let root = graph.root().clone();

        if !options.force && self.receipts.exists(&root.name, &root.version) {
            return Err(Error::AlreadyInstalled {
                name: root.name,
                version: root.version,
            });
        }

        let dep_options = InstallOptions {
            force: false,
            options: vec![],
            no_link: options.no_link,
            ..Default::default()
        };

        let mut plan = Vec::new();
        for dep in graph.dependencies() {
            if self.receipts.is_installed(&dep.name)? {
                debug!(formula = %dep.name, "dependency already installed");
                continue;
            }
            let strategy = self.choose_strategy(dep, &dep_options)?;
            plan.push((dep.clone(), strategy, false));
        }
        let root_strategy = self.choose_strategy(&root, options)?;
        plan.push((root.clone(), root_strategy, true));

        let artifacts = plan
            .iter()
            .map(|(f, s, _)| self.artifact_for(f, s))
            .collect::<Result<Vec<_>>>()?;
        self.cache.fetch_all(&artifacts).await?;

        let mut outcomes = Vec::new();
        for (formula, strategy, on_request) in plan {
            let opts = if on_request { options } else { &dep_options };
            let dependencies: Vec<Edge> = graph
                .dependencies_of(&formula.name)
                .into_iter()
                .cloned()
                .collect();
            match self
                .install_formula(&formula, &dependencies, strategy, opts, on_request)
                .await
            {
                Ok(outcome) => outcomes.push(outcome),
                Err(Error::AlreadyInstalled { name, version }) if !on_request => {
                    debug!(formula = %name, version = %version, "dependency installed meanwhile");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    /// Drive one formula from Pending to Installed. `dependencies` are the
    /// formula's resolved edges, so aliases arrive under their canonical names.
    pub async fn install_formula(
        &self,
        formula: &Formula,
        dependencies: &[Edge],
        strategy: BuildStrategy,
        options: &InstallOptions,
        on_request: bool,
    ) -> Result<InstallOutcome> {
        let _lock = lock::lock_formula(self.config, &formula.name).await?;
        let mut progress = Progress::new(&formula.name);

        // Re-check under the lock: another process may have finished first.
        // A dependency is satisfied by any installed version.
        if !options.force {
            let existing = if on_request {
                self.receipts
                    .exists(&formula.name, &formula.version)
                    .then(|| formula.version.clone())
            } else {
                self.receipts.installed_version(&formula.name)?
            };
            if let Some(version) = existing {
                return Err(Error::AlreadyInstalled {
                    name: formula.name.clone(),
                    version,
                });
            }
        }

        progress.advance(InstallState::Fetching)?;
        let artifact = self.artifact_for(formula, &strategy)?;
        let entry = match self.cache.fetch(&artifact).await {
            Ok(entry) => entry,
            Err(e) => return Err(progress.fail(e)),
        };

        progress.advance(InstallState::Verifying)?;
        if let Err(e) = self.verify(&entry).await {
            return Err(progress.fail(e));
        }

        let keg = self.config.keg_path(&formula.name, &formula.version);
        let previous = if keg.exists() {
            Some(self.set_aside(formula, &keg)?)
        } else {
            None
        };

        progress.advance(match strategy {
            BuildStrategy::Source => InstallState::Building,
            BuildStrategy::Bottle { .. } => InstallState::Extracting,
        })?;

        let build_log = match self.build(formula, dependencies, &strategy, &entry, &keg).await {
            Ok(log) => log,
            Err(e) => {
                if keg.exists()
                    && let Err(cleanup) = fs::remove_dir_all(&keg)
                {
                    warn!(keg = %keg.display(), error = %cleanup, "failed to remove partial keg");
                }
                if let Some(previous) = &previous {
                    match fs::rename(previous, &keg) {
                        Ok(()) => debug!(keg = %keg.display(), "restored previous keg"),
                        Err(restore) => warn!(
                            keg = %keg.display(),
                            previous = %previous.display(),
                            error = %restore,
                            "failed to restore previous keg"
                        ),
                    }
                } else if let Err(cleanup) =
                    crate::cellar::remove_empty_rack(self.config, &formula.name)
                {
                    warn!(formula = %formula.name, error = %cleanup, "failed to remove empty rack");
                }
                return Err(progress.fail(e));
            }
        };

        if let Some(previous) = previous {
            // Links into the old tree may name files the new build lacks
            Linker::new(self.config).unlink(&formula.name)?;
            if let Err(e) = fs::remove_dir_all(&previous) {
                warn!(path = %previous.display(), error = %e, "failed to remove previous keg");
            }
        }

        let receipt = self.write_receipt(formula, dependencies, &strategy, options, on_request)?;

        progress.advance(InstallState::Linking)?;
        let mut linked = false;
        let mut link_conflicts = Vec::new();
        if formula.keg_only {
            info!(formula = %formula.name, "keg-only; not linking");
        } else if !options.no_link {
            match Linker::new(self.config).link(&formula.name, &formula.version) {
                Ok(_) => linked = true,
                Err(Error::LinkConflict { conflicts, .. }) => {
                    warn!(
                        formula = %formula.name,
                        conflicts = conflicts.len(),
                        "installed but not linked; conflicting files in prefix"
                    );
                    link_conflicts = conflicts;
                }
                Err(e) => return Err(progress.fail(e)),
            }
        }

        progress.advance(InstallState::Installed)?;
        info!(formula = %formula.name, version = %formula.version, keg = %keg.display(), "installed");

        Ok(InstallOutcome {
            name: formula.name.clone(),
            version: formula.version.clone(),
            keg,
            receipt,
            strategy,
            linked,
            link_conflicts,
            build_log,
            history: progress.history,
        })
    }

    /// Re-hash the cache entry; a corrupt entry is evicted so the next
    /// attempt downloads again.
    async fn verify(&self, entry: &CacheEntry) -> Result<()> {
        let Some(expected) = &entry.artifact.sha256 else {
            warn!(formula = %entry.artifact.name, "no checksum recorded; skipping verification");
            return Ok(());
        };
        let actual = download::sha256_file(&entry.path).await?;
        if !expected.eq_ignore_ascii_case(&actual) {
            self.cache.evict(&entry.artifact)?;
            return Err(Error::ChecksumMismatch {
                url: entry.artifact.url.clone(),
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Move an existing keg out of the way of a reinstall; hidden entries in a
    /// rack are not kegs.
    fn set_aside(&self, formula: &Formula, keg: &Path) -> Result<PathBuf> {
        let aside = self
            .config
            .cellar
            .join(&formula.name)
            .join(format!(".previous-{}", formula.version));
        if aside.exists() {
            fs::remove_dir_all(&aside)
                .with_context(|| format!("Failed to remove {}", aside.display()))?;
        }
        debug!(keg = %keg.display(), "setting existing keg aside for reinstall");
        fs::rename(keg, &aside)
            .with_context(|| format!("Failed to move {} aside", keg.display()))?;
        Ok(aside)
    }

    async fn build(
        &self,
        formula: &Formula,
        dependencies: &[Edge],
        strategy: &BuildStrategy,
        entry: &CacheEntry,
        keg: &Path,
    ) -> Result<String> {
        let config = self.config.clone();
        let formula = formula.clone();
        let strategy = strategy.clone();
        let artifact = entry.path.clone();
        let keg = keg.to_path_buf();
        let dep_prefixes = self.dependency_prefixes(dependencies)?;

        tokio::task::spawn_blocking(move || match strategy {
            BuildStrategy::Source => {
                builder::build_from_source(&config, &formula, &artifact, &keg, &dep_prefixes)
            }
            BuildStrategy::Bottle { .. } => {
                builder::pour_bottle(&config, &formula, &artifact, &keg).map(|()| String::new())
            }
        })
        .await
        .context("Build task panicked")?
    }

    fn dependency_prefixes(&self, dependencies: &[Edge]) -> Result<Vec<PathBuf>> {
        let mut prefixes = Vec::new();
        for edge in dependencies {
            if let Some(version) = self.receipts.installed_version(&edge.to)? {
                prefixes.push(self.config.keg_path(&edge.to, &version));
            }
        }
        Ok(prefixes)
    }

    fn write_receipt(
        &self,
        formula: &Formula,
        dependencies: &[Edge],
        strategy: &BuildStrategy,
        options: &InstallOptions,
        on_request: bool,
    ) -> Result<InstallReceipt> {
        let mut installed = Vec::new();
        for edge in dependencies {
            match self.receipts.installed_version(&edge.to)? {
                Some(version) => installed.push((
                    edge.kind,
                    ReceiptDependency {
                        full_name: edge.to.clone(),
                        version,
                    },
                )),
                None => warn!(
                    formula = %formula.name,
                    dependency = %edge.to,
                    "dependency not installed; left out of receipt"
                ),
            }
        }

        let receipt = InstallReceipt::new(
            formula,
            installed,
            options.options.clone(),
            strategy.is_bottle(),
            options.build_bottle,
            on_request,
        );
        self.receipts.write(&receipt)?;
        Ok(receipt)
    }
}
