//! Install receipts - the persisted record of a completed install.
//!
//! Each installed keg carries an `INSTALL_RECEIPT.json`:
//! ```text
//! <cellar>/bar/1.0/
//!   INSTALL_RECEIPT.json     # what was installed, how, and against which deps
//!   bin/
//! ```
//!
//! Receipts are written last during install, so a keg without one is an
//! incomplete install. Uninstall, upgrade and the missing-dependency audit all
//! read them back through [`ReceiptStore`].

use crate::config::Config;
use crate::error::Result;
use crate::formula::{DependencyKind, Formula};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

/// Dependency as it was installed when the receipt was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDependency {
    pub full_name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap: Option<String>,
    pub path: String,
    pub spec: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub installed_with: String,
    #[serde(default)]
    pub used_options: Vec<String>,
    #[serde(default)]
    pub built_as_bottle: bool,
    #[serde(default)]
    pub poured_from_bottle: bool,
    #[serde(default)]
    pub installed_as_dependency: bool,
    #[serde(default)]
    pub installed_on_request: bool,
    pub time: i64,
    #[serde(default)]
    pub runtime_dependencies: Vec<ReceiptDependency>,
    #[serde(default)]
    pub build_dependencies: Vec<ReceiptDependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl InstallReceipt {
    /// Build a receipt for a freshly installed formula. `dependencies` pairs
    /// each dependency the install actually used (canonical name, installed
    /// version) with how it was declared.
    pub fn new(
        formula: &Formula,
        dependencies: impl IntoIterator<Item = (DependencyKind, ReceiptDependency)>,
        used_options: Vec<String>,
        poured_from_bottle: bool,
        built_as_bottle: bool,
        installed_on_request: bool,
    ) -> Self {
        let mut runtime_dependencies = Vec::new();
        let mut build_dependencies = Vec::new();

        for (kind, record) in dependencies {
            match kind {
                DependencyKind::Build => build_dependencies.push(record),
                DependencyKind::Runtime | DependencyKind::Optional => {
                    runtime_dependencies.push(record)
                }
            }
        }

        Self {
            name: formula.name.clone(),
            version: formula.version.clone(),
            installed_with: format!("kettle/{}", env!("CARGO_PKG_VERSION")),
            used_options,
            built_as_bottle,
            poured_from_bottle,
            installed_as_dependency: !installed_on_request,
            installed_on_request,
            time: chrono::Utc::now().timestamp(),
            runtime_dependencies,
            build_dependencies,
            source: Some(SourceInfo {
                tap: formula.tap.clone(),
                path: formula.path.display().to_string(),
                spec: "stable".to_string(),
            }),
            arch: Some(std::env::consts::ARCH.to_string()),
        }
    }

    /// Read `INSTALL_RECEIPT.json` from a keg
    pub fn read(keg: &Path) -> Result<Self> {
        let receipt_path = keg.join(RECEIPT_FILE);
        let contents = fs::read_to_string(&receipt_path)
            .with_context(|| format!("Failed to read receipt: {}", receipt_path.display()))?;
        let receipt = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse receipt: {}", receipt_path.display()))?;
        Ok(receipt)
    }

    /// Write receipt to `INSTALL_RECEIPT.json`, replacing it atomically
    pub fn write(&self, keg: &Path) -> Result<()> {
        let receipt_path = keg.join(RECEIPT_FILE);
        let partial = keg.join(format!(".{}.partial", RECEIPT_FILE));
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize install receipt")?;

        fs::write(&partial, json)
            .with_context(|| format!("Failed to write receipt: {}", partial.display()))?;
        fs::rename(&partial, &receipt_path)
            .with_context(|| format!("Failed to write receipt: {}", receipt_path.display()))?;

        Ok(())
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.runtime_dependencies.iter().any(|d| d.full_name == name)
    }
}

/// Receipt-backed view of what is installed
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    cellar: PathBuf,
}

impl ReceiptStore {
    pub fn new(config: &Config) -> Self {
        Self {
            cellar: config.cellar.clone(),
        }
    }

    fn keg(&self, name: &str, version: &str) -> PathBuf {
        self.cellar.join(name).join(version)
    }

    pub fn exists(&self, name: &str, version: &str) -> bool {
        self.keg(name, version).join(RECEIPT_FILE).is_file()
    }

    pub fn read(&self, name: &str, version: &str) -> Result<InstallReceipt> {
        InstallReceipt::read(&self.keg(name, version))
    }

    pub fn write(&self, receipt: &InstallReceipt) -> Result<()> {
        receipt.write(&self.keg(&receipt.name, &receipt.version))
    }

    /// Remove the receipt of one version (the keg itself is left alone)
    pub fn delete(&self, name: &str, version: &str) -> Result<()> {
        let path = self.keg(name, version).join(RECEIPT_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Receipts of every installed version of `name`
    pub fn for_formula(&self, name: &str) -> Result<Vec<InstallReceipt>> {
        let dir = self.cellar.join(name);
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let mut receipts = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let keg = entry.path();
            if keg.join(RECEIPT_FILE).is_file() {
                receipts.push(InstallReceipt::read(&keg)?);
            }
        }
        receipts.sort_by(|a, b| crate::cellar::compare_versions(&b.version, &a.version));
        Ok(receipts)
    }

    /// Installed version of `name`, newest first when several exist
    pub fn installed_version(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .for_formula(name)?
            .into_iter()
            .next()
            .map(|r| r.version))
    }

    pub fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.installed_version(name)?.is_some())
    }

    /// Every receipt in the Cellar, sorted by (name, version)
    pub fn all(&self) -> Result<Vec<InstallReceipt>> {
        if !self.cellar.is_dir() {
            return Ok(vec![]);
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.cellar)
            .with_context(|| format!("Failed to read Cellar: {}", self.cellar.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') && entry.path().is_dir() {
                names.push(name);
            }
        }
        names.sort();

        let mut receipts = Vec::new();
        for name in names {
            let mut versions = self.for_formula(&name)?;
            versions.reverse();
            receipts.extend(versions);
        }
        Ok(receipts)
    }
}
