//! Cellar management - reading installed kegs

use crate::config::Config;
use crate::error::Result;
use crate::receipt::{InstallReceipt, RECEIPT_FILE};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// An installed version directory in the Cellar
#[derive(Debug, Clone)]
pub struct Keg {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub receipt: Option<InstallReceipt>,
}

impl Keg {
    /// Create from a Cellar version directory
    pub fn from_path(name: String, version: String, path: PathBuf) -> Self {
        let receipt = if path.join(RECEIPT_FILE).is_file() {
            InstallReceipt::read(&path).ok()
        } else {
            None
        };
        Self {
            name,
            version,
            path,
            receipt,
        }
    }

    /// Number of regular files in the keg (receipt included)
    pub fn file_count(&self) -> usize {
        walkdir::WalkDir::new(&self.path)
            .follow_links(false)
            .max_open(64)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .count()
    }

    /// Total size in bytes of the keg's files
    pub fn disk_usage(&self) -> u64 {
        dir_size(&self.path)
    }
}

/// Read every keg in the Cellar, sorted by name then version
pub fn list_installed(config: &Config) -> Result<Vec<Keg>> {
    let cellar = &config.cellar;

    if !cellar.exists() {
        return Ok(vec![]);
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(cellar)
        .with_context(|| format!("Failed to read Cellar: {}", cellar.display()))?
    {
        let entry = entry?;
        let formula_name = entry.file_name().to_string_lossy().to_string();

        // Skip hidden files and staging directories
        if formula_name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        names.push(formula_name);
    }
    names.sort();

    let mut kegs = Vec::new();
    for name in names {
        let mut versions = installed_versions(config, &name)?;
        versions.reverse();
        kegs.extend(versions);
    }

    Ok(kegs)
}

/// Get all versions of a specific formula, sorted by version (newest first)
pub fn installed_versions(config: &Config, formula: &str) -> Result<Vec<Keg>> {
    let formula_path = config.cellar.join(formula);

    if !formula_path.is_dir() {
        return Ok(vec![]);
    }

    let mut kegs = Vec::new();

    for entry in fs::read_dir(&formula_path)? {
        let entry = entry?;
        let version = entry.file_name().to_string_lossy().to_string();

        if version.starts_with('.') || !entry.path().is_dir() {
            continue;
        }

        kegs.push(Keg::from_path(formula.to_string(), version, entry.path()));
    }

    // [0] is always the newest version
    kegs.sort_by(|a, b| compare_versions(&b.version, &a.version));

    Ok(kegs)
}

/// Remove `<cellar>/<name>` once it holds no versions
pub fn remove_empty_rack(config: &Config, name: &str) -> Result<()> {
    let rack = config.cellar.join(name);
    let Ok(metadata) = fs::symlink_metadata(&rack) else {
        return Ok(());
    };
    if metadata.is_symlink() {
        fs::remove_file(&rack)?;
    } else if metadata.is_dir() && fs::read_dir(&rack)?.next().is_none() {
        fs::remove_dir(&rack)?;
    }
    Ok(())
}

/// Compare two version strings semantically
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split(['.', '_', '-'])
            .map(|s| {
                s.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse::<u64>()
                    .unwrap_or(0)
            })
            .collect()
    };
    let a_parts = parse(a);
    let b_parts = parse(b);

    // Compare version parts numerically
    for i in 0..a_parts.len().max(b_parts.len()) {
        let a_part = a_parts.get(i).unwrap_or(&0);
        let b_part = b_parts.get(i).unwrap_or(&0);
        match a_part.cmp(b_part) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }

    // Fall back to lexicographic
    a.cmp(b)
}

pub fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .follow_links(false)
        .max_open(64)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
