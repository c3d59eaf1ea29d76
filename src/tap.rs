//! Taps - namespaces of formula definitions.
//!
//! A tap named `user/repo` lives at `<repository>/Library/Taps/user/homebrew-repo`
//! and contributes `Formula/<name>.json` definitions plus `Aliases/<alias>`
//! redirections. Pinning a tap creates a marker under `Library/PinnedTaps`,
//! which gives the tap's formulae precedence over `homebrew/core` during
//! name resolution.

use crate::config::Config;
use crate::error::{Error, Result};
use anyhow::{Context, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// The canonical default tap
pub const CORE_TAP: &str = "homebrew/core";

/// Taps maintained upstream, printed by `tap --list-official`
pub const OFFICIAL_TAPS: &[&str] = &[
    "apache",
    "binary",
    "completions",
    "devel-only",
    "dupes",
    "emacs",
    "fuse",
    "games",
    "gui",
    "head-only",
    "nginx",
    "php",
    "python",
    "science",
    "tex",
    "versions",
    "x11",
];

/// An installed tap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tap {
    pub user: String,
    pub repo: String,
    pub path: PathBuf,
    pub pinned: bool,
}

impl Tap {
    /// `user/repo`
    pub fn name(&self) -> String {
        format!("{}/{}", self.user, self.repo)
    }

    pub fn is_core(&self) -> bool {
        self.name() == CORE_TAP
    }

    pub fn is_official(&self) -> bool {
        self.user == "homebrew"
    }

    pub fn formula_dir(&self) -> PathBuf {
        self.path.join("Formula")
    }

    pub fn alias_dir(&self) -> PathBuf {
        self.path.join("Aliases")
    }

    pub fn formula_file(&self, name: &str) -> PathBuf {
        self.formula_dir().join(format!("{}.json", name))
    }

    /// Names of every formula file in this tap, sorted
    pub fn formula_names(&self) -> Result<Vec<String>> {
        list_stems(&self.formula_dir(), Some("json"))
    }

    /// Alias names defined by this tap, sorted
    pub fn alias_names(&self) -> Result<Vec<String>> {
        list_stems(&self.alias_dir(), None)
    }

    /// Resolve an alias in this tap to a canonical formula name
    pub fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        let path = self.alias_dir().join(alias);
        if path.symlink_metadata().is_err() {
            return Ok(None);
        }

        // Symlinked aliases point at the formula file itself
        if let Ok(target) = fs::read_link(&path) {
            let stem = target
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_lowercase);
            return Ok(stem);
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read alias: {}", path.display()))?;
        let target = contents.trim().to_lowercase();
        if target.is_empty() {
            return Err(Error::InvalidTap(format!(
                "{}: alias {} is empty",
                self.name(),
                alias
            )));
        }
        Ok(Some(target))
    }

    /// Remote URL of the tap's git checkout, if it has one
    pub fn remote(&self) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(["config", "--get", "remote.origin.url"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!url.is_empty()).then_some(url)
    }
}

fn list_stems(dir: &Path, extension: Option<&str>) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') {
            continue;
        }
        match extension {
            Some(ext) => {
                if path.extension().and_then(|e| e.to_str()) == Some(ext)
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    names.push(stem.to_lowercase());
                }
            }
            None => names.push(file_name.to_lowercase()),
        }
    }
    names.sort();
    Ok(names)
}

/// Parse a tap name into (user, repo) components
/// Input: "user/repo" or "user/homebrew-repo" → Output: ("user", "repo")
pub fn parse_tap_name(tap: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = tap.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::InvalidTap(format!(
            "{} (expected 'user/repo')",
            tap
        )));
    }

    let user = parts[0].to_lowercase();
    let repo = parts[1].to_lowercase();
    let repo = repo
        .strip_prefix("homebrew-")
        .map(str::to_string)
        .unwrap_or(repo);

    // Legacy name of the core tap
    if user == "homebrew" && repo == "homebrew" {
        return Ok((user, "core".to_string()));
    }

    Ok((user, repo))
}

/// Get the directory path for a tap
pub fn tap_directory(config: &Config, tap: &str) -> Result<PathBuf> {
    let (user, repo) = parse_tap_name(tap)?;
    Ok(config
        .taps_dir()
        .join(user)
        .join(format!("homebrew-{}", repo)))
}

fn pin_marker(config: &Config, user: &str, repo: &str) -> PathBuf {
    config.pinned_taps_dir().join(user).join(repo)
}

/// List all installed taps, sorted by name
pub fn list_taps(config: &Config) -> Result<Vec<Tap>> {
    let taps_dir = config.taps_dir();

    if !taps_dir.exists() {
        return Ok(vec![]);
    }

    let mut taps = Vec::new();

    for user_entry in fs::read_dir(&taps_dir)? {
        let user_entry = user_entry?;
        let user = user_entry.file_name().to_string_lossy().to_string();

        if user.starts_with('.') || !user_entry.path().is_dir() {
            continue;
        }

        for repo_entry in fs::read_dir(user_entry.path())? {
            let repo_entry = repo_entry?;
            let dir_name = repo_entry.file_name().to_string_lossy().to_string();

            if dir_name.starts_with('.') || !repo_entry.path().is_dir() {
                continue;
            }

            let repo = dir_name
                .strip_prefix("homebrew-")
                .unwrap_or(&dir_name)
                .to_string();
            let pinned = pin_marker(config, &user, &repo).symlink_metadata().is_ok();
            taps.push(Tap {
                user: user.clone(),
                repo,
                path: repo_entry.path(),
                pinned,
            });
        }
    }

    taps.sort_by_key(|t| t.name());
    Ok(taps)
}

/// Find an installed tap by name
pub fn find_tap(config: &Config, tap_name: &str) -> Result<Option<Tap>> {
    let (user, repo) = parse_tap_name(tap_name)?;
    Ok(list_taps(config)?
        .into_iter()
        .find(|t| t.user == user && t.repo == repo))
}

fn require_tap(config: &Config, tap_name: &str) -> Result<Tap> {
    find_tap(config, tap_name)?
        .ok_or_else(|| Error::InvalidTap(format!("{} is not tapped", tap_name)))
}

/// Add a tap by cloning its git repository. Without `url`, the GitHub
/// repository `user/homebrew-repo` is used. Returns the new tap.
pub fn tap(config: &Config, tap_name: &str, url: Option<&str>) -> Result<Tap> {
    let (user, repo) = parse_tap_name(tap_name)?;
    let tap_dir = tap_directory(config, tap_name)?;

    if tap_dir.exists() {
        return Err(Error::InvalidTap(format!(
            "{}/{} already tapped",
            user, repo
        )));
    }

    let user_dir = config.taps_dir().join(&user);
    fs::create_dir_all(&user_dir)
        .with_context(|| format!("Failed to create directory: {}", user_dir.display()))?;

    let git_url = url
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://github.com/{}/homebrew-{}", user, repo));
    debug!(tap = %tap_name, url = %git_url, "cloning tap");

    let output = Command::new("git")
        .args(["clone", "--quiet", "--depth", "1"])
        .arg(&git_url)
        .arg(&tap_dir)
        .output()
        .context("Failed to execute git clone")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Failed to clone tap {}: {}", tap_name, stderr.trim()).into());
    }

    require_tap(config, tap_name)
}

/// Remove a tap (delete its checkout and any pin)
pub fn untap(config: &Config, tap_name: &str) -> Result<Tap> {
    let tap = require_tap(config, tap_name)?;

    if tap.pinned {
        unpin(config, tap_name)?;
    }

    fs::remove_dir_all(&tap.path)
        .with_context(|| format!("Failed to remove tap directory: {}", tap.path.display()))?;

    // Remove user directory if empty
    if let Some(user_dir) = tap.path.parent()
        && user_dir.exists()
        && fs::read_dir(user_dir)?.next().is_none()
    {
        fs::remove_dir(user_dir)?;
    }

    Ok(tap)
}

/// Pin a tap so its formulae win over core for unqualified names
pub fn pin(config: &Config, tap_name: &str) -> Result<()> {
    let tap = require_tap(config, tap_name)?;
    if tap.is_core() {
        return Err(Error::InvalidTap(format!("{} cannot be pinned", CORE_TAP)));
    }
    if tap.pinned {
        return Err(Error::InvalidTap(format!("{} is already pinned", tap.name())));
    }

    let marker = pin_marker(config, &tap.user, &tap.repo);
    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(&tap.path, &marker)
        .with_context(|| format!("Failed to pin {}", tap.name()))?;
    Ok(())
}

pub fn unpin(config: &Config, tap_name: &str) -> Result<()> {
    let tap = require_tap(config, tap_name)?;
    if !tap.pinned {
        return Err(Error::InvalidTap(format!("{} is not pinned", tap.name())));
    }

    let marker = pin_marker(config, &tap.user, &tap.repo);
    fs::remove_file(&marker).with_context(|| format!("Failed to unpin {}", tap.name()))?;

    if let Some(user_dir) = marker.parent()
        && fs::read_dir(user_dir)?.next().is_none()
    {
        fs::remove_dir(user_dir)?;
    }
    Ok(())
}
