//! Symlink forest between installed kegs and the shared prefix.
//!
//! Linking mirrors every file under a keg's linkable directories into the
//! prefix:
//!
//! ```text
//! <prefix>/bin/jq  ->  ../Cellar/jq/1.7.1/bin/jq
//! <prefix>/opt/jq  ->  ../Cellar/jq/1.7.1
//! <prefix>/var/kettle/linked/jq  ->  <cellar>/jq/1.7.1
//! ```
//!
//! The last link is the link state: it records which version of a formula
//! currently owns its prefix links. Links are relative when the Cellar sits
//! inside the prefix and absolute otherwise.
//!
//! A link pass is planned in full before anything is touched, so a conflict
//! leaves the prefix exactly as it was.

use crate::cellar;
use crate::config::Config;
use crate::error::{Error, Result};
use anyhow::Context;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Keg directories mirrored into the prefix
pub const LINKABLE_DIRS: &[&str] = &[
    "bin",
    "sbin",
    "lib",
    "include",
    "share",
    "etc",
    "Frameworks",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Mkdir(PathBuf),
    Link {
        source: PathBuf,
        target: PathBuf,
        replace: bool,
    },
}

/// What a successful link pass created
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    pub links: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    /// Links that already pointed at this keg
    pub unchanged: usize,
}

pub struct Linker<'a> {
    config: &'a Config,
}

impl<'a> Linker<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.config.linked_dir().join(name)
    }

    fn opt_path(&self, name: &str) -> PathBuf {
        self.config.opt_dir().join(name)
    }

    /// Version whose links currently own the prefix, if any
    pub fn linked_version(&self, name: &str) -> Option<String> {
        let target = fs::read_link(self.record_path(name)).ok()?;
        target
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
    }

    pub fn is_linked(&self, name: &str) -> bool {
        self.linked_version(name).is_some()
    }

    /// Link `<cellar>/<name>/<version>` into the prefix. Existing links owned
    /// by another version of the same formula are taken over; anything else in
    /// the way is reported as a [`Error::LinkConflict`] before any change.
    pub fn link(&self, name: &str, version: &str) -> Result<LinkReport> {
        let keg = self.config.keg_path(name, version);
        if !keg.is_dir() {
            return Err(anyhow::anyhow!("{} {} is not installed", name, version).into());
        }

        let rack = self.config.cellar.join(name);
        let (actions, unchanged, conflicts) = self.plan(&keg, &rack)?;

        if !conflicts.is_empty() {
            return Err(Error::LinkConflict {
                formula: name.to_string(),
                conflicts,
            });
        }

        if let Some(current) = self.linked_version(name)
            && current != version
        {
            debug!(formula = %name, from = %current, to = %version, "switching linked version");
            self.unlink_keg(&self.config.keg_path(name, &current))?;
        }

        let mut report = LinkReport {
            unchanged,
            ..Default::default()
        };
        for action in actions {
            match action {
                Action::Mkdir(dir) => {
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
                    report.directories.push(dir);
                }
                Action::Link {
                    source,
                    target,
                    replace,
                } => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    if replace {
                        remove_if_present(&target)?;
                    }
                    let link = self.link_target(&source, &target);
                    unix_fs::symlink(&link, &target).with_context(|| {
                        format!(
                            "Failed to create symlink: {} -> {}",
                            target.display(),
                            link.display()
                        )
                    })?;
                    report.links.push(target);
                }
            }
        }

        self.write_records(name, &keg)?;
        debug!(formula = %name, version = %version, links = report.links.len(), "linked");
        Ok(report)
    }

    fn plan(&self, keg: &Path, rack: &Path) -> Result<(Vec<Action>, usize, Vec<PathBuf>)> {
        let mut actions = Vec::new();
        let mut conflicts = Vec::new();
        let mut unchanged = 0;
        let rack = normalize_path(rack);

        for dir_name in LINKABLE_DIRS {
            let source_dir = keg.join(dir_name);
            if !source_dir.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&source_dir)
                .follow_links(false)
                .sort_by_file_name()
            {
                let entry = entry.with_context(|| {
                    format!("Failed to walk {}", source_dir.display())
                })?;
                let source = entry.path();
                let Ok(relative) = source.strip_prefix(keg) else {
                    continue;
                };
                let target = self.config.prefix.join(relative);

                if entry.file_type().is_dir() {
                    match fs::symlink_metadata(&target) {
                        Err(_) => actions.push(Action::Mkdir(target)),
                        Ok(_) if target.is_dir() => {}
                        Ok(_) => conflicts.push(target),
                    }
                    continue;
                }

                match fs::symlink_metadata(&target) {
                    Err(_) => actions.push(Action::Link {
                        source: source.to_path_buf(),
                        target,
                        replace: false,
                    }),
                    Ok(meta) if meta.is_symlink() => {
                        let resolved = resolve_link(&target)?;
                        if resolved == normalize_path(source) {
                            unchanged += 1;
                        } else if resolved.starts_with(&rack) {
                            actions.push(Action::Link {
                                source: source.to_path_buf(),
                                target,
                                replace: true,
                            });
                        } else {
                            conflicts.push(target);
                        }
                    }
                    Ok(_) => conflicts.push(target),
                }
            }
        }

        Ok((actions, unchanged, conflicts))
    }

    /// What a symlink at `target` should contain to reach `source`
    fn link_target(&self, source: &Path, target: &Path) -> PathBuf {
        let prefix = normalize_path(&self.config.prefix);
        let cellar = normalize_path(&self.config.cellar);
        if cellar.starts_with(&prefix)
            && let Some(parent) = target.parent()
        {
            relative_path(&normalize_path(parent), &normalize_path(source))
        } else {
            source.to_path_buf()
        }
    }

    fn write_records(&self, name: &str, keg: &Path) -> Result<()> {
        for (record, target) in [
            (self.record_path(name), keg.to_path_buf()),
            (self.opt_path(name), self.link_target(keg, &self.opt_path(name))),
        ] {
            if let Some(parent) = record.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            remove_if_present(&record)?;
            unix_fs::symlink(&target, &record)
                .with_context(|| format!("Failed to record link state: {}", record.display()))?;
        }
        Ok(())
    }

    /// Remove every prefix link belonging to any installed version of `name`
    /// and clear its link state. Links that resolve elsewhere are left alone.
    pub fn unlink(&self, name: &str) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for keg in cellar::installed_versions(self.config, name)? {
            removed.extend(self.unlink_keg(&keg.path)?);
        }

        let rack = normalize_path(&self.config.cellar.join(name));
        for record in [self.record_path(name), self.opt_path(name)] {
            if fs::symlink_metadata(&record).is_ok() && resolve_link(&record)?.starts_with(&rack) {
                fs::remove_file(&record)?;
            }
        }

        debug!(formula = %name, links = removed.len(), "unlinked");
        Ok(removed)
    }

    fn unlink_keg(&self, keg: &Path) -> Result<Vec<PathBuf>> {
        let keg_root = normalize_path(keg);
        let mut removed = Vec::new();
        let mut directories = Vec::new();

        for dir_name in LINKABLE_DIRS {
            let source_dir = keg.join(dir_name);
            if !source_dir.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&source_dir)
                .follow_links(false)
                .contents_first(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let Ok(relative) = entry.path().strip_prefix(keg) else {
                    continue;
                };
                let target = self.config.prefix.join(relative);

                if entry.file_type().is_dir() {
                    if entry.path() != source_dir {
                        directories.push(target);
                    }
                    continue;
                }

                let Ok(meta) = fs::symlink_metadata(&target) else {
                    continue;
                };
                if !meta.is_symlink() {
                    continue;
                }
                if resolve_link(&target)?.starts_with(&keg_root) {
                    fs::remove_file(&target)
                        .with_context(|| format!("Failed to remove {}", target.display()))?;
                    removed.push(target);
                } else {
                    warn!(path = %target.display(), "leaving link owned by another keg");
                }
            }
        }

        // contents_first yields children before parents
        for dir in directories {
            if fs::read_dir(&dir).is_ok_and(|mut d| d.next().is_none()) {
                let _ = fs::remove_dir(&dir);
            }
        }

        Ok(removed)
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Lexical destination of a symlink (the target is not required to exist)
fn resolve_link(link: &Path) -> Result<PathBuf> {
    let target = fs::read_link(link)
        .with_context(|| format!("Failed to read link {}", link.display()))?;
    let resolved = if target.is_relative() {
        link.parent().unwrap_or(Path::new("/")).join(target)
    } else {
        target
    };
    Ok(normalize_path(&resolved))
}

/// Resolve `.` and `..` components without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else if !matches!(
                    components.last(),
                    Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Path that leads from directory `from` to `to`; both must be absolute
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for component in &to[common..] {
        result.push(component);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keg(config: &Config, name: &str, version: &str, files: &[&str]) -> PathBuf {
        let keg = config.keg_path(name, version);
        for file in files {
            let path = keg.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file).unwrap();
        }
        keg
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/opt/homebrew/bin/../Cellar/./jq")),
            PathBuf::from("/opt/homebrew/Cellar/jq")
        );
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_path(Path::new("../a/b/..")), PathBuf::from("../a"));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(
                Path::new("/opt/homebrew/bin"),
                Path::new("/opt/homebrew/Cellar/jq/1.7/bin/jq")
            ),
            PathBuf::from("../Cellar/jq/1.7/bin/jq")
        );
    }

    #[test]
    fn test_link_creates_relative_links_and_records() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        keg(&config, "foo", "1.0", &["bin/foo", "share/foo/doc.txt", "README"]);

        let report = Linker::new(&config).link("foo", "1.0").unwrap();
        assert_eq!(report.links.len(), 2);

        let bin = config.prefix.join("bin/foo");
        assert_eq!(
            fs::read_link(&bin).unwrap(),
            PathBuf::from("../Cellar/foo/1.0/bin/foo")
        );
        assert_eq!(fs::read_to_string(&bin).unwrap(), "bin/foo");
        assert!(!config.prefix.join("README").exists());
        assert!(config.prefix.join("opt/foo").exists());
        assert_eq!(Linker::new(&config).linked_version("foo").as_deref(), Some("1.0"));
    }

    #[test]
    fn test_link_absolute_when_cellar_outside_prefix() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::new(tmp.path().join("prefix"));
        config.cellar = tmp.path().join("cellar");
        let keg = keg(&config, "foo", "1.0", &["bin/foo"]);

        Linker::new(&config).link("foo", "1.0").unwrap();
        assert_eq!(
            fs::read_link(config.prefix.join("bin/foo")).unwrap(),
            keg.join("bin/foo")
        );
    }

    #[test]
    fn test_conflict_reports_all_paths_and_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        keg(&config, "foo", "1.0", &["bin/a", "bin/b", "bin/c"]);
        fs::create_dir_all(config.prefix.join("bin")).unwrap();
        fs::write(config.prefix.join("bin/a"), "mine").unwrap();
        unix_fs::symlink("/somewhere/else", config.prefix.join("bin/c")).unwrap();

        let err = Linker::new(&config).link("foo", "1.0").unwrap_err();
        match err {
            Error::LinkConflict { conflicts, .. } => assert_eq!(
                conflicts,
                vec![config.prefix.join("bin/a"), config.prefix.join("bin/c")]
            ),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!config.prefix.join("bin/b").exists());
        assert!(!Linker::new(&config).is_linked("foo"));
    }

    #[test]
    fn test_relink_switches_versions() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        keg(&config, "foo", "1.0", &["bin/foo", "bin/old-only"]);
        keg(&config, "foo", "2.0", &["bin/foo"]);
        let linker = Linker::new(&config);

        linker.link("foo", "1.0").unwrap();
        linker.link("foo", "2.0").unwrap();

        assert_eq!(
            fs::read_link(config.prefix.join("bin/foo")).unwrap(),
            PathBuf::from("../Cellar/foo/2.0/bin/foo")
        );
        assert!(fs::symlink_metadata(config.prefix.join("bin/old-only")).is_err());
        assert_eq!(linker.linked_version("foo").as_deref(), Some("2.0"));
    }

    #[test]
    fn test_unlink_removes_only_owned_links() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        keg(&config, "foo", "1.0", &["bin/foo", "share/foo/doc.txt"]);
        keg(&config, "bar", "1.0", &["bin/bar"]);
        let linker = Linker::new(&config);
        linker.link("foo", "1.0").unwrap();
        linker.link("bar", "1.0").unwrap();

        let removed = linker.unlink("foo").unwrap();
        assert_eq!(removed.len(), 2);
        assert!(fs::symlink_metadata(config.prefix.join("bin/foo")).is_err());
        assert!(!config.prefix.join("share/foo").exists());
        assert!(config.prefix.join("share").exists());
        assert!(fs::symlink_metadata(config.prefix.join("bin/bar")).is_ok());
        assert!(!linker.is_linked("foo"));
        assert!(fs::symlink_metadata(config.prefix.join("opt/foo")).is_err());
    }

    #[test]
    fn test_unlink_leaves_repointed_link() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        keg(&config, "foo", "1.0", &["bin/foo"]);
        let linker = Linker::new(&config);
        linker.link("foo", "1.0").unwrap();

        let target = config.prefix.join("bin/foo");
        fs::remove_file(&target).unwrap();
        unix_fs::symlink("/usr/bin/true", &target).unwrap();

        assert!(linker.unlink("foo").unwrap().is_empty());
        assert_eq!(fs::read_link(&target).unwrap(), PathBuf::from("/usr/bin/true"));
    }
}
