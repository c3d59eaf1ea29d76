//! Installation layout configuration.
//!
//! A [`Config`] is built once at program entry and passed by reference into
//! every engine call. Nothing below this module reads the process environment.
//!
//! ```text
//! <prefix>/
//!   bin/ lib/ share/ ...        # symlink forest
//!   opt/<name>                  # version-agnostic link to the linked keg
//!   var/kettle/linked/<name>    # which keg is currently linked
//!   var/kettle/locks/           # advisory lock files
//! <cellar>/<name>/<version>/    # installed kegs + INSTALL_RECEIPT.json
//! <cache>/                      # downloaded artifacts
//! <repository>/Library/Taps/    # formula repositories
//! ```

use std::path::{Path, PathBuf};

/// Resolved filesystem layout for one engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub prefix: PathBuf,
    pub cellar: PathBuf,
    pub cache: PathBuf,
    pub repository: PathBuf,
}

impl Config {
    /// Derive every location from a single root (cellar, cache and repository
    /// all live under `prefix`).
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            cellar: prefix.join("Cellar"),
            cache: prefix.join("Caches"),
            repository: prefix.clone(),
            prefix,
        }
    }

    /// Read `KETTLE_PREFIX`, `KETTLE_CELLAR`, `KETTLE_CACHE` and
    /// `KETTLE_REPOSITORY`, falling back to platform defaults.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty());

        let prefix = var("KETTLE_PREFIX")
            .map(PathBuf::from)
            .unwrap_or_else(default_prefix);
        let cellar = var("KETTLE_CELLAR")
            .map(PathBuf::from)
            .unwrap_or_else(|| prefix.join("Cellar"));
        let cache = var("KETTLE_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache);
        let repository = var("KETTLE_REPOSITORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| prefix.clone());

        Self {
            prefix,
            cellar,
            cache,
            repository,
        }
    }

    pub fn taps_dir(&self) -> PathBuf {
        self.repository.join("Library/Taps")
    }

    pub fn pinned_taps_dir(&self) -> PathBuf {
        self.repository.join("Library/PinnedTaps")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.prefix.join("var/kettle/locks")
    }

    pub fn linked_dir(&self) -> PathBuf {
        self.prefix.join("var/kettle/linked")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.prefix.join("opt")
    }

    /// Cellar slot for one installed version
    pub fn keg_path(&self, name: &str, version: &str) -> PathBuf {
        self.cellar.join(name).join(version)
    }

    /// Environment handed to source builds. `dep_prefixes` are the kegs of the
    /// formula's dependencies; they are searched before the shared prefix.
    pub fn build_env(&self, dep_prefixes: &[PathBuf]) -> Vec<(String, String)> {
        let mut search: Vec<&Path> = dep_prefixes.iter().map(PathBuf::as_path).collect();
        search.push(&self.prefix);

        let join = |paths: Vec<PathBuf>| {
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(":")
        };

        let system_path = "/usr/bin:/bin:/usr/sbin:/sbin";

        vec![
            (
                "CMAKE_PREFIX_PATH".to_string(),
                join(search.iter().map(|p| p.to_path_buf()).collect()),
            ),
            (
                "PKG_CONFIG_PATH".to_string(),
                join(search.iter().map(|p| p.join("lib/pkgconfig")).collect()),
            ),
            (
                "PATH".to_string(),
                format!(
                    "{}:{}",
                    join(search.iter().map(|p| p.join("bin")).collect()),
                    system_path
                ),
            ),
            (
                "KETTLE_PREFIX".to_string(),
                self.prefix.display().to_string(),
            ),
            (
                "KETTLE_CELLAR".to_string(),
                self.cellar.display().to_string(),
            ),
        ]
    }
}

/// Detect the default prefix by architecture
fn default_prefix() -> PathBuf {
    #[cfg(target_arch = "aarch64")]
    {
        PathBuf::from("/opt/homebrew")
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        PathBuf::from("/usr/local")
    }
}

fn default_cache() -> PathBuf {
    if let Some(cache_home) = std::env::var_os("XDG_CACHE_HOME") {
        PathBuf::from(cache_home).join("kettle")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".cache/kettle")
    } else {
        PathBuf::from(".cache/kettle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_layout() {
        let config = Config::new("/tmp/k");
        assert_eq!(config.cellar, PathBuf::from("/tmp/k/Cellar"));
        assert_eq!(config.cache, PathBuf::from("/tmp/k/Caches"));
        assert_eq!(config.repository, PathBuf::from("/tmp/k"));
        assert_eq!(config.taps_dir(), PathBuf::from("/tmp/k/Library/Taps"));
        assert_eq!(
            config.keg_path("testball", "0.1"),
            PathBuf::from("/tmp/k/Cellar/testball/0.1")
        );
    }

    #[test]
    fn test_build_env_prefers_dependency_kegs() {
        let config = Config::new("/tmp/k");
        let env = config.build_env(&[PathBuf::from("/tmp/k/Cellar/foo/1.0")]);
        let cmake = env
            .iter()
            .find(|(k, _)| k == "CMAKE_PREFIX_PATH")
            .map(|(_, v)| v.as_str());
        assert_eq!(cmake, Some("/tmp/k/Cellar/foo/1.0:/tmp/k"));
    }

    #[test]
    fn test_build_env_without_deps_starts_with_prefix() {
        let config = Config::new("/tmp/k");
        let env = config.build_env(&[]);
        let path = env.iter().find(|(k, _)| k == "PATH").map(|(_, v)| v.clone());
        assert!(path.unwrap().starts_with("/tmp/k/bin:"));
    }
}
