//! System diagnostics.
//!
//! Each check inspects one thing and returns a message describing the problem,
//! or `None` when all is well.

use crate::config::Config;
use crate::error::Result;
use std::fs;
use std::path::Path;

/// Inputs the checks look at
#[derive(Debug, Clone)]
pub struct Environment<'a> {
    pub config: &'a Config,
    /// Value of `PATH` to inspect
    pub path: String,
}

pub struct Check {
    pub name: &'static str,
    run: fn(&Environment) -> Option<String>,
}

impl Check {
    pub fn run(&self, env: &Environment) -> Option<String> {
        (self.run)(env)
    }
}

pub const CHECKS: &[Check] = &[
    Check {
        name: "check_path_for_trailing_slashes",
        run: check_path_for_trailing_slashes,
    },
    Check {
        name: "check_for_anaconda",
        run: check_for_anaconda,
    },
    Check {
        name: "check_for_broken_symlinks",
        run: check_for_broken_symlinks,
    },
];

pub fn find_check(name: &str) -> Result<&'static Check> {
    CHECKS
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| anyhow::anyhow!("No check available by the name: {}", name).into())
}

fn check_path_for_trailing_slashes(env: &Environment) -> Option<String> {
    let offenders: Vec<&str> = env
        .path
        .split(':')
        .filter(|dir| dir.len() > 1 && dir.ends_with('/'))
        .collect();
    if offenders.is_empty() {
        return None;
    }

    let mut message = String::from("Some directories in your path end in a slash.\n");
    message.push_str("Directories in your path should not end in a slash. This can break other\n");
    message.push_str("doctor checks. The following directories should be edited:\n");
    for dir in offenders {
        message.push_str(&format!("  {}\n", dir));
    }
    Some(message)
}

fn check_for_anaconda(env: &Environment) -> Option<String> {
    let anaconda_dir = env.path.split(':').find(|dir| {
        let dir = Path::new(dir);
        (dir.join("anaconda").is_file() || dir.join("conda").is_file())
            && dir.join("python").is_file()
    })?;

    let root = Path::new(anaconda_dir)
        .parent()
        .unwrap_or(Path::new(anaconda_dir));
    Some(format!(
        "Anaconda is known to frequently break builds, including of kettle itself.\n\
         Its installation at {} shadows system tools with its own.\n\
         Consider removing {} from your PATH while building formulae.\n",
        root.display(),
        anaconda_dir
    ))
}

fn check_for_broken_symlinks(env: &Environment) -> Option<String> {
    let bin_dir = env.config.prefix.join("bin");
    let entries = fs::read_dir(&bin_dir).ok()?;

    let mut broken: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_symlink() && !p.exists())
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    if broken.is_empty() {
        return None;
    }
    broken.sort();

    let mut message = format!("Broken symlinks were found in {}:\n", bin_dir.display());
    for name in broken {
        message.push_str(&format!("  {}\n", name));
    }
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env<'a>(config: &'a Config, path: &str) -> Environment<'a> {
        Environment {
            config,
            path: path.to_string(),
        }
    }

    #[test]
    fn test_trailing_slashes() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        let check = find_check("check_path_for_trailing_slashes").unwrap();

        let message = check.run(&env(&config, "/usr/bin/:/bin")).unwrap();
        assert!(message.contains("Some directories in your path end in a slash"));
        assert!(check.run(&env(&config, "/usr/bin:/")).is_none());
    }

    #[test]
    fn test_anaconda() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        let bin = tmp.path().join("anaconda/bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("conda"), "").unwrap();
        fs::write(bin.join("python"), "").unwrap();

        let path = format!("{}:/usr/bin", bin.display());
        let message = find_check("check_for_anaconda")
            .unwrap()
            .run(&env(&config, &path))
            .unwrap();
        assert!(message.contains("Anaconda"));
    }

    #[test]
    fn test_unknown_check() {
        assert!(find_check("check_for_unicorns").is_err());
    }

    #[test]
    fn test_broken_symlinks() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        let bin = config.prefix.join("bin");
        fs::create_dir_all(&bin).unwrap();
        std::os::unix::fs::symlink("../Cellar/gone/1.0/bin/gone", bin.join("gone")).unwrap();

        let message = find_check("check_for_broken_symlinks")
            .unwrap()
            .run(&env(&config, ""))
            .unwrap();
        assert!(message.contains("gone"));
    }
}
