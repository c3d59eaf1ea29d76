//! Build strategies: compiling from source or pouring a bottle.
//!
//! Both produce a populated keg directory and nothing else. Receipts and links
//! are the installer's business.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{self, ArchiveFormat};
use crate::formula::Formula;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use walkdir::WalkDir;

/// How a formula gets into its keg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStrategy {
    Source,
    Bottle { tag: String },
}

impl BuildStrategy {
    pub fn is_bottle(&self) -> bool {
        matches!(self, BuildStrategy::Bottle { .. })
    }
}

/// Unpack a source artifact and run the formula's build steps into `keg`.
/// Returns the captured build log.
pub fn build_from_source(
    config: &Config,
    formula: &Formula,
    artifact: &Path,
    keg: &Path,
    dep_prefixes: &[PathBuf],
) -> Result<String> {
    let work = tempfile::Builder::new()
        .prefix(&format!("kettle-{}-", formula.name))
        .tempdir()
        .context("Failed to create build directory")?;

    let format = extract::detect_format(artifact)?;
    let source_root = if format == ArchiveFormat::Plain {
        // Single-file source: a script or binary shipped as-is
        let file_name = artifact_file_name(formula);
        fs::copy(artifact, work.path().join(&file_name))
            .with_context(|| format!("Failed to stage {}", artifact.display()))?;
        work.path().to_path_buf()
    } else {
        extract::unpack(artifact, work.path())?;
        extract::source_root(work.path())?
    };

    fs::create_dir_all(keg).with_context(|| format!("Failed to create {}", keg.display()))?;

    if formula.build_steps.is_empty() {
        copy_tree(&source_root, keg)?;
        return Ok(String::new());
    }

    let mut env = config.build_env(dep_prefixes);
    env.push(("PREFIX".to_string(), keg.display().to_string()));

    let mut log = String::new();
    for step in &formula.build_steps {
        let argv: Vec<String> = step.iter().map(|arg| expand(arg, formula, keg)).collect();
        let Some((program, args)) = argv.split_first() else {
            continue;
        };

        debug!(formula = %formula.name, command = ?argv, "build step");
        log.push_str(&format!("==> {}\n", argv.join(" ")));

        let output = Command::new(program)
            .args(args)
            .current_dir(&source_root)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return Err(Error::BuildError {
                    formula: formula.name.clone(),
                    message: format!("could not run {}: {}", program, e),
                    log,
                });
            }
        };

        log.push_str(&String::from_utf8_lossy(&output.stdout));
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(Error::BuildError {
                formula: formula.name.clone(),
                message: format!("{} exited with {}", argv.join(" "), output.status),
                log,
            });
        }
    }

    Ok(log)
}

/// Unpack a bottle into a staging directory beside the keg, then move its
/// `<name>/<version>` tree into place.
pub fn pour_bottle(config: &Config, formula: &Formula, bottle: &Path, keg: &Path) -> Result<()> {
    let rack = config.cellar.join(&formula.name);
    fs::create_dir_all(&rack).with_context(|| format!("Failed to create {}", rack.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&rack)
        .context("Failed to create staging directory")?;

    extract::unpack(bottle, staging.path())?;
    let poured = extract::find_bottle_dir(staging.path(), &formula.name, &formula.version)?;

    if keg.exists() {
        fs::remove_dir_all(keg)?;
    }
    fs::rename(&poured, keg)
        .with_context(|| format!("Failed to move bottle into {}", keg.display()))?;

    debug!(formula = %formula.name, keg = %keg.display(), "poured bottle");
    Ok(())
}

fn expand(arg: &str, formula: &Formula, keg: &Path) -> String {
    arg.replace("{prefix}", &keg.display().to_string())
        .replace("{name}", &formula.name)
        .replace("{version}", &formula.version)
}

fn artifact_file_name(formula: &Formula) -> String {
    formula
        .url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(&formula.name)
        .to_string()
}

/// Recursively copy `from` into `to`, preserving symlinks
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(false).min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(target, &dest)?;
        } else {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn formula(steps: Vec<Vec<&str>>) -> Formula {
        Formula {
            name: "testball".to_string(),
            version: "0.1".to_string(),
            url: "https://example.com/testball-0.1.sh".to_string(),
            sha256: None,
            desc: None,
            homepage: None,
            dependencies: vec![],
            options: vec![],
            keg_only: false,
            build_steps: steps
                .into_iter()
                .map(|s| s.into_iter().map(String::from).collect())
                .collect(),
            bottles: BTreeMap::new(),
            tap: None,
            path: PathBuf::new(),
        }
    }

    #[test]
    fn test_plain_source_without_steps_is_copied() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        let artifact = tmp.path().join("artifact");
        fs::write(&artifact, "#!/bin/sh\necho hi\n").unwrap();
        let keg = config.keg_path("testball", "0.1");

        let log = build_from_source(&config, &formula(vec![]), &artifact, &keg, &[]).unwrap();
        assert!(log.is_empty());
        assert!(keg.join("testball-0.1.sh").is_file());
    }

    #[test]
    fn test_steps_expand_placeholders_and_capture_output() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        let artifact = tmp.path().join("artifact");
        fs::write(&artifact, "payload").unwrap();
        let keg = config.keg_path("testball", "0.1");

        let f = formula(vec![
            vec!["mkdir", "-p", "{prefix}/bin"],
            vec!["cp", "testball-0.1.sh", "{prefix}/bin/{name}"],
            vec!["echo", "built {name} {version}"],
        ]);
        let log = build_from_source(&config, &f, &artifact, &keg, &[]).unwrap();

        assert!(keg.join("bin/testball").is_file());
        assert!(log.contains("built testball 0.1"));
    }

    #[test]
    fn test_failing_step_carries_log() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        let artifact = tmp.path().join("artifact");
        fs::write(&artifact, "payload").unwrap();
        let keg = config.keg_path("testball", "0.1");

        let f = formula(vec![vec!["sh", "-c", "echo compiling; exit 3"]]);
        match build_from_source(&config, &f, &artifact, &keg, &[]).unwrap_err() {
            Error::BuildError { log, .. } => assert!(log.contains("compiling")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
