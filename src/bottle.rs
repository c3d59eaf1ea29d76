//! Packing an installed keg into a bottle archive.
//!
//! A bottle is a gzip tarball laid out as `<name>/<version>/...`, the same
//! shape [`crate::builder::pour_bottle`] expects. The file is named
//! `<name>-<version>.<tag>.bottle.tar.gz`; repeated bottling of the same
//! version numbers the rebuilds `.bottle.1.tar.gz`, `.bottle.2.tar.gz`, ...

use crate::cellar;
use crate::config::Config;
use crate::error::Result;
use crate::formula::Formula;
use anyhow::Context;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BottleOptions {
    /// Always write the unnumbered file name, replacing any existing bottle
    pub no_revision: bool,
    pub tag: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BottleArchive {
    pub path: PathBuf,
    pub sha256: String,
    pub rebuild: u32,
}

pub fn bottle(config: &Config, formula: &Formula, options: &BottleOptions) -> Result<BottleArchive> {
    if formula.tap.is_none() {
        return Err(anyhow::anyhow!("Formula not from core or any taps: {}", formula.name).into());
    }

    let keg = cellar::installed_versions(config, &formula.name)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Formula not installed: {}", formula.name))?;

    let (path, rebuild) = archive_path(
        &options.output_dir,
        &keg.name,
        &keg.version,
        &options.tag,
        options.no_revision,
    );

    let file =
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(Path::new(&keg.name).join(&keg.version), &keg.path)
        .with_context(|| format!("Failed to archive {}", keg.path.display()))?;
    builder
        .into_inner()
        .and_then(|gz| gz.finish())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let sha256 = sha256_file(&path)?;
    debug!(bottle = %path.display(), sha256 = %sha256, "bottled");

    Ok(BottleArchive {
        path,
        sha256,
        rebuild,
    })
}

fn archive_path(dir: &Path, name: &str, version: &str, tag: &str, no_revision: bool) -> (PathBuf, u32) {
    let base = dir.join(format!("{}-{}.{}.bottle.tar.gz", name, version, tag));
    if no_revision || !base.exists() {
        return (base, 0);
    }

    let mut rebuild = 1;
    loop {
        let path = dir.join(format!("{}-{}.{}.bottle.{}.tar.gz", name, version, tag, rebuild));
        if !path.exists() {
            return (path, rebuild);
        }
        rebuild += 1;
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
