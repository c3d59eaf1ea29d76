//! Archive unpacking for source tarballs and bottles.
//!
//! Formats are recognised by their leading bytes rather than by file name, so
//! a cache entry named `.tbz` that is really gzip still unpacks:
//! - gzip (`1f 8b`) → tar stream inside
//! - plain tar (`ustar` magic at offset 257)
//!
//! Bottles unpack to `<name>/<version>/...`, possibly with a bottle revision
//! suffix (`1.0.0_1`); [`find_bottle_dir`] locates whichever was shipped.

use crate::error::Result;
use anyhow::Context;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Gzip,
    Tar,
    /// Not an archive this module can unpack
    Plain,
}

const TAR_MAGIC_OFFSET: usize = 257;

pub fn detect_format(path: &Path) -> Result<ArchiveFormat> {
    let mut header = [0u8; 512];
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut read = 0;
    while read < header.len() {
        let n = file.read(&mut header[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }

    if read >= 2 && header[0] == 0x1f && header[1] == 0x8b {
        return Ok(ArchiveFormat::Gzip);
    }
    if read >= TAR_MAGIC_OFFSET + 5 && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar" {
        return Ok(ArchiveFormat::Tar);
    }
    Ok(ArchiveFormat::Plain)
}

/// Unpack `archive` into `dest`, which is created if missing
pub fn unpack(archive: &Path, dest: &Path) -> Result<ArchiveFormat> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let format = detect_format(archive)?;
    let file =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;

    match format {
        ArchiveFormat::Gzip => unpack_tar(Archive::new(GzDecoder::new(file)), archive, dest)?,
        ArchiveFormat::Tar => unpack_tar(Archive::new(file), archive, dest)?,
        ArchiveFormat::Plain => {
            return Err(anyhow::anyhow!("{} is not a tar archive", archive.display()).into());
        }
    }

    Ok(format)
}

fn unpack_tar<R: Read>(mut archive: Archive<R>, source: &Path, dest: &Path) -> Result<()> {
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .with_context(|| format!("Failed to extract {} to {}", source.display(), dest.display()))?;
    Ok(())
}

/// Directory a source build should run in: the single top-level directory
/// most tarballs wrap their contents in, else `dir` itself.
pub fn source_root(dir: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .collect();

    match entries.as_slice() {
        [only] if only.file_type().map(|t| t.is_dir()).unwrap_or(false) => Ok(only.path()),
        _ => Ok(dir.to_path_buf()),
    }
}

/// Locate `<name>/<version>` (or `<name>/<version>_N`) inside an unpacked bottle
pub fn find_bottle_dir(unpacked: &Path, name: &str, version: &str) -> Result<PathBuf> {
    let formula_dir = unpacked.join(name);
    let exact = formula_dir.join(version);
    if exact.is_dir() {
        return Ok(exact);
    }

    let revision_prefix = format!("{}_", version);
    let found = fs::read_dir(&formula_dir)
        .with_context(|| format!("Bottle has no {} directory", name))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .find(|dir| {
            dir.strip_prefix(&revision_prefix)
                .is_some_and(|rev| !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()))
        })
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Bottle does not contain {}/{}",
                name,
                version
            )
        })?;

    Ok(formula_dir.join(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn append_files<W: std::io::Write>(builder: &mut tar::Builder<W>, files: &[(&str, &str)]) {
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
    }

    fn write_tar(path: &Path, files: &[(&str, &str)], gzip: bool) {
        let file = File::create(path).unwrap();
        if gzip {
            let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
            append_files(&mut builder, files);
            builder.into_inner().unwrap().finish().unwrap();
        } else {
            let mut builder = tar::Builder::new(file);
            append_files(&mut builder, files);
            builder.finish().unwrap();
        }
    }

    #[test]
    fn test_unpack_gzip_and_find_source_root() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("foo-1.0.tar.gz");
        write_tar(&archive, &[("foo-1.0/bin/foo", "#!/bin/sh\n")], true);

        let dest = tmp.path().join("out");
        assert_eq!(unpack(&archive, &dest).unwrap(), ArchiveFormat::Gzip);
        let root = source_root(&dest).unwrap();
        assert_eq!(root, dest.join("foo-1.0"));
        assert!(root.join("bin/foo").is_file());
    }

    #[test]
    fn test_detect_plain_tar_and_plain_file() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("foo.tbz");
        write_tar(&archive, &[("README", "hi")], false);
        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::Tar);

        let plain = tmp.path().join("script.sh");
        fs::write(&plain, "echo hi").unwrap();
        assert_eq!(detect_format(&plain).unwrap(), ArchiveFormat::Plain);
        let err = unpack(&plain, &tmp.path().join("x")).unwrap_err();
        assert!(err.to_string().contains("is not a tar archive"), "{err}");
    }

    #[test]
    fn test_find_bottle_dir_with_revision() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("python/3.13.9_1")).unwrap();
        fs::create_dir_all(tmp.path().join("python/3.13.90")).unwrap();

        let found = find_bottle_dir(tmp.path(), "python", "3.13.9").unwrap();
        assert_eq!(found, tmp.path().join("python/3.13.9_1"));
        assert!(find_bottle_dir(tmp.path(), "python", "3.12").is_err());
    }
}
