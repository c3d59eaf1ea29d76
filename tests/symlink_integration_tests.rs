use anyhow::Result;
use kettle::symlink::relative_path;
use kettle::{Config, Error, Linker, normalize_path};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Mock keg with binaries, nested share data and a library
fn create_mock_keg(config: &Config, formula: &str, version: &str) -> Result<PathBuf> {
    let keg = config.keg_path(formula, version);

    let bin_dir = keg.join("bin");
    fs::create_dir_all(&bin_dir)?;
    fs::write(bin_dir.join(formula), "#!/bin/sh\necho test")?;

    let man_dir = keg.join("share/man/man1");
    fs::create_dir_all(&man_dir)?;
    fs::write(man_dir.join(format!("{}.1", formula)), "test man page")?;

    let lib_dir = keg.join("lib");
    fs::create_dir_all(&lib_dir)?;
    fs::write(lib_dir.join(format!("lib{}.so", formula)), "fake library")?;

    Ok(keg)
}

fn points_into(link: &Path, keg: &Path) -> bool {
    match (fs::canonicalize(link), fs::canonicalize(keg)) {
        (Ok(target), Ok(keg)) => target.starts_with(keg),
        _ => false,
    }
}

#[test]
fn test_link_creates_relative_symlinks() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::new(temp_dir.path());
    let keg = create_mock_keg(&config, "testpkg", "1.0.0")?;

    let report = Linker::new(&config).link("testpkg", "1.0.0")?;
    assert_eq!(report.links.len(), 3);

    let bin_link = config.prefix.join("bin/testpkg");
    assert!(bin_link.symlink_metadata()?.is_symlink());
    assert_eq!(
        fs::read_link(&bin_link)?,
        PathBuf::from("../Cellar/testpkg/1.0.0/bin/testpkg")
    );
    assert!(points_into(&config.prefix.join("share/man/man1/testpkg.1"), &keg));
    assert!(points_into(&config.prefix.join("lib/libtestpkg.so"), &keg));

    assert!(points_into(&config.opt_dir().join("testpkg"), &keg));
    Ok(())
}

#[test]
fn test_link_is_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::new(temp_dir.path());
    create_mock_keg(&config, "testpkg", "1.0.0")?;
    let linker = Linker::new(&config);

    linker.link("testpkg", "1.0.0")?;
    let again = linker.link("testpkg", "1.0.0")?;
    assert!(again.links.is_empty());
    assert_eq!(again.unchanged, 3);
    Ok(())
}

#[test]
fn test_shared_directories_between_kegs() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::new(temp_dir.path());
    create_mock_keg(&config, "alpha", "1.0")?;
    create_mock_keg(&config, "beta", "2.0")?;
    let linker = Linker::new(&config);

    linker.link("alpha", "1.0")?;
    linker.link("beta", "2.0")?;

    // man1 is a real directory shared by both kegs
    let man1 = config.prefix.join("share/man/man1");
    assert!(!man1.symlink_metadata()?.is_symlink());
    assert!(man1.join("alpha.1").exists());
    assert!(man1.join("beta.1").exists());

    linker.unlink("alpha")?;
    assert!(man1.join("alpha.1").symlink_metadata().is_err());
    assert!(man1.join("beta.1").exists());
    Ok(())
}

#[test]
fn test_conflict_reports_every_path() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::new(temp_dir.path());
    create_mock_keg(&config, "testpkg", "1.0.0")?;
    fs::create_dir_all(config.prefix.join("bin"))?;
    fs::create_dir_all(config.prefix.join("lib"))?;
    fs::write(config.prefix.join("bin/testpkg"), "someone else's")?;
    fs::write(config.prefix.join("lib/libtestpkg.so"), "someone else's")?;

    let err = Linker::new(&config).link("testpkg", "1.0.0").unwrap_err();
    match err {
        Error::LinkConflict { conflicts, .. } => {
            assert_eq!(
                conflicts,
                vec![
                    config.prefix.join("bin/testpkg"),
                    config.prefix.join("lib/libtestpkg.so"),
                ]
            );
        }
        other => panic!("expected LinkConflict, got {other}"),
    }

    // Nothing was linked
    assert!(config.prefix.join("share/man/man1/testpkg.1").symlink_metadata().is_err());
    assert!(!Linker::new(&config).is_linked("testpkg"));
    Ok(())
}

#[test]
fn test_unlink_leaves_no_dangling_links() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::new(temp_dir.path());
    create_mock_keg(&config, "testpkg", "1.0.0")?;
    let linker = Linker::new(&config);
    linker.link("testpkg", "1.0.0")?;

    let removed = linker.unlink("testpkg")?;
    assert_eq!(removed.len(), 3);

    let dangling: Vec<_> = walkdir::WalkDir::new(&config.prefix)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path_is_symlink() && !e.path().exists())
        .collect();
    assert!(dangling.is_empty());
    assert!(config.opt_dir().join("testpkg").symlink_metadata().is_err());
    Ok(())
}

#[test]
fn test_path_helpers() {
    assert_eq!(
        normalize_path(Path::new("/opt/kettle/bin/../Cellar/./foo")),
        PathBuf::from("/opt/kettle/Cellar/foo")
    );
    assert_eq!(
        relative_path(Path::new("/p/bin"), Path::new("/p/Cellar/foo/1.0/bin/foo")),
        PathBuf::from("../Cellar/foo/1.0/bin/foo")
    );
}
