//! Symlink management commands.

use crate::commands::{package_manager, pluralize, rack_name};
use colored::Colorize;
use kettle::{Config, Linker, Result};

pub fn link(config: &Config, formula_names: &[String], force: bool) -> Result<()> {
    let pm = package_manager(config);

    for arg in formula_names {
        let name = rack_name(&pm, arg)?;
        let report = pm.link(&name, force)?;
        let version = Linker::new(config).linked_version(&name).unwrap_or_default();

        println!(
            "Linking {}... {} created",
            config.keg_path(&name, &version).display(),
            pluralize(report.links.len(), "symlink", "symlinks")
        );
    }
    Ok(())
}

pub fn unlink(config: &Config, formula_names: &[String]) -> Result<()> {
    let pm = package_manager(config);

    for arg in formula_names {
        let name = rack_name(&pm, arg)?;
        let removed = pm.unlink(&name)?;
        if removed.is_empty() {
            println!("  {} {} is not linked", "⚠".yellow(), name.bold());
            continue;
        }
        println!(
            "Unlinking {}... {} removed",
            config.cellar.join(&name).display(),
            pluralize(removed.len(), "symlink", "symlinks")
        );
    }
    Ok(())
}
