//! Path and environment queries.
//!
//! Each flag prints one location from the active [`Config`]; given a formula
//! it prints where that formula lives (or would live) instead.

use crate::commands::{package_manager, rack_name};
use kettle::{Config, PackageManager, ReceiptStore, Result};

/// `--prefix [formula]`: the prefix, or `<cellar>/<name>/<version>`
pub fn prefix(config: &Config, formula: Option<&str>) -> Result<()> {
    let Some(arg) = formula else {
        println!("{}", config.prefix.display());
        return Ok(());
    };

    let pm = package_manager(config);
    let (name, version) = formula_version(&pm, arg)?;
    println!("{}", config.keg_path(&name, &version).display());
    Ok(())
}

/// Installed version if there is one, else the version the registry offers
fn formula_version(pm: &PackageManager, arg: &str) -> Result<(String, String)> {
    let name = rack_name(pm, arg)?;
    if let Some(version) = ReceiptStore::new(pm.config()).installed_version(&name)? {
        return Ok((name, version));
    }
    let formula = pm.lookup(arg)?;
    Ok((formula.name, formula.version))
}

/// `--cellar [formula]`
pub fn cellar(config: &Config, formula: Option<&str>) -> Result<()> {
    match formula {
        Some(arg) => {
            let pm = package_manager(config);
            println!("{}", config.cellar.join(rack_name(&pm, arg)?).display());
        }
        None => println!("{}", config.cellar.display()),
    }
    Ok(())
}

/// `--cache [formula]`
pub fn cache(config: &Config, formula: Option<&str>) -> Result<()> {
    match formula {
        Some(arg) => {
            let pm = package_manager(config);
            println!("{}", pm.cache_path(arg)?.display());
        }
        None => println!("{}", config.cache.display()),
    }
    Ok(())
}

/// `--repository [tap]`
pub fn repository(config: &Config, tap: Option<&str>) -> Result<()> {
    match tap {
        Some(name) => println!("{}", kettle::tap::tap_directory(config, name)?.display()),
        None => println!("{}", config.repository.display()),
    }
    Ok(())
}

/// `--env`: the environment a source build runs with
pub fn env(config: &Config) -> Result<()> {
    for (key, value) in config.build_env(&[]) {
        println!("{}=\"{}\"", key, value);
    }
    Ok(())
}
