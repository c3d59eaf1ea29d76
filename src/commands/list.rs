use crate::commands::package_manager;
use colored::Colorize;
use kettle::{Config, Result};
use std::collections::BTreeMap;

/// Installed formulae by name; with `versions`, every installed version too
pub fn list(config: &Config, versions: bool) -> Result<()> {
    let pm = package_manager(config);

    let mut installed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for receipt in pm.list()? {
        installed.entry(receipt.name).or_default().push(receipt.version);
    }

    for (name, found) in &installed {
        if versions {
            println!("{} {}", name.bold(), found.join(" "));
        } else {
            println!("{}", name);
        }
    }
    Ok(())
}
