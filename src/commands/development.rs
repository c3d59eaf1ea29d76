//! Formula development commands: bottling and validating taps.

use crate::commands::{package_manager, pluralize};
use colored::Colorize;
use kettle::bottle::{self, BottleOptions};
use kettle::tap::{self, Tap};
use kettle::{Config, Result, platform};
use std::fs;

/// Pack each installed formula into a bottle in the current directory
pub fn bottle(config: &Config, formula_names: &[String], no_revision: bool) -> Result<()> {
    let pm = package_manager(config);
    let options = BottleOptions {
        no_revision,
        tag: platform::bottle_tag()?,
        output_dir: std::env::current_dir()?,
    };

    for name in formula_names {
        let formula = pm.lookup(name)?;
        let archive = bottle::bottle(config, &formula, &options)?;

        println!("{} {}", "==>".green().bold(), format!("Bottling {}", formula.full_name()).bold());
        println!("./{}", file_name(&archive.path));
        println!("  sha256 \"{}\" => :{}", archive.sha256, options.tag);
        if archive.rebuild > 0 {
            println!("  rebuild {}", archive.rebuild);
        }
    }
    Ok(())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load every formula (and, with `aliases`, every alias) of one tap or all
/// of them. Any failure is reported and makes the command fail.
pub fn readall(config: &Config, tap_name: Option<&str>, aliases: bool, syntax: bool) -> Result<()> {
    let pm = package_manager(config);

    let taps: Vec<Tap> = match tap_name {
        Some(name) => vec![
            tap::find_tap(config, name)?
                .ok_or_else(|| kettle::Error::InvalidTap(format!("{} is not tapped", name)))?,
        ],
        None => tap::list_taps(config)?,
    };

    let mut failures = 0;

    if syntax {
        for tap in &taps {
            for name in tap.formula_names()? {
                let path = tap.formula_file(&name);
                let contents = fs::read_to_string(&path)?;
                if let Err(e) = serde_json::from_str::<serde_json::Value>(&contents) {
                    println!("{} {}: {}", "✗".red(), path.display(), e);
                    failures += 1;
                }
            }
        }
    }

    let mut loaded = pm.registry().load_all(&taps)?;
    if aliases {
        loaded.extend(pm.registry().check_aliases(&taps)?);
    }

    let total = loaded.len();
    for (name, result) in loaded {
        if let Err(e) = result {
            println!("{} {}: {}", "✗".red(), name.bold(), e);
            failures += 1;
        }
    }

    tracing::info!(taps = taps.len(), checked = total, failures, "readall finished");

    if failures > 0 {
        return Err(anyhow::anyhow!(
            "{} failed to load",
            pluralize(failures, "formula", "formulae")
        )
        .into());
    }
    Ok(())
}
