use crate::commands::{package_manager, rack_name};
use colored::Colorize;
use kettle::cellar::{Keg, format_size};
use kettle::{Config, Error, InstallOptions, InstallOutcome, Result};

pub async fn install(config: &Config, formula_names: &[String], options: &InstallOptions) -> Result<()> {
    let pm = package_manager(config);
    let mut already_installed = None;

    for name in formula_names {
        println!("{} {}", "==>".green().bold(), format!("Installing {}", name).bold());

        let outcomes = match pm.install(name, options).await {
            Ok(outcomes) => outcomes,
            Err(e @ Error::AlreadyInstalled { .. }) => {
                // Keep going with the remaining names, fail at the end
                println!("    Use {} to reinstall", "--force".dimmed());
                already_installed.get_or_insert(e);
                continue;
            }
            Err(e) => return Err(e),
        };

        for outcome in &outcomes {
            print_outcome(outcome);
        }
    }

    match already_installed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_outcome(outcome: &InstallOutcome) {
    let how = if outcome.strategy.is_bottle() {
        "poured from bottle"
    } else {
        "built from source"
    };
    println!(
        "  {} {} {} ({})",
        "✓".green(),
        outcome.name.bold(),
        outcome.version.cyan(),
        how.dimmed()
    );

    let keg = Keg::from_path(outcome.name.clone(), outcome.version.clone(), outcome.keg.clone());
    println!(
        "  {}: {} files, {}",
        keg.path.display(),
        keg.file_count(),
        format_size(keg.disk_usage())
    );

    if !outcome.link_conflicts.is_empty() {
        println!(
            "  {} Could not link {}; these files already exist:",
            "⚠".yellow(),
            outcome.name.bold()
        );
        for path in &outcome.link_conflicts {
            println!("    {}", path.display());
        }
        println!(
            "    Remove them and run {}",
            format!("kettle link {}", outcome.name).cyan()
        );
    }
}

pub async fn upgrade(config: &Config, formula_names: &[String], options: &InstallOptions) -> Result<()> {
    let pm = package_manager(config);

    let outdated = pm.outdated()?;
    if formula_names.is_empty() && outdated.is_empty() {
        println!("{} All formulae are up to date", "✓".green());
        return Ok(());
    }

    let results = pm.upgrade(formula_names, options).await?;
    if results.is_empty() {
        println!("{} Nothing to upgrade", "✓".green());
        return Ok(());
    }

    for result in &results {
        println!(
            "  {} {} {} -> {}",
            "✓".green(),
            result.name.bold(),
            result.from_version.dimmed(),
            result.to_version.cyan()
        );
        if !result.linked {
            println!(
                "    {} {} is not linked",
                "⚠".yellow(),
                result.path.display()
            );
        }
    }

    println!(
        "{} Upgraded {}",
        "==>".green().bold(),
        crate::commands::pluralize(results.len(), "formula", "formulae")
    );
    Ok(())
}

pub async fn fetch(config: &Config, formula_names: &[String], options: &InstallOptions) -> Result<()> {
    let pm = package_manager(config);

    for entry in pm.fetch(formula_names, options).await? {
        let status = if entry.hit {
            "Already downloaded"
        } else {
            "Downloaded"
        };
        println!("{}: {}", status, entry.path.display());
        match &entry.artifact.sha256 {
            Some(sha) => println!("SHA256: {}", sha),
            None => println!("{} no checksum to verify against", "⚠".yellow()),
        }
    }
    Ok(())
}

pub async fn uninstall(config: &Config, formula_names: &[String], force: bool) -> Result<()> {
    let pm = package_manager(config);

    for arg in formula_names {
        let name = rack_name(&pm, arg)?;
        let report = pm.uninstall(&name, force).await?;

        if report.is_empty() {
            println!("  {} {} is not installed", "⚠".yellow(), name.bold());
            continue;
        }

        for keg in &report.removed {
            println!(
                "Uninstalling {} {}... ({} files, {})",
                keg.name.bold(),
                keg.version,
                keg.files,
                format_size(keg.size)
            );
        }
        if !report.unlinked.is_empty() {
            tracing::debug!(formula = %name, links = report.unlinked.len(), "removed symlinks");
        }
    }
    Ok(())
}
