//! Maintenance commands: cleanup, missing, doctor.

use crate::commands::{package_manager, pluralize};
use colored::Colorize;
use kettle::cellar::format_size;
use kettle::doctor::{self, CHECKS, Check, Environment};
use kettle::{CleanupOptions, Config, Result};

pub fn cleanup(config: &Config, options: &CleanupOptions) -> Result<()> {
    let pm = package_manager(config);
    let report = pm.cleanup(options)?;

    let verb = if options.dry_run {
        "Would remove"
    } else {
        "Removing"
    };
    for path in report.removed() {
        println!("{}: {}", verb, path.display());
    }

    if report.is_empty() {
        tracing::debug!("nothing to clean up");
        return Ok(());
    }

    if report.freed > 0 {
        let summary = if options.dry_run {
            "This operation would free approximately"
        } else {
            "This operation has freed approximately"
        };
        println!(
            "{} {} {} of disk space.",
            "==>".green().bold(),
            summary,
            format_size(report.freed).bold()
        );
    }
    Ok(())
}

/// Print each missing dependency on its own line
pub fn missing(config: &Config, formula_names: &[String]) -> Result<()> {
    let pm = package_manager(config);
    for name in pm.missing(formula_names)? {
        println!("{}", name);
    }
    Ok(())
}

pub fn doctor(config: &Config, check_names: &[String]) -> Result<()> {
    let checks: Vec<&Check> = if check_names.is_empty() {
        CHECKS.iter().collect()
    } else {
        check_names
            .iter()
            .map(|name| doctor::find_check(name))
            .collect::<Result<_>>()?
    };

    let env = Environment {
        config,
        path: std::env::var("PATH").unwrap_or_default(),
    };

    let mut problems = 0;
    for check in checks {
        tracing::debug!(check = check.name, "running check");
        if let Some(message) = check.run(&env) {
            if problems > 0 {
                println!();
            }
            println!("{} {}", "Warning:".yellow().bold(), message.trim_end());
            problems += 1;
        }
    }

    if problems == 0 {
        println!("{} Your system is ready to go.", "✓".green());
        return Ok(());
    }

    Err(anyhow::anyhow!("doctor found {}", pluralize(problems, "problem", "problems")).into())
}
