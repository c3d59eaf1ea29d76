use crate::commands::pluralize;
use colored::Colorize;
use kettle::tap::{self, OFFICIAL_TAPS, Tap};
use kettle::{Config, Result};
use serde_json::json;

/// List installed taps, or tap `tap_name` (cloning `url` if given)
pub fn tap(config: &Config, tap_name: Option<&str>, url: Option<&str>) -> Result<()> {
    let Some(name) = tap_name else {
        for tap in tap::list_taps(config)? {
            println!("{}", tap.name());
        }
        return Ok(());
    };

    if let Some(existing) = tap::find_tap(config, name)? {
        println!("  {} {} already tapped", "✓".green(), existing.name().bold());
        return Ok(());
    }

    let tap = tap::tap(config, name, url)?;
    let count = tap.formula_names()?.len();
    println!(
        "{} {} ({})",
        "Tapped".green(),
        tap.name().bold(),
        pluralize(count, "formula", "formulae")
    );
    Ok(())
}

pub fn list_official_taps() -> Result<()> {
    for repo in OFFICIAL_TAPS {
        println!("homebrew/{}", repo);
    }
    Ok(())
}

pub fn list_pinned_taps(config: &Config) -> Result<()> {
    for tap in tap::list_taps(config)?.iter().filter(|t| t.pinned) {
        println!("{}", tap.name());
    }
    Ok(())
}

pub fn untap(config: &Config, tap_names: &[String]) -> Result<()> {
    for name in tap_names {
        let count = match tap::find_tap(config, name)? {
            Some(tap) => tap.formula_names()?.len(),
            None => 0,
        };
        let tap = tap::untap(config, name)?;
        println!(
            "{} {} ({})",
            "Untapped".green(),
            tap.name().bold(),
            pluralize(count, "formula", "formulae")
        );
    }
    Ok(())
}

pub fn tap_pin(config: &Config, tap_names: &[String]) -> Result<()> {
    for name in tap_names {
        tap::pin(config, name)?;
        println!("Pinned {}", tap_display_name(config, name)?);
    }
    Ok(())
}

pub fn tap_unpin(config: &Config, tap_names: &[String]) -> Result<()> {
    for name in tap_names {
        tap::unpin(config, name)?;
        println!("Unpinned {}", tap_display_name(config, name)?);
    }
    Ok(())
}

fn tap_display_name(config: &Config, name: &str) -> Result<String> {
    Ok(tap::find_tap(config, name)?
        .map(|t| t.name())
        .unwrap_or_else(|| name.to_lowercase()))
}

/// Summary of all taps, or details of the named ones
pub fn tap_info(config: &Config, tap_names: &[String], installed: bool, json: Option<&str>) -> Result<()> {
    let selected: Vec<Tap> = if installed {
        tap::list_taps(config)?
    } else {
        let mut taps = Vec::new();
        for name in tap_names {
            let tap = tap::find_tap(config, name)?
                .ok_or_else(|| kettle::Error::InvalidTap(format!("{} is not tapped", name)))?;
            taps.push(tap);
        }
        taps
    };

    if let Some(version) = json {
        if version != "v1" {
            return Err(anyhow::anyhow!("Invalid JSON version: {}", version).into());
        }
        if selected.is_empty() && !installed {
            return Err(anyhow::anyhow!("Invalid usage: --json requires --installed or a tap name").into());
        }
        return print_json(&selected);
    }

    if selected.is_empty() && !installed {
        return print_summary(config);
    }

    for (i, tap) in selected.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_details(tap)?;
    }
    Ok(())
}

fn print_summary(config: &Config) -> Result<()> {
    let taps = tap::list_taps(config)?;
    let pinned = taps.iter().filter(|t| t.pinned).count();
    let mut formulae = 0;
    for tap in &taps {
        formulae += tap.formula_names()?.len();
    }

    println!(
        "{}, {}, {}",
        pluralize(taps.len(), "tap", "taps"),
        pluralize(pinned, "pinned", "pinned"),
        pluralize(formulae, "formula", "formulae")
    );
    Ok(())
}

fn print_details(tap: &Tap) -> Result<()> {
    let pinned = if tap.pinned { " (pinned)" } else { "" };
    println!("{}{}", tap.name().bold(), pinned);
    println!(
        "{}",
        pluralize(tap.formula_names()?.len(), "formula", "formulae")
    );
    println!("{}", tap.path.display().to_string().cyan());
    match tap.remote() {
        Some(remote) => println!("From: {}", remote),
        None => println!("From: {}", "no remote".dimmed()),
    }
    Ok(())
}

fn print_json(taps: &[Tap]) -> Result<()> {
    let mut entries = Vec::new();
    for tap in taps {
        let formula_names = tap.formula_names()?;
        let formula_files: Vec<String> = formula_names
            .iter()
            .map(|n| tap.formula_file(n).display().to_string())
            .collect();
        entries.push(json!({
            "name": tap.name(),
            "user": tap.user,
            "repo": tap.repo,
            "path": tap.path.display().to_string(),
            "installed": true,
            "official": tap.is_official(),
            "pinned": tap.pinned,
            "remote": tap.remote(),
            "formula_names": formula_names,
            "formula_files": formula_files,
            "aliases": tap.alias_names()?,
        }));
    }
    println!("{}", serde_json::to_string(&entries)?);
    Ok(())
}
