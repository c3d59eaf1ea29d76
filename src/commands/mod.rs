//! Command implementations for the kettle CLI
//!
//! Handlers are grouped by functional area:
//!
//! - **install**: installation, upgrade, download and removal
//! - **maintenance**: cleanup, missing-dependency audit, doctor
//! - **linking**: symlinking kegs into the prefix
//! - **list** / **query**: installed packages and dependency order
//! - **paths**: `--prefix`, `--cellar`, `--cache`, `--repository`, `--env`
//! - **tap**: formula repositories
//! - **development**: bottling and formula validation
//!
//! Every handler prints user-facing output to stdout and returns errors for
//! `main` to report.

pub mod development;
pub mod install;
pub mod linking;
pub mod list;
pub mod maintenance;
pub mod paths;
pub mod query;
pub mod tap;

pub use development::{bottle, readall};
pub use install::{fetch, install, uninstall, upgrade};
pub use linking::{link, unlink};
pub use list::list;
pub use maintenance::{cleanup, doctor, missing};
pub use paths::{cache, cellar, env, prefix, repository};
pub use query::deps;
pub use tap::{list_official_taps, list_pinned_taps, tap, tap_info, tap_pin, tap_unpin, untap};

use colored::control;
use indicatif::MultiProgress;
use kettle::{Config, PackageManager};
use std::io::IsTerminal;

/// Configure colour output from `NO_COLOR`, `CLICOLOR`, `CLICOLOR_FORCE` and
/// whether stdout is a terminal, in that order of precedence.
pub fn init_colors() {
    if std::env::var_os("NO_COLOR").is_some() {
        control::set_override(false);
        return;
    }

    if std::env::var("CLICOLOR_FORCE")
        .map(|v| v != "0")
        .unwrap_or(false)
    {
        control::set_override(true);
        return;
    }

    if std::env::var("CLICOLOR").map(|v| v == "0").unwrap_or(false) {
        control::set_override(false);
        return;
    }

    control::set_override(std::io::stdout().is_terminal());
}

/// A package manager for `config`, drawing progress bars only on a terminal
pub(crate) fn package_manager(config: &Config) -> PackageManager {
    let pm = PackageManager::new(config.clone());
    if std::io::stdout().is_terminal() {
        pm.with_progress(MultiProgress::new())
    } else {
        pm
    }
}

/// "1 tap", "3 taps"
pub(crate) fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    format!("{} {}", count, if count == 1 { singular } else { plural })
}

/// The Cellar name a command-line formula argument refers to. Paths to
/// formula files are loaded for their name; `user/repo/name` drops the tap.
pub(crate) fn rack_name(pm: &PackageManager, arg: &str) -> kettle::Result<String> {
    if arg.ends_with(".json") && std::path::Path::new(arg).is_file() {
        return Ok(pm.lookup(arg)?.name);
    }
    let bare = arg.rsplit('/').next().unwrap_or(arg);
    Ok(bare.to_lowercase())
}
