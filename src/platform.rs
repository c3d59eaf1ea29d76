//! Platform tags for bottle selection.
//!
//! Bottles are keyed by `<arch>_<os>` tags such as `arm64_sequoia` or
//! `x86_64_linux`. A bottle tagged `all` works everywhere.

use crate::error::Result;
#[cfg(target_os = "macos")]
use anyhow::Context;
#[cfg(target_os = "macos")]
use std::process::Command;

/// Tag of bottles that install on any platform
pub const UNIVERSAL_TAG: &str = "all";

/// Bottle tag of the running system
pub fn bottle_tag() -> Result<String> {
    let arch = match std::env::consts::ARCH {
        "aarch64" => "arm64",
        other => other,
    };

    #[cfg(target_os = "macos")]
    {
        let os_version = macos_version()?;
        Ok(format!("{}_{}", arch, macos_name(&os_version)))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(format!("{}_linux", arch))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(anyhow::anyhow!("Unsupported platform: {}", std::env::consts::OS).into())
    }
}

#[cfg(target_os = "macos")]
fn macos_version() -> Result<String> {
    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .context("Failed to run sw_vers")?;

    Ok(String::from_utf8(output.stdout)
        .context("Invalid UTF-8 in sw_vers output")?
        .trim()
        .to_string())
}

#[cfg(target_os = "macos")]
fn macos_name(version: &str) -> &'static str {
    let major: u32 = version
        .split('.')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    match major {
        26 | 16 => "tahoe",
        15 => "sequoia",
        14 => "sonoma",
        13 => "ventura",
        12 => "monterey",
        11 => "big_sur",
        _ => "sonoma",
    }
}
