//! Explicit conda lockfiles exported from images.

use std::sync::LazyLock;

use regex::Regex;
use wigwam_common::error::{Result, WigwamError};

static CONDA_PACKAGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https://conda\.anaconda\.org/\S*$").ok());

static ENV_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").ok());

/// Environment exported when none is named.
pub const DEFAULT_ENV_NAME: &str = "base";

/// Returns the micromamba command exporting `env_name` as an explicit
/// lockfile.
///
/// # Errors
///
/// Returns `WigwamError::Usage` if the name contains anything but
/// alphanumerics, dots, dashes and underscores.
pub fn export_command(env_name: &str) -> Result<String> {
    let valid = ENV_NAME.as_ref().is_some_and(|pattern| pattern.is_match(env_name));
    if !valid {
        return Err(WigwamError::Usage {
            message: format!("invalid environment name: {env_name:?}"),
        });
    }
    Ok(format!("micromamba env export --name {env_name} --explicit --no-md5"))
}

fn is_conda_package(line: &str) -> bool {
    CONDA_PACKAGE.as_ref().is_some_and(|pattern| pattern.is_match(line))
}

/// Normalizes an exported lockfile: header lines first in their original
/// order, then the package URLs sorted. Blank lines are dropped.
#[must_use]
pub fn sort_lockfile(raw: &str) -> String {
    let (mut packages, header): (Vec<&str>, Vec<&str>) = raw
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .partition(|line| is_conda_package(line));
    packages.sort_unstable();

    let mut out = String::new();
    for line in header.into_iter().chain(packages) {
        out.push_str(line);
        out.push('\n');
    }
    out
}
