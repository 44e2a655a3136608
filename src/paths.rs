//! Path resolution for steward's configuration.
//!
//! # Environment Variables
//!
//! - `STEWARD_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/steward`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STEWARD_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/steward` (if set)
//! 3. `~/.config/steward`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STEWARD_CONFIG_DIR";

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "steward.toml";

/// Catalog applied when none is given on the command line
pub const DEFAULT_CATALOG: &str = "catalog.toml";

/// Get the steward config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        dirs::home_dir(),
    )
}

fn resolve_config_dir(
    override_dir: Option<String>,
    xdg_config: Option<String>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg) = xdg_config.filter(|d| !d.is_empty()) {
        let path = PathBuf::from(xdg).join("steward");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".config").join("steward");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand `~` and environment variables in a path.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
