//! `steward.toml` settings.
//!
//! ```toml
//! noop = false
//! catalog = "~/dotfiles/catalog.toml"
//! search_path = ["/usr/local/sbin", "/usr/sbin", "/usr/bin"]
//!
//! [retry]
//! attempts = 3
//! base_delay_secs = 1
//!
//! [facts]
//! "os.family" = "debian"
//! ```

use crate::paths;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Report changes without applying them
    pub noop: bool,
    /// Catalog applied when none is given on the command line
    pub catalog: Option<String>,
    /// Directories searched for provider commands; empty means `PATH`
    pub search_path: Vec<String>,
    /// Fact overrides, applied on top of detection
    pub facts: BTreeMap<String, String>,
    pub retry: RetrySettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub attempts: Option<u32>,
    pub base_delay_secs: Option<u64>,
}

impl Settings {
    /// Load settings from the config directory; a missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = paths::config_dir()?.join(paths::SETTINGS_FILE);
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Search path with `~` and variables expanded.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.search_path.iter().map(|p| paths::expand(p)).collect()
    }

    /// Catalog path: the explicit one, the configured one, or the default.
    pub fn catalog_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        match &self.catalog {
            Some(configured) => Ok(paths::expand(configured)),
            None => Ok(paths::config_dir()?.join(paths::DEFAULT_CATALOG)),
        }
    }

    /// Provider options with the configured retry policy applied.
    pub fn hostkit_options(&self) -> hostkit::Options {
        let mut options = hostkit::Options::detect();
        if let Some(attempts) = self.retry.attempts {
            options.retry.max_attempts = attempts.max(1);
        }
        if let Some(secs) = self.retry.base_delay_secs {
            options.retry.base_delay = Duration::from_secs(secs);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("steward.toml")).unwrap();
        assert!(!settings.noop);
        assert!(settings.search_path.is_empty());
    }

    #[test]
    fn test_load_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steward.toml");
        fs::write(
            &path,
            r#"
noop = true
search_path = ["~/bin", "/usr/sbin"]

[retry]
attempts = 0

[facts]
"os.family" = "debian"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.noop);
        assert_eq!(settings.facts.get("os.family").map(String::as_str), Some("debian"));
        assert_eq!(settings.search_path()[1], PathBuf::from("/usr/sbin"));
        assert_eq!(settings.hostkit_options().retry.max_attempts, 1);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steward.toml");
        fs::write(&path, "nope = 1\n").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("nope"));
    }

    #[test]
    fn test_explicit_catalog_wins() {
        let settings = Settings {
            catalog: Some("/etc/steward/catalog.toml".to_string()),
            ..Settings::default()
        };
        assert_eq!(
            settings.catalog_path(Some(Path::new("site.toml"))).unwrap(),
            PathBuf::from("site.toml")
        );
        assert_eq!(
            settings.catalog_path(None).unwrap(),
            PathBuf::from("/etc/steward/catalog.toml")
        );
    }
}
