//! Host facts and feature flags used by confinement and default rules.
//!
//! Facts are flat `name → value` pairs using dotted names:
//!
//! | Fact               | Example       |
//! |--------------------|---------------|
//! | `kernel`           | `linux`       |
//! | `architecture`     | `x86_64`      |
//! | `os.family`        | `debian`      |
//! | `os.name`          | `ubuntu`      |
//! | `os.release.full`  | `22.04`       |
//! | `os.release.major` | `22`          |
//!
//! Feature flags (`root`, `systemd`) are booleans probed once at detection.
//! Matching is case-insensitive everywhere.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const OS_RELEASE: &str = "/etc/os-release";

/// Snapshot of facts about the current host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFacts {
    values: BTreeMap<String, String>,
    features: BTreeSet<String>,
}

impl HostFacts {
    /// Create an empty fact set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect facts for the current host.
    ///
    /// Reads `/etc/os-release` when present; never runs external commands.
    pub fn detect() -> Self {
        let os_release = std::fs::read_to_string(OS_RELEASE).unwrap_or_default();
        let mut facts = Self::from_parts(std::env::consts::OS, std::env::consts::ARCH, &os_release);

        if is_root() {
            facts.features.insert("root".to_string());
        }
        if Path::new("/run/systemd/system").exists() {
            facts.features.insert("systemd".to_string());
        }

        log::debug!("Detected host facts: {:?}", facts.values);
        facts
    }

    /// Build facts from an OS name, an architecture and os-release content.
    pub fn from_parts(os: &str, arch: &str, os_release: &str) -> Self {
        let mut facts = Self::new();

        let kernel = match os {
            "macos" => "darwin",
            other => other,
        };
        facts.set("kernel", kernel);
        facts.set("architecture", arch);

        if kernel == "darwin" {
            facts.set("os.family", "darwin");
            facts.set("os.name", "darwin");
            return facts;
        }

        let release = parse_os_release(os_release);
        if let Some(id) = release.get("ID") {
            let name = match id.as_str() {
                "amzn" => "amazon",
                other => other,
            };
            facts.set("os.name", name);

            let like = release.get("ID_LIKE").map(String::as_str).unwrap_or("");
            if let Some(family) = os_family(id, like) {
                facts.set("os.family", family);
            }
        }

        if let Some(version) = release.get("VERSION_ID") {
            facts.set("os.release.full", version);
            let mut parts = version.split('.');
            if let Some(major) = parts.next() {
                facts.set("os.release.major", major);
            }
            if let Some(minor) = parts.next() {
                facts.set("os.release.minor", minor);
            }
        }

        facts
    }

    /// Set a fact, replacing any previous value.
    pub fn set(&mut self, name: &str, value: &str) {
        self.values
            .insert(name.to_string(), value.trim().to_lowercase());
    }

    /// Builder form of [`HostFacts::set`].
    pub fn with_fact(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    /// Builder form for enabling a feature flag.
    pub fn with_feature(mut self, name: &str) -> Self {
        self.features.insert(name.to_lowercase());
        self
    }

    /// Apply configured overrides on top of detected facts.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, String>) {
        for (name, value) in overrides {
            self.set(name, value);
        }
    }

    /// Get a fact value (lowercased).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Check whether a fact equals one of the given values, case-insensitively.
    ///
    /// Missing or empty facts never match.
    pub fn matches(&self, name: &str, values: &[String]) -> bool {
        match self.get(name) {
            Some(actual) if !actual.is_empty() => {
                values.iter().any(|v| v.trim().to_lowercase() == actual)
            }
            _ => false,
        }
    }

    /// Numeric value of a fact, if it parses as an integer.
    pub fn number(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Check whether a host feature flag is set.
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains(&name.to_lowercase())
    }

    /// Iterate facts in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate feature flags in name order.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(String::as_str)
    }
}

/// Parse `KEY=value` lines, stripping quotes.
fn parse_os_release(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Map an os-release ID (and ID_LIKE) to a family name.
fn os_family(id: &str, like: &str) -> Option<&'static str> {
    let candidates = std::iter::once(id).chain(like.split_whitespace());
    for candidate in candidates {
        let family = match candidate {
            "debian" | "ubuntu" | "linuxmint" | "raspbian" => "debian",
            "rhel" | "centos" | "fedora" | "amzn" | "rocky" | "almalinux" | "ol" => "redhat",
            "arch" | "manjaro" | "endeavouros" => "archlinux",
            "suse" | "opensuse" | "sles" | "opensuse-leap" | "opensuse-tumbleweed" => "suse",
            "alpine" => "alpine",
            "gentoo" => "gentoo",
            _ => continue,
        };
        return Some(family);
    }
    None
}

#[allow(unsafe_code)]
fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
