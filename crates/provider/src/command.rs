//! Command declarations and the command locator.
//!
//! A provider declares the executables it needs by symbol. The locator
//! resolves each declaration once, caches the resulting [`CommandTable`] per
//! provider, and keeps it until [`CommandLocator::reset`].
//!
//! Resolution order:
//! 1. An absolute path in the declaration wins if it is an executable file.
//! 2. Otherwise the configured search path is scanned.
//! 3. Then `PATH`, unless the locator is [isolated](CommandLocator::isolated).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// A command a provider needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDecl {
    /// Symbol the provider uses to invoke it (e.g. "install")
    pub symbol: String,
    /// Executable name or absolute path
    pub executable: String,
    /// Optional commands never make a provider unsuitable
    pub optional: bool,
    /// Resource parameter that may name an explicit executable instead
    pub target_param: Option<String>,
    /// Extra environment for every invocation
    pub env: Vec<(String, String)>,
}

impl CommandDecl {
    /// A mandatory command.
    pub fn required(symbol: &str, executable: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            executable: executable.to_string(),
            optional: false,
            target_param: None,
            env: Vec::new(),
        }
    }

    /// An optional command.
    pub fn optional(symbol: &str, executable: &str) -> Self {
        Self {
            optional: true,
            ..Self::required(symbol, executable)
        }
    }

    /// Let a resource parameter point this symbol at another executable.
    pub fn targeted_by(mut self, param: &str) -> Self {
        self.target_param = Some(param.to_string());
        self
    }

    /// Add an environment variable to every invocation.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

/// Outcome of resolving one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Absolute path of the executable
    Resolved(PathBuf),
    /// Not found
    Unavailable,
}

impl Resolution {
    /// The resolved path, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Resolved(path) => Some(path),
            Self::Unavailable => None,
        }
    }
}

/// Resolved commands of one provider.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: BTreeMap<String, (CommandDecl, Resolution)>,
}

impl CommandTable {
    /// Path of a resolved command.
    pub fn path(&self, symbol: &str) -> Option<&Path> {
        self.entries.get(symbol).and_then(|(_, r)| r.path())
    }

    /// Declaration for a symbol.
    pub fn decl(&self, symbol: &str) -> Option<&CommandDecl> {
        self.entries.get(symbol).map(|(d, _)| d)
    }

    /// Whether a symbol resolved.
    pub fn is_available(&self, symbol: &str) -> bool {
        self.path(symbol).is_some()
    }

    /// Mandatory commands that did not resolve, as `symbol (executable)`.
    pub fn missing_mandatory(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|(decl, res)| !decl.optional && *res == Resolution::Unavailable)
            .map(|(decl, _)| format!("{} ({})", decl.symbol, decl.executable))
            .collect()
    }

    /// Iterate `(symbol, resolution)` pairs in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolution)> {
        self.entries.iter().map(|(s, (_, r))| (s.as_str(), r))
    }
}

/// Resolves executables and caches the results.
#[derive(Debug, Default)]
pub struct CommandLocator {
    search_path: Vec<PathBuf>,
    isolated: bool,
    tables: Mutex<HashMap<String, Arc<CommandTable>>>,
    targets: Mutex<HashMap<String, Resolution>>,
}

impl CommandLocator {
    /// Create a locator that scans `search_path` before `PATH`.
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            ..Self::default()
        }
    }

    /// Create a locator that never looks past `search_path`.
    pub fn isolated(search_path: Vec<PathBuf>) -> Self {
        Self {
            isolated: true,
            ..Self::new(search_path)
        }
    }

    /// Resolve a single executable without caching.
    pub fn locate(&self, executable: &str) -> Resolution {
        let candidate = Path::new(executable);
        if candidate.is_absolute() {
            return if is_executable(candidate) {
                Resolution::Resolved(candidate.to_path_buf())
            } else {
                Resolution::Unavailable
            };
        }

        let mut found = None;
        if !self.search_path.is_empty() {
            match std::env::join_paths(&self.search_path) {
                Ok(paths) => {
                    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
                    found = which::which_in(executable, Some(paths), cwd).ok();
                }
                Err(e) => log::warn!("Invalid search path entry: {}", e),
            }
        }
        if found.is_none() && !self.isolated {
            found = which::which(executable).ok();
        }

        match found {
            Some(path) => Resolution::Resolved(path),
            None => Resolution::Unavailable,
        }
    }

    /// Command table for a provider, resolved on first use.
    pub fn table(&self, provider: &str, decls: &[CommandDecl]) -> Arc<CommandTable> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = tables.get(provider) {
            return Arc::clone(table);
        }

        let mut table = CommandTable::default();
        for decl in decls {
            let resolution = self.locate(&decl.executable);
            log::debug!(
                "Provider {}: command {} ({}) -> {:?}",
                provider,
                decl.symbol,
                decl.executable,
                resolution
            );
            table
                .entries
                .insert(decl.symbol.clone(), (decl.clone(), resolution));
        }

        let table = Arc::new(table);
        tables.insert(provider.to_string(), Arc::clone(&table));
        table
    }

    /// Resolve an explicit target for a targeted command, cached per target.
    pub fn resolve_target(&self, provider: &str, symbol: &str, target: &str) -> Resolution {
        let key = format!("{provider}\u{0}{symbol}\u{0}{target}");
        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        targets
            .entry(key)
            .or_insert_with(|| {
                let resolution = self.locate(target);
                log::debug!(
                    "Provider {}: command {} targeted at {} -> {:?}",
                    provider,
                    symbol,
                    target,
                    resolution
                );
                resolution
            })
            .clone()
    }

    /// Drop every cached resolution.
    pub fn reset(&self) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
