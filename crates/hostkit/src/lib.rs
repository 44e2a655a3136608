//! # hostkit
//!
//! Concrete providers for the `provider` framework: system package managers
//! and local user accounts.
//!
//! ```no_run
//! use provider::{HostFacts, ProviderRegistry, Resource, Session, SystemExecutor};
//! use std::sync::Arc;
//!
//! let mut registry = ProviderRegistry::new();
//! hostkit::register_all(&mut registry).expect("built-in providers register");
//!
//! let session = Session::new(Arc::new(registry), HostFacts::detect(), Arc::new(SystemExecutor));
//! let report = session.converge(vec![Resource::new("package", "git").ensure("latest")]);
//! println!("{} changes", report.summary.total_changes());
//! ```
//!
//! Registration order matters: within a type, a parent is registered before
//! its children, and ties between equally specific defaults go to the
//! earlier provider.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod package;
pub mod retry;
pub mod schema;
pub mod user;

pub use retry::RetryConfig;

use provider::{CommandLocator, ProviderRegistry, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Host-dependent settings for the built-in providers.
#[derive(Debug, Clone)]
pub struct Options {
    /// Retry policy for package installs and removals
    pub retry: RetryConfig,
    /// Account database read by the user providers
    pub passwd: PathBuf,
    /// Group database read by the user providers
    pub group: PathBuf,
    /// Whether libuser tools are installed (enables `forcelocal`)
    pub libuser: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            passwd: PathBuf::from("/etc/passwd"),
            group: PathBuf::from("/etc/group"),
            libuser: false,
        }
    }
}

impl Options {
    /// Defaults, with optional tooling probed on `PATH`.
    pub fn detect() -> Self {
        let libuser = CommandLocator::new(Vec::new())
            .locate("luseradd")
            .path()
            .is_some();
        log::debug!("libuser tools available: {libuser}");
        Self {
            libuser,
            ..Self::default()
        }
    }
}

/// Register every built-in type and provider with detected options.
pub fn register_all(registry: &mut ProviderRegistry) -> Result<()> {
    register_with(registry, &Options::detect())
}

/// Register every built-in type and provider.
pub fn register_with(registry: &mut ProviderRegistry, options: &Options) -> Result<()> {
    registry.register_type(schema::package_type())?;
    registry.register_type(schema::user_type())?;

    let retry = &options.retry;
    let dpkg = registry.register(package::dpkg::spec(retry))?;
    registry.register(package::apt::spec(&dpkg, retry))?;

    let rpm = registry.register(package::rpm::spec(retry))?;
    let yum = registry.register(package::yum::spec(&rpm, retry))?;
    registry.register(package::yum::dnf_spec(&yum))?;

    registry.register(package::brew::spec(retry))?;
    registry.register(package::pip::spec(retry))?;

    registry.register(user::useradd::spec(options))?;
    Ok(())
}

/// Registry with every built-in provider, ready to share between sessions.
pub fn registry(options: &Options) -> Result<Arc<ProviderRegistry>> {
    let mut registry = ProviderRegistry::new();
    register_with(&mut registry, options)?;
    Ok(Arc::new(registry))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Sessions over fake executables and a scripted executor.

    use super::{Options, RetryConfig, registry};
    use provider::{HostFacts, ScriptedExecutor, Session, SessionOptions};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub struct Harness {
        pub session: Session,
        pub executor: Arc<ScriptedExecutor>,
        prefix: String,
        _bin: TempDir,
    }

    impl Harness {
        pub fn new(facts: HostFacts, tools: &[&str], executor: ScriptedExecutor) -> Self {
            Self::with_options(facts, tools, executor, |_| {})
        }

        /// `tools` become empty executables on the only search path; the
        /// host's `PATH` is never consulted.
        pub fn with_options(
            facts: HostFacts,
            tools: &[&str],
            executor: ScriptedExecutor,
            tweak: impl FnOnce(&mut Options),
        ) -> Self {
            let bin = tempfile::tempdir().unwrap();
            for tool in tools {
                let path = bin.path().join(tool);
                std::fs::write(&path, "#!/bin/sh\n").unwrap();
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            }

            let mut options = Options {
                retry: RetryConfig::no_retry(),
                ..Options::default()
            };
            tweak(&mut options);

            let executor = Arc::new(executor);
            let session = Session::with_options(
                registry(&options).unwrap(),
                facts,
                executor.clone(),
                SessionOptions {
                    noop: false,
                    search_path: vec![bin.path().to_path_buf()],
                    isolated: true,
                },
            );
            Self {
                session,
                executor,
                prefix: format!("{}/", bin.path().display()),
                _bin: bin,
            }
        }

        /// Recorded command lines with the fake bin directory stripped.
        pub fn calls(&self) -> Vec<String> {
            self.executor
                .calls()
                .into_iter()
                .map(|call| call.strip_prefix(&self.prefix).map_or(call.clone(), str::to_string))
                .collect()
        }
    }

    pub fn debian() -> HostFacts {
        HostFacts::new()
            .with_fact("kernel", "linux")
            .with_fact("os.family", "debian")
            .with_fact("os.name", "debian")
            .with_fact("os.release.major", "12")
    }

    pub fn redhat(major: &str) -> HostFacts {
        HostFacts::new()
            .with_fact("kernel", "linux")
            .with_fact("os.family", "redhat")
            .with_fact("os.name", "rhel")
            .with_fact("os.release.major", major)
    }

    pub fn darwin() -> HostFacts {
        HostFacts::new()
            .with_fact("kernel", "darwin")
            .with_fact("os.family", "darwin")
            .with_fact("os.name", "darwin")
    }
}
