//! Provider context and progress callbacks
//!
//! A [`ProviderContext`] is what lifecycle and setter code sees: the host
//! facts, the provider's resolved commands, a way to run them, and the
//! session run cache. Providers never touch the session directly.

use crate::command::{CommandDecl, CommandTable, Resolution};
use crate::error::{ProviderError, Result};
use crate::exec::{CommandOutput, Invocation};
use crate::facts::HostFacts;
use crate::provider::ProviderSpec;
use crate::report::ApplyResult;
use crate::resource::Resource;
use crate::session::Session;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a provider may use while working on one resource.
pub struct ProviderContext<'a> {
    session: &'a Session,
    spec: &'a ProviderSpec,
    commands: Arc<CommandTable>,
    resource: Option<&'a Resource>,
}

impl<'a> ProviderContext<'a> {
    pub(crate) fn new(
        session: &'a Session,
        spec: &'a ProviderSpec,
        resource: Option<&'a Resource>,
    ) -> Self {
        Self {
            session,
            spec,
            commands: session.commands(spec),
            resource,
        }
    }

    /// Name of the provider being driven.
    pub fn provider(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &ProviderSpec {
        self.spec
    }

    pub fn facts(&self) -> &HostFacts {
        self.session.facts()
    }

    /// Explicit target for a targeted command, from the bound resource.
    fn target(&self, decl: &CommandDecl) -> Option<&str> {
        let param = decl.target_param.as_deref()?;
        self.resource?.param_text(param)
    }

    fn unavailable(&self, symbol: &str) -> ProviderError {
        ProviderError::CommandUnavailable {
            provider: self.provider().to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Absolute path of a declared command.
    pub fn command(&self, symbol: &str) -> Result<PathBuf> {
        let decl = self
            .commands
            .decl(symbol)
            .ok_or_else(|| self.unavailable(symbol))?;

        if let Some(target) = self.target(decl) {
            return match self
                .session
                .locator()
                .resolve_target(self.provider(), symbol, target)
            {
                Resolution::Resolved(path) => Ok(path),
                Resolution::Unavailable => Err(self.unavailable(&format!("{symbol} ({target})"))),
            };
        }

        self.commands
            .path(symbol)
            .map(Path::to_path_buf)
            .ok_or_else(|| self.unavailable(symbol))
    }

    /// Whether a command can be invoked. Check before using optional ones.
    pub fn has_command(&self, symbol: &str) -> bool {
        self.command(symbol).is_ok()
    }

    /// Run a declared command; a non-zero exit is an error.
    pub fn run<S: AsRef<str>>(&self, symbol: &str, args: &[S]) -> Result<CommandOutput> {
        let (invocation, output) = self.invoke(symbol, args)?;
        if !output.success() {
            return Err(ProviderError::CommandFailed {
                command: invocation.display(),
                status: output.status,
                stderr: output.stderr_str().trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run a declared command and return its output whatever the exit code.
    pub fn run_unchecked<S: AsRef<str>>(&self, symbol: &str, args: &[S]) -> Result<CommandOutput> {
        self.invoke(symbol, args).map(|(_, output)| output)
    }

    fn invoke<S: AsRef<str>>(&self, symbol: &str, args: &[S]) -> Result<(Invocation, CommandOutput)> {
        let program = self.command(symbol)?;
        let env = self
            .commands
            .decl(symbol)
            .map(|d| d.env.clone())
            .unwrap_or_default();
        let invocation = Invocation {
            program,
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            env,
        };

        log::debug!("{}: executing {}", self.provider(), invocation.display());
        let output = self
            .session
            .executor()
            .execute(&invocation)
            .map_err(|source| ProviderError::Exec {
                program: invocation.program.clone(),
                source,
            })?;
        log::debug!(
            "{}: {} exited with {:?}",
            self.provider(),
            invocation.program.display(),
            output.status
        );
        Ok((invocation, output))
    }

    /// Get a run-scoped cached value, computing it on first use.
    ///
    /// Values are keyed per provider and live until [`Session::reset`].
    pub fn cached<T, F>(&self, key: &str, init: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T>,
    {
        let full_key = format!("{}::{}", self.provider(), key);
        if let Some(hit) = self.session.cache_get(&full_key)
            && let Ok(value) = hit.downcast::<T>()
        {
            return Ok(value);
        }

        let value = Arc::new(init()?);
        let erased: Arc<dyn Any + Send + Sync> = value.clone();
        self.session.cache_put(full_key, erased);
        Ok(value)
    }

    /// Drop a run-scoped cached value.
    pub fn invalidate(&self, key: &str) {
        self.session
            .cache_remove(&format!("{}::{}", self.provider(), key));
    }
}

/// Progress callback for convergence runs
///
/// Implement this trait to receive progress updates while a catalog is
/// applied.
pub trait ProgressCallback {
    /// Called before a resource is synced
    fn on_resource_start(&mut self, title: &str, provider: &str);

    /// Called when a resource has been synced and flushed
    fn on_resource_complete(&mut self, title: &str, result: &ApplyResult);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_resource_start(&mut self, _title: &str, _provider: &str) {}
    fn on_resource_complete(&mut self, _title: &str, _result: &ApplyResult) {}
}
