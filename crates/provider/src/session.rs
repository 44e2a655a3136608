//! The run-scoped session: binding, prefetch, query and convergence.
//!
//! A [`Session`] owns everything that lives for one run: host facts, the
//! executor, resolved command tables, the default-provider memo, bulk
//! enumeration results and the provider run cache. All of it is dropped by
//! [`Session::reset`].
//!
//! Caller contract:
//!
//! ```text
//! resolve_all ──▶ prefetch ──▶ sync (per instance) ──▶ flush
//! └──────────────────── converge ─────────────────────────┘
//! ```

use crate::command::{CommandLocator, CommandTable};
use crate::context::{NoProgress, ProgressCallback, ProviderContext};
use crate::error::{ProviderError, Result};
use crate::exec::Executor;
use crate::facts::HostFacts;
use crate::provider::{Lookup, PropertyHash, ProviderSpec};
use crate::registry::{self, ProviderRegistry};
use crate::report::{ApplyResult, ResourceReport, RunReport};
use crate::resource::Resource;
use crate::sync::{Observed, ProviderInstance};
use crate::value::Value;
use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Options for a session
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Compute and report changes without applying them
    pub noop: bool,
    /// Directories searched for provider commands before `PATH`
    pub search_path: Vec<PathBuf>,
    /// Never fall back to `PATH`
    pub isolated: bool,
}

/// A resource that could not be bound to a provider.
#[derive(Debug)]
pub struct BindFailure {
    pub resource: Resource,
    pub error: ProviderError,
}

type Enumeration = Option<Arc<Vec<PropertyHash>>>;

/// Run-scoped registry value with explicit [`reset`](Session::reset).
pub struct Session {
    registry: Arc<ProviderRegistry>,
    facts: HostFacts,
    executor: Arc<dyn Executor>,
    locator: CommandLocator,
    noop: bool,
    run_cache: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    defaults: Mutex<HashMap<String, Arc<ProviderSpec>>>,
    enumerations: Mutex<HashMap<String, Enumeration>>,
}

impl Session {
    /// Create a session with default options.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        facts: HostFacts,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self::with_options(registry, facts, executor, SessionOptions::default())
    }

    /// Create a session with explicit options.
    pub fn with_options(
        registry: Arc<ProviderRegistry>,
        facts: HostFacts,
        executor: Arc<dyn Executor>,
        options: SessionOptions,
    ) -> Self {
        Self {
            registry,
            facts,
            executor,
            locator: if options.isolated {
                CommandLocator::isolated(options.search_path)
            } else {
                CommandLocator::new(options.search_path)
            },
            noop: options.noop,
            run_cache: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            enumerations: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn facts(&self) -> &HostFacts {
        &self.facts
    }

    /// Whether changes are only reported.
    pub fn is_noop(&self) -> bool {
        self.noop
    }

    pub(crate) fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub(crate) fn locator(&self) -> &CommandLocator {
        &self.locator
    }

    pub(crate) fn cache_get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.run_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn cache_put(&self, key: String, value: Arc<dyn Any + Send + Sync>) {
        self.run_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    pub(crate) fn cache_remove(&self, key: &str) {
        self.run_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Drop every session-level cache. Safe to call repeatedly.
    pub fn reset(&self) {
        self.locator.reset();
        self.run_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.enumerations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        log::debug!("Session caches cleared");
    }

    /// A provider context outside of sync, e.g. for listing or diagnostics.
    pub fn context<'a>(
        &'a self,
        spec: &'a ProviderSpec,
        resource: Option<&'a Resource>,
    ) -> ProviderContext<'a> {
        ProviderContext::new(self, spec, resource)
    }

    /// Resolved command table of a provider.
    pub fn commands(&self, spec: &ProviderSpec) -> Arc<CommandTable> {
        self.locator.table(spec.name(), &spec.effective_commands())
    }

    /// Why a provider is unusable here; empty when it is suitable.
    pub fn unsuitable_reasons(&self, spec: &ProviderSpec) -> Vec<String> {
        let table = self.commands(spec);
        let mut reasons: Vec<String> = spec
            .effective_confines()
            .into_iter()
            .filter(|confine| !confine.holds(&self.facts, &table))
            .map(ToString::to_string)
            .collect();
        reasons.extend(
            table
                .missing_mandatory()
                .into_iter()
                .map(|missing| format!("missing command {missing}")),
        );
        reasons
    }

    /// Whether a provider is usable on this host.
    pub fn is_suitable(&self, spec: &ProviderSpec) -> bool {
        self.unsuitable_reasons(spec).is_empty()
    }

    /// Suitable providers of a type, in registration order.
    pub fn suitable(&self, type_name: &str) -> Result<Vec<Arc<ProviderSpec>>> {
        Ok(self
            .registry
            .providers(type_name)?
            .iter()
            .filter(|spec| self.is_suitable(spec))
            .cloned()
            .collect())
    }

    /// Default provider of a type on this host, memoized per session.
    pub fn default_provider(&self, type_name: &str, resource_name: &str) -> Result<Arc<ProviderSpec>> {
        if let Some(spec) = self
            .defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
        {
            return Ok(Arc::clone(spec));
        }

        let suitable = self.suitable(type_name)?;
        let chosen = registry::select_default(type_name, resource_name, &suitable, &self.facts)?;
        self.defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.to_string(), Arc::clone(&chosen));
        Ok(chosen)
    }

    /// Pick the provider for a resource: the pinned one if suitable,
    /// otherwise the default.
    pub fn resolve(&self, resource: &Resource) -> Result<Arc<ProviderSpec>> {
        let Some(pinned) = resource.provider() else {
            return self.default_provider(resource.type_name(), resource.name());
        };

        let spec = self.registry.provider(resource.type_name(), pinned)?;
        let reasons = self.unsuitable_reasons(spec);
        if !reasons.is_empty() {
            return Err(ProviderError::UnknownProvider {
                type_name: resource.type_name().to_string(),
                provider: pinned.to_string(),
                reason: format!("not suitable on this host ({})", reasons.join("; ")),
            });
        }
        Ok(Arc::clone(spec))
    }

    /// Bind a resource to its provider.
    ///
    /// Validates attributes against the schema and checks the features the
    /// parameters need. Desired values are checked at sync, once the diff
    /// shows which of them differ.
    pub fn bind(&self, resource: Resource) -> Result<ProviderInstance> {
        let schema = self.registry.schema(resource.type_name())?;
        for (name, _) in resource.should_values().chain(resource.parameters()) {
            if schema.attr(name).is_none() {
                return Err(ProviderError::UnknownAttribute {
                    type_name: resource.type_name().to_string(),
                    attribute: name.to_string(),
                });
            }
        }

        let spec = self.resolve(&resource)?;
        for (name, value) in resource.parameters() {
            self.check_features(&spec, &resource, name, value)?;
        }

        log::debug!("{} bound to provider {}", resource, spec.name());
        Ok(ProviderInstance::new(resource, spec))
    }

    /// Fail unless `spec` declares every feature `attribute = value` needs.
    pub(crate) fn check_features(
        &self,
        spec: &ProviderSpec,
        resource: &Resource,
        attribute: &str,
        value: &Value,
    ) -> Result<()> {
        let schema = self.registry.schema(resource.type_name())?;
        let scheme = spec.version_scheme();
        let required = schema.required_features(attribute, value, scheme.as_ref());
        match spec.effective_features().first_missing(&required) {
            Some(missing) => Err(ProviderError::PropertyNotManageable {
                resource: resource.title(),
                attribute: attribute.to_string(),
                feature: missing.to_string(),
                provider: spec.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Bind a batch, keeping catalog order; failures stay per resource.
    pub fn resolve_all(
        &self,
        resources: Vec<Resource>,
    ) -> Vec<std::result::Result<ProviderInstance, BindFailure>> {
        resources
            .into_iter()
            .map(|resource| {
                let copy = resource.clone();
                self.bind(resource)
                    .map_err(|error| BindFailure { resource: copy, error })
            })
            .collect()
    }

    /// Bulk enumeration for a provider, borrowing its source's if needed.
    fn enumeration(&self, spec: &ProviderSpec) -> Enumeration {
        let mut candidates: Vec<&ProviderSpec> = vec![spec];
        if spec.source() != spec.name()
            && let Ok(source) = self.registry.provider(spec.type_name(), spec.source())
            && self.is_suitable(source)
        {
            candidates.push(source);
        }

        for candidate in candidates {
            if let Some(memo) = self
                .enumerations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(candidate.name())
            {
                if memo.is_some() {
                    return memo.clone();
                }
                continue;
            }

            let Some(lifecycle) = candidate.lifecycle() else {
                continue;
            };
            let ctx = ProviderContext::new(self, candidate, None);
            let result = match lifecycle.instances(&ctx) {
                Ok(Some(found)) => {
                    log::debug!("Prefetched {} entities from {}", found.len(), candidate.name());
                    Some(Arc::new(found))
                }
                Ok(None) => None,
                Err(e) => {
                    log::warn!(
                        "Prefetch with {} failed, falling back to per-resource queries: {}",
                        candidate.name(),
                        e
                    );
                    None
                }
            };
            self.enumerations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(candidate.name().to_string(), result.clone());
            if result.is_some() {
                return result;
            }
        }
        None
    }

    /// Forget enumerations a mutation by this provider may have staled.
    pub(crate) fn invalidate_enumeration(&self, spec: &ProviderSpec) {
        let mut memo = self
            .enumerations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        memo.remove(spec.name());
        memo.remove(spec.source());
    }

    /// Attach observed state to instances from bulk enumeration.
    ///
    /// Never mutates the host. Instances whose provider cannot enumerate (or
    /// whose enumeration failed) stay unobserved and are queried at sync.
    pub fn prefetch<'a, I>(&self, instances: I)
    where
        I: IntoIterator<Item = &'a mut ProviderInstance>,
    {
        for instance in instances {
            if !matches!(instance.observed(), Observed::Unknown) {
                continue;
            }
            let Some(all) = self.enumeration(instance.spec()) else {
                continue;
            };
            let matches: Vec<PropertyHash> = all
                .iter()
                .filter(|hash| hash.name == instance.resource().name())
                .cloned()
                .collect();
            instance.attach(matches);
        }
    }

    /// Look up one instance that prefetch did not cover.
    pub fn query(&self, instance: &mut ProviderInstance) -> Result<()> {
        if !matches!(instance.observed(), Observed::Unknown) {
            return Ok(());
        }
        let spec = Arc::clone(instance.spec());
        let lifecycle = spec.require_lifecycle()?;
        let lookup = {
            let ctx = ProviderContext::new(self, &spec, Some(instance.resource()));
            lifecycle.query(&ctx, instance.resource())?
        };
        instance.observe(match lookup {
            Lookup::Found(hash) => Observed::Found(hash),
            Lookup::NotFound => Observed::NotFound,
        });
        Ok(())
    }

    /// Bind, prefetch, sync and flush a batch of resources.
    pub fn converge(&self, resources: Vec<Resource>) -> RunReport {
        self.converge_with_progress(resources, &mut NoProgress)
    }

    /// [`Session::converge`] with progress callbacks.
    pub fn converge_with_progress<P: ProgressCallback>(
        &self,
        resources: Vec<Resource>,
        progress: &mut P,
    ) -> RunReport {
        let mut report = RunReport::start(self.noop);
        let mut bound = self.resolve_all(resources);
        self.prefetch(bound.iter_mut().filter_map(|b| b.as_mut().ok()));

        for entry in bound {
            match entry {
                Err(failure) => {
                    let title = failure.resource.title();
                    log::warn!("{}: {}", title, failure.error);
                    let result = ApplyResult::failed(&failure.error);
                    progress.on_resource_complete(&title, &result);
                    report.push(ResourceReport {
                        resource: title,
                        provider: None,
                        result,
                        changes: Vec::new(),
                    });
                }
                Ok(mut instance) => {
                    let title = instance.resource().title();
                    progress.on_resource_start(&title, instance.spec().name());

                    let result = match self
                        .sync(&mut instance)
                        .and_then(|result| self.flush(&mut instance).map(|()| result))
                    {
                        Ok(result) => result,
                        Err(e) => {
                            log::warn!("{}: {}", title, e);
                            ApplyResult::failed(&e)
                        }
                    };

                    progress.on_resource_complete(&title, &result);
                    report.push(ResourceReport {
                        resource: title,
                        provider: Some(instance.spec().name().to_string()),
                        result,
                        changes: instance.last_changes().to_vec(),
                    });
                }
            }
        }

        report.finish();
        report
    }
}
