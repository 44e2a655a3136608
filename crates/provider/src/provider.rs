//! Provider specifications and the provider contract.
//!
//! A [`ProviderSpec`] is the static description of one backend: which host
//! it suits, which commands and features it has, and the strategy objects
//! that do the work. Inheritance is composition: a spec may name a parent
//! and overlays it additively.
//!
//! ```text
//!   dpkg ──parent──▶ apt
//!    │                │ confines:  dpkg's + own
//!    │                │ commands:  dpkg's, redeclared symbols replaced
//!    │                │ features:  union
//!    │                │ lifecycle: own, else dpkg's
//!    └─ source "dpkg" ┘ defaults:  own only
//! ```

use crate::command::CommandDecl;
use crate::confine::{Confine, DefaultRule};
use crate::context::ProviderContext;
use crate::error::{ProviderError, Result};
use crate::feature::{Feature, FeatureSet};
use crate::resource::Resource;
use crate::value::Value;
use crate::version::{SegmentScheme, VersionScheme};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Observed state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyHash {
    /// Entity name
    pub name: String,
    /// Observed identity state
    pub ensure: Value,
    /// Observed property values
    pub properties: BTreeMap<String, Value>,
    /// Provider-private details (origin, variant, arch)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub private: BTreeMap<String, String>,
}

impl PropertyHash {
    /// Create a hash with only name and ensure.
    pub fn new(name: &str, ensure: Value) -> Self {
        Self {
            name: name.to_string(),
            ensure,
            properties: BTreeMap::new(),
            private: BTreeMap::new(),
        }
    }

    /// Add an observed property.
    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Add a private attribute.
    pub fn with_private(mut self, key: &str, value: &str) -> Self {
        self.private.insert(key.to_string(), value.to_string());
        self
    }

    /// Observed value of an attribute (`ensure` included).
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        if attribute == crate::resource::ENSURE {
            Some(&self.ensure)
        } else {
            self.properties.get(attribute)
        }
    }

    /// Observed version: the ensure text, or the private `version` when
    /// ensure is symbolic (a held package still has one).
    pub fn version(&self) -> Option<&str> {
        self.ensure
            .as_text()
            .or_else(|| self.private.get("version").map(String::as_str))
    }

    /// Record a value after a successful mutation.
    pub fn set(&mut self, attribute: &str, value: Value) {
        if attribute == crate::resource::ENSURE {
            self.ensure = value;
        } else {
            self.properties.insert(attribute.to_string(), value);
        }
    }
}

/// Result of a single-entity lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(PropertyHash),
    NotFound,
}

/// Core operations of a provider.
///
/// Only `query`-or-`instances`, `create` and `destroy` are essential; the
/// rest have defaults. Implementations must report a missing entity as
/// [`Lookup::NotFound`] (or leave it out of `instances`), never as an error.
pub trait Lifecycle: Send + Sync {
    /// Enumerate every existing entity, or `None` if this provider cannot.
    fn instances(&self, _ctx: &ProviderContext<'_>) -> Result<Option<Vec<PropertyHash>>> {
        Ok(None)
    }

    /// Look up one entity. Defaults to scanning [`Lifecycle::instances`].
    fn query(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
        let Some(all) = self.instances(ctx)? else {
            return Err(ProviderError::Unsupported {
                provider: ctx.provider().to_string(),
                operation: "query".to_string(),
            });
        };
        let mut matches = all.into_iter().filter(|h| h.name == resource.name());
        match (matches.next(), matches.next()) {
            (Some(found), None) => Ok(Lookup::Found(found)),
            (None, _) => Ok(Lookup::NotFound),
            (Some(first), Some(second)) => {
                let mut candidates = vec![first.ensure.to_string(), second.ensure.to_string()];
                candidates.extend(matches.map(|h| h.ensure.to_string()));
                Err(ProviderError::AmbiguousEntity {
                    resource: resource.title(),
                    candidates,
                })
            }
        }
    }

    /// Bring a missing entity into existence with the given ensure value.
    ///
    /// `Latest` arrives unresolved; version ranges arrive already resolved.
    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()>;

    /// Remove an entity. `ensure` is `Absent` or `Purged`.
    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value)
    -> Result<()>;

    /// Newest available version, if the provider can tell.
    fn latest(&self, _ctx: &ProviderContext<'_>, _resource: &Resource) -> Result<Option<String>> {
        Ok(None)
    }

    /// Every installable version, for range selection.
    fn available_versions(
        &self,
        _ctx: &ProviderContext<'_>,
        _resource: &Resource,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Commit deferred changes. Called once per resource after its setters,
    /// only when something changed.
    fn flush(
        &self,
        _ctx: &ProviderContext<'_>,
        _resource: &Resource,
        _changed: &[String],
    ) -> Result<()> {
        Ok(())
    }
}

/// Applies one property value.
pub trait Setter: Send + Sync {
    fn set(&self, ctx: &ProviderContext<'_>, resource: &Resource, value: &Value) -> Result<()>;
}

impl<F> Setter for F
where
    F: Fn(&ProviderContext<'_>, &Resource, &Value) -> Result<()> + Send + Sync,
{
    fn set(&self, ctx: &ProviderContext<'_>, resource: &Resource, value: &Value) -> Result<()> {
        self(ctx, resource, value)
    }
}

/// Static description of one provider.
pub struct ProviderSpec {
    name: String,
    type_name: String,
    description: String,
    parent: Option<Arc<ProviderSpec>>,
    source: Option<String>,
    confines: Vec<Confine>,
    defaults: Vec<DefaultRule>,
    not_defaults: Vec<DefaultRule>,
    commands: Vec<CommandDecl>,
    features: FeatureSet,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    setters: BTreeMap<String, Arc<dyn Setter>>,
    version_scheme: Option<Arc<dyn VersionScheme>>,
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("source", &self.source())
            .field("features", &self.features)
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ProviderSpec {
    /// Start building a provider for a resource type.
    pub fn builder(type_name: &str, name: &str) -> ProviderSpecBuilder {
        ProviderSpecBuilder {
            spec: Self {
                name: name.to_string(),
                type_name: type_name.to_string(),
                description: String::new(),
                parent: None,
                source: None,
                confines: Vec::new(),
                defaults: Vec::new(),
                not_defaults: Vec::new(),
                commands: Vec::new(),
                features: FeatureSet::new(),
                lifecycle: None,
                setters: BTreeMap::new(),
                version_scheme: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parent(&self) -> Option<&Arc<ProviderSpec>> {
        self.parent.as_ref()
    }

    /// Grouping tag for shared enumeration; defaults to the provider name.
    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |p| p.depth() + 1)
    }

    /// Parent chain, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &ProviderSpec> {
        std::iter::successors(self.parent.as_deref(), |p| p.parent.as_deref())
    }

    /// Own and inherited confines, root ancestor first.
    pub fn effective_confines(&self) -> Vec<&Confine> {
        let mut confines = self
            .parent
            .as_ref()
            .map(|p| p.effective_confines())
            .unwrap_or_default();
        confines.extend(self.confines.iter());
        confines
    }

    /// Commands with redeclared symbols replaced by the nearest declaration.
    pub fn effective_commands(&self) -> Vec<CommandDecl> {
        let mut by_symbol: BTreeMap<String, CommandDecl> = self
            .parent
            .as_ref()
            .map(|p| {
                p.effective_commands()
                    .into_iter()
                    .map(|d| (d.symbol.clone(), d))
                    .collect()
            })
            .unwrap_or_default();
        for decl in &self.commands {
            by_symbol.insert(decl.symbol.clone(), decl.clone());
        }
        by_symbol.into_values().collect()
    }

    /// Own and inherited features.
    pub fn effective_features(&self) -> FeatureSet {
        let mut features = self.features.clone();
        if let Some(parent) = &self.parent {
            features.extend(&parent.effective_features());
        }
        features
    }

    /// Check whether this provider (or an ancestor) declares a feature.
    pub fn declares(&self, feature: &str) -> bool {
        self.features.declares(feature) || self.parent.as_ref().is_some_and(|p| p.declares(feature))
    }

    /// Default rules declared by this spec itself (never inherited).
    pub fn defaults(&self) -> &[DefaultRule] {
        &self.defaults
    }

    /// Not-default rules declared by this spec itself.
    pub fn not_defaults(&self) -> &[DefaultRule] {
        &self.not_defaults
    }

    /// Lifecycle strategy, own or inherited.
    pub fn lifecycle(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.lifecycle
            .as_ref()
            .or_else(|| self.parent.as_ref().and_then(|p| p.lifecycle()))
    }

    /// Setter for a property, own or inherited.
    pub fn setter(&self, attribute: &str) -> Option<&Arc<dyn Setter>> {
        self.setters
            .get(attribute)
            .or_else(|| self.parent.as_ref().and_then(|p| p.setter(attribute)))
    }

    /// Version scheme, own or inherited; segment comparison otherwise.
    pub fn version_scheme(&self) -> Arc<dyn VersionScheme> {
        match &self.version_scheme {
            Some(scheme) => Arc::clone(scheme),
            None => match &self.parent {
                Some(parent) => parent.version_scheme(),
                None => Arc::new(SegmentScheme),
            },
        }
    }

    /// Lifecycle or a `Registration` error.
    pub(crate) fn require_lifecycle(&self) -> Result<&Arc<dyn Lifecycle>> {
        self.lifecycle().ok_or_else(|| {
            ProviderError::Registration(format!(
                "provider {} has no lifecycle (own or inherited)",
                self.name
            ))
        })
    }
}

/// Builder for [`ProviderSpec`].
pub struct ProviderSpecBuilder {
    spec: ProviderSpec,
}

impl ProviderSpecBuilder {
    /// Inherit from a parent spec.
    pub fn parent(mut self, parent: &Arc<ProviderSpec>) -> Self {
        self.spec.parent = Some(Arc::clone(parent));
        self
    }

    /// Share bulk enumeration with providers of the same source.
    pub fn source(mut self, source: &str) -> Self {
        self.spec.source = Some(source.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.spec.description = description.to_string();
        self
    }

    pub fn confine(mut self, confine: Confine) -> Self {
        self.spec.confines.push(confine);
        self
    }

    /// Add a default rule; any one holding makes the provider a default.
    pub fn default_for(mut self, rule: DefaultRule) -> Self {
        self.spec.defaults.push(rule);
        self
    }

    /// Add a not-default rule; any one holding vetoes default status.
    pub fn not_default_for(mut self, rule: DefaultRule) -> Self {
        self.spec.not_defaults.push(rule);
        self
    }

    /// Declare a mandatory command. Also confines the provider to hosts
    /// where it resolves.
    pub fn command(mut self, symbol: &str, executable: &str) -> Self {
        self.spec.commands.push(CommandDecl::required(symbol, executable));
        self
    }

    /// Declare an optional command.
    pub fn optional_command(mut self, symbol: &str, executable: &str) -> Self {
        self.spec.commands.push(CommandDecl::optional(symbol, executable));
        self
    }

    /// Declare a command from a prepared declaration.
    pub fn command_decl(mut self, decl: CommandDecl) -> Self {
        self.spec.commands.push(decl);
        self
    }

    pub fn feature(mut self, feature: &str) -> Self {
        self.spec.features.insert(Feature::new(feature));
        self
    }

    pub fn features(mut self, features: &[&str]) -> Self {
        for feature in features {
            self.spec.features.insert(Feature::new(*feature));
        }
        self
    }

    pub fn lifecycle(mut self, lifecycle: impl Lifecycle + 'static) -> Self {
        self.spec.lifecycle = Some(Arc::new(lifecycle));
        self
    }

    /// Register the setter for a property.
    pub fn setter<F>(mut self, attribute: &str, setter: F) -> Self
    where
        F: Fn(&ProviderContext<'_>, &Resource, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.spec
            .setters
            .insert(attribute.to_string(), Arc::new(setter));
        self
    }

    /// Register a shared setter object.
    pub fn setter_impl(mut self, attribute: &str, setter: Arc<dyn Setter>) -> Self {
        self.spec.setters.insert(attribute.to_string(), setter);
        self
    }

    pub fn version_scheme(mut self, scheme: impl VersionScheme + 'static) -> Self {
        self.spec.version_scheme = Some(Arc::new(scheme));
        self
    }

    pub fn build(self) -> ProviderSpec {
        self.spec
    }
}
