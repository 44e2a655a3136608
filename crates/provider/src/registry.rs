//! Provider registry and default-provider selection.
//!
//! The registry holds, per resource type, the schema and the provider specs
//! in registration order. Selection among suitable providers works like
//! this:
//!
//! 1. `defaulted` = suitable specs with a matching default rule of their
//!    own and no matching not-default rule.
//! 2. Rank by `100 × conditions of the best matching rule + depth`.
//! 3. Highest wins; ties go to registration order with a warning.
//!
//! Default rules are never inherited, so a child does not become a default
//! just because its parent is one.

use crate::error::{ProviderError, Result};
use crate::facts::HostFacts;
use crate::provider::ProviderSpec;
use crate::resource::ResourceType;
use std::sync::Arc;

struct TypeEntry {
    schema: ResourceType,
    providers: Vec<Arc<ProviderSpec>>,
}

/// All resource types and their providers.
#[derive(Default)]
pub struct ProviderRegistry {
    types: Vec<TypeEntry>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type.
    pub fn register_type(&mut self, schema: ResourceType) -> Result<()> {
        if self.entry(schema.name()).is_some() {
            return Err(ProviderError::Registration(format!(
                "resource type {} registered twice",
                schema.name()
            )));
        }
        log::debug!("Registered resource type {}", schema.name());
        self.types.push(TypeEntry {
            schema,
            providers: Vec::new(),
        });
        Ok(())
    }

    /// Register a provider spec and return the shared handle children use
    /// as their parent.
    pub fn register(&mut self, spec: ProviderSpec) -> Result<Arc<ProviderSpec>> {
        let entry = self
            .types
            .iter_mut()
            .find(|e| e.schema.name() == spec.type_name())
            .ok_or_else(|| ProviderError::UnknownType(spec.type_name().to_string()))?;

        if entry.providers.iter().any(|p| p.name() == spec.name()) {
            return Err(ProviderError::Registration(format!(
                "provider {} registered twice for {}",
                spec.name(),
                spec.type_name()
            )));
        }

        if let Some(parent) = spec.parent() {
            if parent.type_name() != spec.type_name() {
                return Err(ProviderError::Registration(format!(
                    "provider {} ({}) cannot inherit from {} ({})",
                    spec.name(),
                    spec.type_name(),
                    parent.name(),
                    parent.type_name()
                )));
            }
            if !entry.providers.iter().any(|p| Arc::ptr_eq(p, parent)) {
                return Err(ProviderError::Registration(format!(
                    "parent {} of provider {} is not registered",
                    parent.name(),
                    spec.name()
                )));
            }
        }

        spec.require_lifecycle()?;

        let spec = Arc::new(spec);
        log::debug!(
            "Registered provider {} for {} (source {})",
            spec.name(),
            spec.type_name(),
            spec.source()
        );
        entry.providers.push(Arc::clone(&spec));
        Ok(spec)
    }

    fn entry(&self, type_name: &str) -> Option<&TypeEntry> {
        self.types.iter().find(|e| e.schema.name() == type_name)
    }

    /// Schema of a resource type.
    pub fn schema(&self, type_name: &str) -> Result<&ResourceType> {
        self.entry(type_name)
            .map(|e| &e.schema)
            .ok_or_else(|| ProviderError::UnknownType(type_name.to_string()))
    }

    /// Resource type names in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|e| e.schema.name())
    }

    /// Providers of a type in registration order.
    pub fn providers(&self, type_name: &str) -> Result<&[Arc<ProviderSpec>]> {
        self.entry(type_name)
            .map(|e| e.providers.as_slice())
            .ok_or_else(|| ProviderError::UnknownType(type_name.to_string()))
    }

    /// Look up a provider by name.
    pub fn provider(&self, type_name: &str, name: &str) -> Result<&Arc<ProviderSpec>> {
        self.providers(type_name)?
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ProviderError::UnknownProvider {
                type_name: type_name.to_string(),
                provider: name.to_string(),
                reason: "not registered".to_string(),
            })
    }

    /// Providers sharing a source, in registration order.
    pub fn providers_by_source(&self, type_name: &str, source: &str) -> Vec<&Arc<ProviderSpec>> {
        self.providers(type_name)
            .map(|all| all.iter().filter(|p| p.source() == source).collect())
            .unwrap_or_default()
    }
}

/// Default-ranking score of a provider, or `None` if it is not a default
/// on this host.
pub fn specificity(spec: &ProviderSpec, facts: &HostFacts) -> Option<usize> {
    if spec.not_defaults().iter().any(|rule| rule.holds(facts)) {
        return None;
    }
    let weight = spec
        .defaults()
        .iter()
        .filter(|rule| rule.holds(facts))
        .map(|rule| rule.len())
        .max()?;
    Some(weight * 100 + spec.depth())
}

/// Pick the default among suitable providers (given in registration order).
pub fn select_default(
    type_name: &str,
    resource_name: &str,
    suitable: &[Arc<ProviderSpec>],
    facts: &HostFacts,
) -> Result<Arc<ProviderSpec>> {
    if suitable.is_empty() {
        return Err(ProviderError::NoSuitableProvider {
            type_name: type_name.to_string(),
            name: resource_name.to_string(),
        });
    }

    let ranked: Vec<(usize, &Arc<ProviderSpec>)> = suitable
        .iter()
        .filter_map(|spec| specificity(spec, facts).map(|score| (score, spec)))
        .collect();

    let Some(best) = ranked.iter().map(|(score, _)| *score).max() else {
        return Err(ProviderError::NoDefaultProvider {
            type_name: type_name.to_string(),
            suitable: suitable.iter().map(|p| p.name().to_string()).collect(),
        });
    };

    let top: Vec<&Arc<ProviderSpec>> = ranked
        .iter()
        .filter(|(score, _)| *score == best)
        .map(|(_, spec)| *spec)
        .collect();

    if top.len() > 1 {
        let names: Vec<&str> = top.iter().map(|p| p.name()).collect();
        log::warn!(
            "Found {} default providers for {}: {}; using {}",
            top.len(),
            type_name,
            names.join(", "),
            names[0]
        );
    }

    let chosen = Arc::clone(top[0]);
    log::debug!(
        "Default provider for {} is {} (specificity {})",
        type_name,
        chosen.name(),
        best
    );
    Ok(chosen)
}
