//! Provider instances and the sync/flush protocol.
//!
//! `sync` observes, diffs, checks, then dispatches:
//!
//! | observed → desired         | action                             |
//! |----------------------------|------------------------------------|
//! | absent → present-like      | `create` (no setters afterwards)   |
//! | present → absent / purged  | `destroy` (no setters afterwards)  |
//! | present → other ensure     | `ensure` setter (or `create`)      |
//! | property differs           | that property's setter             |
//!
//! `flush` then commits once with the list of changed attributes.

use crate::context::ProviderContext;
use crate::diff::{self, Plan, PropertyChange};
use crate::error::{ProviderError, Result};
use crate::feature::Feature;
use crate::provider::{Lifecycle, PropertyHash, ProviderSpec};
use crate::report::ApplyResult;
use crate::resource::{ENSURE, Resource};
use crate::session::Session;
use crate::value::Value;
use crate::version;
use std::sync::Arc;

/// What is known about the entity behind an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    /// Not looked up yet
    Unknown,
    Found(PropertyHash),
    NotFound,
    /// Several entities share the resource's identity
    Ambiguous(Vec<PropertyHash>),
}

/// A resource bound to its provider for one run.
#[derive(Debug)]
pub struct ProviderInstance {
    resource: Resource,
    spec: Arc<ProviderSpec>,
    observed: Observed,
    changed: Vec<String>,
    last_changes: Vec<PropertyChange>,
}

impl ProviderInstance {
    pub(crate) fn new(resource: Resource, spec: Arc<ProviderSpec>) -> Self {
        Self {
            resource,
            spec,
            observed: Observed::Unknown,
            changed: Vec::new(),
            last_changes: Vec::new(),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn spec(&self) -> &Arc<ProviderSpec> {
        &self.spec
    }

    pub fn observed(&self) -> &Observed {
        &self.observed
    }

    /// Attributes changed this run and not yet flushed.
    pub fn changed(&self) -> &[String] {
        &self.changed
    }

    /// Differences found by the last sync.
    pub fn last_changes(&self) -> &[PropertyChange] {
        &self.last_changes
    }

    pub(crate) fn observe(&mut self, observed: Observed) {
        self.observed = observed;
    }

    /// Attach the enumerated entities matching this resource's name.
    ///
    /// Several matches are ambiguous, unless the resource asks for
    /// `install_only` on a provider that keeps versions side by side; then
    /// the newest one stands for the entity.
    pub(crate) fn attach(&mut self, mut matches: Vec<PropertyHash>) {
        self.observed = match matches.len() {
            0 => Observed::NotFound,
            1 => Observed::Found(matches.remove(0)),
            _ if self.resource.param_flag(Feature::INSTALL_ONLY)
                && self.spec.declares(Feature::INSTALL_ONLY) =>
            {
                let scheme = self.spec.version_scheme();
                matches.sort_by(|a, b| {
                    scheme.compare(&a.ensure.to_string(), &b.ensure.to_string())
                });
                match matches.pop() {
                    Some(newest) => Observed::Found(newest),
                    None => Observed::NotFound,
                }
            }
            _ => Observed::Ambiguous(matches),
        };
    }
}

fn describe_candidate(hash: &PropertyHash) -> String {
    let mut text = format!("{} {}", hash.name, hash.ensure);
    if let Some(arch) = hash.private.get("arch") {
        text.push('.');
        text.push_str(arch);
    }
    text
}

impl Session {
    /// Bring one instance to its desired state.
    ///
    /// Every check (ambiguity, range, downgrade, setters) runs before the
    /// first mutation. A second sync of the same instance is a no-op.
    pub fn sync(&self, instance: &mut ProviderInstance) -> Result<ApplyResult> {
        instance.last_changes.clear();
        if matches!(instance.observed, Observed::Unknown) {
            self.query(instance)?;
        }

        let current = match &instance.observed {
            Observed::Found(hash) => Some(hash.clone()),
            Observed::NotFound | Observed::Unknown => None,
            Observed::Ambiguous(candidates) => {
                return Err(ProviderError::AmbiguousEntity {
                    resource: instance.resource.title(),
                    candidates: candidates.iter().map(describe_candidate).collect(),
                });
            }
        };

        let spec = Arc::clone(&instance.spec);
        let lifecycle = spec.require_lifecycle()?;
        let scheme = spec.version_scheme();
        let resource = &instance.resource;
        let ctx = ProviderContext::new(self, &spec, Some(resource));

        let is_ensure = current.as_ref().map_or(Value::Absent, |h| h.ensure.clone());
        let is_version = current.as_ref().and_then(PropertyHash::version);
        let ensure = self.resolve_ensure(&ctx, lifecycle.as_ref(), resource, &is_ensure, is_version)?;
        let plan = diff::compute(resource, current.as_ref(), ensure.as_ref(), scheme.as_ref());
        if plan.is_in_sync() {
            log::debug!("{} is in sync", resource);
            return Ok(ApplyResult::NoChange);
        }

        // only differing values need their features; nothing has mutated yet
        for change in plan.changes() {
            let declared = match resource.ensure_value() {
                Some(declared) if change.attribute == ENSURE => declared,
                _ => &change.should,
            };
            self.check_features(&spec, resource, &change.attribute, declared)?;
        }

        if let Some(change) = plan.changes().iter().find(|c| c.is_downgrade(scheme.as_ref()))
            && !spec.declares(Feature::DOWNGRADABLE)
        {
            return Err(ProviderError::DowngradeNotSupported {
                resource: resource.title(),
                current: change.is.to_string(),
                requested: change.should.to_string(),
                provider: spec.name().to_string(),
            });
        }
        if let Plan::Update(changes) = &plan
            && let Some(missing) = changes
                .iter()
                .find(|c| c.attribute != ENSURE && spec.setter(&c.attribute).is_none())
        {
            return Err(ProviderError::MissingSetter {
                provider: spec.name().to_string(),
                attribute: missing.attribute.clone(),
            });
        }

        instance.last_changes = plan.changes().to_vec();
        if self.is_noop() {
            log::info!("{}: {} (noop)", resource, plan.describe());
            return Ok(ApplyResult::Skipped {
                reason: plan.describe(),
            });
        }

        let result = match plan {
            Plan::Create { ensure, changes } => {
                log::info!("{}: creating ({}) with {}", resource, ensure, spec.name());
                lifecycle.create(&ctx, resource, &ensure)?;
                let mut hash = PropertyHash::new(resource.name(), ensure);
                for change in changes.into_iter().filter(|c| c.attribute != ENSURE) {
                    instance.changed.push(change.attribute.clone());
                    hash.set(&change.attribute, change.should);
                }
                instance.changed.insert(0, ENSURE.to_string());
                instance.observed = Observed::Found(hash);
                ApplyResult::Created
            }
            Plan::Destroy { ensure, .. } => {
                log::info!("{}: removing ({}) with {}", resource, ensure, spec.name());
                lifecycle.destroy(&ctx, resource, &ensure)?;
                instance.changed.push(ENSURE.to_string());
                instance.observed = Observed::NotFound;
                ApplyResult::Removed
            }
            Plan::Update(changes) => {
                let mut hash = current.unwrap_or_else(|| PropertyHash::new(resource.name(), Value::Present));
                let mut properties = Vec::with_capacity(changes.len());
                for change in changes {
                    log::info!(
                        "{}: {} changed {} -> {}",
                        resource,
                        change.attribute,
                        change.is,
                        change.should
                    );
                    match spec.setter(&change.attribute) {
                        Some(setter) => setter.set(&ctx, resource, &change.should)?,
                        None => lifecycle.create(&ctx, resource, &change.should)?,
                    }
                    hash.set(&change.attribute, change.should);
                    instance.observed = Observed::Found(hash.clone());
                    instance.changed.push(change.attribute.clone());
                    properties.push(change.attribute);
                }
                ApplyResult::Modified { properties }
            }
            Plan::InSync => ApplyResult::NoChange,
        };

        self.invalidate_enumeration(&spec);
        Ok(result)
    }

    /// Commit deferred changes of one instance.
    ///
    /// Runs the provider's flush only when sync changed something, then
    /// clears the changed list so a repeated flush does nothing.
    pub fn flush(&self, instance: &mut ProviderInstance) -> Result<()> {
        if instance.changed.is_empty() {
            return Ok(());
        }
        let spec = Arc::clone(&instance.spec);
        let lifecycle = spec.require_lifecycle()?;
        {
            let ctx = ProviderContext::new(self, &spec, Some(&instance.resource));
            log::debug!("{}: flushing {}", instance.resource, instance.changed.join(", "));
            lifecycle.flush(&ctx, &instance.resource, &instance.changed)?;
        }
        instance.changed.clear();
        Ok(())
    }
}

impl Session {
    /// Turn the desired ensure value into something comparable with `is`.
    ///
    /// `latest` becomes the provider's newest version (when the entity exists
    /// and the provider can tell), a range becomes the best available
    /// candidate unless the current version already satisfies it, and an exact
    /// version loses its `=` prefix. Asking the provider for versions needs
    /// the matching feature.
    fn resolve_ensure(
        &self,
        ctx: &ProviderContext<'_>,
        lifecycle: &dyn Lifecycle,
        resource: &Resource,
        is: &Value,
        is_version: Option<&str>,
    ) -> Result<Option<Value>> {
        let Some(should) = resource.ensure_value() else {
            return Ok(None);
        };
        if should == is || should.is_absent_like() {
            return Ok(Some(should.clone()));
        }
        let spec = ctx.spec();
        let scheme = spec.version_scheme();

        let resolved = match should {
            Value::Latest if is.is_present_like() => {
                self.check_features(spec, resource, ENSURE, should)?;
                match lifecycle.latest(ctx, resource)? {
                    Some(newest) => Value::Text(newest),
                    None => Value::Latest,
                }
            }
            Value::Text(text) if scheme.is_range(text) => {
                if let Some(current) = is_version {
                    let satisfied = scheme
                        .satisfies(current, text)
                        .map_err(|message| ProviderError::InvalidValue {
                            attribute: ENSURE.to_string(),
                            message,
                        })?;
                    if satisfied {
                        return Ok(Some(Value::Text(current.to_string())));
                    }
                }
                self.check_features(spec, resource, ENSURE, should)?;
                let candidates = lifecycle.available_versions(ctx, resource)?;
                Value::Text(version::select_best(
                    scheme.as_ref(),
                    &resource.title(),
                    text,
                    &candidates,
                )?)
            }
            Value::Text(text) => Value::Text(version::exact(text).to_string()),
            other => other.clone(),
        };
        Ok(Some(resolved))
    }
}
