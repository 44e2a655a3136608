//! Diff computation between desired and observed state

use crate::provider::PropertyHash;
use crate::resource::{ENSURE, Resource};
use crate::value::Value;
use crate::version::VersionScheme;
use serde::Serialize;
use std::cmp::Ordering;

/// One attribute that differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyChange {
    pub attribute: String,
    pub is: Value,
    pub should: Value,
}

impl PropertyChange {
    fn new(attribute: &str, is: Value, should: Value) -> Self {
        Self {
            attribute: attribute.to_string(),
            is,
            should,
        }
    }

    /// Check if this change moves a version backwards
    pub fn is_downgrade(&self, scheme: &dyn VersionScheme) -> bool {
        match (&self.is, &self.should) {
            (Value::Text(is), Value::Text(should)) if self.attribute == ENSURE => {
                scheme.compare(should, is) == Ordering::Less
            }
            _ => false,
        }
    }
}

/// What sync has to do for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Nothing differs
    InSync,
    /// Entity is missing and must be created with `ensure`
    Create {
        ensure: Value,
        changes: Vec<PropertyChange>,
    },
    /// Entity exists and must be removed (`Absent` or `Purged`)
    Destroy {
        ensure: Value,
        changes: Vec<PropertyChange>,
    },
    /// Entity exists; these attributes go through their setters
    Update(Vec<PropertyChange>),
}

impl Plan {
    /// Every differing attribute
    pub fn changes(&self) -> &[PropertyChange] {
        match self {
            Self::InSync => &[],
            Self::Create { changes, .. } | Self::Destroy { changes, .. } | Self::Update(changes) => {
                changes
            }
        }
    }

    /// Check if there is anything to do
    pub fn is_in_sync(&self) -> bool {
        matches!(self, Self::InSync)
    }

    /// Short description for noop reports
    pub fn describe(&self) -> String {
        match self {
            Self::InSync => "in sync".to_string(),
            Self::Create { ensure, .. } => format!("would create ({ensure})"),
            Self::Destroy { ensure, .. } => format!("would remove ({ensure})"),
            Self::Update(changes) => {
                let parts: Vec<String> = changes
                    .iter()
                    .map(|c| format!("{}: {} -> {}", c.attribute, c.is, c.should))
                    .collect();
                format!("would change {}", parts.join(", "))
            }
        }
    }
}

/// Check whether an observed ensure value satisfies a desired one.
///
/// `should` is already resolved: `latest` is a concrete version when the
/// provider could tell, and a range is the chosen version.
pub fn ensure_in_sync(scheme: &dyn VersionScheme, should: &Value, is: &Value) -> bool {
    if should == is {
        return true;
    }
    match should {
        Value::Absent | Value::Purged => is.is_absent_like(),
        Value::Present | Value::Latest => is.is_present_like(),
        Value::Held => false,
        Value::Text(version) => is.as_text().is_some_and(|current| scheme.same(current, version)),
        Value::List(_) | Value::Integer(_) => false,
    }
}

/// Compute the plan for a resource.
///
/// `ensure` is the resolved desired ensure value (or `None` when the
/// resource does not manage existence). Property differences are only
/// considered for an entity that exists and stays.
pub fn compute(
    resource: &Resource,
    current: Option<&PropertyHash>,
    ensure: Option<&Value>,
    scheme: &dyn VersionScheme,
) -> Plan {
    let is_ensure = current.map_or(Value::Absent, |h| h.ensure.clone());
    let exists = !is_ensure.is_absent_like();
    // versions compare against the observed version even when ensure is
    // symbolic (held)
    let comparable = |should: &Value| match (should, current.and_then(PropertyHash::version)) {
        (Value::Text(_), Some(version)) => Value::text(version),
        _ => is_ensure.clone(),
    };

    match ensure {
        Some(should) if should.is_absent_like() => {
            if ensure_in_sync(scheme, should, &is_ensure) {
                Plan::InSync
            } else {
                Plan::Destroy {
                    ensure: should.clone(),
                    changes: vec![PropertyChange::new(ENSURE, is_ensure, should.clone())],
                }
            }
        }
        Some(should) if !exists => {
            let mut changes = vec![PropertyChange::new(ENSURE, is_ensure, should.clone())];
            changes.extend(
                resource
                    .should_values()
                    .filter(|(name, _)| *name != ENSURE)
                    .map(|(name, value)| PropertyChange::new(name, Value::Absent, value.clone())),
            );
            Plan::Create {
                ensure: should.clone(),
                changes,
            }
        }
        _ if !exists => {
            log::debug!("{}: absent and ensure unmanaged, skipping properties", resource);
            Plan::InSync
        }
        _ => {
            let mut changes = Vec::new();
            if let Some(should) = ensure {
                let is = comparable(should);
                if !ensure_in_sync(scheme, should, &is) {
                    changes.push(PropertyChange::new(ENSURE, is, should.clone()));
                }
            }
            for (name, should) in resource.should_values() {
                if name == ENSURE {
                    continue;
                }
                let is = current
                    .and_then(|h| h.get(name))
                    .cloned()
                    .unwrap_or(Value::Absent);
                if !should.matches(&is) {
                    changes.push(PropertyChange::new(name, is, should.clone()));
                }
            }
            if changes.is_empty() {
                Plan::InSync
            } else {
                Plan::Update(changes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{SegmentScheme, SemverScheme};

    fn user(shell: &str) -> Resource {
        Resource::new("user", "deploy")
            .ensure("present")
            .with_property("shell", Value::text(shell))
            .with_property("groups", Value::list(["wheel", "docker"]))
    }

    fn observed(shell: &str) -> PropertyHash {
        PropertyHash::new("deploy", Value::Present)
            .with_property("shell", Value::text(shell))
            .with_property("groups", Value::list(["docker", "wheel"]))
    }

    #[test]
    fn test_in_sync() {
        let res = user("/bin/bash");
        let plan = compute(&res, Some(&observed("/bin/bash")), res.ensure_value(), &SegmentScheme);
        assert!(plan.is_in_sync());
    }

    #[test]
    fn test_property_change() {
        let res = user("/bin/zsh");
        let plan = compute(&res, Some(&observed("/bin/bash")), res.ensure_value(), &SegmentScheme);
        let changes = plan.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].attribute, "shell");
        assert_eq!(changes[0].is, Value::text("/bin/bash"));
        assert!(plan.describe().contains("shell: /bin/bash -> /bin/zsh"));
    }

    #[test]
    fn test_create_when_missing() {
        let res = user("/bin/zsh");
        let plan = compute(&res, None, res.ensure_value(), &SegmentScheme);
        assert!(matches!(plan, Plan::Create { ensure: Value::Present, .. }));
        assert_eq!(plan.changes().len(), 3);
    }

    #[test]
    fn test_destroy_and_purged_absent() {
        let res = Resource::new("package", "nginx").ensure("purged");
        let current = PropertyHash::new("nginx", Value::text("1.18"));
        let plan = compute(&res, Some(&current), res.ensure_value(), &SegmentScheme);
        assert!(matches!(plan, Plan::Destroy { ensure: Value::Purged, .. }));

        // purged is satisfied by absent
        let plan = compute(&res, None, res.ensure_value(), &SegmentScheme);
        assert!(plan.is_in_sync());
    }

    #[test]
    fn test_version_change() {
        let res = Resource::new("package", "nginx").ensure("1.4");
        let current = PropertyHash::new("nginx", Value::text("1.0"));
        let plan = compute(&res, Some(&current), res.ensure_value(), &SemverScheme);
        let Plan::Update(changes) = plan else {
            panic!("expected update");
        };
        assert_eq!(changes[0].should, Value::text("1.4"));
        assert!(!changes[0].is_downgrade(&SemverScheme));

        let current = PropertyHash::new("nginx", Value::text("1.4.0"));
        assert!(compute(&res, Some(&current), res.ensure_value(), &SemverScheme).is_in_sync());
    }

    #[test]
    fn test_downgrade_detection() {
        let change = PropertyChange::new(ENSURE, Value::text("2.0"), Value::text("1.9"));
        assert!(change.is_downgrade(&SegmentScheme));
    }

    #[test]
    fn test_ensure_in_sync_rules() {
        let s = SegmentScheme;
        assert!(ensure_in_sync(&s, &Value::Present, &Value::text("1.0")));
        assert!(ensure_in_sync(&s, &Value::Latest, &Value::Latest));
        assert!(!ensure_in_sync(&s, &Value::Held, &Value::Present));
        assert!(ensure_in_sync(&s, &Value::Held, &Value::Held));
        assert!(ensure_in_sync(&s, &Value::Present, &Value::Held));
        assert!(ensure_in_sync(&s, &Value::Purged, &Value::Absent));
        assert!(!ensure_in_sync(&s, &Value::Absent, &Value::Present));
    }

    #[test]
    fn test_held_entity_keeps_its_version() {
        let held = PropertyHash::new("nginx", Value::Held).with_private("version", "1.22.1-9");

        let res = Resource::new("package", "nginx").ensure("held");
        assert!(compute(&res, Some(&held), res.ensure_value(), &SegmentScheme).is_in_sync());

        let res = Resource::new("package", "nginx").ensure("present");
        assert!(compute(&res, Some(&held), res.ensure_value(), &SegmentScheme).is_in_sync());

        let same = Value::text("1.22.1-9");
        assert!(compute(&res, Some(&held), Some(&same), &SegmentScheme).is_in_sync());

        let newer = Value::text("1.24.0-2");
        let plan = compute(&res, Some(&held), Some(&newer), &SegmentScheme);
        assert_eq!(plan.changes()[0].is, Value::text("1.22.1-9"));
    }

    #[test]
    fn test_properties_ignored_without_entity() {
        let res = Resource::new("user", "ghost").with_property("shell", Value::text("/bin/sh"));
        assert!(compute(&res, None, None, &SegmentScheme).is_in_sync());
    }
}
