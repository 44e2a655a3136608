//! Provider features (capability tags).
//!
//! A feature is an opaque name. Attributes and ensure values declare which
//! feature they need; a provider either declares it or not. Features are
//! additive across inheritance: a child provider has every feature of its
//! parent.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// An opaque capability tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Feature(String);

impl Feature {
    /// Can report and request a specific version
    pub const VERSIONABLE: &'static str = "versionable";
    /// Can move to the newest available version
    pub const UPGRADEABLE: &'static str = "upgradeable";
    /// Can pin an entity against upgrades
    pub const HOLDABLE: &'static str = "holdable";
    /// Can remove an entity together with its configuration
    pub const PURGEABLE: &'static str = "purgeable";
    /// Accepts extra command-line flags
    pub const INSTALL_OPTIONS: &'static str = "install_options";
    /// Understands version range expressions
    pub const VERSION_RANGES: &'static str = "version_ranges";
    /// Can move to an older version
    pub const DOWNGRADABLE: &'static str = "downgradable";
    /// Keeps several installed versions side by side
    pub const INSTALL_ONLY: &'static str = "install_only";

    /// Create a feature from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The feature name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Feature {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An ordered set of features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<Feature>);

impl FeatureSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature.
    pub fn insert(&mut self, feature: impl Into<Feature>) {
        self.0.insert(feature.into());
    }

    /// Check whether a feature is declared.
    pub fn declares(&self, feature: &str) -> bool {
        self.0.iter().any(|f| f.name() == feature)
    }

    /// Return the first feature of `required` that is missing.
    pub fn first_missing<'a>(&self, required: &'a [Feature]) -> Option<&'a Feature> {
        required.iter().find(|f| !self.declares(f.name()))
    }

    /// Merge another set into this one.
    pub fn extend(&mut self, other: &FeatureSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Iterate features in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.0.iter()
    }

    /// Number of declared features.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<F: Into<Feature>> FromIterator<F> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declares() {
        let set: FeatureSet = [Feature::VERSIONABLE, Feature::HOLDABLE].into_iter().collect();
        assert!(set.declares("holdable"));
        assert!(!set.declares("purgeable"));
    }

    #[test]
    fn test_first_missing() {
        let set: FeatureSet = [Feature::VERSIONABLE].into_iter().collect();
        let required = vec![Feature::new(Feature::VERSIONABLE), Feature::new(Feature::VERSION_RANGES)];
        assert_eq!(
            set.first_missing(&required).map(Feature::name),
            Some("version_ranges")
        );
    }

    #[test]
    fn test_extend_is_additive() {
        let mut child: FeatureSet = ["install_options"].into_iter().collect();
        let parent: FeatureSet = ["versionable", "install_options"].into_iter().collect();
        child.extend(&parent);
        assert_eq!(child.len(), 2);
    }
}
