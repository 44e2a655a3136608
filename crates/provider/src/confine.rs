//! Confine predicates and default rules.
//!
//! Confines decide whether a provider is usable on this host at all; default
//! rules decide which usable provider is preferred. Both are evaluated
//! against [`HostFacts`] only, so evaluation is pure and repeatable.

use crate::command::CommandTable;
use crate::facts::HostFacts;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Host predicate with a label, for checks no other variant covers.
pub type ProbeFn = Arc<dyn Fn(&HostFacts) -> bool + Send + Sync>;

/// A single suitability predicate.
#[derive(Clone)]
pub enum Confine {
    /// Fact equals one of the values (case-insensitive)
    Fact { name: String, values: Vec<String> },
    /// Numeric fact within an inclusive range
    FactRange {
        name: String,
        min: Option<i64>,
        max: Option<i64>,
    },
    /// Path exists on the host
    Exists(PathBuf),
    /// Declared command symbol resolved
    Command(String),
    /// Host feature flag is set
    Feature(String),
    /// Literal boolean
    Bool { label: String, value: bool },
    /// Arbitrary labelled check
    Probe { label: String, check: ProbeFn },
}

impl Confine {
    /// Fact must equal one of `values`.
    pub fn fact(name: &str, values: &[&str]) -> Self {
        Self::Fact {
            name: name.to_string(),
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Numeric fact must fall within `min..=max`.
    pub fn fact_range(name: &str, min: Option<i64>, max: Option<i64>) -> Self {
        Self::FactRange {
            name: name.to_string(),
            min,
            max,
        }
    }

    /// Path must exist.
    pub fn exists(path: impl Into<PathBuf>) -> Self {
        Self::Exists(path.into())
    }

    /// Declared command must resolve.
    pub fn command(symbol: &str) -> Self {
        Self::Command(symbol.to_string())
    }

    /// Host feature flag must be set.
    pub fn feature(name: &str) -> Self {
        Self::Feature(name.to_string())
    }

    /// Literal boolean.
    pub fn boolean(label: &str, value: bool) -> Self {
        Self::Bool {
            label: label.to_string(),
            value,
        }
    }

    /// Labelled probe over host facts.
    pub fn probe<F>(label: &str, check: F) -> Self
    where
        F: Fn(&HostFacts) -> bool + Send + Sync + 'static,
    {
        Self::Probe {
            label: label.to_string(),
            check: Arc::new(check),
        }
    }

    /// Evaluate against host facts and the provider's command table.
    pub fn holds(&self, facts: &HostFacts, commands: &CommandTable) -> bool {
        match self {
            Self::Fact { name, values } => facts.matches(name, values),
            Self::FactRange { name, min, max } => match facts.number(name) {
                Some(n) => min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi),
                None => false,
            },
            Self::Exists(path) => path.exists(),
            Self::Command(symbol) => commands.is_available(symbol),
            Self::Feature(name) => facts.has_feature(name),
            Self::Bool { value, .. } => *value,
            Self::Probe { check, .. } => check(facts),
        }
    }
}

impl fmt::Display for Confine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fact { name, values } => write!(f, "{} in [{}]", name, values.join(", ")),
            Self::FactRange { name, min, max } => {
                let lo = min.map_or_else(String::new, |v| v.to_string());
                let hi = max.map_or_else(String::new, |v| v.to_string());
                write!(f, "{name} in {lo}..{hi}")
            }
            Self::Exists(path) => write!(f, "{} exists", path.display()),
            Self::Command(symbol) => write!(f, "command {symbol} available"),
            Self::Feature(name) => write!(f, "host feature {name}"),
            Self::Bool { label, value } => write!(f, "{label} ({value})"),
            Self::Probe { label, .. } => write!(f, "{label}"),
        }
    }
}

impl fmt::Debug for Confine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Confine({self})")
    }
}

/// A conjunction of fact and feature conditions.
///
/// Used for both default and not-default rules. The number of conditions
/// is the rule's weight when ranking default providers.
#[derive(Debug, Clone, Default)]
pub struct DefaultRule {
    conditions: Vec<Confine>,
}

impl DefaultRule {
    /// Create an empty rule (always holds, weight zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact condition.
    pub fn fact(mut self, name: &str, values: &[&str]) -> Self {
        self.conditions.push(Confine::fact(name, values));
        self
    }

    /// Add a numeric range condition.
    pub fn range(mut self, name: &str, min: Option<i64>, max: Option<i64>) -> Self {
        self.conditions.push(Confine::fact_range(name, min, max));
        self
    }

    /// Add a host feature condition.
    pub fn feature(mut self, name: &str) -> Self {
        self.conditions.push(Confine::feature(name));
        self
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when the rule has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check whether every condition holds.
    pub fn holds(&self, facts: &HostFacts) -> bool {
        let no_commands = CommandTable::default();
        self.conditions.iter().all(|c| c.holds(facts, &no_commands))
    }
}

impl fmt::Display for DefaultRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("always");
        }
        let parts: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" and "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redhat(major: &str) -> HostFacts {
        HostFacts::new()
            .with_fact("kernel", "linux")
            .with_fact("os.family", "RedHat")
            .with_fact("os.release.major", major)
    }

    #[test]
    fn test_fact_confine() {
        let facts = redhat("7");
        let table = CommandTable::default();
        assert!(Confine::fact("os.family", &["redhat", "suse"]).holds(&facts, &table));
        assert!(!Confine::fact("os.family", &["debian"]).holds(&facts, &table));
    }

    #[test]
    fn test_range_confine() {
        let table = CommandTable::default();
        let confine = Confine::fact_range("os.release.major", Some(4), Some(7));
        assert!(confine.holds(&redhat("7"), &table));
        assert!(!confine.holds(&redhat("8"), &table));
        assert!(!confine.holds(&HostFacts::new(), &table));

        let open = Confine::fact_range("os.release.major", Some(8), None);
        assert!(open.holds(&redhat("9"), &table));
    }

    #[test]
    fn test_command_confine_uses_table() {
        let table = CommandTable::default();
        assert!(!Confine::command("install").holds(&HostFacts::new(), &table));
    }

    #[test]
    fn test_probe_and_bool() {
        let table = CommandTable::default();
        let facts = redhat("8");
        let probe = Confine::probe("modern rhel", |f| f.number("os.release.major") >= Some(8));
        assert!(probe.holds(&facts, &table));
        assert!(!Confine::boolean("disabled", false).holds(&facts, &table));
        assert_eq!(probe.to_string(), "modern rhel");
    }

    #[test]
    fn test_confine_is_deterministic() {
        let table = CommandTable::default();
        let facts = redhat("7");
        let confine = Confine::fact("os.family", &["redhat"]);
        let first = confine.holds(&facts, &table);
        for _ in 0..10 {
            assert_eq!(confine.holds(&facts, &table), first);
        }
    }

    #[test]
    fn test_default_rule() {
        let rule = DefaultRule::new()
            .fact("os.family", &["redhat"])
            .range("os.release.major", Some(4), Some(7));
        assert_eq!(rule.len(), 2);
        assert!(rule.holds(&redhat("6")));
        assert!(!rule.holds(&redhat("9")));
        assert!(DefaultRule::new().holds(&HostFacts::new()));
    }
}
