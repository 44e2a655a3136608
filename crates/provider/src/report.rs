//! Per-resource results and the run report

use crate::diff::PropertyChange;
use crate::error::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of converging one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyResult {
    /// Already in the desired state
    NoChange,
    /// Entity was created
    Created,
    /// Properties (or the ensure version) were changed
    Modified { properties: Vec<String> },
    /// Entity was removed
    Removed,
    /// Sync or flush failed
    Failed {
        error: String,
        category: ErrorCategory,
    },
    /// Changes were computed but not applied
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified { .. } | Self::Removed)
    }

    /// Build a failure from a provider error
    pub fn failed(error: &crate::error::ProviderError) -> Self {
        Self::Failed {
            error: error.to_string(),
            category: error.category(),
        }
    }
}

/// Outcome for one resource in a run
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    /// `type[name]`
    pub resource: String,
    /// Bound provider, if binding succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(flatten)]
    pub result: ApplyResult,
    /// Differences found (applied, or would be applied in noop mode)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<PropertyChange>,
}

/// Summary of convergence results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl RunSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &RunSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified { .. } => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Report of one convergence run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub noop: bool,
    pub resources: Vec<ResourceReport>,
    pub summary: RunSummary,
}

impl RunReport {
    /// Start an empty report.
    pub fn start(noop: bool) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            noop,
            resources: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    /// Record one resource outcome.
    pub fn push(&mut self, report: ResourceReport) {
        self.summary.add_result(&report.result);
        self.resources.push(report);
    }

    /// Append every resource of another report (e.g. another type's run).
    pub fn absorb(&mut self, other: RunReport) {
        self.summary.merge(&other.summary);
        self.resources.extend(other.resources);
        self.finished_at = self.finished_at.max(other.finished_at);
    }

    /// Stamp the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Run duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn test_summary_counts() {
        let mut report = RunReport::start(false);
        for result in [
            ApplyResult::Created,
            ApplyResult::NoChange,
            ApplyResult::Modified {
                properties: vec!["shell".into()],
            },
            ApplyResult::failed(&ProviderError::UnknownType("service".into())),
        ] {
            report.push(ResourceReport {
                resource: "x[y]".into(),
                provider: None,
                result,
                changes: Vec::new(),
            });
        }

        assert_eq!(report.summary.total(), 4);
        assert_eq!(report.summary.total_changes(), 2);
        assert!(!report.summary.is_success());
    }

    #[test]
    fn test_absorb() {
        let mut a = RunReport::start(true);
        let mut b = RunReport::start(true);
        b.push(ResourceReport {
            resource: "user[deploy]".into(),
            provider: Some("useradd".into()),
            result: ApplyResult::Removed,
            changes: Vec::new(),
        });
        b.finish();
        a.absorb(b);
        assert_eq!(a.summary.removed, 1);
        assert_eq!(a.resources.len(), 1);
        assert!(a.duration_ms() >= 0);
    }

    #[test]
    fn test_serialize_result() {
        let json = serde_json::to_value(ApplyResult::Modified {
            properties: vec!["ensure".into()],
        })
        .unwrap();
        assert_eq!(json["status"], "modified");
        assert_eq!(json["properties"][0], "ensure");
    }
}
