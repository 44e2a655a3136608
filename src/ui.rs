use colored::Colorize;
use provider::{ApplyResult, ProgressCallback, RunSummary};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.len()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// One-line rendering of a resource outcome.
pub fn describe_result(result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => "unchanged".dimmed().to_string(),
        ApplyResult::Created => "created".green().to_string(),
        ApplyResult::Modified { properties } => {
            format!("{} {}", "changed".yellow(), properties.join(", "))
        }
        ApplyResult::Removed => "removed".red().to_string(),
        ApplyResult::Skipped { reason } => format!("{} {}", "would change:".cyan(), reason),
        ApplyResult::Failed { error, .. } => format!("{} {}", "failed:".red().bold(), error),
    }
}

/// Run summary line, e.g. `2 created, 1 changed, 5 unchanged`.
pub fn summary_line(summary: &RunSummary) -> String {
    let parts = [
        (summary.created, "created"),
        (summary.modified, "changed"),
        (summary.removed, "removed"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
        (summary.no_change, "unchanged"),
    ];
    let rendered: Vec<String> = parts
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();
    if rendered.is_empty() {
        "nothing to do".to_string()
    } else {
        rendered.join(", ")
    }
}

/// Prints each resource as it completes.
pub struct TerminalProgress {
    quiet: bool,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_resource_start(&mut self, title: &str, provider: &str) {
        log::debug!("{title}: using provider {provider}");
    }

    fn on_resource_complete(&mut self, title: &str, result: &ApplyResult) {
        match result {
            ApplyResult::Failed { .. } => error(&format!("{title}: {}", describe_result(result))),
            ApplyResult::NoChange if self.quiet => {}
            ApplyResult::NoChange => dim(&format!("{title}: unchanged")),
            _ if self.quiet => {}
            _ => println!("  {} {}", title.bold(), describe_result(result)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let summary = RunSummary {
            created: 2,
            modified: 1,
            no_change: 5,
            ..RunSummary::default()
        };
        assert_eq!(summary_line(&summary), "2 created, 1 changed, 5 unchanged");
        assert_eq!(summary_line(&RunSummary::default()), "nothing to do");
    }

    #[test]
    fn test_describe_result_mentions_properties() {
        colored::control::set_override(false);
        let result = ApplyResult::Modified {
            properties: vec!["shell".to_string(), "groups".to_string()],
        };
        assert_eq!(describe_result(&result), "changed shell, groups");
    }
}
