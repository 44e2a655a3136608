//! dpkg: the Debian package database.
//!
//! Enumerates with `dpkg-query -W`, installs `.deb` files from `source`.
//! apt inherits the query side and borrows the enumeration.

use super::{require_source, wants_hold};
use crate::retry::{self, RetryConfig};
use provider::{
    Confine, Feature, Lifecycle, Lookup, PropertyHash, ProviderContext, ProviderError,
    ProviderSpec, Resource, Result, Value,
};
use regex::Regex;
use std::sync::LazyLock;

/// `${Status}` expands to three words: want, error flag, state.
const SHOW_FORMAT: &str = "${Status} ${Package} ${Version}\\n";

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+) (\S+) (\S+) (\S+) (\S*)$").expect("status regex must compile")
});

/// Parse one `dpkg-query` status line. An installed package selected for
/// hold reports `held`; its version moves to the private `version` key.
pub(crate) fn parse_line(line: &str) -> Option<PropertyHash> {
    let caps = STATUS_LINE.captures(line.trim())?;
    let want = &caps[1];
    let state = &caps[3];
    let name = &caps[4];
    let version = &caps[5];

    let held = want == "hold";
    let ensure = match state {
        "installed" if held => Value::Held,
        "installed" => Value::text(version),
        "not-installed" => Value::Purged,
        // config-files, half-installed, unpacked, half-configured
        _ => Value::Absent,
    };
    let mark = if held { "hold" } else { "none" };
    let mut hash = PropertyHash::new(name, ensure)
        .with_property("mark", Value::text(mark))
        .with_private("status", state);
    if !version.is_empty() {
        hash = hash.with_private("version", version);
    }
    Some(hash)
}

/// Parse the full output of `dpkg-query -W`.
pub(crate) fn parse_status(output: &str) -> Vec<PropertyHash> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_line(line);
            if parsed.is_none() {
                log::debug!("dpkg: ignoring unparsable status line {line:?}");
            }
            parsed
        })
        .collect()
}

/// Look up one package with `dpkg-query`. Shared with apt.
pub(crate) fn query_one(ctx: &ProviderContext<'_>, name: &str) -> Result<Lookup> {
    let output = ctx.run_unchecked("query", &["-W", "--showformat", SHOW_FORMAT, name])?;
    // dpkg-query exits 1 for unknown packages
    if !output.success() {
        return Ok(Lookup::NotFound);
    }
    Ok(parse_status(&output.stdout_str())
        .into_iter()
        .find(|hash| hash.name == name)
        .map_or(Lookup::NotFound, Lookup::Found))
}

/// Set or clear the hold selection. Shared with apt.
pub(crate) fn set_mark(ctx: &ProviderContext<'_>, resource: &Resource, hold: bool) -> Result<()> {
    if !ctx.has_command("mark") {
        return Err(ProviderError::Unsupported {
            provider: ctx.provider().to_string(),
            operation: "mark (apt-mark not found)".to_string(),
        });
    }
    let action = if hold { "hold" } else { "unhold" };
    ctx.run("mark", &[action, resource.name()])?;
    Ok(())
}

/// Install the resource's source `.deb`.
fn install_source(ctx: &ProviderContext<'_>, retry: &RetryConfig, resource: &Resource) -> Result<()> {
    let source = require_source(ctx, resource)?;
    retry::run(ctx, retry, "dpkg", &["--force-confold", "-i", source])?;
    Ok(())
}

/// Remove or purge a package. Shared with apt.
pub(crate) fn remove(
    ctx: &ProviderContext<'_>,
    retry: &RetryConfig,
    resource: &Resource,
    ensure: &Value,
) -> Result<()> {
    let flag = if matches!(ensure, Value::Purged) {
        "--purge"
    } else {
        "--remove"
    };
    retry::run(ctx, retry, "dpkg", &[flag, resource.name()])?;
    Ok(())
}

/// Package database lifecycle through dpkg.
pub struct Dpkg {
    retry: RetryConfig,
}

impl Lifecycle for Dpkg {
    fn instances(&self, ctx: &ProviderContext<'_>) -> Result<Option<Vec<PropertyHash>>> {
        let output = ctx.run("query", &["-W", "--showformat", SHOW_FORMAT])?;
        Ok(Some(parse_status(&output.stdout_str())))
    }

    fn query(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
        query_one(ctx, resource.name())
    }

    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        install_source(ctx, &self.retry, resource)?;
        if wants_hold(resource, ensure) {
            set_mark(ctx, resource, true)?;
        }
        Ok(())
    }

    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        remove(ctx, &self.retry, resource, ensure)
    }
}

/// The dpkg provider spec.
pub fn spec(retry: &RetryConfig) -> ProviderSpec {
    let setter_retry = retry.clone();
    ProviderSpec::builder("package", "dpkg")
        .description("Debian packages via dpkg; installs need a source .deb")
        .command("dpkg", "dpkg")
        .command("query", "dpkg-query")
        .optional_command("mark", "apt-mark")
        .confine(Confine::command("query"))
        .features(&[Feature::PURGEABLE, Feature::HOLDABLE])
        .lifecycle(Dpkg {
            retry: retry.clone(),
        })
        .setter("mark", |ctx, resource, value| {
            set_mark(ctx, resource, value.as_text() == Some("hold"))
        })
        .setter("ensure", move |ctx, resource, value| match value {
            Value::Held => set_mark(ctx, resource, true),
            _ => install_source(ctx, &setter_retry, resource),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, debian};
    use provider::{ApplyResult, CommandOutput, Observed, ScriptedExecutor};

    const STATUS: &str = "\
install ok installed bash 5.2.15-2+b2
hold ok installed nginx 1.22.1-9
deinstall ok config-files vim 2:9.0.1378-2
purge ok not-installed curl
";

    #[test]
    fn test_parse_status() {
        let hashes = parse_status(STATUS);
        assert_eq!(hashes.len(), 4);
        assert_eq!(hashes[0].name, "bash");
        assert_eq!(hashes[0].ensure, Value::text("5.2.15-2+b2"));
        assert_eq!(hashes[1].ensure, Value::Held);
        assert_eq!(hashes[1].version(), Some("1.22.1-9"));
        assert_eq!(hashes[1].get("mark"), Some(&Value::text("hold")));
        assert_eq!(hashes[0].version(), Some("5.2.15-2+b2"));
        assert_eq!(hashes[2].ensure, Value::Absent);
        assert_eq!(hashes[3].ensure, Value::Purged);
        assert_eq!(hashes[3].private.get("status").map(String::as_str), Some("not-installed"));
    }

    #[test]
    fn test_parse_ignores_garbage() {
        assert!(parse_line("dpkg-query: no packages found matching nope").is_none());
        assert!(parse_status("\n\n").is_empty());
    }

    #[test]
    fn test_unknown_package_is_not_found() {
        let h = Harness::new(
            debian(),
            &["dpkg", "dpkg-query"],
            ScriptedExecutor::new().on(
                "dpkg-query -W --showformat",
                CommandOutput::exit(1, "dpkg-query: no packages found matching nope"),
            ),
        );
        let mut instance = h
            .session
            .bind(Resource::new("package", "nope").with_provider("dpkg").ensure("absent"))
            .unwrap();
        assert_eq!(h.session.sync(&mut instance).unwrap(), ApplyResult::NoChange);
        assert_eq!(instance.observed(), &Observed::NotFound);
    }

    #[test]
    fn test_create_requires_source() {
        let h = Harness::new(debian(), &["dpkg", "dpkg-query"], ScriptedExecutor::new());
        let mut instance = h
            .session
            .bind(Resource::new("package", "tool").with_provider("dpkg").ensure("present"))
            .unwrap();
        let err = h.session.sync(&mut instance).unwrap_err();
        assert!(err.to_string().contains("source"));

        let mut instance = h
            .session
            .bind(
                Resource::new("package", "tool")
                    .with_provider("dpkg")
                    .ensure("present")
                    .with_param("source", Value::text("/tmp/tool.deb")),
            )
            .unwrap();
        assert_eq!(h.session.sync(&mut instance).unwrap(), ApplyResult::Created);
        assert!(h.calls().contains(&"dpkg --force-confold -i /tmp/tool.deb".to_string()));
    }

    #[test]
    fn test_purge() {
        let h = Harness::new(
            debian(),
            &["dpkg", "dpkg-query"],
            ScriptedExecutor::new().on(
                "dpkg-query -W --showformat",
                CommandOutput::ok("install ok installed vim 2:9.0.1378-2\n"),
            ),
        );
        let report = h.session.converge(vec![
            Resource::new("package", "vim").with_provider("dpkg").ensure("purged"),
        ]);
        assert_eq!(report.summary.removed, 1);
        assert!(h.calls().contains(&"dpkg --purge vim".to_string()));
    }

    #[test]
    fn test_hold_without_apt_mark() {
        let h = Harness::new(
            debian(),
            &["dpkg", "dpkg-query"],
            ScriptedExecutor::new().on(
                "dpkg-query -W --showformat",
                CommandOutput::ok("install ok installed nginx 1.22.1-9\n"),
            ),
        );
        let mut instance = h
            .session
            .bind(
                Resource::new("package", "nginx")
                    .with_provider("dpkg")
                    .with_property("mark", Value::text("hold")),
            )
            .unwrap();
        let err = h.session.sync(&mut instance).unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported { .. }));
        assert!(h.calls().iter().all(|call| !call.contains("apt-mark")));
    }

    #[test]
    fn test_held_package_stays_in_sync() {
        let h = Harness::new(
            debian(),
            &["dpkg", "dpkg-query", "apt-mark"],
            ScriptedExecutor::new().on(
                "dpkg-query -W --showformat",
                CommandOutput::ok("hold ok installed nginx 1.22.1-9
"),
            ),
        );
        let report = h.session.converge(vec![
            Resource::new("package", "nginx").with_provider("dpkg").ensure("held"),
            Resource::new("package", "nginx").with_provider("dpkg").ensure("present"),
            Resource::new("package", "nginx")
                .with_provider("dpkg")
                .with_property("mark", Value::text("hold")),
        ]);
        assert_eq!(report.summary.no_change, 3);
        assert!(h.calls().iter().all(|call| !call.starts_with("apt-mark")));
    }

    #[test]
    fn test_hold_installed_package() {
        let h = Harness::new(
            debian(),
            &["dpkg", "dpkg-query", "apt-mark"],
            ScriptedExecutor::new().on(
                "dpkg-query -W --showformat",
                CommandOutput::ok("install ok installed nginx 1.22.1-9
"),
            ),
        );
        let report = h.session.converge(vec![
            Resource::new("package", "nginx").with_provider("dpkg").ensure("held"),
        ]);
        assert_eq!(report.summary.modified, 1);
        assert_eq!(h.calls().last().map(String::as_str), Some("apt-mark hold nginx"));
    }

    #[test]
    fn test_install_retries_a_locked_database() {
        let h = Harness::with_options(
            debian(),
            &["dpkg", "dpkg-query"],
            ScriptedExecutor::new().on(
                "dpkg --force-confold -i",
                CommandOutput::exit(
                    2,
                    "dpkg: error: unable to acquire the dpkg frontend lock (/var/lib/dpkg/lock-frontend)",
                ),
            ),
            |options| options.retry = RetryConfig::immediate(3),
        );
        let report = h.session.converge(vec![
            Resource::new("package", "tool")
                .with_provider("dpkg")
                .ensure("present")
                .with_param("source", Value::text("/tmp/tool.deb")),
        ]);
        assert_eq!(report.summary.failed, 1);
        let installs = h.calls().iter().filter(|c| c.starts_with("dpkg --force-confold -i")).count();
        assert_eq!(installs, 3);
    }
}
