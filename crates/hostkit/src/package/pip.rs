//! pip: Python distributions.
//!
//! The `command` parameter points a resource at a specific pip (a virtualenv
//! or `pip3`). Installed distributions are listed once per pip and run;
//! there is no bulk prefetch since each resource may target a different
//! interpreter.

use super::{install_options, requested_version};
use crate::retry::{self, RetryConfig};
use provider::{
    CommandDecl, Confine, Feature, Lifecycle, Lookup, PropertyHash, ProviderContext,
    Pep440Scheme, ProviderError, ProviderSpec, Resource, Result, Value,
};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct Distribution {
    name: String,
    version: String,
}

/// Canonical project name: case-insensitive, `_` and `.` equal to `-`.
pub(crate) fn normalize(name: &str) -> String {
    name.to_lowercase().replace(['_', '.'], "-")
}

/// Parse `pip list --format=json` into normalized name → version.
pub(crate) fn parse_list(stdout: &str) -> Result<HashMap<String, String>> {
    let dists: Vec<Distribution> =
        serde_json::from_str(stdout).map_err(|e| ProviderError::Parse {
            command: "pip list".to_string(),
            message: e.to_string(),
        })?;
    Ok(dists
        .into_iter()
        .map(|d| (normalize(&d.name), d.version))
        .collect())
}

/// Parse `pip index versions`: `Available versions: 2.32.3, 2.32.2, ...`.
pub(crate) fn parse_index(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Available versions:"))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn list_key(resource: &Resource) -> String {
    format!("list:{}", resource.param_text("command").unwrap_or("pip"))
}

fn installed(ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
    let list = ctx.cached(&list_key(resource), || {
        let output = ctx.run("pip", &["list", "--format=json", "--disable-pip-version-check"])?;
        parse_list(&output.stdout_str())
    })?;
    Ok(match list.get(&normalize(resource.name())) {
        Some(version) => Lookup::Found(PropertyHash::new(resource.name(), Value::text(version))),
        None => Lookup::NotFound,
    })
}

fn install(ctx: &ProviderContext<'_>, retry: &RetryConfig, resource: &Resource, ensure: &Value) -> Result<()> {
    let mut args = vec!["install".to_string(), "-q".to_string()];
    args.extend(install_options(resource));
    match requested_version(ensure) {
        Some(version) => args.push(format!("{}=={}", resource.name(), version)),
        None => {
            if matches!(ensure, Value::Latest) {
                args.push("--upgrade".to_string());
            }
            args.push(resource.name().to_string());
        }
    }
    let result = retry::run(ctx, retry, "pip", &args);
    ctx.invalidate(&list_key(resource));
    result.map(|_| ())
}

fn index_versions(ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Vec<String>> {
    let output = ctx.run_unchecked(
        "pip",
        &["index", "versions", resource.name(), "--disable-pip-version-check"],
    )?;
    if !output.success() {
        log::debug!(
            "pip: no index versions for {}: {}",
            resource.name(),
            output.stderr_str().trim()
        );
        return Ok(Vec::new());
    }
    Ok(parse_index(&output.stdout_str()))
}

/// Distribution lifecycle through a (possibly targeted) pip.
pub struct Pip {
    retry: RetryConfig,
}

impl Lifecycle for Pip {
    fn query(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
        installed(ctx, resource)
    }

    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        install(ctx, &self.retry, resource, ensure)
    }

    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, _ensure: &Value) -> Result<()> {
        let result = retry::run(ctx, &self.retry, "pip", &["uninstall", "-y", "-q", resource.name()]);
        ctx.invalidate(&list_key(resource));
        result.map(|_| ())
    }

    fn latest(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Option<String>> {
        // pip lists newest first
        Ok(index_versions(ctx, resource)?.into_iter().next())
    }

    fn available_versions(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Vec<String>> {
        index_versions(ctx, resource)
    }
}

/// The pip provider spec.
pub fn spec(retry: &RetryConfig) -> ProviderSpec {
    let setter_retry = retry.clone();
    ProviderSpec::builder("package", "pip")
        .description("Python distributions via pip")
        .command_decl(CommandDecl::required("pip", "pip").targeted_by("command"))
        .confine(Confine::command("pip"))
        .features(&[
            Feature::VERSIONABLE,
            Feature::UPGRADEABLE,
            Feature::VERSION_RANGES,
            Feature::INSTALL_OPTIONS,
        ])
        .version_scheme(Pep440Scheme)
        .lifecycle(Pip {
            retry: retry.clone(),
        })
        .setter("ensure", move |ctx, resource, value| {
            install(ctx, &setter_retry, resource, value)
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, debian};
    use provider::{ApplyResult, CommandOutput, ScriptedExecutor};

    const LIST: &str = r#"[
        {"name": "requests", "version": "2.31.0"},
        {"name": "PyYAML", "version": "6.0.1"},
        {"name": "typing_extensions", "version": "4.12.2"}
    ]"#;

    const INDEX: &str = "\
requests (2.32.3)
Available versions: 2.32.3, 2.32.2, 2.31.0, 2.28.2
";

    #[test]
    fn test_parse_list_normalizes() {
        let list = parse_list(LIST).unwrap();
        assert_eq!(list.get("pyyaml").map(String::as_str), Some("6.0.1"));
        assert_eq!(list.get("typing-extensions").map(String::as_str), Some("4.12.2"));
        assert!(matches!(parse_list("oops"), Err(ProviderError::Parse { .. })));
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index(INDEX), vec!["2.32.3", "2.32.2", "2.31.0", "2.28.2"]);
        assert!(parse_index("ERROR: No matching distribution").is_empty());
    }

    fn harness() -> Harness {
        Harness::new(
            debian(),
            &["pip", "pip3"],
            ScriptedExecutor::new()
                .on("list --format=json", CommandOutput::ok(LIST))
                .on("index versions", CommandOutput::ok(INDEX)),
        )
    }

    fn pip(name: &str, ensure: &str) -> Resource {
        Resource::new("package", name).with_provider("pip").ensure(ensure)
    }

    #[test]
    fn test_list_runs_once_per_pip() {
        let h = harness();
        let report = h.session.converge(vec![
            pip("requests", "present"),
            pip("pyyaml", "6.0.1"),
            pip("Typing_Extensions", "present"),
        ]);
        assert_eq!(report.summary.no_change, 3);
        let lists = h.calls().iter().filter(|c| c.contains("list")).count();
        assert_eq!(lists, 1);
    }

    #[test]
    fn test_targeted_pip_lists_separately() {
        let h = harness();
        h.session.converge(vec![
            pip("requests", "present"),
            pip("requests", "present").with_param("command", Value::text("pip3")),
        ]);
        let calls = h.calls();
        assert!(calls.iter().any(|c| c.starts_with("pip list")));
        assert!(calls.iter().any(|c| c.starts_with("pip3 list")));
    }

    #[test]
    fn test_range_picks_best_from_index() {
        let h = harness();
        let mut instance = h.session.bind(pip("requests", ">=2.32.0, <2.32.3")).unwrap();
        assert!(matches!(
            h.session.sync(&mut instance).unwrap(),
            ApplyResult::Modified { .. }
        ));
        assert!(h.calls().contains(&"pip install -q requests==2.32.2".to_string()));
    }

    #[test]
    fn test_compatible_release_and_exclusion() {
        let h = harness();
        let report = h.session.converge(vec![pip("requests", "~=2.31")]);
        assert_eq!(report.summary.no_change, 1);
        assert!(h.calls().iter().all(|c| !c.contains("index versions")));

        let report = h.session.converge(vec![pip("requests", "~=2.32.0")]);
        assert_eq!(report.summary.modified, 1);
        assert!(h.calls().contains(&"pip install -q requests==2.32.3".to_string()));

        h.executor.clear_calls();
        let report = h.session.converge(vec![pip("requests", "!=2.31.0, <2.32.3")]);
        assert_eq!(report.summary.modified, 1);
        assert!(h.calls().contains(&"pip install -q requests==2.32.2".to_string()));
    }

    #[test]
    fn test_install_and_uninstall() {
        let h = harness();
        let report = h.session.converge(vec![
            pip("flask", "present").with_param("install_options", Value::list(["--user"])),
            pip("requests", "absent"),
        ]);
        assert_eq!(report.summary.created, 1);
        assert_eq!(report.summary.removed, 1);
        let calls = h.calls();
        assert!(calls.contains(&"pip install -q --user flask".to_string()));
        assert!(calls.contains(&"pip uninstall -y -q requests".to_string()));
    }
}
