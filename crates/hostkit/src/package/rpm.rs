//! rpm: the RPM package database.
//!
//! Versions are reported as `[epoch:]version-release`, with the epoch only
//! when it is not zero. Several installed versions of one name (kernels)
//! are ambiguous unless the resource sets `install_only`.

use super::{install_options, require_source};
use crate::retry::{self, RetryConfig};
use provider::{
    Confine, Feature, Lifecycle, Lookup, PropertyHash, ProviderContext, ProviderError,
    ProviderSpec, Resource, Result, Value,
};

/// One line per package: name, epoch, version, release, arch.
const QUERY_FORMAT: &str = "%{NAME} %|EPOCH?{%{EPOCH}}:{0}| %{VERSION} %{RELEASE} %{ARCH}\\n";

/// Format `[epoch:]version-release`.
pub(crate) fn evr(epoch: &str, version: &str, release: &str) -> String {
    if epoch.is_empty() || epoch == "0" || epoch == "(none)" {
        format!("{version}-{release}")
    } else {
        format!("{epoch}:{version}-{release}")
    }
}

/// Parse one query line.
pub(crate) fn parse_line(line: &str) -> Option<PropertyHash> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [name, epoch, version, release, arch] = fields.as_slice() else {
        return None;
    };
    Some(
        PropertyHash::new(name, Value::text(evr(epoch, version, release)))
            .with_private("arch", arch)
            .with_private("epoch", epoch),
    )
}

/// Parse `rpm -q --qf` output.
pub(crate) fn parse_query(output: &str) -> Vec<PropertyHash> {
    output.lines().filter_map(parse_line).collect()
}

fn base_args() -> Vec<&'static str> {
    vec!["--nosignature", "--nodigest", "--qf", QUERY_FORMAT]
}

/// Installed versions of one package. Shared with yum.
pub(crate) fn installed(ctx: &ProviderContext<'_>, name: &str) -> Result<Vec<PropertyHash>> {
    let mut args = vec!["-q"];
    args.extend(base_args());
    args.push(name);
    let output = ctx.run_unchecked("rpm", &args)?;
    // "package foo is not installed" exits 1
    if !output.success() {
        return Ok(Vec::new());
    }
    Ok(parse_query(&output.stdout_str())
        .into_iter()
        .filter(|hash| hash.name == name)
        .collect())
}

/// Look up one package, collapsing side-by-side versions when allowed.
pub(crate) fn query_one(ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
    let mut found = installed(ctx, resource.name())?;
    match found.len() {
        0 => Ok(Lookup::NotFound),
        1 => Ok(Lookup::Found(found.remove(0))),
        _ if resource.param_flag("install_only") && ctx.spec().declares(Feature::INSTALL_ONLY) => {
            let scheme = ctx.spec().version_scheme();
            found.sort_by(|a, b| scheme.compare(&a.ensure.to_string(), &b.ensure.to_string()));
            Ok(found.pop().map_or(Lookup::NotFound, Lookup::Found))
        }
        _ => Err(ProviderError::AmbiguousEntity {
            resource: resource.title(),
            candidates: found
                .iter()
                .map(|hash| {
                    let arch = hash.private.get("arch").map_or("", String::as_str);
                    format!("{} {}.{}", hash.name, hash.ensure, arch)
                })
                .collect(),
        }),
    }
}

/// Current version for comparisons, when exactly one is installed.
pub(crate) fn current_version(ctx: &ProviderContext<'_>, name: &str) -> Result<Option<String>> {
    let found = installed(ctx, name)?;
    Ok(match found.as_slice() {
        [only] => Some(only.ensure.to_string()),
        _ => None,
    })
}

/// Package database lifecycle through rpm.
pub struct Rpm {
    retry: RetryConfig,
}

impl Lifecycle for Rpm {
    fn instances(&self, ctx: &ProviderContext<'_>) -> Result<Option<Vec<PropertyHash>>> {
        let mut args = vec!["-qa"];
        args.extend(base_args());
        let output = ctx.run("rpm", &args)?;
        Ok(Some(parse_query(&output.stdout_str())))
    }

    fn query(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
        query_one(ctx, resource)
    }

    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, _ensure: &Value) -> Result<()> {
        let source = require_source(ctx, resource)?;
        let mut args = vec!["-i".to_string()];
        args.extend(install_options(resource));
        args.push(source.to_string());
        retry::run(ctx, &self.retry, "rpm", &args)?;
        Ok(())
    }

    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, _ensure: &Value) -> Result<()> {
        let mut args = vec!["-e"];
        if resource.param_flag("install_only") {
            args.push("--allmatches");
        }
        args.push(resource.name());
        retry::run(ctx, &self.retry, "rpm", &args)?;
        Ok(())
    }
}

/// The rpm provider spec.
pub fn spec(retry: &RetryConfig) -> ProviderSpec {
    ProviderSpec::builder("package", "rpm")
        .description("RPM packages via rpm; installs need a source .rpm")
        .command("rpm", "rpm")
        .confine(Confine::command("rpm"))
        .features(&[Feature::VERSIONABLE, Feature::INSTALL_ONLY])
        .lifecycle(Rpm {
            retry: retry.clone(),
        })
        .setter("ensure", |ctx, resource, _value| {
            let source = require_source(ctx, resource)?;
            let mut args = vec!["-U".to_string(), "--oldpackage".to_string()];
            args.extend(install_options(resource));
            args.push(source.to_string());
            ctx.run("rpm", &args)?;
            Ok(())
        })
        .build()
}
