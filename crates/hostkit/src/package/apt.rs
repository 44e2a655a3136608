//! apt: repository installs on Debian-family hosts.

use super::{dpkg, install_options, requested_version, wants_hold};
use crate::retry::{self, RetryConfig};
use provider::{
    CommandDecl, Confine, DefaultRule, Feature, Lifecycle, Lookup, ProviderContext, ProviderSpec,
    Resource, Result, Value,
};
use std::sync::Arc;

/// Candidate version from `apt-cache policy`; `None` when nothing is
/// installable.
pub(crate) fn parse_policy(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Candidate:"))
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .filter(|candidate| *candidate != "(none)")
        .map(str::to_string)
}

/// Versions listed by `apt-cache madison`, in repository order.
pub(crate) fn parse_madison(output: &str) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for line in output.lines() {
        let mut fields = line.split('|').map(str::trim);
        if let (Some(_), Some(version)) = (fields.next(), fields.next())
            && !version.is_empty()
            && !versions.iter().any(|v| v == version)
        {
            versions.push(version.to_string());
        }
    }
    versions
}

fn install(
    ctx: &ProviderContext<'_>,
    retry: &RetryConfig,
    resource: &Resource,
    ensure: &Value,
    hold: bool,
) -> Result<()> {
    let mut args: Vec<String> = ["-q", "-y", "-o", "DPkg::Options::=--force-confold"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    args.extend(install_options(resource));
    let target = match requested_version(ensure) {
        Some(version) => {
            args.push("--allow-downgrades".to_string());
            format!("{}={}", resource.name(), version)
        }
        None => resource.name().to_string(),
    };
    args.push("install".to_string());
    args.push(target);

    retry::run(ctx, retry, "get", &args)?;
    if hold {
        dpkg::set_mark(ctx, resource, true)?;
    }
    Ok(())
}

/// Repository installs through apt-get.
pub struct Apt {
    retry: RetryConfig,
}

impl Lifecycle for Apt {
    fn query(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
        dpkg::query_one(ctx, resource.name())
    }

    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        install(ctx, &self.retry, resource, ensure, wants_hold(resource, ensure))
    }

    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        let action = if matches!(ensure, Value::Purged) {
            "purge"
        } else {
            "remove"
        };
        retry::run(ctx, &self.retry, "get", &["-q", "-y", action, resource.name()])?;
        Ok(())
    }

    fn latest(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Option<String>> {
        let output = ctx.run("cache", &["policy", resource.name()])?;
        Ok(parse_policy(&output.stdout_str()))
    }

    fn available_versions(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Vec<String>> {
        let output = ctx.run("cache", &["madison", resource.name()])?;
        Ok(parse_madison(&output.stdout_str()))
    }
}

/// The apt provider spec, a child of dpkg sharing its package database.
pub fn spec(dpkg: &Arc<ProviderSpec>, retry: &RetryConfig) -> ProviderSpec {
    let setter_retry = retry.clone();
    ProviderSpec::builder("package", "apt")
        .parent(dpkg)
        .source("dpkg")
        .description("Debian packages from configured repositories via apt-get")
        .command_decl(
            CommandDecl::required("get", "apt-get").with_env("DEBIAN_FRONTEND", "noninteractive"),
        )
        .command("cache", "apt-cache")
        .confine(Confine::command("get"))
        .default_for(DefaultRule::new().fact("os.family", &["debian"]))
        .features(&[
            Feature::VERSIONABLE,
            Feature::UPGRADEABLE,
            Feature::INSTALL_OPTIONS,
            Feature::DOWNGRADABLE,
        ])
        .lifecycle(Apt {
            retry: retry.clone(),
        })
        .setter("ensure", move |ctx, resource, value| match value {
            Value::Held => dpkg::set_mark(ctx, resource, true),
            _ => install(ctx, &setter_retry, resource, value, false),
        })
        .build()
}
