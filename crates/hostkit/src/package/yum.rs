//! yum and dnf: repository installs on Red Hat-family hosts.
//!
//! Both drive the `cmd` command (`yum` or `dnf`) and inherit the rpm
//! database queries. Update availability comes from one `check-update` per
//! run, kept in the session run cache.

use super::{install_options, requested_version, rpm};
use crate::retry::{self, RetryConfig};
use provider::{
    Confine, DefaultRule, Feature, Lifecycle, Lookup, ProviderContext, ProviderSpec, Resource,
    Result, Value,
};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// `[epoch:]version-release`
static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+):)?(\S+)-(\S+)$").expect("version regex must compile")
});

static SECTION_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(Obsoleting|Security:|Update)").expect("section regex must compile")
});

/// Package name → newest available `[epoch:]version-release`.
pub type Updates = HashMap<String, String>;

/// Parse `check-update` output.
///
/// Entries are `name.arch version repo` triples, possibly wrapped across
/// lines. Both `name` and `name.arch` are recorded.
pub(crate) fn parse_updates(output: &str) -> Updates {
    let body = SECTION_END
        .find(output)
        .map_or(output, |m| &output[..m.start()]);

    let mut updates = Updates::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let lines = body.lines().chain(std::iter::once(""));
    for line in lines {
        if !line.trim().is_empty() {
            paragraph.extend(line.split_whitespace());
            continue;
        }
        for tuple in paragraph.chunks(3) {
            let [package, version, _repo] = tuple else {
                continue;
            };
            let Some((name, _arch)) = package.rsplit_once('.') else {
                continue;
            };
            let Some(caps) = VERSION.captures(version) else {
                continue;
            };
            let newest = rpm::evr(
                caps.get(1).map_or("0", |m| m.as_str()),
                &caps[2],
                &caps[3],
            );
            if name.is_empty() {
                continue;
            }
            updates.insert(name.to_string(), newest.clone());
            updates.insert((*package).to_string(), newest);
        }
        paragraph.clear();
    }
    updates
}

/// Parse `list --showduplicates`: versions under "Available Packages".
pub(crate) fn parse_available(output: &str) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for line in output
        .lines()
        .skip_while(|line| !line.starts_with("Available Packages"))
        .skip(1)
    {
        if let Some(version) = line.split_whitespace().nth(1)
            && VERSION.is_match(version)
            && !versions.iter().any(|v| v == version)
        {
            versions.push(version.to_string());
        }
    }
    versions
}

fn check_updates(ctx: &ProviderContext<'_>) -> Result<Updates> {
    let output = ctx.run_unchecked("cmd", &["-q", "check-update"])?;
    match output.status {
        Some(100) => Ok(parse_updates(&output.stdout_str())),
        Some(0) => {
            log::debug!("{}: check-update found no updates", ctx.provider());
            Ok(Updates::new())
        }
        status => {
            log::warn!(
                "{}: check-update exited with {:?}; assuming no updates",
                ctx.provider(),
                status
            );
            Ok(Updates::new())
        }
    }
}

fn yum_args(resource: &Resource, action: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-d", "0", "-e", "0", "-y"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    args.extend(install_options(resource));
    args.push(action.to_string());
    args
}

/// Install, upgrade to, or downgrade to what `ensure` asks for.
fn install(ctx: &ProviderContext<'_>, retry: &RetryConfig, resource: &Resource, ensure: &Value) -> Result<()> {
    let current = rpm::current_version(ctx, resource.name())?;
    let (action, target) = match requested_version(ensure) {
        Some(version) => {
            let older = current.as_deref().is_some_and(|current| {
                ctx.spec().version_scheme().compare(version, current) == Ordering::Less
            });
            let action = if older { "downgrade" } else { "install" };
            (action, format!("{}-{}", resource.name(), version))
        }
        None if matches!(ensure, Value::Latest) && current.is_some() => {
            ("update", resource.name().to_string())
        }
        None => ("install", resource.name().to_string()),
    };
    let mut args = yum_args(resource, action);
    args.push(target);
    retry::run(ctx, retry, "cmd", &args)?;
    Ok(())
}

/// Repository installs through yum or dnf.
pub struct Yum {
    retry: RetryConfig,
}

impl Lifecycle for Yum {
    fn query(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
        rpm::query_one(ctx, resource)
    }

    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        install(ctx, &self.retry, resource, ensure)
    }

    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        if matches!(ensure, Value::Purged) {
            let mut args = yum_args(resource, "remove");
            args.push(resource.name().to_string());
            retry::run(ctx, &self.retry, "cmd", &args)?;
        } else {
            // Plain removal leaves dependents alone
            retry::run(ctx, &self.retry, "rpm", &["-e", resource.name()])?;
        }
        Ok(())
    }

    fn latest(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Option<String>> {
        let updates: Arc<Updates> = ctx.cached("check-update", || check_updates(ctx))?;
        Ok(updates.get(resource.name()).cloned())
    }

    fn available_versions(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Vec<String>> {
        let output = ctx.run("cmd", &["-q", "list", resource.name(), "--showduplicates"])?;
        Ok(parse_available(&output.stdout_str()))
    }
}

/// The yum provider spec, a child of rpm.
pub fn spec(rpm: &Arc<ProviderSpec>, retry: &RetryConfig) -> ProviderSpec {
    let setter_retry = retry.clone();
    ProviderSpec::builder("package", "yum")
        .parent(rpm)
        .source("rpm")
        .description("RPM packages from configured repositories via yum")
        .command("cmd", "yum")
        .confine(Confine::command("cmd"))
        .default_for(DefaultRule::new().fact("os.name", &["amazon"]))
        .default_for(
            DefaultRule::new()
                .fact("os.family", &["redhat"])
                .range("os.release.major", Some(4), Some(7)),
        )
        .features(&[
            Feature::UPGRADEABLE,
            Feature::INSTALL_OPTIONS,
            Feature::VERSION_RANGES,
            Feature::PURGEABLE,
            Feature::DOWNGRADABLE,
        ])
        .lifecycle(Yum {
            retry: retry.clone(),
        })
        .setter("ensure", move |ctx, resource, value| {
            install(ctx, &setter_retry, resource, value)
        })
        .build()
}

/// The dnf provider spec: yum's behavior with the `dnf` binary.
pub fn dnf_spec(yum: &Arc<ProviderSpec>) -> ProviderSpec {
    ProviderSpec::builder("package", "dnf")
        .parent(yum)
        .source("rpm")
        .description("RPM packages from configured repositories via dnf")
        .command("cmd", "dnf")
        .default_for(
            DefaultRule::new()
                .fact("os.family", &["redhat"])
                .range("os.release.major", Some(8), None),
        )
        .default_for(DefaultRule::new().fact("os.name", &["fedora"]))
        .build()
}
