//! Homebrew formulae and casks on macOS.

use super::{install_options, requested_version};
use crate::retry::{self, RetryConfig};
use provider::{
    CommandDecl, Confine, DefaultRule, Feature, Lifecycle, Lookup, PropertyHash, ProviderContext,
    ProviderError, ProviderSpec, Resource, Result, Value,
};

fn parse_json(command: &str, stdout: &str) -> Result<serde_json::Value> {
    serde_json::from_str(stdout).map_err(|e| ProviderError::Parse {
        command: command.to_string(),
        message: e.to_string(),
    })
}

/// Installed formulae and casks from `brew info --json=v2` output.
pub(crate) fn parse_installed(json: &serde_json::Value) -> Vec<PropertyHash> {
    let empty = Vec::new();
    let mut installed = Vec::new();

    for formula in json["formulae"].as_array().unwrap_or(&empty) {
        let name = formula["name"].as_str().unwrap_or_default();
        // The last entry is the active keg
        if let Some(keg) = formula["installed"].as_array().and_then(|kegs| kegs.last()) {
            let version = keg["version"].as_str().unwrap_or_default();
            let on_request = keg["installed_on_request"].as_bool().unwrap_or(false);
            installed.push(
                PropertyHash::new(name, Value::text(version))
                    .with_private("kind", "formula")
                    .with_private("on_request", if on_request { "true" } else { "false" }),
            );
        }
    }

    for cask in json["casks"].as_array().unwrap_or(&empty) {
        let name = cask["token"].as_str().unwrap_or_default();
        if let Some(version) = cask["installed"].as_str() {
            installed.push(PropertyHash::new(name, Value::text(version)).with_private("kind", "cask"));
        }
    }

    installed
}

/// Newest stable version from `brew info --json=v2 <name>` output.
pub(crate) fn parse_stable(json: &serde_json::Value) -> Option<String> {
    json["formulae"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|f| f["versions"]["stable"].as_str())
        .or_else(|| {
            json["casks"]
                .as_array()
                .and_then(|arr| arr.first())
                .and_then(|c| c["version"].as_str())
        })
        .map(str::to_string)
}

/// `brew info` for one name; `None` when brew does not know it.
fn info(ctx: &ProviderContext<'_>, name: &str) -> Result<Option<serde_json::Value>> {
    let output = ctx.run_unchecked("brew", &["info", "--json=v2", name])?;
    if !output.success() {
        return Ok(None);
    }
    parse_json("brew info", &output.stdout_str()).map(Some)
}

/// Formula reference for a version request (`name@version`).
fn target(resource: &Resource, ensure: &Value) -> String {
    match requested_version(ensure) {
        Some(version) => format!("{}@{}", resource.name(), version),
        None => resource.name().to_string(),
    }
}

/// Formula and cask lifecycle through the brew CLI.
pub struct Brew {
    retry: RetryConfig,
}

impl Lifecycle for Brew {
    fn instances(&self, ctx: &ProviderContext<'_>) -> Result<Option<Vec<PropertyHash>>> {
        let output = ctx.run("brew", &["info", "--json=v2", "--installed"])?;
        let json = parse_json("brew info --installed", &output.stdout_str())?;
        Ok(Some(parse_installed(&json)))
    }

    fn query(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Lookup> {
        let Some(json) = info(ctx, resource.name())? else {
            return Ok(Lookup::NotFound);
        };
        Ok(parse_installed(&json)
            .into_iter()
            .find(|hash| hash.name == resource.name())
            .map_or(Lookup::NotFound, Lookup::Found))
    }

    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, ensure: &Value) -> Result<()> {
        let mut args = vec!["install".to_string()];
        args.extend(install_options(resource));
        args.push(target(resource, ensure));
        retry::run(ctx, &self.retry, "brew", &args)?;
        Ok(())
    }

    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, _ensure: &Value) -> Result<()> {
        retry::run(ctx, &self.retry, "brew", &["uninstall", resource.name()])?;
        Ok(())
    }

    fn latest(&self, ctx: &ProviderContext<'_>, resource: &Resource) -> Result<Option<String>> {
        Ok(info(ctx, resource.name())?.as_ref().and_then(parse_stable))
    }
}

/// The brew provider spec.
pub fn spec(retry: &RetryConfig) -> ProviderSpec {
    let setter_retry = retry.clone();
    ProviderSpec::builder("package", "brew")
        .description("Homebrew formulae and casks")
        .command_decl(CommandDecl::required("brew", "brew").with_env("HOMEBREW_NO_AUTO_UPDATE", "1"))
        .confine(Confine::fact("kernel", &["darwin"]))
        .confine(Confine::command("brew"))
        .default_for(DefaultRule::new().fact("kernel", &["darwin"]))
        .features(&[Feature::VERSIONABLE, Feature::UPGRADEABLE, Feature::INSTALL_OPTIONS])
        .lifecycle(Brew {
            retry: retry.clone(),
        })
        .setter("ensure", move |ctx, resource, value| {
            let args = match requested_version(value) {
                // A pinned version is a separate formula
                Some(_) => vec!["install".to_string(), target(resource, value)],
                None => vec!["upgrade".to_string(), resource.name().to_string()],
            };
            retry::run(ctx, &setter_retry, "brew", &args)?;
            Ok(())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, darwin};
    use provider::{CommandOutput, ScriptedExecutor};

    const INSTALLED: &str = r#"{
        "formulae": [
            {
                "name": "git",
                "versions": {"stable": "2.47.1"},
                "installed": [{"version": "2.47.0", "installed_on_request": true}]
            },
            {
                "name": "openssl@3",
                "versions": {"stable": "3.4.0"},
                "installed": [{"version": "3.4.0", "installed_on_request": false}]
            }
        ],
        "casks": [
            {"token": "firefox", "version": "133.0", "installed": "132.0"},
            {"token": "slack", "version": "4.41", "installed": null}
        ]
    }"#;

    #[test]
    fn test_parse_installed() {
        let json: serde_json::Value = serde_json::from_str(INSTALLED).unwrap();
        let installed = parse_installed(&json);
        assert_eq!(installed.len(), 3);
        assert_eq!(installed[0].name, "git");
        assert_eq!(installed[0].ensure, Value::text("2.47.0"));
        assert_eq!(installed[1].private.get("on_request").map(String::as_str), Some("false"));
        assert_eq!(installed[2].name, "firefox");
        assert_eq!(installed[2].private.get("kind").map(String::as_str), Some("cask"));
    }

    #[test]
    fn test_parse_stable() {
        let json: serde_json::Value = serde_json::from_str(INSTALLED).unwrap();
        assert_eq!(parse_stable(&json).as_deref(), Some("2.47.1"));

        let cask: serde_json::Value =
            serde_json::from_str(r#"{"formulae": [], "casks": [{"token": "x", "version": "1.0"}]}"#)
                .unwrap();
        assert_eq!(parse_stable(&cask).as_deref(), Some("1.0"));
    }

    #[test]
    fn test_brew_only_on_darwin() {
        let h = Harness::new(crate::testing::debian(), &["brew"], ScriptedExecutor::new());
        let brew = h.session.registry().provider("package", "brew").unwrap();
        assert!(!h.session.is_suitable(brew));

        let h = Harness::new(darwin(), &["brew"], ScriptedExecutor::new());
        let chosen = h.session.resolve(&Resource::new("package", "git")).unwrap();
        assert_eq!(chosen.name(), "brew");
    }

    #[test]
    fn test_latest_upgrades() {
        let h = Harness::new(
            darwin(),
            &["brew"],
            ScriptedExecutor::new().on("brew info --json=v2", CommandOutput::ok(INSTALLED)),
        );
        let report = h
            .session
            .converge(vec![Resource::new("package", "git").ensure("latest")]);
        assert_eq!(report.summary.modified, 1);
        assert!(h.calls().contains(&"brew install git@2.47.1".to_string()));
    }

    #[test]
    fn test_garbled_json_falls_back_to_query() {
        let h = Harness::new(
            darwin(),
            &["brew"],
            ScriptedExecutor::new()
                .on("--installed", CommandOutput::ok("Error: not json"))
                .on("brew info --json=v2 git", CommandOutput::ok(INSTALLED)),
        );
        let report = h
            .session
            .converge(vec![Resource::new("package", "git").ensure("present")]);
        assert_eq!(report.summary.no_change, 1);
    }
}
