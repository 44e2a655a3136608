//! useradd: shadow-utils account management on Linux.
//!
//! Property setters only record intent; `flush` applies every changed
//! property in a single `usermod`. With `forcelocal` the libuser tools
//! (`luseradd`, `lusermod`, `luserdel`) edit the local files directly; they
//! cannot set supplementary groups, so a groups change fails there.

use super::read_accounts;
use crate::Options;
use crate::schema::{MANAGES_HOMEDIR, MANAGES_LOCAL_USERS};
use provider::{
    Confine, DefaultRule, ENSURE, Lifecycle, PropertyHash, ProviderContext, ProviderError,
    ProviderSpec, Resource, Result, Value,
};
use std::path::PathBuf;

/// Properties in the order their flags are emitted.
const PROPERTIES: &[(&str, &str)] = &[
    ("uid", "-u"),
    ("gid", "-g"),
    ("comment", "-c"),
    ("home", "-d"),
    ("shell", "-s"),
    ("groups", "-G"),
];

fn flag_value(value: &Value) -> String {
    match value {
        Value::List(items) => items.join(","),
        other => other.to_string(),
    }
}

/// Flags for the given properties, skipping those the resource leaves
/// unmanaged.
fn property_flags(resource: &Resource, only: Option<&[String]>) -> Vec<String> {
    let mut args = Vec::new();
    for (name, flag) in PROPERTIES {
        if only.is_some_and(|changed| !changed.iter().any(|c| c == name)) {
            continue;
        }
        if let Some(value) = resource.should(name) {
            args.push((*flag).to_string());
            args.push(flag_value(value));
        }
    }
    args
}

/// Pick the shadow-utils or libuser variant of a command.
fn tool<'a>(ctx: &ProviderContext<'_>, resource: &Resource, shadow: &'a str, local: &'a str) -> (&'a str, bool) {
    if resource.param_flag("forcelocal") && ctx.has_command(local) {
        (local, true)
    } else {
        (shadow, false)
    }
}

/// libuser's tools have no `-G`, so supplementary groups cannot be managed
/// under `forcelocal`.
fn reject_local_groups(ctx: &ProviderContext<'_>, resource: &Resource) -> Result<()> {
    if resource.should("groups").is_some() && tool(ctx, resource, "modify", "localmodify").1 {
        return Err(ProviderError::Unsupported {
            provider: ctx.provider().to_string(),
            operation: "groups with forcelocal (libuser has no -G)".to_string(),
        });
    }
    Ok(())
}

/// Account lifecycle over the passwd and group files.
pub struct Useradd {
    passwd: PathBuf,
    group: PathBuf,
}

impl Lifecycle for Useradd {
    fn instances(&self, _ctx: &ProviderContext<'_>) -> Result<Option<Vec<PropertyHash>>> {
        read_accounts(&self.passwd, &self.group).map(Some)
    }

    fn create(&self, ctx: &ProviderContext<'_>, resource: &Resource, _ensure: &Value) -> Result<()> {
        reject_local_groups(ctx, resource)?;
        let (symbol, local) = tool(ctx, resource, "add", "localadd");
        let mut args = property_flags(resource, None);
        if resource.param_flag("managehome") {
            if !local {
                args.push("-m".to_string());
            }
        } else {
            args.push("-M".to_string());
        }
        args.push(resource.name().to_string());
        ctx.run(symbol, &args)?;
        Ok(())
    }

    fn destroy(&self, ctx: &ProviderContext<'_>, resource: &Resource, _ensure: &Value) -> Result<()> {
        let (symbol, _) = tool(ctx, resource, "delete", "localdelete");
        let mut args = Vec::new();
        if resource.param_flag("managehome") {
            args.push("-r");
        }
        args.push(resource.name());
        ctx.run(symbol, &args)?;
        Ok(())
    }

    fn flush(&self, ctx: &ProviderContext<'_>, resource: &Resource, changed: &[String]) -> Result<()> {
        // create and destroy already applied everything
        if changed.iter().any(|c| c == ENSURE) {
            return Ok(());
        }

        let (symbol, local) = tool(ctx, resource, "modify", "localmodify");
        let mut args = property_flags(resource, Some(changed));
        if args.is_empty() {
            return Ok(());
        }
        if changed.iter().any(|c| c == "home") && resource.param_flag("managehome") && !local {
            args.push("-m".to_string());
        }
        args.push(resource.name().to_string());
        ctx.run(symbol, &args)?;
        Ok(())
    }
}

/// The useradd provider spec.
pub fn spec(options: &Options) -> ProviderSpec {
    let mut builder = ProviderSpec::builder("user", "useradd")
        .description("Local accounts via useradd, usermod and userdel")
        .command("add", "useradd")
        .command("delete", "userdel")
        .command("modify", "usermod")
        .optional_command("localadd", "luseradd")
        .optional_command("localdelete", "luserdel")
        .optional_command("localmodify", "lusermod")
        .confine(Confine::fact("kernel", &["linux"]))
        .confine(Confine::command("add"))
        .default_for(DefaultRule::new().fact("kernel", &["linux"]))
        .feature(MANAGES_HOMEDIR)
        .lifecycle(Useradd {
            passwd: options.passwd.clone(),
            group: options.group.clone(),
        });
    if options.libuser {
        builder = builder.feature(MANAGES_LOCAL_USERS);
    }
    for (name, _) in PROPERTIES {
        builder = match *name {
            "groups" => builder.setter(name, |ctx, resource, _value| reject_local_groups(ctx, resource)),
            _ => builder.setter(name, |_ctx, _resource, _value| Ok(())),
        };
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, debian};
    use provider::{ApplyResult, ErrorCategory, ScriptedExecutor};
    use tempfile::TempDir;

    const TOOLS: &[&str] = &["useradd", "userdel", "usermod"];

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
alice:x:1001:1001:Alice:/home/alice:/bin/bash
";

    const GROUP: &str = "\
wheel:x:10:alice
alice:x:1001:
";

    fn harness(tools: &[&str], libuser: bool) -> (Harness, TempDir) {
        let etc = tempfile::tempdir().unwrap();
        std::fs::write(etc.path().join("passwd"), PASSWD).unwrap();
        std::fs::write(etc.path().join("group"), GROUP).unwrap();
        let h = Harness::with_options(debian(), tools, ScriptedExecutor::new(), |options| {
            options.passwd = etc.path().join("passwd");
            options.group = etc.path().join("group");
            options.libuser = libuser;
        });
        (h, etc)
    }

    fn user(name: &str) -> Resource {
        Resource::new("user", name).ensure("present")
    }

    #[test]
    fn test_useradd_is_default_on_linux() {
        let (h, _etc) = harness(TOOLS, false);
        let chosen = h.session.resolve(&user("bob")).unwrap();
        assert_eq!(chosen.name(), "useradd");
    }

    #[test]
    fn test_create_passes_properties() {
        let (h, _etc) = harness(TOOLS, false);
        let report = h.session.converge(vec![
            user("bob")
                .with_property("uid", 1002_i64)
                .with_property("shell", Value::text("/bin/zsh"))
                .with_property("groups", Value::list(["wheel", "docker"]))
                .with_param("managehome", Value::text("true")),
        ]);
        assert_eq!(report.summary.created, 1);
        // one useradd, no usermod afterwards
        assert_eq!(
            h.calls(),
            vec!["useradd -u 1002 -s /bin/zsh -G wheel,docker -m bob".to_string()]
        );
    }

    #[test]
    fn test_changes_flush_in_one_usermod() {
        let (h, _etc) = harness(TOOLS, false);
        let report = h.session.converge(vec![
            user("alice")
                .with_property("uid", 1001_i64)
                .with_property("comment", Value::text("Alice Liddell"))
                .with_property("shell", Value::text("/bin/zsh")),
        ]);
        assert_eq!(report.summary.modified, 1);
        assert_eq!(
            h.calls(),
            vec!["usermod -c Alice Liddell -s /bin/zsh alice".to_string()]
        );
    }

    #[test]
    fn test_in_sync_account_runs_nothing() {
        let (h, _etc) = harness(TOOLS, false);
        let report = h.session.converge(vec![
            user("alice")
                .with_property("uid", "1001")
                .with_property("groups", Value::list(["wheel"])),
        ]);
        assert_eq!(report.summary.no_change, 1);
        assert!(h.calls().is_empty());
    }

    #[test]
    fn test_remove_with_home() {
        let (h, _etc) = harness(TOOLS, false);
        let report = h.session.converge(vec![
            Resource::new("user", "alice")
                .ensure("absent")
                .with_param("managehome", Value::text("true")),
        ]);
        assert_eq!(report.summary.removed, 1);
        assert_eq!(h.calls(), vec!["userdel -r alice".to_string()]);
    }

    #[test]
    fn test_forcelocal_needs_libuser() {
        let (h, _etc) = harness(TOOLS, false);
        let report = h.session.converge(vec![
            user("carol").with_param("forcelocal", Value::text("true")),
        ]);
        assert_eq!(report.summary.failed, 1);
        assert!(matches!(
            report.resources[0].result,
            ApplyResult::Failed {
                category: ErrorCategory::PropertyNotManageable,
                ..
            }
        ));

        let tools = [TOOLS, &["luseradd", "luserdel", "lusermod"]].concat();
        let (h, _etc) = harness(&tools, true);
        let report = h.session.converge(vec![
            user("carol").with_param("forcelocal", Value::text("true")),
        ]);
        assert_eq!(report.resources[0].result, ApplyResult::Created);
        assert_eq!(h.calls(), vec!["luseradd -M carol".to_string()]);
    }

    #[test]
    fn test_forcelocal_groups_fail_without_running() {
        let tools = [TOOLS, &["luseradd", "luserdel", "lusermod"]].concat();
        let (h, _etc) = harness(&tools, true);
        let catalog = || {
            vec![
                user("alice")
                    .with_property("groups", Value::list(["wheel", "docker"]))
                    .with_param("forcelocal", Value::text("true")),
                user("dave")
                    .with_property("groups", Value::list(["wheel"]))
                    .with_param("forcelocal", Value::text("true")),
            ]
        };

        for _ in 0..2 {
            let report = h.session.converge(catalog());
            assert_eq!(report.summary.failed, 2);
            assert_eq!(report.summary.total_changes(), 0);
        }
        assert!(h.calls().is_empty());

        // groups already in place need nothing from libuser
        let report = h.session.converge(vec![
            user("alice")
                .with_property("groups", Value::list(["wheel"]))
                .with_property("shell", Value::text("/bin/zsh"))
                .with_param("forcelocal", Value::text("true")),
        ]);
        assert_eq!(report.summary.modified, 1);
        assert_eq!(h.calls(), vec!["lusermod -s /bin/zsh alice".to_string()]);
    }

    #[test]
    fn test_forcelocal_false_needs_no_libuser() {
        let (h, _etc) = harness(TOOLS, false);
        let report = h.session.converge(vec![
            user("bob").with_param("forcelocal", Value::text("false")),
        ]);
        assert_eq!(report.resources[0].result, ApplyResult::Created);
        assert_eq!(h.calls(), vec!["useradd -M bob".to_string()]);
    }
}
