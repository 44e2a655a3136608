//! `steward resource`: show resources in catalog syntax.

use crate::Context;
use crate::config::Settings;
use anyhow::{Context as _, Result, bail};
use provider::{AttrKind, Observed, PropertyHash, Resource, ResourceType, Value};

fn quote(value: &Value) -> String {
    match value {
        Value::Integer(i) => i.to_string(),
        Value::List(items) => {
            let quoted: Vec<String> = items.iter().map(|i| format!("{i:?}")).collect();
            format!("[{}]", quoted.join(", "))
        }
        other => format!("{:?}", other.to_string()),
    }
}

/// Render an observed entity as a catalog entry.
pub fn render(schema: &ResourceType, hash: &PropertyHash) -> String {
    let mut lines = vec![format!("[[{}]]", schema.name()), format!("name = {:?}", hash.name)];
    for def in schema.attributes() {
        if def.kind == AttrKind::Parameter {
            continue;
        }
        if let Some(value) = hash.get(&def.name) {
            lines.push(format!("{} = {}", def.name, quote(value)));
        }
    }
    lines.join("\n")
}

pub fn run(
    _ctx: &Context,
    settings: &Settings,
    resource_type: &str,
    name: Option<&str>,
    provider: Option<&str>,
) -> Result<()> {
    let session = super::session(settings, true)?;
    let schema = session.registry().schema(resource_type)?;

    let mut probe = Resource::new(resource_type, name.unwrap_or(""));
    if let Some(provider) = provider {
        probe = probe.with_provider(provider);
    }
    let spec = session.resolve(&probe)?;

    let Some(name) = name else {
        let lifecycle = spec
            .lifecycle()
            .with_context(|| format!("provider {} has no lifecycle", spec.name()))?;
        let Some(all) = lifecycle.instances(&session.context(&spec, None))? else {
            bail!("provider {} cannot list {resource_type} resources", spec.name());
        };
        let rendered: Vec<String> = all.iter().map(|hash| render(schema, hash)).collect();
        println!("{}", rendered.join("\n\n"));
        return Ok(());
    };

    let mut instance = session.bind(probe.with_provider(spec.name()))?;
    session.query(&mut instance)?;
    match instance.observed() {
        Observed::Found(hash) => println!("{}", render(schema, hash)),
        Observed::NotFound | Observed::Unknown => {
            let absent = PropertyHash::new(name, Value::Absent);
            println!("{}", render(schema, &absent));
        }
        Observed::Ambiguous(candidates) => {
            for hash in candidates {
                println!("{}\n", render(schema, hash));
            }
            bail!("{resource_type}[{name}] matches {} entities", candidates.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_user() {
        let schema = hostkit::schema::user_type();
        let hash = PropertyHash::new("alice", Value::Present)
            .with_property("uid", 1001_i64)
            .with_property("shell", Value::text("/bin/zsh"))
            .with_property("groups", Value::list(["docker", "wheel"]));
        assert_eq!(
            render(&schema, &hash),
            "[[user]]\nname = \"alice\"\nensure = \"present\"\nuid = 1001\nshell = \"/bin/zsh\"\ngroups = [\"docker\", \"wheel\"]"
        );
    }
}
