//! TOML catalogs: one array of tables per resource type.
//!
//! ```toml
//! [[package]]
//! name = "nginx"
//! ensure = "latest"
//!
//! [[package]]
//! name = "requests"
//! provider = "pip"
//! ensure = ">=2.31, <3"
//!
//! [[user]]
//! name = "deploy"
//! uid = 1100
//! groups = ["docker"]
//! managehome = true
//! ```

use anyhow::{Context, Result, bail};
use provider::{ProviderRegistry, Resource, ResourceType, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A parsed catalog, entries grouped by type in file order.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: BTreeMap<String, Vec<toml::Table>>,
}

fn to_value(key: &str, raw: toml::Value) -> Result<Value> {
    Ok(match raw {
        toml::Value::String(s) => Value::Text(s),
        toml::Value::Integer(i) => Value::Integer(i),
        toml::Value::Boolean(b) => Value::text(b.to_string()),
        toml::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(|item| match item {
                    toml::Value::String(s) => Ok(s),
                    other => bail!("{key}: list items must be strings, got {}", other.type_str()),
                })
                .collect::<Result<_>>()?,
        ),
        other => bail!("{key}: unsupported value type {}", other.type_str()),
    })
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read catalog {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, Vec<toml::Table>> = toml::from_str(content)?;
        Ok(Self { entries })
    }

    /// Number of entries across all types.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validated resources per type, in the registry's type order.
    pub fn resources(&self, registry: &ProviderRegistry) -> Result<Vec<(String, Vec<Resource>)>> {
        if let Some(unknown) = self
            .entries
            .keys()
            .find(|name| registry.schema(name).is_err())
        {
            bail!("unknown resource type '{unknown}'");
        }

        let mut grouped = Vec::new();
        for type_name in registry.type_names() {
            let Some(tables) = self.entries.get(type_name) else {
                continue;
            };
            let schema = registry.schema(type_name)?;
            let mut resources = Vec::with_capacity(tables.len());
            for (index, table) in tables.iter().enumerate() {
                let resource = build(schema, table)
                    .with_context(|| format!("{type_name} entry #{}", index + 1))?;
                resources.push(resource);
            }
            grouped.push((type_name.to_string(), resources));
        }
        Ok(grouped)
    }
}

fn build(schema: &ResourceType, table: &toml::Table) -> Result<Resource> {
    let type_name = schema.name();
    let mut table = table.clone();
    let name = match table.remove("name") {
        Some(toml::Value::String(name)) if !name.is_empty() => name,
        Some(_) => bail!("{type_name}: name must be a non-empty string"),
        None => bail!("{type_name}: missing name"),
    };
    let provider = match table.remove("provider") {
        Some(toml::Value::String(provider)) => Some(provider),
        Some(_) => bail!("{type_name}[{name}]: provider must be a string"),
        None => None,
    };

    let attributes = table
        .into_iter()
        .map(|(key, raw)| to_value(&key, raw).map(|value| (key, value)))
        .collect::<Result<Vec<_>>>()?;
    Ok(schema.resource(&name, attributes, provider.as_deref())?)
}
