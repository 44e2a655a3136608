//! Resource types (attribute schemas) and resource instances.
//!
//! A [`ResourceType`] describes the attributes a kind of resource accepts:
//! which are synced (`Ensure`, `Property`), which only steer the provider
//! (`Parameter`), their legal values, and the provider features they
//! require. A [`Resource`] is one validated entry of a catalog.

use crate::error::{ProviderError, Result};
use crate::feature::Feature;
use crate::value::Value;
use crate::version::VersionScheme;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the identity-state attribute.
pub const ENSURE: &str = "ensure";

/// How an attribute participates in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Identity state (exists / version / removed)
    Ensure,
    /// Synced against observed state
    Property,
    /// Passed to the provider, never synced
    Parameter,
}

/// Legal values of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    /// Any text
    Any,
    /// One of the given symbols; `free_text` also admits other text
    Symbols {
        allowed: Vec<String>,
        free_text: bool,
    },
    /// List of strings (a single string becomes a one-element list)
    List,
    /// Integer (decimal text is accepted)
    Integer,
    /// `true` / `false`
    Boolean,
}

/// Schema entry for one attribute.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttrKind,
    pub domain: Domain,
    /// Features the bound provider must declare to use this attribute
    pub features: Vec<Feature>,
    pub description: String,
}

impl AttributeDef {
    fn new(name: &str, kind: AttrKind, domain: Domain) -> Self {
        Self {
            name: name.to_string(),
            kind,
            domain,
            features: Vec::new(),
            description: String::new(),
        }
    }

    /// The ensure attribute with its symbolic values.
    pub fn ensure(symbols: &[&str]) -> Self {
        Self::new(
            ENSURE,
            AttrKind::Ensure,
            Domain::Symbols {
                allowed: symbols.iter().map(|s| (*s).to_string()).collect(),
                free_text: false,
            },
        )
    }

    /// A synced property accepting any text.
    pub fn property(name: &str) -> Self {
        Self::new(name, AttrKind::Property, Domain::Any)
    }

    /// A parameter accepting any text.
    pub fn parameter(name: &str) -> Self {
        Self::new(name, AttrKind::Parameter, Domain::Any)
    }

    /// Set the value domain.
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Also accept free text (versions, for ensure).
    pub fn free_text(mut self) -> Self {
        if let Domain::Symbols { free_text, .. } = &mut self.domain {
            *free_text = true;
        }
        self
    }

    /// Require a provider feature.
    pub fn requires(mut self, feature: &str) -> Self {
        self.features.push(Feature::new(feature));
        self
    }

    /// Set the description.
    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Normalize and validate a raw value against the domain.
    pub fn coerce(&self, raw: Value) -> Result<Value> {
        let invalid = |message: String| ProviderError::InvalidValue {
            attribute: self.name.clone(),
            message,
        };

        match &self.domain {
            Domain::Any => match raw {
                Value::Text(_) => Ok(raw),
                Value::Integer(i) => Ok(Value::Text(i.to_string())),
                other => Ok(Value::Text(other.to_string())),
            },
            Domain::Symbols { allowed, free_text } => {
                let value = match raw {
                    Value::Text(s) => Value::parse_symbol(&s),
                    Value::Integer(i) => Value::Text(i.to_string()),
                    other => other,
                };
                match &value {
                    Value::Text(_) if *free_text => Ok(value),
                    Value::List(_) => Err(invalid("expected a single value".to_string())),
                    v if allowed.iter().any(|a| a == v.kind() || a == &v.to_string()) => {
                        Ok(value)
                    }
                    v => Err(invalid(format!(
                        "'{}' is not one of: {}",
                        v,
                        allowed.join(", ")
                    ))),
                }
            }
            Domain::List => match raw {
                Value::List(_) => Ok(raw),
                Value::Text(s) => Ok(Value::List(vec![s])),
                other => Err(invalid(format!("expected a list, got {}", other.kind()))),
            },
            Domain::Integer => match raw {
                Value::Integer(_) => Ok(raw),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| invalid(format!("'{s}' is not an integer"))),
                other => Err(invalid(format!("expected an integer, got {}", other.kind()))),
            },
            Domain::Boolean => match raw {
                Value::Text(s) if s == "true" || s == "false" => Ok(Value::Text(s)),
                other => Err(invalid(format!("expected true or false, got '{other}'"))),
            },
        }
    }
}

/// Schema of a resource kind.
#[derive(Debug, Clone)]
pub struct ResourceType {
    name: String,
    attributes: Vec<AttributeDef>,
    /// Ensure value kind (`latest`, `text`, `range`, ...) → required feature
    ensure_features: BTreeMap<String, Vec<Feature>>,
}

impl ResourceType {
    /// Create a schema with no attributes.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            ensure_features: BTreeMap::new(),
        }
    }

    /// Add an attribute definition.
    pub fn attribute(mut self, def: AttributeDef) -> Self {
        self.attributes.push(def);
        self
    }

    /// Require a feature when ensure takes a value of the given kind.
    ///
    /// Kinds are the [`Value::kind`] names, plus `range` for version range
    /// expressions.
    pub fn ensure_requires(mut self, kind: &str, feature: &str) -> Self {
        self.ensure_features
            .entry(kind.to_string())
            .or_default()
            .push(Feature::new(feature));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    /// Look up an attribute definition.
    pub fn attr(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Features a provider needs to manage `attribute` with `value`.
    ///
    /// `scheme` is the bound provider's version scheme; it decides whether
    /// an ensure text is a range. A boolean parameter set to `false` asks
    /// for nothing.
    pub fn required_features(
        &self,
        attribute: &str,
        value: &Value,
        scheme: &dyn VersionScheme,
    ) -> Vec<Feature> {
        let Some(def) = self.attr(attribute) else {
            return Vec::new();
        };
        if def.domain == Domain::Boolean && value.as_text() == Some("false") {
            return Vec::new();
        }
        let mut features = def.features.clone();

        if attribute == ENSURE {
            let mut kinds = vec![value.kind()];
            if value.as_text().is_some_and(|text| scheme.is_range(text)) {
                kinds.push("range");
            }
            for kind in kinds {
                if let Some(extra) = self.ensure_features.get(kind) {
                    features.extend(extra.iter().cloned());
                }
            }
        }
        features
    }

    /// Build a validated resource from raw attribute values.
    ///
    /// Unknown attributes are rejected. Each value is coerced to its domain
    /// and routed to the desired state or the parameters by kind.
    pub fn resource<I>(&self, name: &str, attributes: I, provider: Option<&str>) -> Result<Resource>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut resource = Resource::new(&self.name, name);
        if let Some(provider) = provider {
            resource = resource.with_provider(provider);
        }

        for (attr_name, raw) in attributes {
            let def = self
                .attr(&attr_name)
                .ok_or_else(|| ProviderError::UnknownAttribute {
                    type_name: self.name.clone(),
                    attribute: attr_name.clone(),
                })?;
            let value = def.coerce(raw)?;
            match def.kind {
                AttrKind::Ensure | AttrKind::Property => {
                    resource.should.insert(attr_name, value);
                }
                AttrKind::Parameter => {
                    resource.parameters.insert(attr_name, value);
                }
            }
        }
        Ok(resource)
    }
}

/// One entry of the catalog: a typed, named, desired state.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    type_name: String,
    name: String,
    should: BTreeMap<String, Value>,
    parameters: BTreeMap<String, Value>,
    provider: Option<String>,
}

impl Resource {
    /// Create a resource with no desired values.
    pub fn new(type_name: &str, name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            name: name.to_string(),
            should: BTreeMap::new(),
            parameters: BTreeMap::new(),
            provider: None,
        }
    }

    /// Set the desired ensure value.
    pub fn ensure(self, value: impl Into<Value>) -> Self {
        self.with_property(ENSURE, value)
    }

    /// Set a desired property value.
    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.should.insert(name.to_string(), value.into());
        self
    }

    /// Set a parameter.
    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Pin the resource to a named provider.
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `type[name]`, for messages.
    pub fn title(&self) -> String {
        format!("{}[{}]", self.type_name, self.name)
    }

    /// Desired ensure value, if set.
    pub fn ensure_value(&self) -> Option<&Value> {
        self.should.get(ENSURE)
    }

    /// Desired value of an attribute (including ensure).
    pub fn should(&self, name: &str) -> Option<&Value> {
        self.should.get(name)
    }

    /// Desired values in attribute-name order.
    pub fn should_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.should.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A parameter value.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// A parameter as text.
    pub fn param_text(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(Value::as_text)
    }

    /// A parameter as a list; text becomes a single element.
    pub fn param_list(&self, name: &str) -> Vec<String> {
        match self.param(name) {
            Some(Value::List(items)) => items.clone(),
            Some(Value::Text(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// A boolean parameter; unset means false.
    pub fn param_flag(&self, name: &str) -> bool {
        self.param_text(name) == Some("true")
    }

    /// Parameters in name order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Explicitly pinned provider.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_name, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SegmentScheme;

    fn package_type() -> ResourceType {
        ResourceType::new("package")
            .attribute(
                AttributeDef::ensure(&["present", "absent", "latest", "purged", "held"]).free_text(),
            )
            .attribute(
                AttributeDef::property("mark")
                    .domain(Domain::Symbols {
                        allowed: vec!["hold".into(), "none".into()],
                        free_text: false,
                    })
                    .requires(Feature::HOLDABLE),
            )
            .attribute(AttributeDef::parameter("install_options").domain(Domain::List))
            .attribute(
                AttributeDef::parameter("install_only")
                    .domain(Domain::Boolean)
                    .requires(Feature::INSTALL_ONLY),
            )
            .ensure_requires("latest", Feature::UPGRADEABLE)
            .ensure_requires("text", Feature::VERSIONABLE)
            .ensure_requires("range", Feature::VERSION_RANGES)
    }

    fn attrs(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_resource_routes_properties_and_parameters() {
        let schema = package_type();
        let res = schema
            .resource(
                "nginx",
                attrs(&[
                    ("ensure", Value::text("installed")),
                    ("install_options", Value::text("--no-install-recommends")),
                ]),
                None,
            )
            .unwrap();

        assert_eq!(res.ensure_value(), Some(&Value::Present));
        assert_eq!(res.param_list("install_options"), vec!["--no-install-recommends"]);
        assert_eq!(res.title(), "package[nginx]");
    }

    #[test]
    fn test_unknown_attribute() {
        let err = package_type()
            .resource("nginx", attrs(&[("colour", Value::text("blue"))]), None)
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_symbol_domain() {
        let schema = package_type();
        let err = schema
            .resource("nginx", attrs(&[("mark", Value::text("frozen"))]), None)
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidValue { .. }));

        let res = schema
            .resource("nginx", attrs(&[("mark", Value::text("hold"))]), None)
            .unwrap();
        assert_eq!(res.should("mark"), Some(&Value::text("hold")));
    }

    #[test]
    fn test_integer_domain() {
        let def = AttributeDef::property("uid").domain(Domain::Integer);
        assert_eq!(def.coerce(Value::text("1001")).unwrap(), Value::Integer(1001));
        assert!(def.coerce(Value::text("abc")).is_err());
    }

    #[test]
    fn test_required_features() {
        let schema = package_type();
        let scheme = SegmentScheme;
        let features = schema.required_features("ensure", &Value::Latest, &scheme);
        assert_eq!(features, vec![Feature::new("upgradeable")]);

        let features = schema.required_features("ensure", &Value::text(">=1.2,<2"), &scheme);
        assert_eq!(
            features,
            vec![Feature::new("versionable"), Feature::new("version_ranges")]
        );

        let features = schema.required_features("ensure", &Value::text("2.0~rc1-1"), &scheme);
        assert_eq!(features, vec![Feature::new("versionable")]);

        let features = schema.required_features("mark", &Value::text("hold"), &scheme);
        assert_eq!(features, vec![Feature::new("holdable")]);
        assert!(schema.required_features("ensure", &Value::Present, &scheme).is_empty());
    }

    #[test]
    fn test_disabled_flag_needs_no_feature() {
        let schema = package_type();
        let scheme = SegmentScheme;
        let off = schema.required_features("install_only", &Value::text("false"), &scheme);
        assert!(off.is_empty());
        let on = schema.required_features("install_only", &Value::text("true"), &scheme);
        assert_eq!(on, vec![Feature::new("install_only")]);
    }
}
