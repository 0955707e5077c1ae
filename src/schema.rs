//! Attribute schemas for the provider, its resources and data sources.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use strum::Display;

use crate::error::{Error, Result};

/// Type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ValueType {
    String,
    Int,
    Bool,
    List(Box<ValueType>),
    Map(Box<ValueType>),
    /// Nested block with a fixed set of fields.
    Object(Vec<(&'static str, ValueType)>),
}

impl ValueType {
    pub fn list(elem: ValueType) -> Self {
        ValueType::List(Box::new(elem))
    }

    pub fn map(elem: ValueType) -> Self {
        ValueType::Map(Box::new(elem))
    }

    /// Whether `value` conforms to this type. Nulls inside containers are
    /// accepted as unset values.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::List(elem), Value::Array(items)) => items.iter().all(|v| elem.matches(v)),
            (ValueType::Map(elem), Value::Object(map)) => map.values().all(|v| elem.matches(v)),
            (ValueType::Object(fields), Value::Object(map)) => map.iter().all(|(key, v)| {
                fields
                    .iter()
                    .find(|(name, _)| name == key)
                    .is_some_and(|(_, field_type)| field_type.matches(v))
            }),
            _ => false,
        }
    }
}

/// A single attribute of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub value_type: ValueType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub description: &'static str,
    pub env_default: Option<&'static str>,
    pub default: Option<Value>,
}

impl Attribute {
    fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            description: "",
            env_default: None,
            default: None,
        }
    }

    pub fn required(value_type: ValueType) -> Self {
        Self {
            required: true,
            ..Self::new(value_type)
        }
    }

    pub fn optional(value_type: ValueType) -> Self {
        Self {
            optional: true,
            ..Self::new(value_type)
        }
    }

    /// An attribute only ever set by the provider.
    pub fn computed_only(value_type: ValueType) -> Self {
        Self {
            computed: true,
            ..Self::new(value_type)
        }
    }

    pub fn required_string() -> Self {
        Self::required(ValueType::String)
    }

    pub fn optional_string() -> Self {
        Self::optional(ValueType::String)
    }

    pub fn computed_string() -> Self {
        Self::computed_only(ValueType::String)
    }

    pub fn required_int() -> Self {
        Self::required(ValueType::Int)
    }

    pub fn optional_int() -> Self {
        Self::optional(ValueType::Int)
    }

    pub fn computed_int() -> Self {
        Self::computed_only(ValueType::Int)
    }

    pub fn optional_bool() -> Self {
        Self::optional(ValueType::Bool)
    }

    pub fn optional_string_list() -> Self {
        Self::optional(ValueType::list(ValueType::String))
    }

    pub fn computed_string_list() -> Self {
        Self::computed_only(ValueType::list(ValueType::String))
    }

    /// Optional attribute that the provider fills in when left unset.
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn env_default(mut self, var: &'static str) -> Self {
        self.env_default = Some(var);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether the user may set this attribute.
    pub fn is_configurable(&self) -> bool {
        self.required || self.optional
    }
}

/// An ordered set of named attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    attributes: BTreeMap<&'static str, Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.insert(name, attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Attribute)> {
        self.attributes.iter().map(|(name, attr)| (*name, attr))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Fills unset attributes from the process environment and from static
    /// defaults.
    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        self.apply_defaults_with(config, |var| std::env::var(var).ok());
    }

    pub(crate) fn apply_defaults_with<F>(&self, config: &mut Map<String, Value>, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, attr) in self.iter() {
            if config.get(name).is_some_and(|v| !v.is_null()) {
                continue;
            }

            let from_env = attr
                .env_default
                .and_then(&env)
                .filter(|v| !v.is_empty())
                .map(Value::String);

            if let Some(value) = from_env.or_else(|| attr.default.clone()) {
                config.insert(name.to_string(), value);
            }
        }
    }

    /// Checks user configuration against the schema.
    pub fn validate(&self, config: &Map<String, Value>) -> Result<()> {
        for (name, value) in config {
            let attr = self
                .attribute(name)
                .ok_or_else(|| Error::UnknownAttribute(name.clone()))?;

            if value.is_null() {
                continue;
            }

            if !attr.is_configurable() {
                return Err(Error::ComputedAttribute(name.clone()));
            }

            if !attr.value_type.matches(value) {
                return Err(Error::InvalidAttribute {
                    name: name.clone(),
                    reason: format!("expected a value of type {}", attr.value_type),
                });
            }
        }

        for (name, attr) in self.iter() {
            if attr.required && config.get(name).map_or(true, Value::is_null) {
                return Err(Error::MissingAttribute(name.to_string()));
            }
        }

        Ok(())
    }

    /// Derives a data source schema: every attribute becomes computed, and
    /// `filters` (plus `id`) become optional lookup keys.
    pub fn lookup(&self, filters: &[&'static str]) -> Schema {
        let mut attributes: BTreeMap<&'static str, Attribute> = self
            .iter()
            .map(|(name, source)| {
                let mut attr = Attribute::computed_only(source.value_type.clone())
                    .describe(source.description);
                attr.sensitive = source.sensitive;
                if filters.contains(&name) {
                    attr.optional = true;
                }
                (name, attr)
            })
            .collect();

        attributes.insert(
            "id",
            Attribute::optional_string()
                .computed()
                .describe("The identifier of the object to look up."),
        );

        Schema { attributes }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("size_gb", Attribute::optional_int().default_value(50))
            .with_attribute("token", Attribute::optional_string().env_default("TEST_TOKEN"))
            .with_attribute("href", Attribute::computed_string())
            .with_attribute(
                "interfaces",
                Attribute::optional(ValueType::list(ValueType::Object(vec![
                    ("type", ValueType::String),
                    ("network_uuid", ValueType::String),
                ]))),
            )
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        let config = object(json!({
            "name": "db",
            "size_gb": 100,
            "interfaces": [{"type": "private", "network_uuid": "abc"}],
        }));

        assert!(schema().validate(&config).is_ok());
    }

    #[test]
    fn test_validate_missing_required() {
        let config = object(json!({"size_gb": 100}));

        let err = schema().validate(&config).unwrap_err();

        assert!(matches!(err, Error::MissingAttribute(name) if name == "name"));
    }

    #[test]
    fn test_validate_rejects_unknown_and_computed() {
        let unknown = object(json!({"name": "db", "flavour": "x"}));
        let computed = object(json!({"name": "db", "href": "x"}));

        assert!(matches!(
            schema().validate(&unknown),
            Err(Error::UnknownAttribute(_))
        ));
        assert!(matches!(
            schema().validate(&computed),
            Err(Error::ComputedAttribute(_))
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_types() {
        let config = object(json!({"name": "db", "size_gb": "large"}));
        let nested = object(json!({"name": "db", "interfaces": [{"kind": "public"}]}));

        assert!(matches!(
            schema().validate(&config),
            Err(Error::InvalidAttribute { .. })
        ));
        assert!(matches!(
            schema().validate(&nested),
            Err(Error::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_apply_defaults() {
        let mut config = object(json!({"name": "db"}));

        schema().apply_defaults_with(&mut config, |var| {
            (var == "TEST_TOKEN").then(|| "from-env".to_string())
        });

        assert_eq!(config["size_gb"], json!(50));
        assert_eq!(config["token"], json!("from-env"));
    }

    #[test]
    fn test_apply_defaults_keeps_configured_values() {
        let mut config = object(json!({"name": "db", "token": "configured"}));

        schema().apply_defaults_with(&mut config, |_| Some("from-env".to_string()));

        assert_eq!(config["token"], json!("configured"));
    }

    #[test]
    fn test_lookup_schema() {
        let lookup = schema().lookup(&["name"]);

        let name = lookup.attribute("name").unwrap();
        assert!(name.optional && name.computed && !name.required);

        let size = lookup.attribute("size_gb").unwrap();
        assert!(!size.is_configurable());
        assert!(size.default.is_none());

        assert!(lookup.attribute("id").unwrap().optional);
    }

    #[test]
    fn test_value_type_display() {
        assert_eq!(ValueType::String.to_string(), "string");
        assert_eq!(ValueType::list(ValueType::Int).to_string(), "list");
    }
}
