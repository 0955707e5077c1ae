//! Resource modules.

pub mod custom_image;
pub mod floating_ip;
pub mod network;
pub mod objects_user;
pub mod server;
pub mod server_group;
pub mod subnet;
pub mod volume;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{Attribute, ValueType};
use crate::state::ResourceData;

pub(crate) type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ZoneRef {
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RegionRef {
    pub slug: String,
}

/// Reference to another object, as embedded in API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ObjectRef {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub href: String,
}

pub(crate) fn tags_attribute() -> Attribute {
    Attribute::optional(ValueType::map(ValueType::String))
        .describe("Key/value pairs attached to the object.")
}

pub(crate) fn href_attribute() -> Attribute {
    Attribute::computed_string().describe("The API URL of the object.")
}

pub(crate) fn tags_value(tags: &Tags) -> Value {
    Value::Object(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

pub(crate) fn uuids(refs: &[ObjectRef]) -> Value {
    Value::Array(refs.iter().map(|r| Value::String(r.uuid.clone())).collect())
}

pub(crate) fn string_list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// Builds a PATCH body from the attributes that changed. `fields` maps
/// attribute names to API field names. Removed tags are sent as an empty map.
pub(crate) fn patch_changes(data: &ResourceData, fields: &[(&str, &str)]) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(attribute, _)| data.has_change(attribute))
        .map(|(attribute, field)| {
            let value = match (data.get(attribute), *attribute) {
                (Some(value), _) => value.clone(),
                (None, "tags") => Value::Object(Map::new()),
                (None, _) => Value::Null,
            };
            (field.to_string(), value)
        })
        .collect()
}
