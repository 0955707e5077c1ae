//! Attribute values of a single resource or data source instance.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// The id and attribute values of one resource instance, together with the
/// values it had before the current operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: Option<String>,
    values: Map<String, Value>,
    prior: Map<String, Value>,
}

impl ResourceData {
    /// Data for a resource that does not exist yet, built from configuration.
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            id: None,
            values,
            prior: Map::new(),
        }
    }

    /// Data for an existing resource, as recorded in state.
    pub fn from_state(id: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            id: Some(id.into()),
            prior: values.clone(),
            values,
        }
    }

    /// Data for an update from `prior` state to the `planned` values.
    pub fn for_update(
        id: impl Into<String>,
        prior: Map<String, Value>,
        planned: Map<String, Value>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            values: planned,
            prior,
        }
    }

    /// Builds configuration data from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self::new(values)),
            other => Err(Error::InvalidAttribute {
                name: "config".to_string(),
                reason: format!("expected an object, got {}", other),
            }),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn require_id(&self) -> Result<&str> {
        self.id().ok_or(Error::MissingId)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Marks the resource as gone, removing it from state.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// Returns the value of `key`, treating `null` as unset.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    }

    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.get(key)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| Error::MissingAttribute(key.to_string()))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key)
            .ok_or_else(|| Error::MissingAttribute(key.to_string()))
    }

    /// Returns the value `key` had before the current operation.
    pub fn prior(&self, key: &str) -> Option<&Value> {
        self.prior.get(key).filter(|v| !v.is_null())
    }

    pub fn prior_list(&self, key: &str) -> &[Value] {
        self.prior(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Keeps the prior value of `key` when no new value was given. Returns
    /// whether a value was carried over.
    pub fn keep_prior(&mut self, key: &str) -> bool {
        if self.get(key).is_some() {
            return false;
        }
        match self.prior(key).cloned() {
            Some(value) => {
                self.set(key, value);
                true
            }
            None => false,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Sets `key` to `value`, or to `null` when absent.
    pub fn set_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) {
        self.set(key, value.map_or(Value::Null, Into::into));
    }

    /// Whether `key` differs between the prior and the current values. Empty
    /// lists and maps count as unset.
    pub fn has_change(&self, key: &str) -> bool {
        let normalize = |v: Option<&Value>| {
            v.filter(|v| match v {
                Value::Null => false,
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
                _ => true,
            })
            .cloned()
        };
        normalize(self.values.get(key)) != normalize(self.prior.get(key))
    }

    /// Names of all attributes whose value changed.
    pub fn changed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .keys()
            .chain(self.prior.keys())
            .filter(|key| self.has_change(key))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
