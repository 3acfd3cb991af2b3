//! Free-form values for drive groups
//!
//! Drive group specs are passed through to the orchestrator untouched, so
//! they are held as a tagged recursive value rather than a typed struct.

use indexmap::IndexMap;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::placement::Placement;

/// A free-form value: map, list, string, number, bool or null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Map(IndexMap::new())
    }
}

impl Value {
    /// Structural copy of the whole tree; nothing is shared with `self`
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Number(n.clone()),
            Value::String(s) => Value::String(s.clone()),
            Value::List(items) => Value::List(items.iter().map(Value::deep_copy).collect()),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
        }
    }

    /// Look up a key when this value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Mutable lookup of a key when this value is a map
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Map(entries) => entries.get_mut(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Schema for a value the API server must keep verbatim
pub fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    let mut obj = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    obj.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(obj)
}

/// A named drive group with its free-form spec and placement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriveGroup {
    pub name: String,

    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub spec: Value,

    #[serde(default)]
    pub placement: Placement,
}

impl DriveGroup {
    pub fn deep_copy(&self) -> DriveGroup {
        DriveGroup {
            name: self.name.clone(),
            spec: self.spec.deep_copy(),
            placement: self.placement.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::from(serde_json::json!({
            "data_devices": {"rotational": true, "limit": 3, "paths": ["/dev/sdb", "/dev/sdc"]},
            "db_devices": {"model": "SSD-123"},
            "encrypted": false,
            "osds_per_device": null
        }))
    }

    #[test]
    fn test_deep_copy_isolated() {
        let original = sample();
        let mut copy = original.deep_copy();
        assert_eq!(copy, original);

        if let Some(Value::Map(data)) = copy.get_mut("data_devices") {
            data.insert("limit".into(), Value::String("changed".into()));
            if let Some(Value::List(paths)) = data.get_mut("paths") {
                paths.push(Value::String("/dev/sdd".into()));
                paths[0] = Value::Null;
            }
        }
        if let Some(Value::Map(db)) = copy.get_mut("db_devices") {
            db.clear();
        }

        assert_ne!(copy, original);
        assert_eq!(original, sample());
    }

    #[test]
    fn test_serde_untagged() {
        let v: Value = serde_json::from_str(r#"{"a": [1, "x", true, null, {"b": 2.5}]}"#).unwrap();
        let Value::List(items) = v.get("a").unwrap() else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 5);
        assert_eq!(items[1].as_str(), Some("x"));
        assert_eq!(items[3], Value::Null);

        let back = serde_json::to_string(&v).unwrap();
        assert_eq!(back, r#"{"a":[1,"x",true,null,{"b":2.5}]}"#);
    }

    #[test]
    fn test_drive_group_deep_copy() {
        let dg = DriveGroup {
            name: "fast".into(),
            spec: sample(),
            ..Default::default()
        };
        let mut copy = dg.deep_copy();
        copy.spec = Value::Null;
        assert_eq!(dg.spec, sample());
    }
}
