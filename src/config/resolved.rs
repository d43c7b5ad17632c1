//! Normalized schema: field definitions compiled into engine-ready descriptors.

use crate::config::Constraints;
use crate::error::ConfigError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Concrete storage type a primitive type name resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    String,
    Number,
    Boolean,
    Date,
    /// Reference to another document's identifier.
    ObjectId,
    /// Bare array, elements unchecked.
    Array,
    /// Any JSON value.
    Mixed,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::String => "string",
            StorageType::Number => "number",
            StorageType::Boolean => "boolean",
            StorageType::Date => "date",
            StorageType::ObjectId => "objectid",
            StorageType::Array => "array",
            StorageType::Mixed => "mixed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldDescriptor {
    Scalar {
        storage: StorageType,
        constraints: Constraints,
    },
    Embedded(SchemaDescriptor),
    /// Single-element wrapper: every element has this shape.
    Array(Box<FieldDescriptor>),
}

impl FieldDescriptor {
    pub fn scalar(storage: StorageType) -> Self {
        FieldDescriptor::Scalar {
            storage,
            constraints: Constraints::default(),
        }
    }

    /// Mongoose-like JSON rendering: `{"type": "string", ...}`, nested objects, `[elem]`.
    pub fn to_json(&self) -> Value {
        match self {
            FieldDescriptor::Scalar { storage, constraints } => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String(storage.as_str().into()));
                for (k, v) in &constraints.0 {
                    obj.insert(k.clone(), v.clone());
                }
                Value::Object(obj)
            }
            FieldDescriptor::Embedded(schema) => schema.to_json(),
            FieldDescriptor::Array(elem) => Value::Array(vec![elem.to_json()]),
        }
    }

    /// Levels of embedding/array wrapping below this field (a scalar is 0).
    pub fn depth(&self) -> usize {
        match self {
            FieldDescriptor::Scalar { .. } => 0,
            FieldDescriptor::Embedded(schema) => 1 + schema.depth(),
            FieldDescriptor::Array(elem) => 1 + elem.depth(),
        }
    }
}

/// Field name -> descriptor. Ordered, so equal inputs give equal (and equally ordered) trees.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaDescriptor {
    fields: BTreeMap<String, FieldDescriptor>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, field: FieldDescriptor) {
        self.fields.insert(name.into(), field);
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDescriptor)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.fields.values().map(FieldDescriptor::depth).max().unwrap_or(0)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Dot paths of date-typed scalars reachable through embedded documents.
    pub fn date_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_date_paths(self, "", &mut out);
        out
    }
}

fn collect_date_paths(schema: &SchemaDescriptor, prefix: &str, out: &mut Vec<String>) {
    for (name, field) in schema.iter() {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match field {
            FieldDescriptor::Scalar {
                storage: StorageType::Date,
                ..
            } => out.push(path),
            FieldDescriptor::Embedded(inner) => collect_date_paths(inner, &path, out),
            _ => {}
        }
    }
}

/// Names of the automatic creation/update timestamp fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampFields {
    pub created_at: String,
    pub updated_at: String,
}

impl Default for TimestampFields {
    fn default() -> Self {
        TimestampFields {
            created_at: "createdAt".into(),
            updated_at: "updatedAt".into(),
        }
    }
}

/// Per-model options: the remote `options` bag merged over `{ timestamps: true }`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelOptions {
    /// `None` when the config sets `timestamps: false`.
    pub timestamps: Option<TimestampFields>,
    /// Drop fields the schema does not declare. Off by default: documents stay open.
    pub strict: bool,
    /// Storage collection override; defaults to the entity name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Remaining engine options, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        ModelOptions {
            timestamps: Some(TimestampFields::default()),
            strict: false,
            collection: None,
            extra: Map::new(),
        }
    }
}

impl ModelOptions {
    /// Merge a remote options bag over the defaults.
    pub fn from_config(options: Option<&Map<String, Value>>) -> Result<Self, ConfigError> {
        let mut out = ModelOptions::default();
        let Some(options) = options else {
            return Ok(out);
        };
        for (key, value) in options {
            match (key.as_str(), value) {
                ("timestamps", Value::Bool(true)) => out.timestamps = Some(TimestampFields::default()),
                ("timestamps", Value::Bool(false)) => out.timestamps = None,
                ("timestamps", Value::Object(names)) => {
                    let mut fields = TimestampFields::default();
                    if let Some(name) = names.get("createdAt").and_then(Value::as_str) {
                        fields.created_at = name.to_string();
                    }
                    if let Some(name) = names.get("updatedAt").and_then(Value::as_str) {
                        fields.updated_at = name.to_string();
                    }
                    out.timestamps = Some(fields);
                }
                ("strict", Value::Bool(b)) => out.strict = *b,
                ("collection", Value::String(name)) => out.collection = Some(name.clone()),
                ("timestamps" | "strict" | "collection", other) => {
                    return Err(ConfigError::Invalid(format!(
                        "option '{}' has unsupported value {}",
                        key, other
                    )));
                }
                _ => {
                    out.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_default_to_timestamps_and_open_documents() {
        let opts = ModelOptions::from_config(None).unwrap();
        assert_eq!(opts.timestamps, Some(TimestampFields::default()));
        assert!(!opts.strict);
    }

    #[test]
    fn remote_options_override_defaults_and_keep_extras() {
        let bag = json!({"timestamps": false, "strict": true, "versionKey": false});
        let opts = ModelOptions::from_config(bag.as_object()).unwrap();
        assert!(opts.timestamps.is_none());
        assert!(opts.strict);
        assert_eq!(opts.extra.get("versionKey"), Some(&json!(false)));
    }

    #[test]
    fn custom_timestamp_names() {
        let bag = json!({"timestamps": {"createdAt": "created_on"}});
        let opts = ModelOptions::from_config(bag.as_object()).unwrap();
        let ts = opts.timestamps.unwrap();
        assert_eq!(ts.created_at, "created_on");
        assert_eq!(ts.updated_at, "updatedAt");
    }

    #[test]
    fn rejects_non_boolean_strict() {
        let bag = json!({"strict": "throw"});
        assert!(ModelOptions::from_config(bag.as_object()).is_err());
    }

    #[test]
    fn date_paths_follow_embedded_documents_only() {
        let mut address = SchemaDescriptor::new();
        address.insert("movedIn", FieldDescriptor::scalar(StorageType::Date));
        let mut schema = SchemaDescriptor::new();
        schema.insert("born", FieldDescriptor::scalar(StorageType::Date));
        schema.insert("address", FieldDescriptor::Embedded(address));
        schema.insert(
            "visits",
            FieldDescriptor::Array(Box::new(FieldDescriptor::scalar(StorageType::Date))),
        );
        assert_eq!(schema.date_paths(), vec!["address.movedIn".to_string(), "born".to_string()]);
        assert_eq!(schema.depth(), 1);
    }
}
