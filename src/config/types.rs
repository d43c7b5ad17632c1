//! Raw config types matching the remote JSON document (entity name -> { schema, options, frontend }).

use crate::ui::UiField;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Deepest field-definition nesting accepted from a remote config. Cyclic or
/// pathological documents are rejected here instead of recursing without bound.
pub const MAX_CONFIG_DEPTH: usize = 32;

/// Field name -> field specification for one entity (or one embedded sub-document).
pub type FieldMap = BTreeMap<String, FieldSpec>;

/// One field's raw definition, as found in the remote config.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldSpec {
    /// `"string"`, `"Number"`, `"objectid"`, ...
    Primitive(String),
    /// `["string"]`: homogeneous array, only the first element is representative.
    Array(Box<FieldSpec>),
    /// `[]`: array with no element shape.
    UntypedArray,
    /// `{ "type": "string", "required": true, ... }`
    Typed {
        type_name: Option<String>,
        constraints: Constraints,
    },
    /// Plain nested object, or an object whose `type` is itself an object.
    Embedded(FieldMap),
    /// Numbers, booleans, null: nothing to resolve.
    Untyped,
}

impl FieldSpec {
    /// Parse a field definition, failing once nesting exceeds [`MAX_CONFIG_DEPTH`].
    pub fn from_value(value: &Value, depth: usize) -> Result<FieldSpec, String> {
        if depth > MAX_CONFIG_DEPTH {
            return Err(format!("field definition nested deeper than {} levels", MAX_CONFIG_DEPTH));
        }
        Ok(match value {
            Value::String(s) => FieldSpec::Primitive(s.clone()),
            Value::Array(items) => match items.first() {
                Some(first) => FieldSpec::Array(Box::new(FieldSpec::from_value(first, depth + 1)?)),
                None => FieldSpec::UntypedArray,
            },
            Value::Object(obj) => match obj.get("type").filter(|t| !is_falsy(t)) {
                Some(Value::Object(nested)) => FieldSpec::Embedded(field_map_from_object(nested, depth + 1)?),
                Some(type_value) => {
                    let type_name = match type_value {
                        Value::String(s) => Some(s.clone()),
                        // `type: [...]` declares a bare array; constraints still apply to it.
                        Value::Array(_) => Some("array".to_string()),
                        _ => None,
                    };
                    let constraints = obj
                        .iter()
                        .filter(|(k, _)| k.as_str() != "type")
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    FieldSpec::Typed {
                        type_name,
                        constraints: Constraints(constraints),
                    }
                }
                None => FieldSpec::Embedded(field_map_from_object(obj, depth + 1)?),
            },
            Value::Null | Value::Bool(_) | Value::Number(_) => FieldSpec::Untyped,
        })
    }
}

/// `null`, `false`, `0` and `""` do not declare a type; the object is a sub-document.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn field_map_from_object(obj: &Map<String, Value>, depth: usize) -> Result<FieldMap, String> {
    obj.iter()
        .map(|(k, v)| Ok((k.clone(), FieldSpec::from_value(v, depth)?)))
        .collect()
}

impl<'de> Deserialize<'de> for FieldSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        FieldSpec::from_value(&v, 0).map_err(serde::de::Error::custom)
    }
}

/// Sibling keys of `type` (required, unique, default, enum, min, ...), passed through unvalidated.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Constraints(pub Map<String, Value>);

impl Constraints {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            // mongoose style `[true, "custom message"]`
            Some(Value::Array(items)) => matches!(items.first(), Some(Value::Bool(true))),
            _ => false,
        }
    }

    /// Value of a constraint that may be given as `x` or `[x, "message"]`.
    fn scalar(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(Value::Array(items)) if key != "enum" => items.first(),
            other => other,
        }
    }

    /// Custom error message from the `[value, "message"]` form.
    pub fn message(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(Value::Array(items)) if key != "enum" => items.get(1).and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn required(&self) -> bool {
        self.flag("required")
    }

    pub fn unique(&self) -> bool {
        self.flag("unique")
    }

    pub fn index(&self) -> bool {
        self.flag("index")
    }

    pub fn trim(&self) -> bool {
        self.flag("trim")
    }

    pub fn lowercase(&self) -> bool {
        self.flag("lowercase")
    }

    pub fn uppercase(&self) -> bool {
        self.flag("uppercase")
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.0.get("default")
    }

    /// `enum: [..]` or `enum: { values: [..] }`.
    pub fn enum_values(&self) -> Option<&Vec<Value>> {
        match self.0.get("enum") {
            Some(Value::Array(values)) => Some(values),
            Some(Value::Object(obj)) => obj.get("values").and_then(Value::as_array),
            _ => None,
        }
    }

    pub fn min(&self) -> Option<&Value> {
        self.scalar("min")
    }

    pub fn max(&self) -> Option<&Value> {
        self.scalar("max")
    }

    pub fn min_length(&self) -> Option<u64> {
        self.scalar("minlength").and_then(Value::as_u64)
    }

    pub fn max_length(&self) -> Option<u64> {
        self.scalar("maxlength").and_then(Value::as_u64)
    }

    pub fn pattern(&self) -> Option<&str> {
        self.scalar("match").and_then(Value::as_str)
    }
}

/// Frontend block of an entity: the field catalog UI renderers consume.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FrontendConfig {
    #[serde(default)]
    pub fields: Vec<UiField>,
}

/// One entity entry of the remote config.
#[derive(Clone, Debug, Deserialize)]
pub struct EntityConfig {
    pub schema: FieldMap,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    #[serde(default)]
    pub frontend: Option<FrontendConfig>,
    /// Legacy location of the frontend block.
    #[serde(default)]
    pub config: Option<FrontendConfig>,
}

impl EntityConfig {
    pub fn ui_fields(&self) -> Vec<UiField> {
        self.frontend
            .as_ref()
            .or(self.config.as_ref())
            .map(|f| f.fields.clone())
            .unwrap_or_default()
    }
}

/// Top-level remote document split into candidate entities and skipped annotations.
#[derive(Clone, Debug, Default)]
pub struct RemoteConfig {
    /// Entity name -> raw entry, in name order. Parsed one by one so a bad entry stays isolated.
    pub entities: BTreeMap<String, Value>,
    /// `metadata` and entries without a `schema` key.
    pub skipped: Vec<String>,
}

/// Split the fetched document, unwrapping an optional `record` envelope.
pub fn parse_remote_config(raw: Value) -> Result<RemoteConfig, crate::error::ConfigError> {
    let root = match raw {
        Value::Object(mut obj) => match obj.remove("record") {
            Some(record) => record,
            None => Value::Object(obj),
        },
        other => other,
    };
    let Value::Object(root) = root else {
        return Err(crate::error::ConfigError::Invalid(
            "expected an object of entity configs".into(),
        ));
    };

    let mut config = RemoteConfig::default();
    for (name, entry) in root {
        let has_schema = entry.get("schema").map(|s| !s.is_null()).unwrap_or(false);
        if name == "metadata" || !has_schema {
            config.skipped.push(name);
            continue;
        }
        config.entities.insert(name, entry);
    }
    config.skipped.sort();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(v: Value) -> FieldSpec {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn parses_each_field_shape() {
        assert_eq!(spec(json!("string")), FieldSpec::Primitive("string".into()));
        assert_eq!(
            spec(json!(["number"])),
            FieldSpec::Array(Box::new(FieldSpec::Primitive("number".into())))
        );
        assert_eq!(spec(json!([])), FieldSpec::UntypedArray);
        assert_eq!(spec(json!(42)), FieldSpec::Untyped);

        let FieldSpec::Typed { type_name, constraints } = spec(json!({"type": "string", "required": true})) else {
            panic!("expected typed spec");
        };
        assert_eq!(type_name.as_deref(), Some("string"));
        assert!(constraints.required());
        assert!(constraints.get("type").is_none());
    }

    #[test]
    fn object_valued_type_is_an_embedded_document() {
        let parsed = spec(json!({"type": {"street": "string", "zip": "number"}, "required": true}));
        let FieldSpec::Embedded(fields) = parsed else {
            panic!("expected embedded spec");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["street"], FieldSpec::Primitive("string".into()));
    }

    #[test]
    fn empty_type_makes_the_object_a_sub_document() {
        for empty in [json!(null), json!(""), json!(false), json!(0)] {
            let FieldSpec::Embedded(fields) = spec(json!({"type": empty, "city": "string"})) else {
                panic!("expected embedded spec for type {empty}");
            };
            assert_eq!(fields["city"], FieldSpec::Primitive("string".into()));
            assert!(fields.contains_key("type"));
        }
    }

    #[test]
    fn array_valued_type_is_a_bare_array() {
        let FieldSpec::Typed { type_name, .. } = spec(json!({"type": ["string"], "default": []})) else {
            panic!("expected typed spec");
        };
        assert_eq!(type_name.as_deref(), Some("array"));
    }

    #[test]
    fn rejects_configs_nested_past_the_limit() {
        let mut v = json!("string");
        for _ in 0..=MAX_CONFIG_DEPTH + 1 {
            v = json!({ "inner": v });
        }
        assert!(serde_json::from_value::<FieldSpec>(v).is_err());
    }

    #[test]
    fn constraint_accessors_accept_message_tuples() {
        let c = Constraints(
            json!({"required": [true, "name please"], "min": [3, "too small"], "enum": ["a", "b"], "match": "^a"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(c.required());
        assert_eq!(c.message("required"), Some("name please"));
        assert_eq!(c.min(), Some(&json!(3)));
        assert_eq!(c.enum_values().map(Vec::len), Some(2));
        assert_eq!(c.pattern(), Some("^a"));
        assert!(!c.unique());
    }

    #[test]
    fn remote_config_unwraps_record_and_skips_annotations() {
        let parsed = parse_remote_config(json!({
            "record": {
                "metadata": {"schema": {"x": "string"}},
                "notes": {"description": "no schema here"},
                "users": {"schema": {"name": "string"}}
            }
        }))
        .unwrap();
        assert_eq!(parsed.entities.keys().collect::<Vec<_>>(), vec!["users"]);
        assert_eq!(parsed.skipped, vec!["metadata".to_string(), "notes".to_string()]);
    }

    #[test]
    fn remote_config_must_be_an_object() {
        assert!(parse_remote_config(json!(["users"])).is_err());
        assert!(parse_remote_config(json!({"record": "oops"})).is_err());
    }

    #[test]
    fn entity_config_reads_frontend_or_legacy_block() {
        let entity: EntityConfig = serde_json::from_value(json!({
            "schema": {"name": "string"},
            "config": {"fields": [{"name": "name", "label": "Name", "type": "text"}]}
        }))
        .unwrap();
        assert_eq!(entity.ui_fields().len(), 1);
        assert!(entity.options.is_none());
    }
}
