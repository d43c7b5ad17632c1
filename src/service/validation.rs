//! Document validation and casting against a model's compiled schema.

use crate::config::{Constraints, FieldDescriptor, ModelOptions, SchemaDescriptor, StorageType};
use crate::error::AppError;
use crate::query::{Document, ID_FIELD};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Number, Value};

/// Canonical text form of stored dates, also used by CSV export.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Read a date from RFC 3339 text, a bare `YYYY-MM-DD`, or epoch milliseconds.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

pub struct DocumentValidator;

impl DocumentValidator {
    /// Apply defaults, cast values to their declared types, and check constraints.
    /// All violations are reported together. Undeclared fields pass through unless `strict` is set.
    pub fn prepare(schema: &SchemaDescriptor, options: &ModelOptions, doc: Document) -> Result<Document, AppError> {
        let mut errors = Vec::new();
        let mut reserved = vec![ID_FIELD.to_string()];
        if let Some(ts) = &options.timestamps {
            reserved.push(ts.created_at.clone());
            reserved.push(ts.updated_at.clone());
        }
        let ctx = Context {
            strict: options.strict,
            reserved: &reserved,
        };
        let out = ctx.prepare_object(schema, doc, "", &mut errors);
        if errors.is_empty() {
            Ok(out)
        } else {
            Err(AppError::Validation(errors.join("; ")))
        }
    }
}

struct Context<'a> {
    strict: bool,
    reserved: &'a [String],
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

impl Context<'_> {
    fn prepare_object(&self, schema: &SchemaDescriptor, mut doc: Document, prefix: &str, errors: &mut Vec<String>) -> Document {
        let mut out = Map::new();
        for (name, field) in schema.iter() {
            let path = join_path(prefix, name);
            let value = doc.remove(name.as_str());
            if let Some(v) = self.prepare_field(field, value, &path, errors) {
                out.insert(name.clone(), v);
            }
        }
        for (name, value) in doc {
            let top_level_reserved = prefix.is_empty() && self.reserved.contains(&name);
            if !self.strict || top_level_reserved {
                out.insert(name, value);
            }
        }
        out
    }

    /// Returns the value to store, or `None` to leave the field absent.
    fn prepare_field(
        &self,
        field: &FieldDescriptor,
        value: Option<Value>,
        path: &str,
        errors: &mut Vec<String>,
    ) -> Option<Value> {
        match field {
            FieldDescriptor::Scalar { storage, constraints } => {
                let value = value.or_else(|| constraints.default_value().cloned());
                let missing = match &value {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.is_empty() && *storage == StorageType::String,
                    _ => false,
                };
                if missing {
                    if constraints.required() {
                        errors.push(message_or(constraints, "required", path, "is required"));
                    }
                    return value;
                }
                let value = value?;
                match cast(*storage, value, constraints) {
                    Ok(v) => {
                        check_constraints(&v, constraints, path, errors);
                        Some(v)
                    }
                    Err(reason) => {
                        errors.push(format!("{}: {}", path, reason));
                        None
                    }
                }
            }
            FieldDescriptor::Embedded(inner) => match value {
                Some(Value::Object(obj)) => Some(Value::Object(self.prepare_object(inner, obj, path, errors))),
                None => {
                    let filled = self.prepare_object(inner, Map::new(), path, errors);
                    (!filled.is_empty()).then_some(Value::Object(filled))
                }
                Some(Value::Null) => {
                    let filled = self.prepare_object(inner, Map::new(), path, errors);
                    Some(if filled.is_empty() { Value::Null } else { Value::Object(filled) })
                }
                Some(_) => {
                    errors.push(format!("{}: expected an object", path));
                    None
                }
            },
            FieldDescriptor::Array(elem) => {
                let items = match value {
                    None => Vec::new(),
                    Some(Value::Null) => return Some(Value::Null),
                    Some(Value::Array(items)) => items,
                    Some(single) => vec![single],
                };
                let out = items
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, item)| self.prepare_element(elem, item, &format!("{}.{}", path, i), errors))
                    .collect();
                Some(Value::Array(out))
            }
        }
    }

    fn prepare_element(&self, elem: &FieldDescriptor, item: Value, path: &str, errors: &mut Vec<String>) -> Option<Value> {
        if item.is_null() {
            return Some(Value::Null);
        }
        self.prepare_field(elem, Some(item), path, errors)
    }
}

fn message_or(constraints: &Constraints, key: &str, path: &str, fallback: &str) -> String {
    match constraints.message(key) {
        Some(custom) => format!("{}: {}", path, custom),
        None => format!("{}: {}", path, fallback),
    }
}

fn cast(storage: StorageType, value: Value, constraints: &Constraints) -> Result<Value, String> {
    match storage {
        StorageType::String => {
            let mut s = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err("expected a string".into()),
            };
            if constraints.trim() {
                s = s.trim().to_string();
            }
            if constraints.lowercase() {
                s = s.to_lowercase();
            } else if constraints.uppercase() {
                s = s.to_uppercase();
            }
            Ok(Value::String(s))
        }
        StorageType::Number => match value {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) => parse_number(s.trim()).ok_or_else(|| "expected a number".to_string()),
            _ => Err("expected a number".into()),
        },
        StorageType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err("expected a boolean".into()),
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Ok(Value::Bool(true)),
                Some(0) => Ok(Value::Bool(false)),
                _ => Err("expected a boolean".into()),
            },
            _ => Err("expected a boolean".into()),
        },
        StorageType::Date => parse_timestamp(&value)
            .map(|dt| Value::String(format_timestamp(&dt)))
            .ok_or_else(|| "expected a date".to_string()),
        StorageType::ObjectId => {
            // A populated reference carries its id under `_id`.
            let raw = match &value {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get(ID_FIELD).and_then(Value::as_str),
                _ => None,
            };
            raw.and_then(|s| uuid::Uuid::parse_str(s.trim()).ok())
                .map(|u| Value::String(u.to_string()))
                .ok_or_else(|| "expected a document identifier".to_string())
        }
        StorageType::Array => match value {
            Value::Array(_) => Ok(value),
            single => Ok(Value::Array(vec![single])),
        },
        StorageType::Mixed => Ok(value),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

/// A bound for min/max: numbers compare numerically, dates chronologically.
fn bound_cmp(value: &Value, bound: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(v), Some(b)) = (value.as_f64(), bound.as_f64()) {
        return v.partial_cmp(&b);
    }
    if value.is_string() {
        if let (Some(v), Some(b)) = (parse_timestamp(value), parse_timestamp(bound)) {
            return Some(v.cmp(&b));
        }
    }
    None
}

fn check_constraints(value: &Value, constraints: &Constraints, path: &str, errors: &mut Vec<String>) {
    if let Some(allowed) = constraints.enum_values() {
        if !allowed.iter().any(|a| a == value) {
            errors.push(format!(
                "{}: must be one of: {}",
                path,
                allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
            ));
        }
    }
    if let Some(min) = constraints.min() {
        if bound_cmp(value, min).map(|o| o.is_lt()).unwrap_or(false) {
            errors.push(message_or(constraints, "min", path, &format!("must be at least {}", min)));
        }
    }
    if let Some(max) = constraints.max() {
        if bound_cmp(value, max).map(|o| o.is_gt()).unwrap_or(false) {
            errors.push(message_or(constraints, "max", path, &format!("must be at most {}", max)));
        }
    }
    let Some(s) = value.as_str() else {
        return;
    };
    let len = s.chars().count() as u64;
    if let Some(min) = constraints.min_length() {
        if len < min {
            errors.push(message_or(
                constraints,
                "minlength",
                path,
                &format!("must be at least {} characters", min),
            ));
        }
    }
    if let Some(max) = constraints.max_length() {
        if len > max {
            errors.push(message_or(
                constraints,
                "maxlength",
                path,
                &format!("must be at most {} characters", max),
            ));
        }
    }
    if let Some(pattern) = constraints.pattern() {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(s) => {}
            Ok(_) => errors.push(message_or(constraints, "match", path, "does not match required pattern")),
            Err(_) => errors.push(format!("{}: invalid pattern in schema", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build_schema;
    use serde_json::json;

    fn schema(v: Value) -> SchemaDescriptor {
        build_schema(&serde_json::from_value(v).unwrap())
    }

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn prepare(s: &SchemaDescriptor, d: Value) -> Result<Document, AppError> {
        DocumentValidator::prepare(s, &ModelOptions::default(), doc(d))
    }

    #[test]
    fn missing_required_field_is_a_validation_error() {
        let s = schema(json!({"name": {"type": "string", "required": true}}));
        let err = prepare(&s, json!({"description": "x"})).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "name: is required"), "{err}");
        assert!(prepare(&s, json!({"name": ""})).is_err());
    }

    #[test]
    fn required_accepts_custom_message() {
        let s = schema(json!({"email": {"type": "string", "required": [true, "email please"]}}));
        let err = prepare(&s, json!({})).unwrap_err();
        assert!(err.to_string().contains("email: email please"));
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let s = schema(json!({
            "status": {"type": "string", "default": "new"},
            "tags": ["string"],
            "meta": {"source": {"type": "string", "default": "api"}}
        }));
        let out = prepare(&s, json!({})).unwrap();
        assert_eq!(out["status"], json!("new"));
        assert_eq!(out["tags"], json!([]));
        assert_eq!(out["meta"], json!({"source": "api"}));
    }

    #[test]
    fn casts_scalars_to_declared_types() {
        let s = schema(json!({
            "qty": "number", "active": "boolean", "label": {"type": "string", "trim": true, "uppercase": true},
            "due": "date", "owner": "objectid", "code": "string"
        }));
        let out = prepare(
            &s,
            json!({
                "qty": "12", "active": "true", "label": "  abc ", "due": "2024-03-01",
                "owner": "6F9619FF-8B86-D011-B42D-00CF4FC964FF", "code": 7
            }),
        )
        .unwrap();
        assert_eq!(out["qty"], json!(12));
        assert_eq!(out["active"], json!(true));
        assert_eq!(out["label"], json!("ABC"));
        assert_eq!(out["due"], json!("2024-03-01T00:00:00.000Z"));
        assert_eq!(out["owner"], json!("6f9619ff-8b86-d011-b42d-00cf4fc964ff"));
        assert_eq!(out["code"], json!("7"));
    }

    #[test]
    fn reports_every_cast_failure() {
        let s = schema(json!({"qty": "number", "due": "date", "owner": "objectid"}));
        let err = prepare(&s, json!({"qty": "many", "due": "soon", "owner": "nope"})).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("qty: expected a number"));
        assert!(msg.contains("due: expected a date"));
        assert!(msg.contains("owner: expected a document identifier"));
    }

    #[test]
    fn enforces_enum_range_length_and_pattern() {
        let s = schema(json!({
            "kind": {"type": "string", "enum": ["a", "b"]},
            "age": {"type": "number", "min": 0, "max": 130},
            "code": {"type": "string", "minlength": 2, "maxlength": 4, "match": "^[A-Z]+$"}
        }));
        assert!(prepare(&s, json!({"kind": "a", "age": 30, "code": "AB"})).is_ok());
        let msg = prepare(&s, json!({"kind": "z", "age": 200, "code": "abcdef"}))
            .unwrap_err()
            .to_string();
        assert!(msg.contains("kind: must be one of"));
        assert!(msg.contains("age: must be at most 130"));
        assert!(msg.contains("code: must be at most 4 characters"));
        assert!(msg.contains("code: does not match required pattern"));
    }

    #[test]
    fn validates_embedded_documents_and_array_elements() {
        let s = schema(json!({
            "address": {"city": {"type": "string", "required": true}},
            "items": [{"qty": {"type": "number", "min": 1}}]
        }));
        let msg = prepare(&s, json!({"items": [{"qty": 2}, {"qty": 0}]})).unwrap_err().to_string();
        assert!(msg.contains("address.city: is required"));
        assert!(msg.contains("items.1.qty: must be at least 1"));
        assert!(prepare(&s, json!({"address": "nowhere"})).is_err());
    }

    #[test]
    fn unknown_fields_pass_through_unless_strict() {
        let s = schema(json!({"name": "string"}));
        let open = prepare(&s, json!({"name": "x", "extra": {"deep": 1}})).unwrap();
        assert_eq!(open["extra"], json!({"deep": 1}));

        let strict = ModelOptions {
            strict: true,
            ..ModelOptions::default()
        };
        let closed =
            DocumentValidator::prepare(&s, &strict, doc(json!({"_id": "k", "name": "x", "extra": 1, "createdAt": "t"})))
                .unwrap();
        assert!(closed.get("extra").is_none());
        assert_eq!(closed["_id"], json!("k"));
        assert_eq!(closed["createdAt"], json!("t"));
    }

    #[test]
    fn single_values_are_wrapped_into_arrays() {
        let s = schema(json!({"tags": ["string"]}));
        let out = prepare(&s, json!({"tags": "solo"})).unwrap();
        assert_eq!(out["tags"], json!(["solo"]));
    }

    #[test]
    fn timestamps_parse_from_several_forms() {
        let a = parse_timestamp(&json!("2024-01-02T03:04:05.678+00:00")).unwrap();
        assert_eq!(format_timestamp(&a), "2024-01-02T03:04:05.678Z");
        let b = parse_timestamp(&json!(0)).unwrap();
        assert_eq!(format_timestamp(&b), "1970-01-01T00:00:00.000Z");
        assert!(parse_timestamp(&json!(true)).is_none());
    }
}
