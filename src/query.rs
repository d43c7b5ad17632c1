//! Document query model: Mongo-style filter and sort specs, parsed into typed form.
//! The memory store evaluates them directly; the SQL builder compiles them for PostgreSQL.

use crate::error::AppError;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A stored document: open JSON object. `_id` holds the identifier.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// Dot-separated path, split into segments.
    pub path: Vec<String>,
    pub op: Op,
}

/// Conjunction of conditions. Empty matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

fn operand_list(op: &str, v: &Value) -> Result<Vec<Value>, AppError> {
    match v {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(AppError::BadRequest(format!("{} expects an array", op))),
    }
}

impl Filter {
    /// Parse `{ "a.b": 1, "n": { "$gte": 3 }, "tags": { "$in": ["x"] } }`. `null` parses as empty.
    pub fn from_json(value: &Value) -> Result<Filter, AppError> {
        let obj = match value {
            Value::Null => return Ok(Filter::default()),
            Value::Object(obj) => obj,
            _ => return Err(AppError::BadRequest("filter must be a JSON object".into())),
        };
        let mut conditions = Vec::new();
        for (key, v) in obj {
            if key.starts_with('$') {
                return Err(AppError::BadRequest(format!("unsupported top-level operator: {}", key)));
            }
            let path = split_path(key);
            match v {
                Value::Object(ops) if is_operator_object(ops) => {
                    for (op, operand) in ops {
                        let op = match op.as_str() {
                            "$eq" => Op::Eq(operand.clone()),
                            "$ne" => Op::Ne(operand.clone()),
                            "$gt" => Op::Gt(operand.clone()),
                            "$gte" => Op::Gte(operand.clone()),
                            "$lt" => Op::Lt(operand.clone()),
                            "$lte" => Op::Lte(operand.clone()),
                            "$in" => Op::In(operand_list(op, operand)?),
                            "$nin" => Op::Nin(operand_list(op, operand)?),
                            "$exists" => Op::Exists(operand.as_bool().unwrap_or(!operand.is_null())),
                            other => {
                                return Err(AppError::BadRequest(format!("unsupported filter operator: {}", other)))
                            }
                        };
                        conditions.push(Condition { path: path.clone(), op });
                    }
                }
                _ => conditions.push(Condition {
                    path,
                    op: Op::Eq(v.clone()),
                }),
            }
        }
        Ok(Filter { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

impl Condition {
    pub fn matches(&self, doc: &Document) -> bool {
        let actual = get_path(doc, &self.path);
        match &self.op {
            Op::Eq(expected) => eq_matches(actual, expected),
            Op::Ne(expected) => !eq_matches(actual, expected),
            Op::Gt(bound) => compare_same_type(actual, bound).map(Ordering::is_gt).unwrap_or(false),
            Op::Gte(bound) => compare_same_type(actual, bound).map(Ordering::is_ge).unwrap_or(false),
            Op::Lt(bound) => compare_same_type(actual, bound).map(Ordering::is_lt).unwrap_or(false),
            Op::Lte(bound) => compare_same_type(actual, bound).map(Ordering::is_le).unwrap_or(false),
            Op::In(options) => options.iter().any(|o| eq_matches(actual, o)),
            Op::Nin(options) => !options.iter().any(|o| eq_matches(actual, o)),
            Op::Exists(expected) => actual.is_some() == *expected,
        }
    }
}

/// Equality with array-membership: an array field matches when it equals the value or contains it.
/// `null` matches both null and missing.
fn eq_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(a), e) if json_eq(a, e) => true,
        (Some(Value::Array(items)), e) => items.iter().any(|i| json_eq(i, e)),
        _ => false,
    }
}

/// Numbers compare by value (1 == 1.0), everything else structurally.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_same_type(actual: Option<&Value>, bound: &Value) -> Option<Ordering> {
    let actual = actual?;
    if type_rank(actual) != type_rank(bound) {
        return None;
    }
    Some(compare_json(actual, bound))
}

/// Follow a path through nested objects.
pub fn get_path<'a>(doc: &'a Document, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = doc.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Cross-type rank, matching PostgreSQL's jsonb ordering: null < string < number < boolean < array < object.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values used for sorting, shaped after jsonb: arrays compare by
/// length then element-wise, objects by pair count then key/value pairs in jsonb key order
/// (shorter keys first). Strings compare bytewise here; PostgreSQL uses the database collation.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y.iter())
                .map(|(i, j)| compare_json(i, j))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            jsonb_pairs(x)
                .into_iter()
                .zip(jsonb_pairs(y))
                .map(|((ka, va), (kb, vb))| jsonb_key_order(ka, kb).then_with(|| compare_json(va, vb)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// jsonb stores object keys shorter-first, then bytewise.
fn jsonb_key_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

fn jsonb_pairs(obj: &Map<String, Value>) -> Vec<(&str, &Value)> {
    let mut pairs: Vec<(&str, &Value)> = obj.iter().map(|(k, v)| (k.as_str(), v)).collect();
    pairs.sort_by(|a, b| jsonb_key_order(a.0, b.0));
    pairs
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub path: Vec<String>,
    pub direction: SortDirection,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    /// Parse `{ "name": 1, "age": -1 }`, `{ "name": "desc" }`, or `"name -age"`.
    pub fn from_json(value: &Value) -> Result<SortSpec, AppError> {
        let mut keys = Vec::new();
        match value {
            Value::Null => {}
            Value::String(s) => {
                for token in s.split_whitespace() {
                    let (field, direction) = match token.strip_prefix('-') {
                        Some(field) => (field, SortDirection::Desc),
                        None => (token.trim_start_matches('+'), SortDirection::Asc),
                    };
                    if !field.is_empty() {
                        keys.push(SortKey {
                            path: split_path(field),
                            direction,
                        });
                    }
                }
            }
            Value::Object(obj) => {
                for (field, dir) in obj {
                    let direction = match dir {
                        Value::Number(n) if n.as_f64().map(|f| f < 0.0).unwrap_or(false) => SortDirection::Desc,
                        Value::Number(_) => SortDirection::Asc,
                        Value::String(s) => match s.to_lowercase().as_str() {
                            "asc" | "ascending" | "1" => SortDirection::Asc,
                            "desc" | "descending" | "-1" => SortDirection::Desc,
                            other => return Err(AppError::BadRequest(format!("invalid sort direction: {}", other))),
                        },
                        other => return Err(AppError::BadRequest(format!("invalid sort direction: {}", other))),
                    };
                    keys.push(SortKey {
                        path: split_path(field),
                        direction,
                    });
                }
            }
            _ => return Err(AppError::BadRequest("sort must be an object or a string".into())),
        }
        Ok(SortSpec { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Missing fields sort lowest, like null.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.keys {
            let x = get_path(a, &key.path).unwrap_or(&Value::Null);
            let y = get_path(b, &key.path).unwrap_or(&Value::Null);
            let ord = match key.direction {
                SortDirection::Asc => compare_json(x, y),
                SortDirection::Desc => compare_json(y, x),
            };
            if ord.is_ne() {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// What a store's `find` receives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: SortSpec,
    pub limit: Option<u64>,
}
