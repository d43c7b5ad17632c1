//! CSV export: flatten documents to dot-path cells, pick a header set, encode with a UTF-8 BOM.

use crate::query::Document;
use crate::service::validation::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const DEFAULT_EXPORT_FILENAME: &str = "export.csv";

const BOM: &str = "\u{feff}";

/// Body of `POST /<entity>/export`. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub filter: Value,
    /// Explicit column list, in order. Empty or absent means every flattened key.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub filename: Option<String>,
    /// Row cap. Zero or negative means no cap.
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort: Value,
}

impl ExportRequest {
    pub fn row_limit(&self) -> Option<u64> {
        self.limit.filter(|n| *n > 0).map(|n| n as u64)
    }

    pub fn filename(&self) -> String {
        sanitize_filename(self.filename.as_deref())
    }
}

/// Strip characters that would break a `Content-Disposition` header.
pub fn sanitize_filename(name: Option<&str>) -> String {
    let cleaned: String = name
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_EXPORT_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// One flattened value.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Date(DateTime<Utc>),
    List(Vec<Cell>),
    /// Objects found inside arrays.
    Json(Value),
}

impl Cell {
    fn from_value(value: &Value, is_date: bool) -> Cell {
        if is_date {
            if let Some(dt) = parse_timestamp(value) {
                return Cell::Date(dt);
            }
        }
        match value {
            Value::Null => Cell::Empty,
            Value::String(s) => Cell::Text(s.clone()),
            Value::Number(n) => Cell::Number(n.clone()),
            Value::Bool(b) => Cell::Bool(*b),
            Value::Array(items) => Cell::List(items.iter().map(|v| Cell::from_value(v, is_date)).collect()),
            Value::Object(_) => Cell::Json(value.clone()),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Date(dt) => format_timestamp(dt),
            Cell::List(items) => items.iter().map(Cell::render).collect::<Vec<_>>().join("; "),
            Cell::Json(v) => v.to_string(),
        }
    }
}

/// Flatten nested objects into dot paths. Arrays stay one cell.
pub fn flatten_document(doc: &Document, date_paths: &HashSet<String>) -> BTreeMap<String, Cell> {
    let mut out = BTreeMap::new();
    flatten_into(doc, "", date_paths, &mut out);
    out
}

fn flatten_into(obj: &Document, prefix: &str, date_paths: &HashSet<String>, out: &mut BTreeMap<String, Cell>) {
    for (key, value) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if !date_paths.contains(&path) => flatten_into(inner, &path, date_paths, out),
            _ => {
                let cell = Cell::from_value(value, date_paths.contains(&path));
                out.insert(path, cell);
            }
        }
    }
}

/// Requested fields when given, otherwise the sorted union of every row's keys.
pub fn derive_headers(rows: &[BTreeMap<String, Cell>], fields: Option<&[String]>) -> Vec<String> {
    match fields {
        Some(fields) if !fields.is_empty() => fields.to_vec(),
        _ => rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}

/// Quote a cell when it holds a comma, quote, or line break; embedded quotes are doubled.
pub fn escape_cell(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// BOM, header line, then one line per row; every line ends in CRLF.
pub fn encode_csv(headers: &[String], rows: &[BTreeMap<String, Cell>]) -> String {
    let mut out = String::from(BOM);
    if headers.is_empty() {
        return out;
    }
    push_line(&mut out, headers.iter().map(|h| escape_cell(h)));
    for row in rows {
        push_line(
            &mut out,
            headers
                .iter()
                .map(|h| row.get(h).map(|c| escape_cell(&c.render())).unwrap_or_default()),
        );
    }
    out
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>) {
    out.push_str(&cells.collect::<Vec<_>>().join(","));
    out.push_str("\r\n");
}

/// Flatten, pick headers, and encode in one step.
pub fn documents_to_csv(docs: &[Document], date_paths: &HashSet<String>, fields: Option<&[String]>) -> String {
    let rows: Vec<BTreeMap<String, Cell>> = docs.iter().map(|d| flatten_document(d, date_paths)).collect();
    let headers = derive_headers(&rows, fields);
    encode_csv(&headers, &rows)
}
