//! Builds parameterized INSERT, SELECT, UPDATE, DELETE over a collection table.
//! Each collection is one table: `id UUID`, `doc JSONB`, `created_at`, `updated_at`.

use crate::query::{Condition, Document, FindQuery, Filter, Op, SortDirection, SortSpec};
use crate::sql::params::SqlParam;
use serde_json::Value;
use uuid::Uuid;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a string literal for DDL, where placeholders are not allowed.
pub fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: SqlParam) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// INSERT one document; returns it.
pub fn insert(table: &str, id: Uuid, doc: &Document) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_n = q.push_param(SqlParam::Uuid(id));
    let doc_n = q.push_param(SqlParam::Json(Value::Object(doc.clone())));
    q.sql = format!(
        "INSERT INTO {} (id, doc) VALUES (${}, ${}) RETURNING doc",
        table, id_n, doc_n
    );
    q
}

pub fn select_by_id(table: &str, id: Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(SqlParam::Uuid(id));
    q.sql = format!("SELECT doc FROM {} WHERE id = ${}", table, n);
    q
}

/// SELECT with optional filter, sort and limit. Insertion order breaks ties.
pub fn select(table: &str, query: &FindQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT doc FROM {}", table);
    if !query.filter.is_empty() {
        let clause = where_clause(&mut q, &query.filter);
        q.sql.push_str(" WHERE ");
        q.sql.push_str(&clause);
    }
    let order = order_by(&mut q, &query.sort);
    q.sql.push_str(" ORDER BY ");
    q.sql.push_str(&order);
    if let Some(limit) = query.limit {
        let n = q.push_param(SqlParam::BigInt(limit.min(i64::MAX as u64) as i64));
        q.sql.push_str(&format!(" LIMIT ${}", n));
    }
    q
}

/// Replace the stored document; returns it, or no row when the id is unknown.
pub fn replace(table: &str, id: Uuid, doc: &Document) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_n = q.push_param(SqlParam::Uuid(id));
    let doc_n = q.push_param(SqlParam::Json(Value::Object(doc.clone())));
    q.sql = format!(
        "UPDATE {} SET doc = ${}, updated_at = clock_timestamp() WHERE id = ${} RETURNING doc",
        table, doc_n, id_n
    );
    q
}

pub fn delete(table: &str, id: Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(SqlParam::Uuid(id));
    q.sql = format!("DELETE FROM {} WHERE id = ${} RETURNING doc", table, n);
    q
}

fn where_clause(q: &mut QueryBuf, filter: &Filter) -> String {
    filter
        .conditions
        .iter()
        .map(|c| condition(q, c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn condition(q: &mut QueryBuf, c: &Condition) -> String {
    let p = q.push_param(SqlParam::Path(c.path.clone()));
    let field = format!("doc #> ${}", p);
    match &c.op {
        Op::Eq(v) => equals(q, &field, v),
        Op::Ne(v) => format!("NOT COALESCE({}, FALSE)", equals(q, &field, v)),
        Op::Gt(v) => range(q, &field, ">", v),
        Op::Gte(v) => range(q, &field, ">=", v),
        Op::Lt(v) => range(q, &field, "<", v),
        Op::Lte(v) => range(q, &field, "<=", v),
        Op::In(values) => any_of(q, &field, values),
        Op::Nin(values) => format!("NOT COALESCE({}, FALSE)", any_of(q, &field, values)),
        Op::Exists(true) => format!("{} IS NOT NULL", field),
        Op::Exists(false) => format!("{} IS NULL", field),
    }
}

/// Equality with array membership; `null` also matches a missing path.
fn equals(q: &mut QueryBuf, field: &str, v: &Value) -> String {
    if v.is_null() {
        return format!("({} IS NULL OR {} = 'null'::jsonb)", field, field);
    }
    let n = q.push_param(SqlParam::Json(v.clone()));
    format!(
        "({f} = ${n} OR (jsonb_typeof({f}) = 'array' AND {f} @> jsonb_build_array(${n})))",
        f = field,
        n = n
    )
}

/// jsonb orders across types; restrict range operators to values of the operand's type.
fn range(q: &mut QueryBuf, field: &str, op: &str, v: &Value) -> String {
    let n = q.push_param(SqlParam::Json(v.clone()));
    format!(
        "(jsonb_typeof({f}) = jsonb_typeof(${n}) AND {f} {op} ${n})",
        f = field,
        n = n,
        op = op
    )
}

fn any_of(q: &mut QueryBuf, field: &str, values: &[Value]) -> String {
    if values.is_empty() {
        return "FALSE".to_string();
    }
    let parts: Vec<String> = values.iter().map(|v| equals(q, field, v)).collect();
    format!("({})", parts.join(" OR "))
}

fn order_by(q: &mut QueryBuf, sort: &SortSpec) -> String {
    let mut parts: Vec<String> = sort
        .keys
        .iter()
        .map(|key| {
            let n = q.push_param(SqlParam::Path(key.path.clone()));
            match key.direction {
                SortDirection::Asc => format!("doc #> ${} ASC NULLS FIRST", n),
                SortDirection::Desc => format!("doc #> ${} DESC NULLS LAST", n),
            }
        })
        .collect();
    parts.push("created_at ASC".to_string());
    parts.push("id ASC".to_string());
    parts.join(", ")
}
