//! Typed query parameters and binding onto sqlx queries.

use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A value bound to a `$n` placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Uuid(uuid::Uuid),
    /// Bound as JSONB.
    Json(Value),
    /// Bound as TEXT[], used for `doc #> $n` paths.
    Path(Vec<String>),
    BigInt(i64),
}

/// Bind params in placeholder order.
pub fn bind_params<'q>(mut query: Query<'q, Postgres, PgArguments>, params: &[SqlParam]) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = match p {
            SqlParam::Uuid(u) => query.bind(*u),
            SqlParam::Json(v) => query.bind(v.clone()),
            SqlParam::Path(segments) => query.bind(segments.clone()),
            SqlParam::BigInt(n) => query.bind(*n),
        };
    }
    query
}
