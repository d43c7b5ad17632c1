//! Collection DDL: one JSONB table per model, plus expression indexes for `unique` and `index` fields.
//! Every statement is idempotent so loaders may run against an existing database.

use crate::error::AppError;
use crate::registry::Model;
use crate::sql::{literal, qualified_table, quoted};
use sqlx::PgPool;

/// PostgreSQL truncates identifiers past this many bytes.
const MAX_IDENT_LEN: usize = 63;

fn index_name(collection: &str, field: &str, suffix: &str) -> String {
    let field: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let mut name = format!("{}_{}_{}", collection, field, suffix);
    while name.len() > MAX_IDENT_LEN {
        name.pop();
    }
    name
}

/// Statements creating the schema, the collection table, and its field indexes.
pub fn collection_ddl(schema: &str, model: &Model) -> Vec<String> {
    let table = qualified_table(schema, model.collection());
    let mut stmts = vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                doc JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
            )
            "#,
            table
        ),
    ];
    for field in model.unique_fields() {
        let key = literal(field);
        stmts.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((doc -> {})) WHERE doc ? {} AND doc -> {} <> 'null'::jsonb",
            quoted(&index_name(model.collection(), field, "uniq")),
            table,
            key,
            key,
            key
        ));
    }
    for field in model.indexed_fields() {
        stmts.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ((doc -> {}))",
            quoted(&index_name(model.collection(), field, "idx")),
            table,
            literal(field)
        ));
    }
    stmts
}

/// Create the model's collection if missing. Existing tables and indexes are left as they are.
pub async fn ensure_collection(pool: &PgPool, schema: &str, model: &Model) -> Result<(), AppError> {
    for sql in collection_ddl(schema, model) {
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::debug!(model = %model.name(), collection = %model.collection(), "collection ensured");
    Ok(())
}
