//! PostgreSQL document store: one JSONB table per collection.

use crate::error::AppError;
use crate::migration;
use crate::query::{Document, FindQuery};
use crate::registry::Model;
use crate::sql::{self, bind_params, qualified_table, QueryBuf};
use crate::store::DocumentStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone, Debug)]
pub struct PgDocumentStore {
    pool: PgPool,
    schema: String,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgDocumentStore {
            pool,
            schema: schema.into(),
        }
    }

    /// Create the database if needed, then open a pool.
    pub async fn connect(url: &str, schema: &str) -> Result<Self, AppError> {
        ensure_database_exists(url).await?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| AppError::Connection(format!("failed to connect to database: {}", e)))?;
        Ok(Self::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table(&self, model: &Model) -> String {
        qualified_table(&self.schema, model.collection())
    }

    async fn fetch_all(&self, q: QueryBuf) -> Result<Vec<Document>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_params(sqlx::query(&q.sql), &q.params).fetch_all(&self.pool).await?;
        rows.iter().map(row_document).collect()
    }

    async fn fetch_optional(&self, q: QueryBuf) -> Result<Option<Document>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_params(sqlx::query(&q.sql), &q.params)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?;
        row.as_ref().map(row_document).transpose()
    }
}

fn row_document(row: &PgRow) -> Result<Document, AppError> {
    match row.try_get::<Value, _>("doc")? {
        Value::Object(doc) => Ok(doc),
        other => Err(AppError::Db(sqlx::Error::Decode(
            format!("stored document is not an object: {}", other).into(),
        ))),
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return AppError::Conflict(db.message().to_string());
        }
    }
    AppError::Db(e)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn ensure_collection(&self, model: &Model) -> Result<(), AppError> {
        migration::ensure_collection(&self.pool, &self.schema, model).await
    }

    async fn insert(&self, model: &Model, id: Uuid, doc: Document) -> Result<Document, AppError> {
        let q = sql::insert(&self.table(model), id, &doc);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_params(sqlx::query(&q.sql), &q.params)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;
        row_document(&row)
    }

    async fn find(&self, model: &Model, query: &FindQuery) -> Result<Vec<Document>, AppError> {
        self.fetch_all(sql::select(&self.table(model), query)).await
    }

    async fn find_by_id(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError> {
        self.fetch_optional(sql::select_by_id(&self.table(model), id)).await
    }

    async fn replace(&self, model: &Model, id: Uuid, doc: Document) -> Result<Option<Document>, AppError> {
        self.fetch_optional(sql::replace(&self.table(model), id, &doc)).await
    }

    async fn delete(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError> {
        self.fetch_optional(sql::delete(&self.table(model), id)).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// Connect to the server's `postgres` database and create the target database if missing.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::Connection(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts
        .connect()
        .await
        .map_err(|e| AppError::Connection(format!("failed to reach database server: {}", e)))?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

/// Split a connection URL into (admin URL on the `postgres` database, target database name).
fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = url[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i + 1)
        .ok_or_else(|| AppError::Connection("DATABASE_URL: no database path".into()))?;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let mut parts = path_and_query.splitn(2, '?');
    let db_name = parts.next().unwrap_or("").trim();
    let query = parts.next().map(|q| format!("?{}", q)).unwrap_or_default();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres{}", base, query);
    Ok((admin_url, db_name.to_string()))
}
