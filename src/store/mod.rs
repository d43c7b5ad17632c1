//! Document persistence. Handlers and the loader only see [`DocumentStore`];
//! the connection string picks PostgreSQL or the in-process store.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgDocumentStore};

use crate::error::AppError;
use crate::query::{Document, FindQuery};
use crate::registry::Model;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Collection-scoped document operations. Documents carry their `_id` as a string.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the model's collection and indexes if missing.
    async fn ensure_collection(&self, model: &Model) -> Result<(), AppError>;

    /// Store a new document under `id`; returns what was stored.
    async fn insert(&self, model: &Model, id: Uuid, doc: Document) -> Result<Document, AppError>;

    async fn find(&self, model: &Model, query: &FindQuery) -> Result<Vec<Document>, AppError>;

    async fn find_by_id(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError>;

    /// Overwrite a document. `None` when no document has `id`.
    async fn replace(&self, model: &Model, id: Uuid, doc: Document) -> Result<Option<Document>, AppError>;

    /// Remove a document, returning it. `None` when no document has `id`.
    async fn delete(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError>;

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Open a store from a connection string: `memory://` or `postgres://`.
pub async fn connect(url: &str, schema: &str) -> Result<Arc<dyn DocumentStore>, AppError> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let store = PgDocumentStore::connect(url, schema).await?;
        return Ok(Arc::new(store));
    }
    let scheme = url.split("://").next().unwrap_or(url);
    Err(AppError::Connection(format!("unsupported connection string scheme '{}'", scheme)))
}

/// Lazily established store handle shared by the loader and the server.
pub struct StoreConnection {
    database_url: Option<String>,
    schema: String,
    store: Mutex<Option<Arc<dyn DocumentStore>>>,
}

impl StoreConnection {
    /// Not yet connected; [`StoreConnection::ensure_connected`] opens `database_url` on demand.
    pub fn new(database_url: Option<String>, schema: impl Into<String>) -> Self {
        StoreConnection {
            database_url,
            schema: schema.into(),
            store: Mutex::new(None),
        }
    }

    /// Already connected to `store`.
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        StoreConnection {
            database_url: None,
            schema: String::new(),
            store: Mutex::new(Some(store)),
        }
    }

    pub async fn current(&self) -> Option<Arc<dyn DocumentStore>> {
        self.store.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.store.lock().await.is_some()
    }

    /// Return the live store, connecting first when `auto_connect` allows it.
    /// Concurrent callers share one connection attempt.
    pub async fn ensure_connected(&self, auto_connect: bool) -> Result<Arc<dyn DocumentStore>, AppError> {
        let mut guard = self.store.lock().await;
        if let Some(store) = guard.as_ref() {
            return Ok(store.clone());
        }
        if !auto_connect {
            return Err(AppError::Connection(
                "store is not connected and auto-connect is disabled; connect it before loading models".into(),
            ));
        }
        let url = self
            .database_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AppError::Connection("DATABASE_URL is not set; set it or connect the store before loading models".into())
            })?;
        tracing::info!("store not connected, attempting to connect");
        let store = connect(url, &self.schema).await.map_err(|e| {
            tracing::error!(error = %e, "store connection failed");
            e
        })?;
        tracing::info!("store connected");
        *guard = Some(store.clone());
        Ok(store)
    }
}
