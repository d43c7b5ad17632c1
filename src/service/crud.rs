//! Generic CRUD over any registered model.

use crate::error::AppError;
use crate::query::{Document, Filter, FindQuery, SortSpec, ID_FIELD};
use crate::registry::Model;
use crate::service::export::{documents_to_csv, ExportRequest};
use crate::service::validation::{format_timestamp, DocumentValidator};
use crate::store::DocumentStore;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// A rendered CSV download.
#[derive(Clone, Debug)]
pub struct CsvExport {
    pub filename: String,
    pub body: String,
    pub rows: usize,
}

pub struct CrudService;

impl CrudService {
    /// Validate, stamp, and store a new document under a fresh id.
    pub async fn create(store: &dyn DocumentStore, model: &Model, mut body: Document) -> Result<Document, AppError> {
        body.remove(ID_FIELD);
        let mut doc = DocumentValidator::prepare(model.schema(), model.options(), body)?;
        if let Some(ts) = &model.options().timestamps {
            let now = Value::String(format_timestamp(&Utc::now()));
            doc.insert(ts.created_at.clone(), now.clone());
            doc.insert(ts.updated_at.clone(), now);
        }
        let id = Uuid::new_v4();
        doc.insert(ID_FIELD.into(), Value::String(id.to_string()));
        store.insert(model, id, doc).await
    }

    /// Every document, oldest first.
    pub async fn list(store: &dyn DocumentStore, model: &Model) -> Result<Vec<Document>, AppError> {
        store.find(model, &FindQuery::default()).await
    }

    pub async fn read(store: &dyn DocumentStore, model: &Model, id: &str) -> Result<Document, AppError> {
        let id = parse_id(id)?;
        store
            .find_by_id(model, id)
            .await?
            .ok_or_else(|| not_found(model, id))
    }

    /// Shallow-merge `body` over the stored document and re-validate the result.
    /// The id and creation time never change.
    pub async fn update(store: &dyn DocumentStore, model: &Model, id: &str, body: Document) -> Result<Document, AppError> {
        let id = parse_id(id)?;
        let mut merged = store
            .find_by_id(model, id)
            .await?
            .ok_or_else(|| not_found(model, id))?;
        let created_at = model.options().timestamps.as_ref().map(|ts| ts.created_at.as_str());
        for (key, value) in body {
            if key == ID_FIELD || Some(key.as_str()) == created_at {
                continue;
            }
            merged.insert(key, value);
        }
        let mut doc = DocumentValidator::prepare(model.schema(), model.options(), merged)?;
        if let Some(ts) = &model.options().timestamps {
            doc.insert(ts.updated_at.clone(), Value::String(format_timestamp(&Utc::now())));
        }
        doc.insert(ID_FIELD.into(), Value::String(id.to_string()));
        store
            .replace(model, id, doc)
            .await?
            .ok_or_else(|| not_found(model, id))
    }

    pub async fn delete(store: &dyn DocumentStore, model: &Model, id: &str) -> Result<Document, AppError> {
        let id = parse_id(id)?;
        store.delete(model, id).await?.ok_or_else(|| not_found(model, id))
    }

    /// Query with the request's filter, sort, and limit, then render every match as CSV.
    pub async fn export(store: &dyn DocumentStore, model: &Model, req: &ExportRequest) -> Result<CsvExport, AppError> {
        let query = FindQuery {
            filter: Filter::from_json(&req.filter)?,
            sort: SortSpec::from_json(&req.sort)?,
            limit: req.row_limit(),
        };
        let docs = store.find(model, &query).await?;
        let date_paths: HashSet<String> = model.date_paths().into_iter().collect();
        let body = documents_to_csv(&docs, &date_paths, req.fields.as_deref());
        tracing::debug!(model = %model.name(), rows = docs.len(), "export rendered");
        Ok(CsvExport {
            filename: req.filename(),
            body,
            rows: docs.len(),
        })
    }
}

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id.trim()).map_err(|_| AppError::BadRequest(format!("invalid id '{}'", id)))
}

fn not_found(model: &Model, id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {}", model.name(), id))
}
