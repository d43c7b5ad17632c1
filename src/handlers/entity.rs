//! Model CRUD handlers: create, list, read, update, delete, export.

use crate::error::AppError;
use crate::query::Document;
use crate::response::{success_created, success_many, success_one_message, success_one_ok};
use crate::service::{CrudService, ExportRequest};
use crate::state::ModelState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

fn body_to_document(value: Value) -> Result<Document, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(State(state): State<ModelState>) -> Result<impl IntoResponse, AppError> {
    let docs = CrudService::list(state.store.as_ref(), &state.model).await?;
    Ok(success_many(docs))
}

pub async fn create(
    State(state): State<ModelState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let body = body_to_document(body)?;
    let doc = CrudService::create(state.store.as_ref(), &state.model, body).await?;
    tracing::debug!(model = %state.model.name(), "document created");
    Ok(success_created(doc))
}

pub async fn read(
    State(state): State<ModelState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let doc = CrudService::read(state.store.as_ref(), &state.model, &id).await?;
    Ok(success_one_ok(doc))
}

pub async fn update(
    State(state): State<ModelState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let body = body_to_document(body)?;
    let doc = CrudService::update(state.store.as_ref(), &state.model, &id, body).await?;
    Ok(success_one_ok(doc))
}

pub async fn delete(
    State(state): State<ModelState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let doc = CrudService::delete(state.store.as_ref(), &state.model, &id).await?;
    Ok(success_one_message(doc, "Deleted"))
}

/// Body is optional: an empty body exports everything with default settings.
pub async fn export(State(state): State<ModelState>, body: Bytes) -> Result<impl IntoResponse, AppError> {
    let req: ExportRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ExportRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("invalid export request: {}", e)))?
    };
    let csv = CrudService::export(state.store.as_ref(), &state.model, &req).await?;
    tracing::info!(model = %state.model.name(), rows = csv.rows, file = %csv.filename, "export generated");
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", csv.filename),
        ),
    ];
    Ok((headers, csv.body))
}
