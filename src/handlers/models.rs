//! Introspection of registered models: list, schema, and form field catalog.

use crate::error::AppError;
use crate::registry::Model;
use crate::response::{success_many, success_one_ok};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn model_or_404(state: &AppState, name: &str) -> Result<Arc<Model>, AppError> {
    state
        .registry
        .get(name)
        .ok_or_else(|| AppError::NotFound(format!("model {}", name)))
}

fn summary(model: &Model) -> Value {
    json!({
        "name": model.name(),
        "collection": model.collection(),
        "fields": model.schema().len(),
    })
}

pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let models: Vec<Value> = state.registry.models().iter().map(|m| summary(m)).collect();
    success_many(models)
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let model = model_or_404(&state, &name)?;
    Ok(success_one_ok(json!({
        "name": model.name(),
        "collection": model.collection(),
        "schema": model.schema().to_json(),
        "options": model.options(),
    })))
}

/// Frontend field catalog with resolved render kinds and initial values.
pub async fn get_form(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let model = model_or_404(&state, &name)?;
    let fields: Vec<Value> = model.ui_fields().iter().map(|f| f.describe()).collect();
    Ok(success_many(fields))
}
