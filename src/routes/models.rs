//! Model introspection routes.

use crate::handlers::models::{get_form, get_model, list_models};
use crate::state::AppState;
use axum::{routing::get, Router};

/// GET /models, GET /models/:name, GET /models/:name/form.
pub fn model_routes(state: AppState) -> Router {
    Router::new()
        .route("/models", get(list_models))
        .route("/models/:name", get(get_model))
        .route("/models/:name/form", get(get_form))
        .with_state(state)
}
