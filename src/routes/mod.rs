//! Router assembly: service probes, model introspection, and generated CRUD routes.

mod common;
mod entity;
mod models;

pub use common::{common_routes, PROBE_PATHS};
pub use entity::{crud_routes, entity_routes, entity_routes_excluding};
pub use models::model_routes;

use crate::settings::Settings;
use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Everything served under the API prefix: `/models...` plus one CRUD router per model.
pub fn api_routes(state: &AppState) -> Router {
    model_routes(state.clone()).merge(entity_routes(state))
}

/// Probes at the root, API routes under `settings.api_prefix`, request bodies capped.
pub fn app_router(state: AppState, settings: &Settings) -> Router {
    let router = if settings.api_prefix.is_empty() {
        // Unprefixed models share the root with the probes.
        let api = model_routes(state.clone()).merge(entity_routes_excluding(&state, PROBE_PATHS));
        common_routes(state).merge(api)
    } else {
        let api = api_routes(&state);
        common_routes(state).nest(&settings.api_prefix, api)
    };
    router.layer(RequestBodyLimitLayer::new(settings.body_limit_bytes))
}
