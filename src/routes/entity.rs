//! Generated CRUD routes: one router per registered model, mounted at `/<entity>`.

use crate::handlers::entity::{create, delete as delete_handler, export, list, read, update};
use crate::state::{AppState, ModelState};
use axum::{
    routing::{get, post},
    Router,
};

/// Routes for one model, relative to its mount point:
/// `POST /`, `GET /`, `GET /:id`, `PUT /:id`, `DELETE /:id`, `POST /export`.
pub fn crud_routes(state: ModelState) -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/export", post(export))
        .route("/:id", get(read).put(update).delete(delete_handler))
        .with_state(state)
}

/// Mount every model currently registered under `/<entity name>`.
/// Models registered later need a rebuilt router.
pub fn entity_routes(state: &AppState) -> Router {
    entity_routes_excluding(state, &[])
}

/// Like [`entity_routes`], leaving out models whose name would shadow `taken` paths.
pub fn entity_routes_excluding(state: &AppState, taken: &[&str]) -> Router {
    state.registry.models().into_iter().fold(Router::new(), |router, model| {
        if taken.contains(&model.name()) {
            tracing::warn!(model = %model.name(), "model name collides with a built-in route; not mounted");
            return router;
        }
        let path = format!("/{}", model.name());
        tracing::debug!(model = %model.name(), path = %path, "mounting CRUD routes");
        router.nest(&path, crud_routes(state.model_state(model)))
    })
}
