//! Shared state handed to route handlers.

use crate::registry::{Model, ModelRegistry};
use crate::store::DocumentStore;
use std::sync::Arc;

/// Process-level state: the live store and every registered model.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<ModelRegistry>) -> Self {
        AppState { store, registry }
    }

    /// State for one model's CRUD router.
    pub fn model_state(&self, model: Arc<Model>) -> ModelState {
        ModelState {
            model,
            store: self.store.clone(),
        }
    }
}

/// State bound into each generated CRUD router.
#[derive(Clone)]
pub struct ModelState {
    pub model: Arc<Model>,
    pub store: Arc<dyn DocumentStore>,
}
