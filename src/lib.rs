//! Dynacrud SDK: remote JSON entity definitions become live document models and REST routes.

pub mod config;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod query;
pub mod registry;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;
pub mod ui;

pub use config::{build_model, build_schema, compile_field, resolve_type, ConfigLoader, LoadReport};
pub use error::{AppError, ConfigError};
pub use query::{Document, FindQuery};
pub use registry::{Model, ModelRegistry, Registration};
pub use response::{success_created, success_many, success_one_ok};
pub use routes::{api_routes, app_router, common_routes, crud_routes, entity_routes};
pub use service::{CrudService, ExportRequest};
pub use settings::Settings;
pub use state::{AppState, ModelState};
pub use store::{connect, DocumentStore, MemoryStore, PgDocumentStore, StoreConnection};
pub use ui::{RenderKind, UiField};
