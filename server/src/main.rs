//! Dynacrud server: load models from the remote config, then serve probes and CRUD routes.
//!
//! Run from repo root: `cargo run -p dynacrud-server`

use dynacrud_sdk::{app_router, AppError, AppState, ConfigLoader, ModelRegistry, Settings, StoreConnection};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dynacrud_sdk=info,dynacrud_server=info")),
        )
        .init();

    let registry = ModelRegistry::global();
    let connection = Arc::new(StoreConnection::new(
        settings.database_url.clone(),
        settings.store_schema.clone(),
    ));
    let loader = ConfigLoader::new(&settings, registry.clone(), connection.clone())?;
    match loader.load_all().await {
        Ok(report) => {
            for (name, error) in &report.failures {
                tracing::warn!(model = %name, error = %error, "model not served");
            }
        }
        // Without a store there is nothing to serve.
        Err(e @ AppError::Connection(_)) => return Err(e.into()),
        Err(e) => tracing::error!(error = %e, "remote config not loaded; serving without models"),
    }

    let store = connection.ensure_connected(settings.auto_connect).await?;
    let state = AppState::new(store, registry);
    let app = app_router(state, &settings);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(
        "dynacrud server listening on http://{} (api prefix '{}')",
        listener.local_addr()?,
        settings.api_prefix
    );
    axum::serve(listener, app).await?;
    Ok(())
}
