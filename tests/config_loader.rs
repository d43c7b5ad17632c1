use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use dynacrud_sdk::{AppError, ConfigError, ConfigLoader, MemoryStore, ModelRegistry, Settings, StoreConnection};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port; returns its base URL.
async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{}", addr)
}

fn settings(url: String) -> Settings {
    Settings {
        remote_config_url: url,
        database_url: Some("memory://".into()),
        config_fetch_timeout: Duration::from_secs(5),
        ..Settings::default()
    }
}

fn loader(settings: &Settings, connection: Arc<StoreConnection>) -> ConfigLoader {
    ConfigLoader::new(settings, Arc::new(ModelRegistry::new()), connection).expect("loader")
}

fn document() -> Value {
    json!({
        "record": {
            "metadata": {"updatedBy": "ops"},
            "assets": {
                "schema": {
                    "tag": {"type": "string", "unique": true},
                    "location": {"type": {"site": "string", "room": "string"}},
                    "parts": [{"sku": "string", "qty": "number"}]
                }
            },
            "Work-Orders": {"schema": {"title": "string"}, "options": {"strict": true}}
        }
    })
}

#[tokio::test]
async fn loads_models_from_remote_document() {
    let base = serve(Router::new().route("/config", get(|| async { Json(document()) }))).await;
    let settings = settings(format!("{}/config", base));
    let connection = Arc::new(StoreConnection::new(settings.database_url.clone(), "dynacrud"));
    let loader = loader(&settings, connection.clone());

    let report = loader.load_all().await.expect("load");
    assert!(report.is_clean());
    assert_eq!(report.skipped, vec!["metadata".to_string()]);
    assert_eq!(
        report.models.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["Work-Orders", "assets"]
    );
    assert_eq!(report.models["Work-Orders"].collection(), "work_orders");
    assert!(report.models["Work-Orders"].options().strict);
    assert_eq!(report.models["assets"].unique_fields(), vec!["tag"]);
    assert!(connection.is_connected().await);
}

#[tokio::test]
async fn fetch_failures_abort_the_load() {
    let base = serve(Router::new().route(
        "/config",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await;
    let settings = settings(format!("{}/config", base));
    let connection = Arc::new(StoreConnection::new(settings.database_url.clone(), "dynacrud"));
    let loader = loader(&settings, connection);

    let err = loader.load_all().await.expect_err("fetch should fail");
    assert!(matches!(err, AppError::Config(ConfigError::Fetch(_))), "{err}");
    assert!(loader.registry().is_empty());
}

#[tokio::test]
async fn non_json_responses_are_fetch_errors() {
    let base = serve(Router::new().route("/config", get(|| async { "<html>nope</html>" }))).await;
    let settings = settings(format!("{}/config", base));
    let connection = Arc::new(StoreConnection::new(settings.database_url.clone(), "dynacrud"));
    let err = loader(&settings, connection).load_all().await.expect_err("not json");
    assert!(err.to_string().contains("not JSON"), "{err}");
}

#[tokio::test]
async fn connection_is_checked_before_fetching() {
    let settings = Settings {
        database_url: None,
        remote_config_url: "http://127.0.0.1:9/unreachable".into(),
        ..Settings::default()
    };
    let connection = Arc::new(StoreConnection::new(None, "dynacrud"));
    let err = loader(&settings, connection).load_all().await.expect_err("no store");
    assert!(matches!(err, AppError::Connection(_)), "{err}");
}

#[tokio::test]
async fn preconnected_store_receives_collections() {
    let store = Arc::new(MemoryStore::new());
    let connection = Arc::new(StoreConnection::with_store(store.clone()));
    let settings = Settings {
        auto_connect: false,
        ..Settings::default()
    };
    let report = loader(&settings, connection)
        .load_from_value(document())
        .await
        .expect("load");
    assert_eq!(report.models.len(), 2);
    assert!(store.has_collection("assets").await);
    assert!(store.has_collection("work_orders").await);
}
