//! Fetch the remote config document and turn each entity entry into a registered model.

use crate::config::{
    build_schema, collection_name, parse_remote_config, validate_entity_name, EntityConfig, ModelOptions,
    MAX_CONFIG_DEPTH,
};
use crate::error::{AppError, ConfigError};
use crate::registry::{Model, ModelRegistry};
use crate::settings::Settings;
use crate::store::{DocumentStore, StoreConnection};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one load: models now live, entries ignored, and entries that failed.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub models: BTreeMap<String, Arc<Model>>,
    /// `metadata` and entries without a schema.
    pub skipped: Vec<String>,
    /// (entity name, error message)
    pub failures: Vec<(String, String)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ConfigLoader {
    config_url: String,
    auto_connect: bool,
    client: reqwest::Client,
    registry: Arc<ModelRegistry>,
    connection: Arc<StoreConnection>,
}

impl ConfigLoader {
    pub fn new(settings: &Settings, registry: Arc<ModelRegistry>, connection: Arc<StoreConnection>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(settings.config_fetch_timeout)
            .build()
            .map_err(|e| ConfigError::Fetch(format!("http client: {}", e)))?;
        Ok(ConfigLoader {
            config_url: settings.remote_config_url.clone(),
            auto_connect: settings.auto_connect,
            client,
            registry,
            connection,
        })
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Connect if needed, fetch the remote document, and register every entity in it.
    /// A connection or fetch failure aborts; a bad entity is recorded in the report and skipped.
    pub async fn load_all(&self) -> Result<LoadReport, AppError> {
        let store = self.connection.ensure_connected(self.auto_connect).await?;
        tracing::info!(url = %self.config_url, "fetching remote config");
        let raw = self.fetch().await?;
        self.load_document(store.as_ref(), raw).await
    }

    /// Same as [`ConfigLoader::load_all`] for an already fetched document.
    pub async fn load_from_value(&self, raw: Value) -> Result<LoadReport, AppError> {
        let store = self.connection.ensure_connected(self.auto_connect).await?;
        self.load_document(store.as_ref(), raw).await
    }

    async fn fetch(&self) -> Result<Value, ConfigError> {
        let res = self
            .client
            .get(&self.config_url)
            .send()
            .await
            .map_err(|e| ConfigError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| ConfigError::Fetch(e.to_string()))?;
        res.json::<Value>()
            .await
            .map_err(|e| ConfigError::Fetch(format!("response is not JSON: {}", e)))
    }

    async fn load_document(&self, store: &dyn DocumentStore, raw: Value) -> Result<LoadReport, AppError> {
        let remote = parse_remote_config(raw)?;
        let mut report = LoadReport {
            skipped: remote.skipped,
            ..LoadReport::default()
        };
        for name in &report.skipped {
            tracing::debug!(entry = %name, "skipping config entry without schema");
        }
        for (name, entry) in remote.entities {
            match self.load_entity(store, &name, entry).await {
                Ok(model) => {
                    tracing::info!(model = %name, collection = %model.collection(), "model loaded");
                    report.models.insert(name, model);
                }
                Err(e) => {
                    tracing::error!(model = %name, error = %e, "failed to load model");
                    report.failures.push((name, e.to_string()));
                }
            }
        }
        tracing::info!(
            loaded = report.models.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "remote config applied"
        );
        Ok(report)
    }

    async fn load_entity(&self, store: &dyn DocumentStore, name: &str, entry: Value) -> Result<Arc<Model>, AppError> {
        let model = build_model(name, entry)?;
        // A model is registered only after its collection exists.
        if self.registry.get(name).is_none() {
            self.registry.check_collection(&model)?;
            store.ensure_collection(&model).await?;
        }
        Ok(self.registry.register(model)?.into_model())
    }
}

/// Compile one entity entry into an unregistered model.
pub fn build_model(name: &str, entry: Value) -> Result<Model, ConfigError> {
    validate_entity_name(name)?;
    if entry.get("schema").map(json_depth).unwrap_or(0) > MAX_CONFIG_DEPTH {
        return Err(ConfigError::TooDeep {
            entity: name.to_string(),
            max: MAX_CONFIG_DEPTH,
        });
    }
    let entity: EntityConfig = serde_json::from_value(entry).map_err(|e| ConfigError::Schema {
        entity: name.to_string(),
        message: e.to_string(),
    })?;
    let schema = build_schema(&entity.schema);
    let options = ModelOptions::from_config(entity.options.as_ref()).map_err(|e| ConfigError::Schema {
        entity: name.to_string(),
        message: e.to_string(),
    })?;
    let collection = collection_name(name, options.collection.as_deref())?;
    Ok(Model::new(name, schema, options)
        .with_collection(collection)
        .with_ui_fields(entity.ui_fields()))
}

/// Container nesting of a JSON value; scalars are 0.
fn json_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        Value::Object(obj) => 1 + obj.values().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldDescriptor, StorageType};
    use crate::query::{Document, FindQuery};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    /// Memory store that cannot create one named collection.
    struct BrokenCollectionStore {
        inner: MemoryStore,
        broken: &'static str,
    }

    #[async_trait]
    impl DocumentStore for BrokenCollectionStore {
        async fn ensure_collection(&self, model: &Model) -> Result<(), AppError> {
            if model.collection() == self.broken {
                return Err(AppError::Connection("relation cannot be created".into()));
            }
            self.inner.ensure_collection(model).await
        }

        async fn insert(&self, model: &Model, id: Uuid, doc: Document) -> Result<Document, AppError> {
            self.inner.insert(model, id, doc).await
        }

        async fn find(&self, model: &Model, query: &FindQuery) -> Result<Vec<Document>, AppError> {
            self.inner.find(model, query).await
        }

        async fn find_by_id(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError> {
            self.inner.find_by_id(model, id).await
        }

        async fn replace(&self, model: &Model, id: Uuid, doc: Document) -> Result<Option<Document>, AppError> {
            self.inner.replace(model, id, doc).await
        }

        async fn delete(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError> {
            self.inner.delete(model, id).await
        }

        async fn ping(&self) -> Result<(), AppError> {
            self.inner.ping().await
        }
    }

    fn loader() -> (ConfigLoader, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let connection = Arc::new(StoreConnection::with_store(store.clone()));
        let loader = ConfigLoader::new(&Settings::default(), Arc::new(ModelRegistry::new()), connection).unwrap();
        (loader, store)
    }

    #[test]
    fn builds_models_with_options_and_ui_fields() {
        let model = build_model(
            "Work-Orders",
            json!({
                "schema": {"title": {"type": "string", "required": true}, "due": "date"},
                "options": {"timestamps": false},
                "frontend": {"fields": [{"name": "title", "label": "Title", "type": "text"}]}
            }),
        )
        .unwrap();
        assert_eq!(model.collection(), "work_orders");
        assert!(model.options().timestamps.is_none());
        assert_eq!(model.ui_fields().len(), 1);
        assert!(matches!(
            model.schema().get("due"),
            Some(FieldDescriptor::Scalar { storage: StorageType::Date, .. })
        ));
    }

    #[test]
    fn rejects_bad_names_and_deep_schemas() {
        let entry = json!({"schema": {"a": "string"}});
        assert!(matches!(
            build_model("bad name", entry.clone()),
            Err(ConfigError::InvalidEntityName(_))
        ));
        assert!(build_model("models", entry).is_err());

        let mut deep = json!("string");
        for _ in 0..MAX_CONFIG_DEPTH + 2 {
            deep = json!({ "inner": deep });
        }
        assert!(matches!(
            build_model("deep", json!({ "schema": deep })),
            Err(ConfigError::TooDeep { .. })
        ));
    }

    #[tokio::test]
    async fn bad_entities_are_isolated() {
        let (loader, store) = loader();
        let report = loader
            .load_from_value(json!({
                "metadata": {"version": 3},
                "users": {"schema": {"name": "string"}},
                "broken": {"schema": "not-an-object"},
                "bad name": {"schema": {"x": "string"}}
            }))
            .await
            .unwrap();
        assert_eq!(report.models.keys().collect::<Vec<_>>(), vec!["users"]);
        assert_eq!(report.skipped, vec!["metadata".to_string()]);
        let failed: Vec<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["bad name", "broken"]);
        assert!(!report.is_clean());
        assert!(store.has_collection("users").await);
    }

    #[tokio::test]
    async fn reloading_reuses_registered_models() {
        let (loader, _) = loader();
        let first = loader
            .load_from_value(json!({"users": {"schema": {"name": "string"}}}))
            .await
            .unwrap();
        let second = loader
            .load_from_value(json!({"users": {"schema": {"email": "string"}}}))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first.models["users"], &second.models["users"]));
        assert!(second.models["users"].schema().contains("name"));
        assert_eq!(loader.registry().len(), 1);
    }

    #[tokio::test]
    async fn entities_folding_to_one_collection_are_rejected() {
        let (loader, store) = loader();
        let report = loader
            .load_from_value(json!({
                "Users": {"schema": {"name": "string"}},
                "users": {"schema": {"title": "string"}},
                "people": {"schema": {"nick": "string"}, "options": {"collection": "users"}}
            }))
            .await
            .unwrap();
        assert_eq!(report.models.keys().collect::<Vec<_>>(), vec!["Users"]);
        let failed: Vec<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["people", "users"]);
        assert!(report.failures[1].1.contains("already belongs to entity 'Users'"));
        assert_eq!(loader.registry().names(), vec!["Users"]);

        let owner = loader.registry().get("Users").unwrap();
        store
            .insert(&owner, Uuid::new_v4(), json!({"name": "secret"}).as_object().unwrap().clone())
            .await
            .unwrap();
        assert!(loader.registry().get("users").is_none());
        assert_eq!(store.count("users").await, 1);
    }

    #[tokio::test]
    async fn models_whose_collection_fails_are_not_registered() {
        let store = Arc::new(BrokenCollectionStore {
            inner: MemoryStore::new(),
            broken: "ledger",
        });
        let connection = Arc::new(StoreConnection::with_store(store));
        let loader = ConfigLoader::new(&Settings::default(), Arc::new(ModelRegistry::new()), connection).unwrap();
        let report = loader
            .load_from_value(json!({
                "ledger": {"schema": {"amount": "number"}},
                "users": {"schema": {"name": "string"}}
            }))
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "ledger");
        assert!(loader.registry().get("ledger").is_none());
        assert!(loader.registry().collection_owner("ledger").is_none());
        assert_eq!(loader.registry().names(), vec!["users"]);
    }

    #[tokio::test]
    async fn malformed_document_aborts_the_load() {
        let (loader, _) = loader();
        let err = loader.load_from_value(json!(["users"])).await.unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn disconnected_store_without_auto_connect_fails_fast() {
        let settings = Settings {
            auto_connect: false,
            ..Settings::default()
        };
        let connection = Arc::new(StoreConnection::new(Some("memory://".into()), "dynacrud"));
        let loader = ConfigLoader::new(&settings, Arc::new(ModelRegistry::new()), connection).unwrap();
        let err = loader
            .load_from_value(json!({"users": {"schema": {"name": "string"}}}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Connection(_)));
        assert!(loader.registry().is_empty());
    }

    #[test]
    fn json_depth_counts_containers() {
        assert_eq!(json_depth(&json!("x")), 0);
        assert_eq!(json_depth(&json!({"a": [1, {"b": 2}]})), 3);
    }
}
