//! Process-wide model registry. One live model per entity name; later registrations reuse it.
//! Each collection belongs to exactly one entity name.

use crate::config::{FieldDescriptor, ModelOptions, SchemaDescriptor};
use crate::error::ConfigError;
use crate::ui::UiField;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, LazyLock};

/// A registered, queryable entity: its compiled schema, options, and storage collection.
#[derive(Debug)]
pub struct Model {
    name: String,
    collection: String,
    schema: SchemaDescriptor,
    options: ModelOptions,
    ui_fields: Vec<UiField>,
}

impl Model {
    /// Collection defaults to the lower-cased entity name; use [`Model::with_collection`] for validated overrides.
    pub fn new(name: impl Into<String>, schema: SchemaDescriptor, options: ModelOptions) -> Self {
        let name = name.into();
        let collection = options
            .collection
            .clone()
            .unwrap_or_else(|| name.to_lowercase().replace('-', "_"));
        Model {
            name,
            collection,
            schema,
            options,
            ui_fields: Vec::new(),
        }
    }

    pub fn with_collection(mut self, collection: String) -> Self {
        self.collection = collection;
        self
    }

    pub fn with_ui_fields(mut self, ui_fields: Vec<UiField>) -> Self {
        self.ui_fields = ui_fields;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn ui_fields(&self) -> &[UiField] {
        &self.ui_fields
    }

    /// Top-level scalar fields declared `unique: true`.
    pub fn unique_fields(&self) -> Vec<&str> {
        self.top_level_flagged(|f| match f {
            FieldDescriptor::Scalar { constraints, .. } => constraints.unique(),
            _ => false,
        })
    }

    /// Top-level scalar fields declared `index: true` (and not already unique).
    pub fn indexed_fields(&self) -> Vec<&str> {
        self.top_level_flagged(|f| match f {
            FieldDescriptor::Scalar { constraints, .. } => constraints.index() && !constraints.unique(),
            _ => false,
        })
    }

    fn top_level_flagged(&self, pred: impl Fn(&FieldDescriptor) -> bool) -> Vec<&str> {
        self.schema
            .iter()
            .filter(|(_, f)| pred(f))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Dot paths holding dates: declared date fields plus the timestamp fields.
    pub fn date_paths(&self) -> Vec<String> {
        let mut paths = self.schema.date_paths();
        if let Some(ts) = &self.options.timestamps {
            paths.push(ts.created_at.clone());
            paths.push(ts.updated_at.clone());
        }
        paths
    }
}

/// Outcome of a registration attempt. Both variants carry the live model.
#[derive(Clone, Debug)]
pub enum Registration {
    Created(Arc<Model>),
    Reused(Arc<Model>),
}

impl Registration {
    pub fn model(&self) -> &Arc<Model> {
        match self {
            Registration::Created(m) | Registration::Reused(m) => m,
        }
    }

    pub fn into_model(self) -> Arc<Model> {
        match self {
            Registration::Created(m) | Registration::Reused(m) => m,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

fn collection_taken(model: &Model, owner: &str) -> ConfigError {
    ConfigError::CollectionTaken {
        entity: model.name.clone(),
        collection: model.collection.clone(),
        owner: owner.to_string(),
    }
}

static GLOBAL: LazyLock<Arc<ModelRegistry>> = LazyLock::new(|| Arc::new(ModelRegistry::new()));

/// Keyed model store. Registration is a single atomic insert-if-absent, so racing
/// first registrations of one name all observe the same model.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: DashMap<String, Arc<Model>>,
    /// collection -> owning entity name
    collections: DashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process. Lives until exit.
    pub fn global() -> Arc<ModelRegistry> {
        GLOBAL.clone()
    }

    /// Register a model built from `schema` and `options`, or return the one already registered under `name`.
    pub fn register_or_get(
        &self,
        name: &str,
        schema: SchemaDescriptor,
        options: ModelOptions,
    ) -> Result<Registration, ConfigError> {
        self.register(Model::new(name, schema, options))
    }

    /// Insert `model` unless its name is taken. A taken name keeps the existing model; the new one is dropped.
    /// A new name whose collection belongs to another entity is rejected.
    pub fn register(&self, model: Model) -> Result<Registration, ConfigError> {
        // Lock order: name entry, then collection entry.
        match self.models.entry(model.name.clone()) {
            Entry::Occupied(existing) => {
                tracing::warn!(model = %model.name, "model already registered, reusing existing model");
                Ok(Registration::Reused(existing.get().clone()))
            }
            Entry::Vacant(slot) => {
                match self.collections.entry(model.collection.clone()) {
                    Entry::Occupied(owner) if owner.get() != &model.name => {
                        return Err(collection_taken(&model, owner.get()));
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(claim) => {
                        claim.insert(model.name.clone());
                    }
                }
                let model = Arc::new(model);
                slot.insert(model.clone());
                Ok(Registration::Created(model))
            }
        }
    }

    /// Fails when `model`'s collection is owned by a different entity name.
    pub fn check_collection(&self, model: &Model) -> Result<(), ConfigError> {
        match self.collections.get(&model.collection) {
            Some(owner) if owner.value() != &model.name => Err(collection_taken(model, owner.value())),
            _ => Ok(()),
        }
    }

    /// Entity name owning `collection`, if any.
    pub fn collection_owner(&self, collection: &str) -> Option<String> {
        self.collections.get(collection).map(|o| o.value().clone())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Model>> {
        self.models.get(name).map(|m| m.value().clone())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|m| m.key().clone()).collect();
        names.sort();
        names
    }

    /// Registered models, sorted by name.
    pub fn models(&self) -> Vec<Arc<Model>> {
        let mut models: Vec<Arc<Model>> = self.models.iter().map(|m| m.value().clone()).collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
