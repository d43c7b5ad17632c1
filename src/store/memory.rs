//! In-process document store. Backs `memory://` connections and the test suite.

use crate::error::AppError;
use crate::query::{Document, FindQuery, ID_FIELD};
use crate::registry::Model;
use crate::store::DocumentStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Collections keyed by name, documents kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection` (0 when it does not exist).
    pub async fn count(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map(Vec::len).unwrap_or(0)
    }

    pub async fn has_collection(&self, collection: &str) -> bool {
        self.collections.read().await.contains_key(collection)
    }
}

fn has_id(doc: &Document, id: &str) -> bool {
    doc.get(ID_FIELD).and_then(Value::as_str) == Some(id)
}

/// Unique fields behave like a partial unique index: absent and null values never collide.
fn check_unique(model: &Model, docs: &[Document], candidate: &Document, skip_id: Option<&str>) -> Result<(), AppError> {
    for field in model.unique_fields() {
        let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let taken = docs
            .iter()
            .filter(|d| skip_id.map(|id| !has_id(d, id)).unwrap_or(true))
            .any(|d| d.get(field) == Some(value));
        if taken {
            return Err(AppError::Conflict(format!(
                "duplicate value for unique field '{}' in {}",
                field,
                model.name()
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_collection(&self, model: &Model) -> Result<(), AppError> {
        self.collections
            .write()
            .await
            .entry(model.collection().to_string())
            .or_default();
        Ok(())
    }

    async fn insert(&self, model: &Model, id: Uuid, mut doc: Document) -> Result<Document, AppError> {
        doc.insert(ID_FIELD.into(), Value::String(id.to_string()));
        let mut collections = self.collections.write().await;
        let docs = collections.entry(model.collection().to_string()).or_default();
        let id = id.to_string();
        if docs.iter().any(|d| has_id(d, &id)) {
            return Err(AppError::Conflict(format!("document {} already exists", id)));
        }
        check_unique(model, docs, &doc, None)?;
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn find(&self, model: &Model, query: &FindQuery) -> Result<Vec<Document>, AppError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(model.collection()) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Document> = docs.iter().filter(|d| query.filter.matches(d)).cloned().collect();
        if !query.sort.is_empty() {
            out.sort_by(|a, b| query.sort.compare(a, b));
        }
        if let Some(limit) = query.limit {
            out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(out)
    }

    async fn find_by_id(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError> {
        let id = id.to_string();
        let collections = self.collections.read().await;
        Ok(collections
            .get(model.collection())
            .and_then(|docs| docs.iter().find(|d| has_id(d, &id)))
            .cloned())
    }

    async fn replace(&self, model: &Model, id: Uuid, mut doc: Document) -> Result<Option<Document>, AppError> {
        let id = id.to_string();
        doc.insert(ID_FIELD.into(), Value::String(id.clone()));
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(model.collection()) else {
            return Ok(None);
        };
        let Some(pos) = docs.iter().position(|d| has_id(d, &id)) else {
            return Ok(None);
        };
        check_unique(model, docs, &doc, Some(id.as_str()))?;
        docs[pos] = doc.clone();
        Ok(Some(doc))
    }

    async fn delete(&self, model: &Model, id: Uuid) -> Result<Option<Document>, AppError> {
        let id = id.to_string();
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(model.collection()) else {
            return Ok(None);
        };
        Ok(docs.iter().position(|d| has_id(d, &id)).map(|pos| docs.remove(pos)))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{build_schema, ModelOptions};
    use crate::query::{Filter, SortSpec};
    use serde_json::json;

    fn model() -> Model {
        let schema = build_schema(
            &serde_json::from_value(json!({
                "sku": {"type": "string", "unique": true},
                "qty": "number"
            }))
            .unwrap(),
        );
        Model::new("stock", schema, ModelOptions::default())
    }

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_find_replace_delete() {
        let store = MemoryStore::new();
        let m = model();
        store.ensure_collection(&m).await.unwrap();
        assert!(store.has_collection("stock").await);

        let id = Uuid::new_v4();
        let stored = store.insert(&m, id, doc(json!({"sku": "a", "qty": 1}))).await.unwrap();
        assert_eq!(stored[ID_FIELD], json!(id.to_string()));

        let replaced = store.replace(&m, id, doc(json!({"sku": "a", "qty": 5}))).await.unwrap().unwrap();
        assert_eq!(replaced["qty"], json!(5));
        assert_eq!(store.find_by_id(&m, id).await.unwrap().unwrap()["qty"], json!(5));

        let removed = store.delete(&m, id).await.unwrap().unwrap();
        assert_eq!(removed["sku"], json!("a"));
        assert!(store.find_by_id(&m, id).await.unwrap().is_none());
        assert!(store.delete(&m, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unique_fields_conflict_but_nulls_do_not() {
        let store = MemoryStore::new();
        let m = model();
        store.insert(&m, Uuid::new_v4(), doc(json!({"sku": "a"}))).await.unwrap();
        let err = store.insert(&m, Uuid::new_v4(), doc(json!({"sku": "a"}))).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        store.insert(&m, Uuid::new_v4(), doc(json!({"sku": null}))).await.unwrap();
        store.insert(&m, Uuid::new_v4(), doc(json!({"qty": 2}))).await.unwrap();
        assert_eq!(store.count("stock").await, 3);
    }

    #[tokio::test]
    async fn find_applies_filter_sort_and_limit() {
        let store = MemoryStore::new();
        let m = model();
        for (sku, qty) in [("a", 3), ("b", 1), ("c", 2), ("d", 9)] {
            store
                .insert(&m, Uuid::new_v4(), doc(json!({"sku": sku, "qty": qty})))
                .await
                .unwrap();
        }
        let query = FindQuery {
            filter: Filter::from_json(&json!({"qty": {"$lt": 5}})).unwrap(),
            sort: SortSpec::from_json(&json!({"qty": 1})).unwrap(),
            limit: Some(2),
        };
        let found = store.find(&m, &query).await.unwrap();
        let skus: Vec<&Value> = found.iter().map(|d| &d["sku"]).collect();
        assert_eq!(skus, vec![&json!("b"), &json!("c")]);
    }

    #[tokio::test]
    async fn unknown_collection_reads_as_empty() {
        let store = MemoryStore::new();
        let m = model();
        assert!(store.find(&m, &FindQuery::default()).await.unwrap().is_empty());
        assert!(store.replace(&m, Uuid::new_v4(), Document::new()).await.unwrap().is_none());
    }
}
