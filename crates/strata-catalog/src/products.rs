//! Product (dataset type) resource: collection registration and cached lookup.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use strata_core::doc::check_doc_unchanged;
use strata_core::{ProductId, TtlCache};

use crate::config::CachePolicy;
use crate::error::{CatalogError, Result};
use crate::metadata_types::MetadataTypeResource;
use crate::model::{Product, ProductDraft};
use crate::store::{CatalogStore, ProductRow};

/// Manages products: named dataset collections bound to one metadata type.
///
/// Same write/read contract as the metadata type resource: idempotent
/// re-registration, conflict on changed definitions, TTL-bounded cached
/// reads.
pub struct ProductResource {
    store: Arc<dyn CatalogStore>,
    metadata_types: Arc<MetadataTypeResource>,
    by_id: Mutex<TtlCache<ProductId, Arc<Product>>>,
    by_name: Mutex<TtlCache<String, Arc<Product>>>,
}

impl ProductResource {
    /// Creates a resource with the default cache policy.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, metadata_types: Arc<MetadataTypeResource>) -> Self {
        Self::with_policy(store, metadata_types, CachePolicy::default())
    }

    /// Creates a resource with an explicit cache policy.
    #[must_use]
    pub fn with_policy(
        store: Arc<dyn CatalogStore>,
        metadata_types: Arc<MetadataTypeResource>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            store,
            metadata_types,
            by_id: Mutex::new(TtlCache::new(policy.capacity, policy.ttl())),
            by_name: Mutex::new(TtlCache::new(policy.capacity, policy.ttl())),
        }
    }

    /// The metadata type resource this one composes.
    #[must_use]
    pub fn metadata_types(&self) -> &Arc<MetadataTypeResource> {
        &self.metadata_types
    }

    /// Builds an in-memory product draft from a definition document.
    ///
    /// The `metadata_type` entry may name a registered type or embed a
    /// full definition; an embedded one is registered (non-locking) if
    /// needed.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed definition; `UnknownMetadataType` when
    /// the named type is not registered.
    pub async fn from_doc(&self, definition: &Value) -> Result<ProductDraft> {
        let draft_name = definition
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>");

        let metadata_type = match definition.get("metadata_type") {
            Some(Value::String(name)) => self.metadata_types.get_by_name(name).await?.ok_or_else(
                || CatalogError::UnknownMetadataType {
                    name: name.clone(),
                },
            )?,
            Some(embedded @ Value::Object(_)) => {
                // They embedded a document; add it if needed.
                self.metadata_types.add(embedded, false).await?
            }
            _ => {
                return Err(CatalogError::validation(format!(
                    "product {draft_name} needs a metadata_type name or embedded definition"
                )))
            }
        };

        ProductDraft::new(definition.clone(), metadata_type)
    }

    /// Registers a product, or verifies an existing one is unchanged.
    ///
    /// Returns the post-registration record, never the draft.
    ///
    /// # Errors
    ///
    /// `Conflict` when a product of the same name exists with a different
    /// definition.
    pub async fn add(&self, draft: &ProductDraft) -> Result<Arc<Product>> {
        let name = draft.name();

        match self.store.get_dataset_type_by_name(name).await? {
            Some(existing) => {
                // Same collection again: make sure it matches what is stored.
                check_doc_unchanged(&existing.definition, draft.definition(), format!("product {name}"))?;
            }
            None => {
                self.store
                    .add_dataset_type(
                        name,
                        &draft.metadata(),
                        draft.metadata_type().id(),
                        draft.definition(),
                    )
                    .await?;
                tracing::info!(name, "registered product");
            }
        }

        self.get_by_name(name)
            .await?
            .ok_or_else(|| CatalogError::UnknownProduct {
                name: name.to_string(),
            })
    }

    /// `from_doc` + `add` in one call.
    ///
    /// # Errors
    ///
    /// As [`from_doc`](Self::from_doc) and [`add`](Self::add).
    pub async fn add_document(&self, definition: &Value) -> Result<Arc<Product>> {
        let draft = self.from_doc(definition).await?;
        self.add(&draft).await
    }

    /// Adds several definitions sequentially.
    ///
    /// Not atomic as a whole: an error aborts the remaining definitions,
    /// but prior successes persist.
    ///
    /// # Errors
    ///
    /// The first error encountered, as [`add_document`](Self::add_document).
    pub async fn add_many(&self, definitions: &[Value]) -> Result<Vec<Arc<Product>>> {
        let mut added = Vec::with_capacity(definitions.len());
        for definition in definitions {
            added.push(self.add_document(definition).await?);
        }
        Ok(added)
    }

    /// Fetches a product by id. Absence is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns storage or validation errors from the read path.
    pub async fn get(&self, id: ProductId) -> Result<Option<Arc<Product>>> {
        if let Some(hit) = lock(&self.by_id)?.get(&id) {
            return Ok(Some(hit));
        }
        let Some(row) = self.store.get_dataset_type(id).await? else {
            return Ok(None);
        };
        let product = self.make(row).await?;
        lock(&self.by_id)?.insert(id, Arc::clone(&product));
        Ok(Some(product))
    }

    /// Fetches a product by name. Absence is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns storage or validation errors from the read path.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Arc<Product>>> {
        if let Some(hit) = lock(&self.by_name)?.get(&name.to_string()) {
            return Ok(Some(hit));
        }
        let Some(row) = self.store.get_dataset_type_by_name(name).await? else {
            return Ok(None);
        };
        let product = self.make(row).await?;
        lock(&self.by_name)?.insert(name.to_string(), Arc::clone(&product));
        Ok(Some(product))
    }

    /// Every registered product whose field registry declares all of
    /// `field_names`. Re-evaluated against current state on each call.
    ///
    /// # Errors
    ///
    /// Returns storage or validation errors from the read path.
    pub async fn get_with_fields<'a>(
        &self,
        field_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<Arc<Product>>> {
        let names: Vec<&str> = field_names.into_iter().collect();
        let mut matching = Vec::new();
        for product in self.get_all().await? {
            if product.fields().has_all(names.iter().copied()) {
                matching.push(product);
            }
        }
        Ok(matching)
    }

    /// Every registered product. Re-evaluated against current state on
    /// each call.
    ///
    /// # Errors
    ///
    /// Returns storage or validation errors from the read path.
    pub async fn get_all(&self) -> Result<Vec<Arc<Product>>> {
        let rows = self.store.get_all_dataset_types().await?;
        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            products.push(self.make(row).await?);
        }
        Ok(products)
    }

    async fn make(&self, row: ProductRow) -> Result<Arc<Product>> {
        let metadata_type = self
            .metadata_types
            .get(row.metadata_type_id)
            .await?
            .ok_or_else(|| CatalogError::UnknownMetadataType {
                name: row.metadata_type_id.to_string(),
            })?;
        Ok(Arc::new(Product::from_definition(
            row.id,
            row.definition,
            metadata_type,
        )?))
    }
}

fn lock<'a, K, V>(
    cache: &'a Mutex<TtlCache<K, V>>,
) -> Result<std::sync::MutexGuard<'a, TtlCache<K, V>>> {
    cache
        .lock()
        .map_err(|_| strata_core::Error::internal("cache lock poisoned").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;

    fn eo_definition() -> Value {
        json!({
            "name": "eo",
            "dataset": {
                "search_fields": {
                    "platform": { "offset": ["platform", "code"] },
                    "lat": {
                        "type": "double-range",
                        "min_offset": [["extent", "ll_lat"]],
                        "max_offset": [["extent", "ur_lat"]]
                    }
                }
            }
        })
    }

    fn telemetry_definition() -> Value {
        json!({
            "name": "telemetry",
            "dataset": {
                "search_fields": {
                    "platform": { "offset": ["platform", "code"] }
                }
            }
        })
    }

    fn resource() -> ProductResource {
        let store: Arc<dyn CatalogStore> = Arc::new(MemoryStore::new());
        let metadata_types = Arc::new(MetadataTypeResource::new(Arc::clone(&store)));
        ProductResource::new(store, metadata_types)
    }

    #[tokio::test]
    async fn from_doc_resolves_named_type() {
        let resource = resource();
        resource
            .metadata_types()
            .add(&eo_definition(), false)
            .await
            .expect("register type");

        let draft = resource
            .from_doc(&json!({"name": "ls8_scenes", "metadata_type": "eo"}))
            .await
            .expect("draft builds");
        assert_eq!(draft.name(), "ls8_scenes");
        assert_eq!(draft.metadata_type().name(), "eo");
    }

    #[tokio::test]
    async fn from_doc_unknown_type_fails() {
        let resource = resource();
        let err = resource
            .from_doc(&json!({"name": "ls8_scenes", "metadata_type": "nope"}))
            .await
            .expect_err("unknown type");
        assert!(matches!(err, CatalogError::UnknownMetadataType { name } if name == "nope"));
    }

    #[tokio::test]
    async fn from_doc_registers_embedded_type() {
        let resource = resource();
        let draft = resource
            .from_doc(&json!({"name": "ls8_scenes", "metadata_type": eo_definition()}))
            .await
            .expect("draft builds");
        assert_eq!(draft.metadata_type().name(), "eo");
        // The embedded type is now registered.
        assert!(resource
            .metadata_types()
            .get_by_name("eo")
            .await
            .expect("lookup")
            .is_some());
    }

    #[tokio::test]
    async fn add_is_idempotent_and_conflicts_on_change() {
        let resource = resource();
        let definition = json!({"name": "ls8_scenes", "metadata_type": eo_definition()});
        let first = resource.add_document(&definition).await.expect("add");
        let second = resource.add_document(&definition).await.expect("re-add");
        assert_eq!(first.id(), second.id());

        let mut changed = definition.clone();
        changed["metadata"] = json!({"platform": {"code": "LANDSAT_8"}});
        let err = resource
            .add_document(&changed)
            .await
            .expect_err("changed definition");
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn add_many_keeps_prior_successes_on_failure() {
        let resource = resource();
        let good = json!({"name": "ls8_scenes", "metadata_type": eo_definition()});
        let bad = json!({"name": "broken"});
        let also_good = json!({"name": "ls7_scenes", "metadata_type": "eo"});

        let err = resource
            .add_many(&[good, bad, also_good])
            .await
            .expect_err("middle definition is invalid");
        assert!(matches!(err, CatalogError::Validation { .. }));

        // The first succeeded and persists; the third was never attempted.
        assert!(resource.get_by_name("ls8_scenes").await.expect("get").is_some());
        assert!(resource.get_by_name("ls7_scenes").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn get_with_fields_filters_by_registry_superset() {
        let resource = resource();
        resource
            .add_document(&json!({"name": "ls8_scenes", "metadata_type": eo_definition()}))
            .await
            .expect("add eo product");
        resource
            .add_document(&json!({"name": "raw_telemetry", "metadata_type": telemetry_definition()}))
            .await
            .expect("add telemetry product");

        let both = resource.get_with_fields(["platform"]).await.expect("query");
        assert_eq!(both.len(), 2);

        let eo_only = resource
            .get_with_fields(["platform", "lat"])
            .await
            .expect("query");
        assert_eq!(eo_only.len(), 1);
        assert_eq!(eo_only[0].name(), "ls8_scenes");

        let none = resource.get_with_fields(["orbit"]).await.expect("query");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn get_all_lists_every_product() {
        let resource = resource();
        assert!(resource.get_all().await.expect("empty").is_empty());
        resource
            .add_document(&json!({"name": "ls8_scenes", "metadata_type": eo_definition()}))
            .await
            .expect("add");
        assert_eq!(resource.get_all().await.expect("all").len(), 1);
    }
}
