//! Metadata type resource: schema registration and cached lookup.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use strata_core::doc::check_doc_unchanged;
use strata_core::{MetadataTypeId, TtlCache};

use crate::config::CachePolicy;
use crate::error::{CatalogError, Result};
use crate::model::MetadataType;
use crate::store::{CatalogStore, MetadataTypeRow};

/// Manages metadata type definitions.
///
/// Writes are idempotent: re-adding an unchanged definition is a no-op
/// returning the stored record; a changed definition under the same name
/// is a conflict. Reads go through a bounded TTL cache, so callers may
/// observe up to one TTL window of staleness after a write.
pub struct MetadataTypeResource {
    store: Arc<dyn CatalogStore>,
    by_id: Mutex<TtlCache<MetadataTypeId, Arc<MetadataType>>>,
    by_name: Mutex<TtlCache<String, Arc<MetadataType>>>,
}

impl MetadataTypeResource {
    /// Creates a resource with the default cache policy.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_policy(store, CachePolicy::default())
    }

    /// Creates a resource with an explicit cache policy.
    #[must_use]
    pub fn with_policy(store: Arc<dyn CatalogStore>, policy: CachePolicy) -> Self {
        Self {
            store,
            by_id: Mutex::new(TtlCache::new(policy.capacity, policy.ttl())),
            by_name: Mutex::new(TtlCache::new(policy.capacity, policy.ttl())),
        }
    }

    /// Registers a metadata type, or verifies an existing one is unchanged.
    ///
    /// `allow_table_lock` permits the store to take an exclusive lock for
    /// a faster, transactional index build; when false the build is
    /// concurrent (slower, non-transactional) and does not block other
    /// callers. Returns the post-registration record, never the raw input.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed definition; `Conflict` when a type of
    /// the same name exists with different content.
    pub async fn add(
        &self,
        definition: &Value,
        allow_table_lock: bool,
    ) -> Result<Arc<MetadataType>> {
        MetadataType::validate(definition)?;
        let name = definition_name(definition)?;

        match self.store.get_metadata_type_by_name(name).await? {
            Some(existing) => {
                // Same name again: make sure it matches what is stored.
                check_doc_unchanged(
                    &existing.definition,
                    definition,
                    format!("metadata type {name}"),
                )?;
            }
            None => {
                self.store
                    .add_metadata_type(name, definition, !allow_table_lock)
                    .await?;
                tracing::info!(name, "registered metadata type");
            }
        }

        self.get_by_name(name)
            .await?
            .ok_or_else(|| CatalogError::UnknownMetadataType {
                name: name.to_string(),
            })
    }

    /// Fetches a metadata type by id. Absence is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns storage or validation errors from the read path.
    pub async fn get(&self, id: MetadataTypeId) -> Result<Option<Arc<MetadataType>>> {
        if let Some(hit) = lock(&self.by_id)?.get(&id) {
            return Ok(Some(hit));
        }
        let Some(row) = self.store.get_metadata_type(id).await? else {
            return Ok(None);
        };
        let metadata_type = make(row)?;
        lock(&self.by_id)?.insert(id, Arc::clone(&metadata_type));
        Ok(Some(metadata_type))
    }

    /// Fetches a metadata type by name. Absence is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns storage or validation errors from the read path.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Arc<MetadataType>>> {
        if let Some(hit) = lock(&self.by_name)?.get(&name.to_string()) {
            return Ok(Some(hit));
        }
        let Some(row) = self.store.get_metadata_type_by_name(name).await? else {
            return Ok(None);
        };
        let metadata_type = make(row)?;
        lock(&self.by_name)?.insert(name.to_string(), Arc::clone(&metadata_type));
        Ok(Some(metadata_type))
    }

    /// (Re)materializes per-field indexing structures for all registered
    /// types. `rebuild_all` forces recomputation even where structures
    /// already exist. Idempotent, side effect only.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the store.
    pub async fn check_field_indexes(
        &self,
        allow_table_lock: bool,
        rebuild_all: bool,
    ) -> Result<()> {
        self.store
            .check_dynamic_fields(!allow_table_lock, rebuild_all)
            .await?;
        Ok(())
    }
}

fn make(row: MetadataTypeRow) -> Result<Arc<MetadataType>> {
    Ok(Arc::new(MetadataType::from_definition(
        row.id,
        row.definition,
    )?))
}

fn definition_name(definition: &Value) -> Result<&str> {
    definition
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CatalogError::validation("metadata type definition needs a name"))
}

fn lock<'a, K, V>(
    cache: &'a Mutex<TtlCache<K, V>>,
) -> Result<std::sync::MutexGuard<'a, TtlCache<K, V>>> {
    cache
        .lock()
        .map_err(|_| strata_core::Error::internal("cache lock poisoned").into())
}
