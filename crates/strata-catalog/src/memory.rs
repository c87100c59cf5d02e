//! In-memory catalog store for testing.
//!
//! Thread-safe via `RwLock`. Not suitable for production: writes made
//! inside an open transaction are visible to concurrent readers before
//! commit (rollback is an undo log, not snapshot isolation), and
//! expression evaluation is a full scan. Uniqueness constraints and
//! archived-row exclusion match the real store contract, which is what
//! the engine's tests exercise.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use strata_core::error::{Error, Result};
use strata_core::{DatasetId, MetadataTypeId, ProductId};

use crate::fields::Expression;
use crate::store::{
    CatalogStore, CatalogTransaction, DatasetRow, InsertOutcome, MetadataTypeRow, ProductRow,
    SelectField, SummaryRow,
};

#[derive(Debug, Clone)]
struct MetadataTypeRecord {
    name: String,
    definition: Value,
}

#[derive(Debug, Clone)]
struct ProductRecord {
    name: String,
    metadata_type_id: MetadataTypeId,
    definition: Value,
}

#[derive(Debug, Clone)]
struct DatasetRecord {
    product_id: ProductId,
    metadata_doc: Value,
    archived: bool,
    locations: Vec<String>,
    /// Direct source edges in insertion order: (classifier, source id).
    sources: Vec<(String, DatasetId)>,
}

#[derive(Debug, Default)]
struct Inner {
    metadata_types: BTreeMap<u32, MetadataTypeRecord>,
    next_metadata_type_id: u32,
    products: BTreeMap<u32, ProductRecord>,
    next_product_id: u32,
    datasets: HashMap<DatasetId, DatasetRecord>,
}

/// In-memory implementation of [`CatalogStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> Error {
    Error::internal("store lock poisoned")
}

impl Inner {
    fn dataset_row(&self, id: DatasetId, record: &DatasetRecord, with_sources: bool) -> DatasetRow {
        let (source_ids, classifiers) = if with_sources {
            record
                .sources
                .iter()
                .map(|(classifier, source)| (*source, classifier.clone()))
                .unzip()
        } else {
            (Vec::new(), Vec::new())
        };
        DatasetRow {
            id,
            product_id: record.product_id,
            metadata_doc: record.metadata_doc.clone(),
            local_uri: record.locations.first().cloned(),
            source_ids,
            classifiers,
        }
    }

    fn matching(&self, expressions: &[Expression]) -> Vec<(DatasetId, &DatasetRecord)> {
        let mut hits: Vec<(DatasetId, &DatasetRecord)> = self
            .datasets
            .iter()
            .filter(|(_, record)| !record.archived)
            .filter(|(id, record)| {
                expressions
                    .iter()
                    .all(|expr| expr.matches(**id, record.product_id, &record.metadata_doc))
            })
            .map(|(id, record)| (*id, record))
            .collect();
        hits.sort_by_key(|(id, _)| *id);
        hits
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_metadata_type(&self, id: MetadataTypeId) -> Result<Option<MetadataTypeRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.metadata_types.get(&id.0).map(|record| MetadataTypeRow {
            id,
            name: record.name.clone(),
            definition: record.definition.clone(),
        }))
    }

    async fn get_metadata_type_by_name(&self, name: &str) -> Result<Option<MetadataTypeRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .metadata_types
            .iter()
            .find(|(_, record)| record.name == name)
            .map(|(id, record)| MetadataTypeRow {
                id: MetadataTypeId(*id),
                name: record.name.clone(),
                definition: record.definition.clone(),
            }))
    }

    async fn add_metadata_type(
        &self,
        name: &str,
        definition: &Value,
        _concurrently: bool,
    ) -> Result<MetadataTypeId> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if inner.metadata_types.values().any(|r| r.name == name) {
            return Err(Error::storage(format!(
                "metadata type {name} already exists"
            )));
        }
        inner.next_metadata_type_id += 1;
        let id = inner.next_metadata_type_id;
        inner.metadata_types.insert(
            id,
            MetadataTypeRecord {
                name: name.to_string(),
                definition: definition.clone(),
            },
        );
        Ok(MetadataTypeId(id))
    }

    async fn check_dynamic_fields(&self, concurrently: bool, rebuild_all: bool) -> Result<()> {
        // Field indexes are implicit in a full-scan store; nothing to build.
        let inner = self.inner.read().map_err(|_| poisoned())?;
        tracing::debug!(
            types = inner.metadata_types.len(),
            concurrently,
            rebuild_all,
            "checked dynamic field indexes"
        );
        Ok(())
    }

    async fn get_dataset_type(&self, id: ProductId) -> Result<Option<ProductRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.products.get(&id.0).map(|record| ProductRow {
            id,
            name: record.name.clone(),
            metadata_type_id: record.metadata_type_id,
            definition: record.definition.clone(),
        }))
    }

    async fn get_dataset_type_by_name(&self, name: &str) -> Result<Option<ProductRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .products
            .iter()
            .find(|(_, record)| record.name == name)
            .map(|(id, record)| ProductRow {
                id: ProductId(*id),
                name: record.name.clone(),
                metadata_type_id: record.metadata_type_id,
                definition: record.definition.clone(),
            }))
    }

    async fn add_dataset_type(
        &self,
        name: &str,
        _metadata: &Value,
        metadata_type_id: MetadataTypeId,
        definition: &Value,
    ) -> Result<ProductId> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if !inner.metadata_types.contains_key(&metadata_type_id.0) {
            return Err(Error::storage(format!(
                "unknown metadata type id {metadata_type_id}"
            )));
        }
        if inner.products.values().any(|r| r.name == name) {
            return Err(Error::storage(format!("product {name} already exists")));
        }
        inner.next_product_id += 1;
        let id = inner.next_product_id;
        inner.products.insert(
            id,
            ProductRecord {
                name: name.to_string(),
                metadata_type_id,
                definition: definition.clone(),
            },
        );
        Ok(ProductId(id))
    }

    async fn get_all_dataset_types(&self) -> Result<Vec<ProductRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .products
            .iter()
            .map(|(id, record)| ProductRow {
                id: ProductId(*id),
                name: record.name.clone(),
                metadata_type_id: record.metadata_type_id,
                definition: record.definition.clone(),
            })
            .collect())
    }

    async fn get_dataset(&self, id: DatasetId) -> Result<Option<DatasetRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .datasets
            .get(&id)
            .map(|record| inner.dataset_row(id, record, false)))
    }

    async fn get_dataset_sources(&self, id: DatasetId) -> Result<Vec<DatasetRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        if !inner.datasets.contains_key(&id) {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id]);
        seen.insert(id);
        while let Some(current) = queue.pop_front() {
            let Some(record) = inner.datasets.get(&current) else {
                continue;
            };
            rows.push(inner.dataset_row(current, record, true));
            for (_, source) in &record.sources {
                if seen.insert(*source) {
                    queue.push_back(*source);
                }
            }
        }
        Ok(rows)
    }

    async fn get_derived_datasets(&self, id: DatasetId) -> Result<Vec<DatasetRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut rows: Vec<DatasetRow> = inner
            .datasets
            .iter()
            .filter(|(_, record)| record.sources.iter().any(|(_, source)| *source == id))
            .map(|(derived, record)| inner.dataset_row(*derived, record, false))
            .collect();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    async fn contains_dataset(&self, id: DatasetId) -> Result<bool> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.datasets.contains_key(&id))
    }

    async fn ensure_dataset_location(&self, id: DatasetId, uri: &str) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let record = inner
            .datasets
            .get_mut(&id)
            .ok_or_else(|| Error::storage(format!("unknown dataset {id}")))?;
        if record.locations.iter().any(|existing| existing == uri) {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            record.locations.push(uri.to_string());
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn get_locations(&self, id: DatasetId) -> Result<Vec<String>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .datasets
            .get(&id)
            .map(|record| record.locations.clone())
            .unwrap_or_default())
    }

    async fn search_datasets(
        &self,
        expressions: &[Expression],
        with_source_ids: bool,
    ) -> Result<Vec<DatasetRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .matching(expressions)
            .into_iter()
            .map(|(id, record)| inner.dataset_row(id, record, with_source_ids))
            .collect())
    }

    async fn search_dataset_summaries(
        &self,
        expressions: &[Expression],
        select: &[SelectField],
    ) -> Result<Vec<SummaryRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .matching(expressions)
            .into_iter()
            .map(|(id, record)| {
                select
                    .iter()
                    .map(|field| {
                        (
                            field.name.clone(),
                            field.spec.project(id, record.product_id, &record.metadata_doc),
                        )
                    })
                    .collect()
            })
            .collect())
    }

    async fn count_datasets(&self, expressions: &[Expression]) -> Result<u64> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.matching(expressions).len() as u64)
    }

    async fn search_datasets_by_metadata(&self, metadata: &Value) -> Result<Vec<DatasetRow>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut rows: Vec<DatasetRow> = inner
            .datasets
            .iter()
            .filter(|(_, record)| !record.archived && contains_subtree(&record.metadata_doc, metadata))
            .map(|(id, record)| inner.dataset_row(*id, record, false))
            .collect();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            undo: Vec::new(),
            committed: false,
        }))
    }
}

/// Whether every field of `pattern` is present (and equal) in `doc`.
fn contains_subtree(doc: &Value, pattern: &Value) -> bool {
    match (doc, pattern) {
        (Value::Object(doc), Value::Object(pattern)) => pattern.iter().all(|(key, expected)| {
            doc.get(key)
                .is_some_and(|actual| contains_subtree(actual, expected))
        }),
        (actual, expected) => actual == expected,
    }
}

enum UndoOp {
    RemoveDataset(DatasetId),
    RemoveSource { dataset: DatasetId, classifier: String },
    SetArchived { dataset: DatasetId, archived: bool },
}

/// Undo-log transaction over [`MemoryStore`].
struct MemoryTransaction {
    inner: Arc<RwLock<Inner>>,
    undo: Vec<UndoOp>,
    committed: bool,
}

#[async_trait]
impl CatalogTransaction for MemoryTransaction {
    async fn insert_dataset(
        &mut self,
        metadata_doc: &Value,
        id: DatasetId,
        product: ProductId,
    ) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if !inner.products.contains_key(&product.0) {
            return Err(Error::storage(format!("unknown product id {product}")));
        }
        if inner.datasets.contains_key(&id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        inner.datasets.insert(
            id,
            DatasetRecord {
                product_id: product,
                metadata_doc: metadata_doc.clone(),
                archived: false,
                locations: Vec::new(),
                sources: Vec::new(),
            },
        );
        self.undo.push(UndoOp::RemoveDataset(id));
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_dataset_source(
        &mut self,
        classifier: &str,
        dataset: DatasetId,
        source: DatasetId,
    ) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let record = inner
            .datasets
            .get_mut(&dataset)
            .ok_or_else(|| Error::storage(format!("unknown dataset {dataset}")))?;
        // (dataset, classifier) is the edge key.
        if record.sources.iter().any(|(existing, _)| existing == classifier) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        record.sources.push((classifier.to_string(), source));
        self.undo.push(UndoOp::RemoveSource {
            dataset,
            classifier: classifier.to_string(),
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn archive_dataset(&mut self, id: DatasetId) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let record = inner
            .datasets
            .get_mut(&id)
            .ok_or_else(|| Error::storage(format!("unknown dataset {id}")))?;
        let previous = record.archived;
        record.archived = true;
        self.undo.push(UndoOp::SetArchived {
            dataset: id,
            archived: previous,
        });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        self.undo.clear();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        for op in self.undo.drain(..).rev() {
            match op {
                UndoOp::RemoveDataset(id) => {
                    inner.datasets.remove(&id);
                }
                UndoOp::RemoveSource { dataset, classifier } => {
                    if let Some(record) = inner.datasets.get_mut(&dataset) {
                        record.sources.retain(|(existing, _)| *existing != classifier);
                    }
                }
                UndoOp::SetArchived { dataset, archived } => {
                    if let Some(record) = inner.datasets.get_mut(&dataset) {
                        record.archived = archived;
                    }
                }
            }
        }
    }
}
