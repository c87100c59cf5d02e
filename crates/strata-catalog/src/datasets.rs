//! Dataset resource: indexed insertion, provenance reconstruction, and search.
//!
//! This is the core of the engine. Insertion fans out through the source
//! graph (sources before dependents), tolerates duplicate-insert races at
//! the store's uniqueness constraint, and guards duplicate ingestion with
//! a stored-document consistency check. Reads either project single rows
//! or rebuild the full provenance graph from one flat batch of rows.
//! Search resolves candidate products, compiles field expressions per
//! product, and concatenates per-product store queries lazily.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};

use strata_core::doc;
use strata_core::DatasetId;

use crate::error::{CatalogError, Result};
use crate::fields::{to_expressions, Expression, QueryValue};
use crate::metrics;
use crate::model::{self, Dataset, Product};
use crate::products::ProductResource;
use crate::store::{CatalogStore, DatasetRow, InsertOutcome, SelectField, SummaryRow};

/// A search request: an optional product name plus field predicates.
///
/// Selecting a product pins the search to that collection; otherwise every
/// product whose field registry declares all the queried names is searched
/// and the results are concatenated.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Restrict the search to the named product.
    pub product: Option<String>,
    /// Field name → value/range predicates.
    pub fields: BTreeMap<String, QueryValue>,
}

impl Query {
    /// An empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the query to one product by name.
    #[must_use]
    pub fn with_product(mut self, name: impl Into<String>) -> Self {
        self.product = Some(name.into());
        self
    }

    /// Adds a field predicate.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: QueryValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Manages dataset documents: insertion, lineage, and search.
pub struct DatasetResource {
    store: Arc<dyn CatalogStore>,
    products: Arc<ProductResource>,
}

impl DatasetResource {
    /// Creates the resource over a store and its product resource.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, products: Arc<ProductResource>) -> Self {
        Self { store, products }
    }

    /// The product resource this one composes.
    #[must_use]
    pub fn products(&self) -> &Arc<ProductResource> {
        &self.products
    }

    /// Whether this dataset is already indexed.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the store.
    pub async fn has(&self, id: DatasetId) -> Result<bool> {
        Ok(self.store.contains_dataset(id).await?)
    }

    /// Ensures a dataset is in the index; adds it if not present.
    ///
    /// Unless `skip_sources`, every dataset reachable via `sources` is
    /// indexed first, depth-first, so source edges always reference
    /// existing rows. Re-insertion of an already-indexed dataset is a
    /// no-op followed by a consistency check: the stored document must be
    /// unchanged, otherwise the call fails with a conflict naming the
    /// dataset id. The caller's document is never mutated; the stored copy
    /// has its lineage section emptied (it is reconstructed on read from
    /// the source edges).
    ///
    /// # Errors
    ///
    /// `Conflict` when the dataset exists with different metadata;
    /// storage errors otherwise.
    pub async fn add(&self, dataset: &Dataset, skip_sources: bool) -> Result<()> {
        if !skip_sources {
            for source in dataset.sources.values() {
                self.add_boxed(source).await?;
            }
        }

        tracing::info!(dataset = %dataset.id, product = dataset.product.name(), "indexing dataset");
        let stripped = model::doc_without_sources(dataset.product.metadata_type(), &dataset.metadata_doc);

        let mut was_inserted = false;
        let mut tx = self.store.begin().await?;
        match tx
            .insert_dataset(&stripped, dataset.id, dataset.product.id())
            .await?
        {
            InsertOutcome::Inserted => {
                was_inserted = true;
                for (classifier, source) in &dataset.sources {
                    let outcome = tx
                        .insert_dataset_source(classifier, dataset.id, source.id)
                        .await?;
                    if outcome == InsertOutcome::AlreadyExists {
                        tracing::warn!(dataset = %dataset.id, classifier = %classifier, "source edge already recorded");
                        metrics::record_duplicate_insert("source");
                    }
                }
            }
            InsertOutcome::AlreadyExists => {
                tracing::warn!(dataset = %dataset.id, "dataset already indexed");
                metrics::record_duplicate_insert("dataset");
            }
        }
        tx.commit().await?;

        if was_inserted {
            metrics::record_dataset_indexed();
        } else if let Some(existing) = self.get(dataset.id).await? {
            // Duplicate ingestion must not silently drift the metadata.
            doc::check_doc_unchanged(
                &existing.metadata_doc,
                &stripped,
                format!("dataset {}", dataset.id),
            )?;
        }

        if let Some(uri) = &dataset.local_uri {
            let outcome = self.store.ensure_dataset_location(dataset.id, uri).await?;
            if outcome == InsertOutcome::AlreadyExists {
                tracing::warn!(dataset = %dataset.id, uri = %uri, "location already registered");
                metrics::record_duplicate_insert("location");
            }
        }

        Ok(())
    }

    fn add_boxed<'a>(&'a self, dataset: &'a Dataset) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.add(dataset, false))
    }

    /// Fetches a dataset by id, without its provenance graph.
    ///
    /// # Errors
    ///
    /// Returns storage errors, or an unknown-product error if the store
    /// references a product this engine cannot resolve.
    pub async fn get(&self, id: DatasetId) -> Result<Option<Dataset>> {
        let Some(row) = self.store.get_dataset(id).await? else {
            return Ok(None);
        };
        Ok(Some(self.dataset_from_row(row).await?))
    }

    /// Fetches a dataset by id with its full provenance graph.
    ///
    /// One store query returns every transitively reachable row; the graph
    /// is rebuilt from an id → row table, resolving each row once all of
    /// its in-batch sources are resolved (non-recursive by construction,
    /// so deep chains cannot grow the stack). A source id missing from the
    /// batch is skipped, not an error. Rows the ready loop never reaches
    /// (possible only if the store returns a cyclic edge set) are
    /// materialized with whatever sources resolved rather than looping.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub async fn get_with_sources(&self, id: DatasetId) -> Result<Option<Dataset>> {
        let rows = self.store.get_dataset_sources(id).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut pending: HashMap<DatasetId, DatasetRow> =
            rows.into_iter().map(|row| (row.id, row)).collect();
        let mut resolved: HashMap<DatasetId, Dataset> = HashMap::with_capacity(pending.len());

        loop {
            let ready: Vec<DatasetId> = pending
                .values()
                .filter(|row| {
                    row.source_ids
                        .iter()
                        .all(|source| resolved.contains_key(source) || !pending.contains_key(source))
                })
                .map(|row| row.id)
                .collect();
            if ready.is_empty() {
                break;
            }
            for ready_id in ready {
                if let Some(row) = pending.remove(&ready_id) {
                    let dataset = self.materialize(row, &resolved).await?;
                    resolved.insert(ready_id, dataset);
                }
            }
        }

        if !pending.is_empty() {
            tracing::warn!(
                dataset = %id,
                unresolved = pending.len(),
                "source rows with cyclic ordering; materializing with partial sources"
            );
            let leftovers: Vec<DatasetRow> = pending.drain().map(|(_, row)| row).collect();
            for row in leftovers {
                let row_id = row.id;
                let dataset = self.materialize(row, &resolved).await?;
                resolved.insert(row_id, dataset);
            }
        }

        Ok(resolved.remove(&id))
    }

    /// Materializes one row, zipping classifiers against source ids and
    /// rewriting the document's lineage section from the resolved sources.
    async fn materialize(
        &self,
        row: DatasetRow,
        resolved: &HashMap<DatasetId, Dataset>,
    ) -> Result<Dataset> {
        let DatasetRow {
            id,
            product_id,
            metadata_doc,
            local_uri,
            source_ids,
            classifiers,
        } = row;

        let product = self.resolve_product(product_id).await?;

        let mut sources = BTreeMap::new();
        let mut lineage = Map::new();
        for (classifier, source_id) in classifiers.iter().zip(source_ids.iter()) {
            // Absent from the batch (truncated upstream): skipped, not an error.
            if let Some(source) = resolved.get(source_id) {
                lineage.insert(classifier.clone(), source.metadata_doc.clone());
                sources.insert(classifier.clone(), source.clone());
            }
        }

        let mut metadata_doc = metadata_doc;
        doc::set_offset(
            &mut metadata_doc,
            product.metadata_type().sources_offset(),
            Value::Object(lineage),
        );

        Ok(Dataset {
            id,
            product,
            metadata_doc,
            local_uri,
            sources,
        })
    }

    /// The datasets directly derived from `id`.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub async fn get_derived(&self, id: DatasetId) -> Result<Vec<Dataset>> {
        let rows = self.store.get_derived_datasets(id).await?;
        self.datasets_from_rows(rows).await
    }

    /// Every storage location registered for `id`.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the store.
    pub async fn get_locations(&self, id: DatasetId) -> Result<Vec<String>> {
        Ok(self.store.get_locations(id).await?)
    }

    /// Archives `old_datasets` and indexes `new_datasets` in one
    /// transaction scope. If indexing fails, the archivals are not
    /// persisted; no compensating logic exists beyond the transaction.
    ///
    /// # Errors
    ///
    /// As [`add`](Self::add), plus storage errors from archiving.
    pub async fn replace(&self, old_datasets: &[Dataset], new_datasets: &[Dataset]) -> Result<()> {
        let mut tx = self.store.begin().await?;
        for unit in old_datasets {
            tx.archive_dataset(unit.id).await?;
        }

        for unit in new_datasets {
            self.add(unit, false).await?;
            tracing::debug!(dataset = %unit.id, uri = ?unit.local_uri, "indexed replacement dataset");
        }

        tx.commit().await?;
        Ok(())
    }

    /// Every field name declared by the named product, or by all products.
    /// Natural set semantics: names shared across products appear once.
    ///
    /// # Errors
    ///
    /// `UnknownProduct` when a named product is not registered.
    pub async fn get_field_names(&self, product_name: Option<&str>) -> Result<Vec<String>> {
        let products = match product_name {
            Some(name) => {
                vec![self.products.get_by_name(name).await?.ok_or_else(|| {
                    CatalogError::UnknownProduct {
                        name: name.to_string(),
                    }
                })?]
            }
            None => self.products.get_all().await?,
        };

        let mut names = BTreeSet::new();
        for product in products {
            for name in product.fields().names() {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Searches with arbitrary metadata containment. Slow: this path does
    /// not use the per-field indexes.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub async fn search_by_metadata(&self, metadata: &Value) -> Result<Vec<Dataset>> {
        let rows = self.store.search_datasets_by_metadata(metadata).await?;
        self.datasets_from_rows(rows).await
    }

    /// Searches, returning datasets as a lazy stream: one store query per
    /// candidate product, issued as the stream is consumed.
    ///
    /// # Errors
    ///
    /// `UnknownProduct` / `NoMatchingProduct` before any search
    /// round-trip; expression compilation and storage errors as the
    /// stream is driven.
    pub async fn search(
        &self,
        query: Query,
    ) -> Result<impl Stream<Item = Result<Dataset>> + '_> {
        metrics::record_search("search");
        let products = self.candidate_products(&query).await?;
        let fields = Arc::new(query.fields);

        Ok(stream::iter(products)
            .then(move |product| {
                let fields = Arc::clone(&fields);
                async move { self.search_product(product, &fields).await }
            })
            .map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<Dataset, CatalogError>)))
            .try_flatten())
    }

    /// Searches and materializes the full result list.
    ///
    /// # Errors
    ///
    /// As [`search`](Self::search).
    pub async fn search_eager(&self, query: Query) -> Result<Vec<Dataset>> {
        let results = self.search(query).await?;
        results.try_collect().await
    }

    /// Searches, returning only each dataset's field projections, the
    /// lighter read path.
    ///
    /// # Errors
    ///
    /// As [`search`](Self::search).
    pub async fn search_summaries(
        &self,
        query: Query,
    ) -> Result<impl Stream<Item = Result<SummaryRow>> + '_> {
        metrics::record_search("search_summaries");
        let products = self.candidate_products(&query).await?;
        let fields = Arc::new(query.fields);

        Ok(stream::iter(products)
            .then(move |product| {
                let fields = Arc::clone(&fields);
                async move {
                    let expressions = self.compile(&product, &fields)?;
                    let select: Vec<SelectField> = product
                        .fields()
                        .iter()
                        .map(|(name, spec)| SelectField {
                            name: name.to_string(),
                            spec: spec.clone(),
                        })
                        .collect();
                    let rows = self
                        .store
                        .search_dataset_summaries(&expressions, &select)
                        .await?;
                    Ok::<_, CatalogError>(rows)
                }
            })
            .map_ok(|batch: Vec<SummaryRow>| {
                stream::iter(batch.into_iter().map(Ok::<SummaryRow, CatalogError>))
            })
            .try_flatten())
    }

    /// Counts matching datasets: one count per candidate product, summed.
    ///
    /// # Errors
    ///
    /// As [`search`](Self::search).
    pub async fn count(&self, query: &Query) -> Result<u64> {
        metrics::record_search("count");
        let products = self.candidate_products(query).await?;
        let mut total = 0;
        for product in products {
            let expressions = self.compile(&product, &query.fields)?;
            total += self.store.count_datasets(&expressions).await?;
        }
        Ok(total)
    }

    /// Resolves the products a query applies to: the pinned one, or every
    /// product whose registry declares all queried fields.
    async fn candidate_products(&self, query: &Query) -> Result<Vec<Arc<Product>>> {
        if let Some(name) = &query.product {
            let product = self.products.get_by_name(name).await?.ok_or_else(|| {
                CatalogError::UnknownProduct { name: name.clone() }
            })?;
            return Ok(vec![product]);
        }

        let names: Vec<&str> = query.fields.keys().map(String::as_str).collect();
        let products = self.products.get_with_fields(names.iter().copied()).await?;
        if products.is_empty() {
            return Err(CatalogError::NoMatchingProduct {
                field_names: query.fields.keys().cloned().collect(),
            });
        }
        Ok(products)
    }

    /// Compiles the query fields for one product, with the implicit
    /// product-id pin appended.
    fn compile(
        &self,
        product: &Arc<Product>,
        fields: &BTreeMap<String, QueryValue>,
    ) -> Result<Vec<Expression>> {
        let mut expressions = to_expressions(product.fields(), fields)?;
        expressions.push(Expression::product(product.id()));
        Ok(expressions)
    }

    async fn search_product(
        &self,
        product: Arc<Product>,
        fields: &BTreeMap<String, QueryValue>,
    ) -> Result<Vec<Dataset>> {
        let expressions = self.compile(&product, fields)?;
        let rows = self.store.search_datasets(&expressions, false).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                Dataset::new(row.id, Arc::clone(&product), row.metadata_doc, row.local_uri)
            })
            .collect())
    }

    async fn resolve_product(&self, id: strata_core::ProductId) -> Result<Arc<Product>> {
        self.products
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::UnknownProduct {
                name: id.to_string(),
            })
    }

    async fn dataset_from_row(&self, row: DatasetRow) -> Result<Dataset> {
        let product = self.resolve_product(row.product_id).await?;
        Ok(Dataset::new(row.id, product, row.metadata_doc, row.local_uri))
    }

    async fn datasets_from_rows(&self, rows: Vec<DatasetRow>) -> Result<Vec<Dataset>> {
        let mut datasets = Vec::with_capacity(rows.len());
        for row in rows {
            datasets.push(self.dataset_from_row(row).await?);
        }
        Ok(datasets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::metadata_types::MetadataTypeResource;
    use serde_json::json;

    fn harness() -> DatasetResource {
        let store: Arc<dyn CatalogStore> = Arc::new(MemoryStore::new());
        let metadata_types = Arc::new(MetadataTypeResource::new(Arc::clone(&store)));
        let products = Arc::new(ProductResource::new(Arc::clone(&store), metadata_types));
        DatasetResource::new(store, products)
    }

    async fn scene_product(resource: &DatasetResource) -> Arc<Product> {
        resource
            .products()
            .add_document(&json!({
                "name": "scenes",
                "metadata_type": {
                    "name": "eo",
                    "dataset": {
                        "search_fields": {
                            "platform": { "offset": ["platform", "code"] }
                        }
                    }
                }
            }))
            .await
            .expect("register product")
    }

    #[tokio::test]
    async fn search_without_matching_product_fails_early() {
        let resource = harness();
        scene_product(&resource).await;

        let query = Query::new().with_field("orbit", QueryValue::number(5.0));
        let err = resource.search(query).await.err().expect("no product");
        assert!(matches!(err, CatalogError::NoMatchingProduct { field_names } if field_names == vec!["orbit".to_string()]));
    }

    #[tokio::test]
    async fn search_with_unknown_product_name_fails() {
        let resource = harness();
        let query = Query::new().with_product("nope");
        let err = resource.search(query).await.err().expect("unknown product");
        assert!(matches!(err, CatalogError::UnknownProduct { name } if name == "nope"));
    }

    #[tokio::test]
    async fn unknown_field_on_pinned_product_fails_at_compile() {
        let resource = harness();
        scene_product(&resource).await;

        let query = Query::new()
            .with_product("scenes")
            .with_field("orbit", QueryValue::number(5.0));
        let stream = resource.search(query).await.expect("candidates resolve");
        futures::pin_mut!(stream);
        let first = stream.next().await.expect("one item").expect_err("compile fails");
        assert!(matches!(
            first,
            CatalogError::Field(crate::fields::FieldError::UnknownField { .. })
        ));
    }

    #[tokio::test]
    async fn get_missing_dataset_is_none() {
        let resource = harness();
        assert!(resource
            .get(DatasetId::generate())
            .await
            .expect("lookup succeeds")
            .is_none());
        assert!(resource
            .get_with_sources(DatasetId::generate())
            .await
            .expect("lookup succeeds")
            .is_none());
    }

    #[tokio::test]
    async fn cyclic_source_rows_terminate_with_partial_sources() {
        let resource = harness();
        let product = scene_product(&resource).await;

        // Hand-build a cyclic edge set the store contract forbids.
        let a = DatasetId::generate();
        let b = DatasetId::generate();
        let mut tx = resource.store.begin().await.expect("begin");
        tx.insert_dataset(&json!({}), a, product.id()).await.expect("insert");
        tx.insert_dataset(&json!({}), b, product.id()).await.expect("insert");
        tx.insert_dataset_source("loop", a, b).await.expect("edge");
        tx.insert_dataset_source("loop", b, a).await.expect("edge");
        tx.commit().await.expect("commit");

        let dataset = resource
            .get_with_sources(a)
            .await
            .expect("reconstruction terminates")
            .expect("root present");
        assert_eq!(dataset.id, a);
    }
}
