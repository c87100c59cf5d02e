//! Backing-store abstraction for the catalog.
//!
//! The engine consumes a relational catalog store through this narrow
//! interface; schema, indexes, and transaction machinery belong to the
//! implementation. All uniqueness is enforced by the store: a guarded
//! insert never errors on "already there"; it reports
//! [`InsertOutcome::AlreadyExists`], which is a normal result, not a
//! failure. The store's atomic constraint check is the sole arbiter of
//! first-writer-wins under concurrent callers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use strata_core::error::Result;
use strata_core::{DatasetId, MetadataTypeId, ProductId};

use crate::fields::{Expression, FieldSpec};

/// Result of an insert guarded by a uniqueness constraint.
///
/// "Already exists" is the expected outcome of a lost duplicate-insert
/// race and is modelled as a result rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with that key was already present; nothing was written.
    AlreadyExists,
}

impl InsertOutcome {
    /// Whether the insert actually added a row.
    #[must_use]
    pub const fn was_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// A stored metadata type.
#[derive(Debug, Clone)]
pub struct MetadataTypeRow {
    /// Store-assigned identifier.
    pub id: MetadataTypeId,
    /// Unique name.
    pub name: String,
    /// The definition document as registered.
    pub definition: Value,
}

/// A stored product (dataset type).
#[derive(Debug, Clone)]
pub struct ProductRow {
    /// Store-assigned identifier.
    pub id: ProductId,
    /// Unique name.
    pub name: String,
    /// The owning metadata type.
    pub metadata_type_id: MetadataTypeId,
    /// The definition document as registered.
    pub definition: Value,
}

/// A stored dataset, optionally with its direct source edges.
///
/// `source_ids` and `classifiers` are parallel arrays: the i-th source id
/// pairs with the i-th classifier label. They are populated only by
/// source-aware queries ([`CatalogStore::get_dataset_sources`] or
/// `with_source_ids` searches) and are empty otherwise.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    /// Dataset identifier.
    pub id: DatasetId,
    /// The owning product.
    pub product_id: ProductId,
    /// The stored metadata document (lineage section empty).
    pub metadata_doc: Value,
    /// Primary storage location, if registered.
    pub local_uri: Option<String>,
    /// Direct source dataset ids, parallel to `classifiers`.
    pub source_ids: Vec<DatasetId>,
    /// Classifier labels, parallel to `source_ids`.
    pub classifiers: Vec<String>,
}

/// One projected summary row: field name → projected value.
pub type SummaryRow = BTreeMap<String, Value>;

/// A field selected for summary projection.
#[derive(Debug, Clone)]
pub struct SelectField {
    /// The field name, used as the summary key.
    pub name: String,
    /// The extraction rule.
    pub spec: FieldSpec,
}

/// The relational catalog store the engine runs against.
///
/// Every method is a potentially blocking I/O boundary; the engine issues
/// no timeouts or retries of its own.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// Fetches a metadata type by id.
    async fn get_metadata_type(&self, id: MetadataTypeId) -> Result<Option<MetadataTypeRow>>;

    /// Fetches a metadata type by name.
    async fn get_metadata_type_by_name(&self, name: &str) -> Result<Option<MetadataTypeRow>>;

    /// Registers a metadata type and materializes its per-field search
    /// support. `concurrently` requests a non-exclusive index build that
    /// does not block concurrent readers/writers, at the cost of being
    /// slower and non-transactional.
    async fn add_metadata_type(
        &self,
        name: &str,
        definition: &Value,
        concurrently: bool,
    ) -> Result<MetadataTypeId>;

    /// (Re)materializes derived per-field indexing structures for all
    /// registered types. `rebuild_all` forces recomputation even where
    /// structures already exist. Idempotent.
    async fn check_dynamic_fields(&self, concurrently: bool, rebuild_all: bool) -> Result<()>;

    /// Fetches a product by id.
    async fn get_dataset_type(&self, id: ProductId) -> Result<Option<ProductRow>>;

    /// Fetches a product by name.
    async fn get_dataset_type_by_name(&self, name: &str) -> Result<Option<ProductRow>>;

    /// Registers a product.
    async fn add_dataset_type(
        &self,
        name: &str,
        metadata: &Value,
        metadata_type_id: MetadataTypeId,
        definition: &Value,
    ) -> Result<ProductId>;

    /// Enumerates all registered products.
    async fn get_all_dataset_types(&self) -> Result<Vec<ProductRow>>;

    /// Fetches a single dataset row, without source edges.
    async fn get_dataset(&self, id: DatasetId) -> Result<Option<DatasetRow>>;

    /// Fetches, in one query, every row transitively reachable from `id`
    /// via source edges, `id`'s row included, each with its parallel
    /// source-id/classifier arrays populated. Empty if `id` is unknown.
    async fn get_dataset_sources(&self, id: DatasetId) -> Result<Vec<DatasetRow>>;

    /// Fetches the datasets directly derived from `id`.
    async fn get_derived_datasets(&self, id: DatasetId) -> Result<Vec<DatasetRow>>;

    /// Whether a dataset with this id is indexed (archived included).
    async fn contains_dataset(&self, id: DatasetId) -> Result<bool>;

    /// Registers a storage location for a dataset.
    async fn ensure_dataset_location(&self, id: DatasetId, uri: &str) -> Result<InsertOutcome>;

    /// All registered locations of a dataset.
    async fn get_locations(&self, id: DatasetId) -> Result<Vec<String>>;

    /// Evaluates the expressions and returns matching active datasets.
    /// `with_source_ids` additionally populates the source arrays.
    async fn search_datasets(
        &self,
        expressions: &[Expression],
        with_source_ids: bool,
    ) -> Result<Vec<DatasetRow>>;

    /// Evaluates the expressions and returns only the selected field
    /// projections, the lighter read path.
    async fn search_dataset_summaries(
        &self,
        expressions: &[Expression],
        select: &[SelectField],
    ) -> Result<Vec<SummaryRow>>;

    /// Evaluates the expressions and returns the number of matching
    /// active datasets.
    async fn count_datasets(&self, expressions: &[Expression]) -> Result<u64>;

    /// Containment search over raw metadata documents. Slow: this path
    /// does not use the per-field indexes.
    async fn search_datasets_by_metadata(&self, metadata: &Value) -> Result<Vec<DatasetRow>>;

    /// Opens a transaction scope.
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>>;
}

/// A transaction scope over the catalog store.
///
/// Dropping an uncommitted transaction rolls back every write made
/// through it; [`commit`](Self::commit) makes them durable.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Inserts a dataset row keyed by id.
    async fn insert_dataset(
        &mut self,
        metadata_doc: &Value,
        id: DatasetId,
        product: ProductId,
    ) -> Result<InsertOutcome>;

    /// Inserts one classifier-labelled source edge.
    async fn insert_dataset_source(
        &mut self,
        classifier: &str,
        dataset: DatasetId,
        source: DatasetId,
    ) -> Result<InsertOutcome>;

    /// Marks a dataset archived (soft delete). Archived datasets are
    /// excluded from active search but remain fetchable by id.
    async fn archive_dataset(&mut self, id: DatasetId) -> Result<()>;

    /// Commits every write made through this transaction.
    async fn commit(self: Box<Self>) -> Result<()>;
}
