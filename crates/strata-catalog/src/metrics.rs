//! Catalog operation metrics.
//!
//! Counters for the indexing and search paths, complementing the
//! structured logging already in place.

use metrics::{counter, describe_counter};

/// Datasets indexed counter.
pub const DATASETS_INDEXED: &str = "strata_datasets_indexed_total";

/// Benign duplicate inserts tolerated counter.
pub const DUPLICATE_INSERTS: &str = "strata_duplicate_inserts_total";

/// Search/count operations counter.
pub const SEARCHES: &str = "strata_searches_total";

/// Registers all catalog metric descriptions.
///
/// Call this once at application startup after initializing the metrics
/// recorder.
pub fn register_metrics() {
    describe_counter!(DATASETS_INDEXED, "Total datasets newly indexed");
    describe_counter!(
        DUPLICATE_INSERTS,
        "Total duplicate inserts tolerated as no-ops"
    );
    describe_counter!(SEARCHES, "Total search and count operations");
}

/// Records a newly indexed dataset.
pub fn record_dataset_indexed() {
    counter!(DATASETS_INDEXED).increment(1);
}

/// Records a duplicate insert that was treated as a no-op.
///
/// `kind` is one of `dataset`, `source`, `location`.
pub fn record_duplicate_insert(kind: &'static str) {
    counter!(DUPLICATE_INSERTS, "kind" => kind).increment(1);
}

/// Records a search-path operation.
///
/// `op` is one of `search`, `search_summaries`, `count`.
pub fn record_search(op: &'static str) {
    counter!(SEARCHES, "op" => op).increment(1);
}
