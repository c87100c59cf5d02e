//! # strata-catalog
//!
//! Catalog engine for immutable, versioned datasets organized under typed
//! schemas (metadata types) and typed collections (products).
//!
//! This crate implements:
//!
//! - **Typed schemas**: metadata types declare how to extract named search
//!   fields from dataset documents
//! - **Products**: named dataset collections, each bound to one metadata
//!   type whose field registry it inherits
//! - **Indexed datasets**: idempotent, duplicate-race-tolerant insertion
//!   with source-graph fan-out
//! - **Lineage**: reconstruction of a dataset's full provenance graph from
//!   one flat batch of rows
//! - **Search**: keyword/range queries compiled into per-product field
//!   expressions and evaluated by the backing store
//!
//! ## Architecture
//!
//! Three layered resources sit on a narrow relational-store trait:
//!
//! ```text
//! DatasetResource ── search, lineage, insertion
//!       │
//! ProductResource ── collections, field registries
//!       │
//! MetadataTypeResource ── schemas, field extraction rules
//!       │
//! dyn CatalogStore ── rows, uniqueness constraints, transactions
//! ```
//!
//! Metadata-type and product reads go through bounded TTL+LRU caches;
//! writes do not invalidate, so readers may see up to one TTL window of
//! staleness. Concurrency correctness for writes is delegated to the
//! store's uniqueness constraints: a lost duplicate-insert race is a
//! logged no-op followed by a consistency check, never an error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_catalog::{Catalog, Query, QueryValue};
//!
//! let catalog = Catalog::new(store);
//! catalog.products().add_document(&product_definition).await?;
//! catalog.datasets().add(&dataset, false).await?;
//!
//! let query = Query::new()
//!     .with_product("ls8_scenes")
//!     .with_field("time", QueryValue::time_range(t0, t1));
//! let found = catalog.datasets().search_eager(query).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod datasets;
pub mod error;
pub mod fields;
pub mod memory;
pub mod metadata_types;
pub mod metrics;
pub mod model;
pub mod products;
pub mod store;

use std::sync::Arc;

pub use config::{CachePolicy, CatalogConfig};
pub use datasets::{DatasetResource, Query};
pub use error::{CatalogError, Result};
pub use fields::{Expression, FieldRegistry, FieldSpec, QueryValue, Range};
pub use metadata_types::MetadataTypeResource;
pub use model::{Dataset, MetadataType, Product, ProductDraft};
pub use products::ProductResource;
pub use store::{CatalogStore, CatalogTransaction, DatasetRow, InsertOutcome};

/// The three catalog resources over one backing store.
pub struct Catalog {
    metadata_types: Arc<MetadataTypeResource>,
    products: Arc<ProductResource>,
    datasets: DatasetResource,
}

impl Catalog {
    /// Creates a catalog with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_config(store, CatalogConfig::default())
    }

    /// Creates a catalog with explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn CatalogStore>, config: CatalogConfig) -> Self {
        let metadata_types = Arc::new(MetadataTypeResource::with_policy(
            Arc::clone(&store),
            config.metadata_type_cache,
        ));
        let products = Arc::new(ProductResource::with_policy(
            Arc::clone(&store),
            Arc::clone(&metadata_types),
            config.product_cache,
        ));
        let datasets = DatasetResource::new(store, Arc::clone(&products));
        Self {
            metadata_types,
            products,
            datasets,
        }
    }

    /// The metadata type resource.
    #[must_use]
    pub fn metadata_types(&self) -> &Arc<MetadataTypeResource> {
        &self.metadata_types
    }

    /// The product resource.
    #[must_use]
    pub fn products(&self) -> &Arc<ProductResource> {
        &self.products
    }

    /// The dataset resource.
    #[must_use]
    pub fn datasets(&self) -> &DatasetResource {
        &self.datasets
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::datasets::{DatasetResource, Query};
    pub use crate::error::{CatalogError, Result};
    pub use crate::fields::{QueryValue, Range};
    pub use crate::metadata_types::MetadataTypeResource;
    pub use crate::model::{Dataset, MetadataType, Product};
    pub use crate::products::ProductResource;
    pub use crate::store::{CatalogStore, InsertOutcome};
    pub use crate::Catalog;
}
