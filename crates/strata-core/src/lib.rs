//! # strata-core
//!
//! Shared foundation for the strata dataset catalog:
//!
//! - **Errors**: infrastructure-level error types and `Result` alias
//! - **Identifiers**: strongly-typed dataset/metadata-type/product ids
//! - **Documents**: offset access and structural comparison of JSON
//!   definition/metadata documents
//! - **Caching**: the bounded TTL+LRU cache backing read-through lookups
//! - **Observability**: logging initialization and span helpers

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod doc;
pub mod error;
pub mod id;
pub mod observability;

pub use cache::TtlCache;
pub use error::{Error, Result};
pub use id::{DatasetId, MetadataTypeId, ProductId};
