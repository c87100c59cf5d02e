//! Error types for catalog operations.
//!
//! The taxonomy follows the engine's propagation policy: validation and
//! unknown-reference errors abort the single operation immediately;
//! conflicts (same name or id, different content) require explicit human
//! resolution and carry the field-level differences; benign duplicate
//! inserts are *not* errors at all: they surface as
//! [`InsertOutcome::AlreadyExists`](crate::store::InsertOutcome) and are
//! logged where "already present" is acceptable. Nothing here retries.

use strata_core::doc::DocMismatch;

use crate::fields::FieldError;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A definition or document is structurally malformed.
    #[error("invalid document: {message}")]
    Validation {
        /// Description of what made the document invalid.
        message: String,
    },

    /// A record with the same name or id exists with different content.
    #[error(transparent)]
    Conflict(#[from] DocMismatch),

    /// A metadata type was referenced by a name that is not registered.
    #[error("unknown metadata type: {name}")]
    UnknownMetadataType {
        /// The name that failed to resolve.
        name: String,
    },

    /// A product was referenced by a name that is not registered.
    #[error("unknown product: {name}")]
    UnknownProduct {
        /// The name that failed to resolve.
        name: String,
    },

    /// No registered product declares all of a query's search fields.
    #[error("no product has all of the search fields: {}", field_names.join(", "))]
    NoMatchingProduct {
        /// The field names the query asked for.
        field_names: Vec<String>,
    },

    /// A query field failed to compile against a product's field registry.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] strata_core::Error),
}

impl CatalogError {
    /// Creates a validation error with the given message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
