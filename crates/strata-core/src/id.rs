//! Strongly-typed identifiers for catalog entities.
//!
//! Dataset ids are caller-supplied UUIDs (the producer mints one per
//! physical/logical unit of data); metadata-type and product ids are
//! assigned by the backing store on registration. Distinct newtypes keep
//! the three spaces from being mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Globally unique identifier of an indexed dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(Uuid);

impl DatasetId {
    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Mints a fresh random id. Mostly useful in tests and tools;
    /// production datasets arrive with their id already assigned.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s).map(Self).map_err(|e| Error::InvalidId {
            message: format!("invalid dataset id '{s}': {e}"),
        })
    }
}

/// Store-assigned identifier of a metadata type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTypeId(pub u32);

impl fmt::Display for MetadataTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a product (dataset type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u32);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_id_roundtrip() {
        let id = DatasetId::generate();
        let s = id.to_string();
        let parsed: DatasetId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn dataset_ids_are_unique() {
        assert_ne!(DatasetId::generate(), DatasetId::generate());
    }

    #[test]
    fn invalid_dataset_id_returns_error() {
        let result: Result<DatasetId> = "not-a-uuid".parse();
        assert!(matches!(result, Err(Error::InvalidId { .. })));
    }

    #[test]
    fn numeric_ids_serialize_transparently() {
        let id = ProductId(42);
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "42");
        let back: ProductId = serde_json::from_str("42").expect("deserialize");
        assert_eq!(back, id);
    }
}
