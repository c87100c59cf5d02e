//! Catalog data model: metadata types, products, and datasets.
//!
//! A **metadata type** is a named schema: a definition document whose
//! `dataset` section declares where a dataset's lineage lives and which
//! search fields can be extracted from its metadata. A **product** is a
//! named collection of datasets bound to exactly one metadata type, whose
//! field registry it inherits. A **dataset** is one indexed, identified
//! document with an optional storage location and classifier-labelled
//! source datasets (its provenance).
//!
//! All three are immutable once registered; "changing" a definition is an
//! explicit conflict, never an overwrite.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use strata_core::doc;
use strata_core::{DatasetId, MetadataTypeId, ProductId};

use crate::error::{CatalogError, Result};
use crate::fields::{DocOffset, FieldRegistry};

/// Default document offset of the lineage section.
const DEFAULT_SOURCES_OFFSET: [&str; 2] = ["lineage", "source_datasets"];

/// A named schema: document shape plus search-field extraction rules.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataType {
    id: MetadataTypeId,
    name: String,
    definition: Value,
    sources_offset: DocOffset,
    fields: FieldRegistry,
}

impl MetadataType {
    /// Builds a metadata type from a stored definition.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the definition is malformed.
    pub fn from_definition(id: MetadataTypeId, definition: Value) -> Result<Self> {
        let (name, sources_offset, fields) = parse_metadata_type(&definition)?;
        Ok(Self {
            id,
            name,
            definition,
            sources_offset,
            fields,
        })
    }

    /// Validates a definition document without building the type.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(definition: &Value) -> Result<()> {
        parse_metadata_type(definition).map(|_| ())
    }

    /// Store-assigned identifier.
    #[must_use]
    pub fn id(&self) -> MetadataTypeId {
        self.id
    }

    /// Unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The definition document as registered.
    #[must_use]
    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// The search fields extractable from this type's datasets.
    #[must_use]
    pub fn dataset_fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Document offset of the lineage section in this type's datasets.
    #[must_use]
    pub fn sources_offset(&self) -> &[String] {
        &self.sources_offset
    }
}

fn parse_metadata_type(definition: &Value) -> Result<(String, DocOffset, FieldRegistry)> {
    let obj = definition
        .as_object()
        .ok_or_else(|| CatalogError::validation("metadata type definition must be an object"))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CatalogError::validation("metadata type definition needs a non-empty name"))?
        .to_string();

    let dataset = obj
        .get("dataset")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            CatalogError::validation(format!("metadata type {name} needs a dataset section"))
        })?;

    let sources_offset = match dataset.get("sources") {
        None => DEFAULT_SOURCES_OFFSET.map(String::from).to_vec(),
        Some(value) => value
            .as_array()
            .and_then(|keys| {
                keys.iter()
                    .map(|k| k.as_str().map(ToString::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| {
                CatalogError::validation(format!(
                    "metadata type {name} has a malformed sources offset"
                ))
            })?,
    };

    let fields = match dataset.get("search_fields") {
        None => FieldRegistry::from_search_fields(&Map::new())?,
        Some(value) => {
            let search_fields = value.as_object().ok_or_else(|| {
                CatalogError::validation(format!(
                    "metadata type {name} search_fields must be an object"
                ))
            })?;
            FieldRegistry::from_search_fields(search_fields)?
        }
    };

    Ok((name, sources_offset, fields))
}

/// A registered product: a named dataset collection bound to one metadata type.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    id: ProductId,
    name: String,
    definition: Value,
    metadata: Value,
    metadata_type: Arc<MetadataType>,
}

impl Product {
    /// Builds a product from a stored definition and its resolved type.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the definition is malformed.
    pub fn from_definition(
        id: ProductId,
        definition: Value,
        metadata_type: Arc<MetadataType>,
    ) -> Result<Self> {
        let name = validate_product(&definition)?;
        let metadata = definition
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(Self {
            id,
            name,
            definition,
            metadata,
            metadata_type,
        })
    }

    /// Store-assigned identifier.
    #[must_use]
    pub fn id(&self) -> ProductId {
        self.id
    }

    /// Unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The definition document as registered.
    #[must_use]
    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// The metadata match template (`definition.metadata`).
    #[must_use]
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// The owning metadata type.
    #[must_use]
    pub fn metadata_type(&self) -> &Arc<MetadataType> {
        &self.metadata_type
    }

    /// The searchable field registry, inherited from the metadata type.
    #[must_use]
    pub fn fields(&self) -> &FieldRegistry {
        self.metadata_type.dataset_fields()
    }
}

/// A validated product definition that is not persisted yet.
///
/// Produced by `ProductResource::from_doc`; gains an id (and becomes a
/// [`Product`]) when added.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    name: String,
    definition: Value,
    metadata_type: Arc<MetadataType>,
}

impl ProductDraft {
    /// Builds a draft from a validated definition and its resolved type.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the definition is malformed.
    pub fn new(definition: Value, metadata_type: Arc<MetadataType>) -> Result<Self> {
        let name = validate_product(&definition)?;
        Ok(Self {
            name,
            definition,
            metadata_type,
        })
    }

    /// The product name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The definition document.
    #[must_use]
    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// The metadata match template (`definition.metadata`), if declared.
    #[must_use]
    pub fn metadata(&self) -> Value {
        self.definition
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// The resolved metadata type.
    #[must_use]
    pub fn metadata_type(&self) -> &Arc<MetadataType> {
        &self.metadata_type
    }
}

fn validate_product(definition: &Value) -> Result<String> {
    let obj = definition
        .as_object()
        .ok_or_else(|| CatalogError::validation("product definition must be an object"))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CatalogError::validation("product definition needs a non-empty name"))?;

    match obj.get("metadata_type") {
        Some(Value::String(_) | Value::Object(_)) => {}
        _ => {
            return Err(CatalogError::validation(format!(
                "product {name} needs a metadata_type name or embedded definition"
            )))
        }
    }

    if let Some(metadata) = obj.get("metadata") {
        if !metadata.is_object() {
            return Err(CatalogError::validation(format!(
                "product {name} metadata template must be an object"
            )));
        }
    }

    Ok(name.to_string())
}

/// One indexed dataset: an identified document with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Globally unique identifier, minted by the producer.
    pub id: DatasetId,
    /// The product this dataset belongs to.
    pub product: Arc<Product>,
    /// The metadata document, lineage section included.
    pub metadata_doc: Value,
    /// Storage location URI, if the data has one.
    pub local_uri: Option<String>,
    /// Source datasets by classifier label. Keys match the classifiers in
    /// the document's lineage section; the producer keeps the graph acyclic.
    pub sources: BTreeMap<String, Dataset>,
}

impl Dataset {
    /// Creates a dataset with no sources.
    #[must_use]
    pub fn new(
        id: DatasetId,
        product: Arc<Product>,
        metadata_doc: Value,
        local_uri: Option<String>,
    ) -> Self {
        Self {
            id,
            product,
            metadata_doc,
            local_uri,
            sources: BTreeMap::new(),
        }
    }

    /// Sets the source mapping.
    #[must_use]
    pub fn with_sources(mut self, sources: BTreeMap<String, Dataset>) -> Self {
        self.sources = sources;
        self
    }

    /// The embedded lineage section, if the document carries one.
    #[must_use]
    pub fn sources_doc(&self) -> Option<&Value> {
        doc::get_offset(
            &self.metadata_doc,
            self.product.metadata_type().sources_offset(),
        )
    }
}

/// Returns a copy of `metadata_doc` with the lineage section emptied.
///
/// The stored document's lineage is reconstructed on read from the source
/// edges, never trusted from the writer's copy; stripping before insert
/// keeps the edge table and the embedded copy from diverging.
#[must_use]
pub(crate) fn doc_without_sources(metadata_type: &MetadataType, metadata_doc: &Value) -> Value {
    let mut stripped = metadata_doc.clone();
    doc::set_offset(
        &mut stripped,
        metadata_type.sources_offset(),
        Value::Object(Map::new()),
    );
    stripped
}
