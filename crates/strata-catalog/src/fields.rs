//! Search fields, registries, and the expression compiler.
//!
//! Each metadata type declares how to extract named search fields from a
//! dataset document (`definition.dataset.search_fields`). A field is a
//! tagged variant per comparison kind (scalar equality/membership or
//! two-bound ranges) and knows how to compile a query value into a
//! predicate and how to evaluate or project itself against a stored
//! document. Registries are built once per metadata type and shared by
//! reference; compiled expressions are stateless and never persisted.
//!
//! A declared field definition looks like:
//!
//! ```json
//! {
//!     "platform": { "offset": ["platform", "code"] },
//!     "lat": {
//!         "type": "double-range",
//!         "min_offset": [["extent", "coord", "ll", "lat"]],
//!         "max_offset": [["extent", "coord", "ur", "lat"]]
//!     },
//!     "time": {
//!         "type": "datetime-range",
//!         "min_offset": [["extent", "from_dt"]],
//!         "max_offset": [["extent", "to_dt"]]
//!     }
//! }
//! ```
//!
//! `min_offset`/`max_offset` accept one offset or a list of candidate
//! offsets; the extracted bound is the minimum/maximum over the values
//! found. A missing `type` means `string`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use strata_core::doc;
use strata_core::{DatasetId, ProductId};

/// A path of object keys into a dataset document.
pub type DocOffset = Vec<String>;

/// Field names always present in a registry, backed by row columns rather
/// than document offsets.
pub const NATIVE_ID: &str = "id";
/// See [`NATIVE_ID`].
pub const NATIVE_PRODUCT: &str = "dataset_type_id";

/// Errors raised while building registries or compiling query values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The query referenced a field the registry does not declare.
    #[error("unknown search field: {name}")]
    UnknownField {
        /// The field name that failed to resolve.
        name: String,
    },

    /// The query value's shape does not fit the field's comparison kind.
    #[error("field {field} cannot be queried with {given} (expected {expected})")]
    InvalidValue {
        /// The field being queried.
        field: String,
        /// What the query supplied.
        given: &'static str,
        /// What the field accepts.
        expected: &'static str,
    },

    /// A search-field definition is structurally malformed.
    #[error("search field {field} has an invalid definition: {message}")]
    BadDefinition {
        /// The field whose definition is malformed.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

/// An inclusive `[low, high]` pair used as a query value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    /// Inclusive lower bound.
    pub low: T,
    /// Inclusive upper bound.
    pub high: T,
}

impl<T: PartialOrd> Range<T> {
    /// Creates a range; bounds are kept as given.
    #[must_use]
    pub fn new(low: T, high: T) -> Self {
        Self { low, high }
    }

    /// Whether `value` lies within the bounds, inclusive.
    pub fn contains(&self, value: &T) -> bool {
        self.low <= *value && *value <= self.high
    }

    /// Whether two inclusive ranges intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

/// Scalar storage kind of a single-offset search field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// Free-form text, compared by equality.
    String,
    /// Floating-point number.
    Double,
    /// Integral number.
    Integer,
    /// A point in time, stored as an ISO-8601-ish string.
    Datetime,
}

impl ScalarKind {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Double => "double",
            Self::Integer => "integer",
            Self::Datetime => "datetime",
        }
    }
}

/// Extraction and comparison rule for one named search field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// The dataset id column.
    NativeId,
    /// The owning product id column.
    NativeProduct,
    /// A single-offset scalar value.
    Scalar {
        /// Storage kind of the value at the offset.
        kind: ScalarKind,
        /// Where the value lives in the document.
        offset: DocOffset,
    },
    /// A numeric extent with separate lower/upper bound offsets.
    DoubleRange {
        /// Candidate offsets for the lower bound (minimum wins).
        min_offsets: Vec<DocOffset>,
        /// Candidate offsets for the upper bound (maximum wins).
        max_offsets: Vec<DocOffset>,
    },
    /// A temporal extent with separate lower/upper bound offsets.
    DatetimeRange {
        /// Candidate offsets for the lower bound (minimum wins).
        min_offsets: Vec<DocOffset>,
        /// Candidate offsets for the upper bound (maximum wins).
        max_offsets: Vec<DocOffset>,
    },
}

/// A query value for one named field.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Exact-match scalar (string, number, bool).
    Scalar(Value),
    /// Exact point in time.
    Time(DateTime<Utc>),
    /// Set membership over scalars.
    OneOf(Vec<Value>),
    /// Inclusive numeric range.
    DoubleRange(Range<f64>),
    /// Inclusive temporal range.
    TimeRange(Range<DateTime<Utc>>),
}

impl QueryValue {
    /// Text equality.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(Value::String(value.into()))
    }

    /// Numeric equality.
    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::Scalar(serde_json::json!(value))
    }

    /// Point-in-time equality.
    #[must_use]
    pub fn time(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }

    /// Inclusive numeric range.
    #[must_use]
    pub fn double_range(low: f64, high: f64) -> Self {
        Self::DoubleRange(Range::new(low, high))
    }

    /// Inclusive temporal range.
    #[must_use]
    pub fn time_range(low: DateTime<Utc>, high: DateTime<Utc>) -> Self {
        Self::TimeRange(Range::new(low, high))
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "a scalar",
            Self::Time(_) => "a timestamp",
            Self::OneOf(_) => "a value set",
            Self::DoubleRange(_) => "a numeric range",
            Self::TimeRange(_) => "a time range",
        }
    }
}

/// A compiled comparison over one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// Scalar equality.
    Eq(Value),
    /// Point-in-time equality (containment for range fields).
    TimeEq(DateTime<Utc>),
    /// Set membership.
    OneOf(Vec<Value>),
    /// Inclusive numeric between/overlap.
    DoubleBetween(Range<f64>),
    /// Inclusive temporal between/overlap.
    TimeBetween(Range<DateTime<Utc>>),
    /// Dataset id equality.
    IdEq(DatasetId),
    /// Owning product equality.
    ProductEq(ProductId),
}

/// A compiled predicate: field, extraction rule, and comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// The queried field name.
    pub name: String,
    /// The field's extraction rule.
    pub spec: FieldSpec,
    /// The comparison to apply.
    pub cmp: Comparison,
}

impl Expression {
    /// The implicit predicate pinning a search to one product.
    #[must_use]
    pub fn product(id: ProductId) -> Self {
        Self {
            name: NATIVE_PRODUCT.to_string(),
            spec: FieldSpec::NativeProduct,
            cmp: Comparison::ProductEq(id),
        }
    }

    /// A dataset-id equality predicate.
    #[must_use]
    pub fn id(id: DatasetId) -> Self {
        Self {
            name: NATIVE_ID.to_string(),
            spec: FieldSpec::NativeId,
            cmp: Comparison::IdEq(id),
        }
    }

    /// Evaluates the predicate against one stored row.
    #[must_use]
    pub fn matches(&self, id: DatasetId, product: ProductId, doc: &Value) -> bool {
        match &self.spec {
            FieldSpec::NativeId => match &self.cmp {
                Comparison::IdEq(want) => id == *want,
                Comparison::Eq(want) => want.as_str() == Some(id.to_string().as_str()),
                _ => false,
            },
            FieldSpec::NativeProduct => match &self.cmp {
                Comparison::ProductEq(want) => product == *want,
                Comparison::Eq(want) => want.as_u64() == Some(u64::from(product.0)),
                _ => false,
            },
            FieldSpec::Scalar { offset, .. } => {
                let Some(value) = doc::get_offset(doc, offset) else {
                    return false;
                };
                match &self.cmp {
                    Comparison::Eq(want) => json_eq(value, want),
                    Comparison::OneOf(set) => set.iter().any(|want| json_eq(value, want)),
                    Comparison::TimeEq(want) => parse_datetime(value) == Some(*want),
                    Comparison::DoubleBetween(range) => {
                        value.as_f64().is_some_and(|v| range.contains(&v))
                    }
                    Comparison::TimeBetween(range) => {
                        parse_datetime(value).is_some_and(|t| range.contains(&t))
                    }
                    _ => false,
                }
            }
            FieldSpec::DoubleRange {
                min_offsets,
                max_offsets,
            } => {
                let Some(extent) = double_bounds(doc, min_offsets, max_offsets) else {
                    return false;
                };
                match &self.cmp {
                    Comparison::DoubleBetween(range) => range.overlaps(&extent),
                    Comparison::Eq(want) => want.as_f64().is_some_and(|v| extent.contains(&v)),
                    Comparison::OneOf(set) => set
                        .iter()
                        .any(|want| want.as_f64().is_some_and(|v| extent.contains(&v))),
                    _ => false,
                }
            }
            FieldSpec::DatetimeRange {
                min_offsets,
                max_offsets,
            } => {
                let Some(extent) = time_bounds(doc, min_offsets, max_offsets) else {
                    return false;
                };
                match &self.cmp {
                    Comparison::TimeBetween(range) => range.overlaps(&extent),
                    Comparison::TimeEq(want) => extent.contains(want),
                    _ => false,
                }
            }
        }
    }
}

impl FieldSpec {
    /// Compiles a query value against this field into a comparison.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::InvalidValue`] when the value's shape does not
    /// fit the field's comparison kind.
    pub fn compile(&self, field: &str, value: &QueryValue) -> Result<Comparison, FieldError> {
        let mismatch = |expected: &'static str| FieldError::InvalidValue {
            field: field.to_string(),
            given: value.kind_name(),
            expected,
        };

        match self {
            Self::NativeId => match value {
                QueryValue::Scalar(Value::String(s)) => s
                    .parse()
                    .map(Comparison::IdEq)
                    .map_err(|_| mismatch("a dataset id")),
                _ => Err(mismatch("a dataset id")),
            },
            Self::NativeProduct => match value {
                QueryValue::Scalar(v) => v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(|n| Comparison::ProductEq(ProductId(n)))
                    .ok_or_else(|| mismatch("a product id")),
                _ => Err(mismatch("a product id")),
            },
            Self::Scalar { kind, .. } => match (kind, value) {
                (ScalarKind::Datetime, QueryValue::Time(t)) => Ok(Comparison::TimeEq(*t)),
                (ScalarKind::Datetime, QueryValue::TimeRange(r)) => Ok(Comparison::TimeBetween(*r)),
                (ScalarKind::Double | ScalarKind::Integer, QueryValue::DoubleRange(r)) => {
                    Ok(Comparison::DoubleBetween(*r))
                }
                (_, QueryValue::Scalar(v)) => Ok(Comparison::Eq(v.clone())),
                (_, QueryValue::OneOf(set)) => Ok(Comparison::OneOf(set.clone())),
                _ => Err(mismatch(kind.name())),
            },
            Self::DoubleRange { .. } => match value {
                QueryValue::DoubleRange(r) => Ok(Comparison::DoubleBetween(*r)),
                QueryValue::Scalar(v) if v.is_number() => Ok(Comparison::Eq(v.clone())),
                _ => Err(mismatch("a number or numeric range")),
            },
            Self::DatetimeRange { .. } => match value {
                QueryValue::TimeRange(r) => Ok(Comparison::TimeBetween(*r)),
                QueryValue::Time(t) => Ok(Comparison::TimeEq(*t)),
                _ => Err(mismatch("a timestamp or time range")),
            },
        }
    }

    /// Projects this field's value out of one stored row, for summaries.
    ///
    /// Scalars project their raw value; range fields project a
    /// `[min, max]` array; missing values project as `null`.
    #[must_use]
    pub fn project(&self, id: DatasetId, product: ProductId, doc: &Value) -> Value {
        match self {
            Self::NativeId => Value::String(id.to_string()),
            Self::NativeProduct => Value::from(product.0),
            Self::Scalar { offset, .. } => doc::get_offset(doc, offset).cloned().unwrap_or(Value::Null),
            Self::DoubleRange {
                min_offsets,
                max_offsets,
            } => double_bounds(doc, min_offsets, max_offsets).map_or(Value::Null, |extent| {
                serde_json::json!([extent.low, extent.high])
            }),
            Self::DatetimeRange {
                min_offsets,
                max_offsets,
            } => time_bounds(doc, min_offsets, max_offsets).map_or(Value::Null, |extent| {
                serde_json::json!([extent.low.to_rfc3339(), extent.high.to_rfc3339()])
            }),
        }
    }
}

/// The search fields a metadata type declares, by name.
///
/// Always contains the native `id` and `dataset_type_id` fields in
/// addition to the declared ones.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegistry {
    fields: BTreeMap<String, FieldSpec>,
}

impl FieldRegistry {
    /// Builds a registry from a `search_fields` definition object.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::BadDefinition`] for malformed field
    /// definitions or declarations that shadow a native field.
    pub fn from_search_fields(search_fields: &Map<String, Value>) -> Result<Self, FieldError> {
        let mut fields = BTreeMap::new();
        fields.insert(NATIVE_ID.to_string(), FieldSpec::NativeId);
        fields.insert(NATIVE_PRODUCT.to_string(), FieldSpec::NativeProduct);

        for (name, def) in search_fields {
            if name == NATIVE_ID || name == NATIVE_PRODUCT {
                return Err(FieldError::BadDefinition {
                    field: name.clone(),
                    message: "shadows a native field".to_string(),
                });
            }
            fields.insert(name.clone(), parse_field(name, def)?);
        }
        Ok(Self { fields })
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Whether the registry declares `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Whether the registry declares every given name.
    pub fn has_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names.into_iter().all(|name| self.contains(name))
    }

    /// Iterates over `(name, spec)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Iterates over field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields, natives included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the registry is empty (never true: natives are always present).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Compiles a field-name → query-value mapping into predicate expressions.
///
/// # Errors
///
/// Returns [`FieldError::UnknownField`] for names the registry does not
/// declare, or [`FieldError::InvalidValue`] for mismatched value shapes.
pub fn to_expressions(
    registry: &FieldRegistry,
    query: &BTreeMap<String, QueryValue>,
) -> Result<Vec<Expression>, FieldError> {
    query
        .iter()
        .map(|(name, value)| {
            let spec = registry.get(name).ok_or_else(|| FieldError::UnknownField {
                name: name.clone(),
            })?;
            let cmp = spec.compile(name, value)?;
            Ok(Expression {
                name: name.clone(),
                spec: spec.clone(),
                cmp,
            })
        })
        .collect()
}

fn parse_field(name: &str, def: &Value) -> Result<FieldSpec, FieldError> {
    let bad = |message: String| FieldError::BadDefinition {
        field: name.to_string(),
        message,
    };

    let obj = def
        .as_object()
        .ok_or_else(|| bad("definition must be an object".to_string()))?;
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or("string");

    match kind {
        "string" | "double" | "integer" | "datetime" => {
            let offset = obj
                .get("offset")
                .ok_or_else(|| bad("missing offset".to_string()))
                .and_then(|v| parse_offset(v).ok_or_else(|| bad("offset must be a list of keys".to_string())))?;
            let kind = match kind {
                "double" => ScalarKind::Double,
                "integer" => ScalarKind::Integer,
                "datetime" => ScalarKind::Datetime,
                _ => ScalarKind::String,
            };
            Ok(FieldSpec::Scalar { kind, offset })
        }
        "double-range" | "numeric-range" | "float-range" | "datetime-range" => {
            let min_offsets = parse_bound(obj.get("min_offset"))
                .ok_or_else(|| bad("missing or malformed min_offset".to_string()))?;
            let max_offsets = parse_bound(obj.get("max_offset"))
                .ok_or_else(|| bad("missing or malformed max_offset".to_string()))?;
            if kind == "datetime-range" {
                Ok(FieldSpec::DatetimeRange {
                    min_offsets,
                    max_offsets,
                })
            } else {
                Ok(FieldSpec::DoubleRange {
                    min_offsets,
                    max_offsets,
                })
            }
        }
        other => Err(bad(format!("unsupported field type {other:?}"))),
    }
}

/// Parses a single offset: a JSON array of string keys.
fn parse_offset(value: &Value) -> Option<DocOffset> {
    let keys = value.as_array()?;
    keys.iter()
        .map(|k| k.as_str().map(ToString::to_string))
        .collect()
}

/// Parses a bound: either one offset or a list of candidate offsets.
fn parse_bound(value: Option<&Value>) -> Option<Vec<DocOffset>> {
    let value = value?;
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    if items.iter().all(Value::is_array) {
        items.iter().map(parse_offset).collect()
    } else {
        parse_offset(value).map(|offset| vec![offset])
    }
}

fn double_bounds(doc: &Value, min_offsets: &[DocOffset], max_offsets: &[DocOffset]) -> Option<Range<f64>> {
    let low = fold_bound(doc, min_offsets, Value::as_f64, f64::min)?;
    let high = fold_bound(doc, max_offsets, Value::as_f64, f64::max)?;
    Some(Range::new(low, high))
}

fn time_bounds(
    doc: &Value,
    min_offsets: &[DocOffset],
    max_offsets: &[DocOffset],
) -> Option<Range<DateTime<Utc>>> {
    let low = fold_bound(doc, min_offsets, parse_datetime, |a, b| a.min(b))?;
    let high = fold_bound(doc, max_offsets, parse_datetime, |a, b| a.max(b))?;
    Some(Range::new(low, high))
}

fn fold_bound<T: Copy>(
    doc: &Value,
    offsets: &[DocOffset],
    extract: impl Fn(&Value) -> Option<T>,
    pick: impl Fn(T, T) -> T,
) -> Option<T> {
    offsets
        .iter()
        .filter_map(|offset| doc::get_offset(doc, offset).and_then(&extract))
        .reduce(pick)
}

/// Equality with numeric tolerance: `1` and `1.0` compare equal.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Parses a document timestamp value.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, and bare dates (midnight UTC).
#[must_use]
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FieldRegistry {
        let search_fields = json!({
            "platform": { "offset": ["platform", "code"] },
            "gsi": { "type": "double", "offset": ["image", "gsi"] },
            "lat": {
                "type": "double-range",
                "min_offset": [["extent", "coord", "ll", "lat"]],
                "max_offset": [["extent", "coord", "ur", "lat"]]
            },
            "time": {
                "type": "datetime-range",
                "min_offset": [["extent", "from_dt"]],
                "max_offset": [["extent", "to_dt"]]
            }
        });
        FieldRegistry::from_search_fields(search_fields.as_object().expect("object"))
            .expect("valid registry")
    }

    fn doc() -> Value {
        json!({
            "platform": { "code": "LANDSAT_8" },
            "image": { "gsi": 25.0 },
            "extent": {
                "coord": { "ll": { "lat": -36.1 }, "ur": { "lat": -34.9 } },
                "from_dt": "2014-07-26T23:48:00Z",
                "to_dt": "2014-07-26T23:52:00Z"
            }
        })
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid rfc3339")
            .with_timezone(&Utc)
    }

    #[test]
    fn registry_always_contains_native_fields() {
        let reg = registry();
        assert!(reg.contains(NATIVE_ID));
        assert!(reg.contains(NATIVE_PRODUCT));
        assert!(reg.has_all(["platform", "lat", "time", "id"]));
        assert!(!reg.has_all(["platform", "orbit"]));
    }

    #[test]
    fn declaring_a_native_name_is_rejected() {
        let search_fields = json!({ "id": { "offset": ["id"] } });
        let err = FieldRegistry::from_search_fields(search_fields.as_object().expect("object"))
            .expect_err("must reject");
        assert!(matches!(err, FieldError::BadDefinition { .. }));
    }

    #[test]
    fn missing_offset_is_rejected() {
        let search_fields = json!({ "platform": { "type": "string" } });
        let err = FieldRegistry::from_search_fields(search_fields.as_object().expect("object"))
            .expect_err("must reject");
        assert!(matches!(err, FieldError::BadDefinition { .. }));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let search_fields = json!({ "shape": { "type": "polygon", "offset": ["shape"] } });
        let err = FieldRegistry::from_search_fields(search_fields.as_object().expect("object"))
            .expect_err("must reject");
        assert!(matches!(err, FieldError::BadDefinition { .. }));
    }

    #[test]
    fn compile_string_equality() {
        let reg = registry();
        let mut query = BTreeMap::new();
        query.insert("platform".to_string(), QueryValue::text("LANDSAT_8"));
        let exprs = to_expressions(&reg, &query).expect("compiles");
        assert_eq!(exprs.len(), 1);
        assert_eq!(exprs[0].cmp, Comparison::Eq(json!("LANDSAT_8")));
    }

    #[test]
    fn compile_unknown_field_fails() {
        let reg = registry();
        let mut query = BTreeMap::new();
        query.insert("orbit".to_string(), QueryValue::number(5.0));
        let err = to_expressions(&reg, &query).expect_err("unknown field");
        assert!(matches!(err, FieldError::UnknownField { name } if name == "orbit"));
    }

    #[test]
    fn compile_mismatched_value_fails() {
        let reg = registry();
        let spec = reg.get("time").expect("declared");
        let err = spec
            .compile("time", &QueryValue::number(5.0))
            .expect_err("mismatch");
        assert!(matches!(err, FieldError::InvalidValue { .. }));
    }

    #[test]
    fn scalar_equality_matches_document() {
        let reg = registry();
        let spec = reg.get("platform").expect("declared");
        let cmp = spec
            .compile("platform", &QueryValue::text("LANDSAT_8"))
            .expect("compiles");
        let expr = Expression {
            name: "platform".into(),
            spec: spec.clone(),
            cmp,
        };
        let id = DatasetId::generate();
        assert!(expr.matches(id, ProductId(1), &doc()));
        assert!(!expr.matches(id, ProductId(1), &json!({"platform": {"code": "SENTINEL_2"}})));
    }

    #[test]
    fn double_range_overlap_semantics() {
        let reg = registry();
        let spec = reg.get("lat").expect("declared");
        let expr = |low: f64, high: f64| Expression {
            name: "lat".into(),
            spec: spec.clone(),
            cmp: spec
                .compile("lat", &QueryValue::double_range(low, high))
                .expect("compiles"),
        };
        let id = DatasetId::generate();
        // Document extent is [-36.1, -34.9].
        assert!(expr(-35.5, -35.0).matches(id, ProductId(1), &doc()));
        assert!(expr(-40.0, -36.1).matches(id, ProductId(1), &doc()), "touching bound is inclusive");
        assert!(!expr(-30.0, -20.0).matches(id, ProductId(1), &doc()));
    }

    #[test]
    fn datetime_range_matches_inclusively() {
        let reg = registry();
        let spec = reg.get("time").expect("declared");
        let cmp = spec
            .compile(
                "time",
                &QueryValue::time_range(utc("2014-07-26T00:00:00Z"), utc("2014-07-27T00:00:00Z")),
            )
            .expect("compiles");
        let expr = Expression {
            name: "time".into(),
            spec: spec.clone(),
            cmp,
        };
        let id = DatasetId::generate();
        assert!(expr.matches(id, ProductId(1), &doc()));

        let miss = spec
            .compile(
                "time",
                &QueryValue::time_range(utc("2015-01-01T00:00:00Z"), utc("2015-02-01T00:00:00Z")),
            )
            .expect("compiles");
        let expr = Expression {
            name: "time".into(),
            spec: spec.clone(),
            cmp: miss,
        };
        assert!(!expr.matches(id, ProductId(1), &doc()));
    }

    #[test]
    fn point_query_on_range_field_is_containment() {
        let reg = registry();
        let spec = reg.get("time").expect("declared");
        let cmp = spec
            .compile("time", &QueryValue::time(utc("2014-07-26T23:50:00Z")))
            .expect("compiles");
        let expr = Expression {
            name: "time".into(),
            spec: spec.clone(),
            cmp,
        };
        assert!(expr.matches(DatasetId::generate(), ProductId(1), &doc()));
    }

    #[test]
    fn product_pin_matches_only_that_product() {
        let expr = Expression::product(ProductId(7));
        let id = DatasetId::generate();
        assert!(expr.matches(id, ProductId(7), &json!({})));
        assert!(!expr.matches(id, ProductId(8), &json!({})));
    }

    #[test]
    fn missing_document_value_never_matches() {
        let reg = registry();
        let spec = reg.get("platform").expect("declared");
        let expr = Expression {
            name: "platform".into(),
            spec: spec.clone(),
            cmp: Comparison::Eq(json!("LANDSAT_8")),
        };
        assert!(!expr.matches(DatasetId::generate(), ProductId(1), &json!({})));
    }

    #[test]
    fn projection_shapes() {
        let reg = registry();
        let id = DatasetId::generate();
        let d = doc();

        let platform = reg.get("platform").expect("declared").project(id, ProductId(3), &d);
        assert_eq!(platform, json!("LANDSAT_8"));

        let lat = reg.get("lat").expect("declared").project(id, ProductId(3), &d);
        assert_eq!(lat, json!([-36.1, -34.9]));

        let native = reg.get(NATIVE_ID).expect("native").project(id, ProductId(3), &d);
        assert_eq!(native, json!(id.to_string()));

        let missing = reg.get("gsi").expect("declared").project(id, ProductId(3), &json!({}));
        assert_eq!(missing, Value::Null);
    }

    #[test]
    fn bound_lists_fold_min_and_max() {
        let search_fields = json!({
            "lat": {
                "type": "double-range",
                "min_offset": [
                    ["extent", "coord", "ll", "lat"],
                    ["extent", "coord", "lr", "lat"]
                ],
                "max_offset": [
                    ["extent", "coord", "ul", "lat"],
                    ["extent", "coord", "ur", "lat"]
                ]
            }
        });
        let reg = FieldRegistry::from_search_fields(search_fields.as_object().expect("object"))
            .expect("valid");
        let d = json!({
            "extent": { "coord": {
                "ll": { "lat": -36.2 },
                "lr": { "lat": -36.4 },
                "ul": { "lat": -34.8 },
                "ur": { "lat": -34.6 }
            }}
        });
        let spec = reg.get("lat").expect("declared");
        let expr = Expression {
            name: "lat".into(),
            spec: spec.clone(),
            cmp: spec
                .compile("lat", &QueryValue::double_range(-36.4, -36.4))
                .expect("compiles"),
        };
        // The folded extent is [-36.4, -34.6]; the bound itself must match.
        assert!(expr.matches(DatasetId::generate(), ProductId(1), &d));
    }

    #[test]
    fn parse_datetime_accepts_common_forms() {
        assert!(parse_datetime(&json!("2014-07-26T23:48:00Z")).is_some());
        assert!(parse_datetime(&json!("2014-07-26 23:48:00")).is_some());
        assert!(parse_datetime(&json!("2014-07-26")).is_some());
        assert!(parse_datetime(&json!("yesterday")).is_none());
        assert!(parse_datetime(&json!(42)).is_none());
    }

    #[test]
    fn range_contains_and_overlaps_are_inclusive() {
        let r = Range::new(1.0, 2.0);
        assert!(r.contains(&1.0));
        assert!(r.contains(&2.0));
        assert!(!r.contains(&2.1));
        assert!(r.overlaps(&Range::new(2.0, 3.0)));
        assert!(!r.overlaps(&Range::new(2.1, 3.0)));
    }
}
