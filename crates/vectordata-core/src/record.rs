//! Records, projections and search results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Primary key column.
pub const ID_COLUMN: &str = "id";
/// Embedding column.
pub const VECTOR_COLUMN: &str = "vector";
/// Metadata document column.
pub const METADATA_COLUMN: &str = "metadata";
/// Optional text payload column.
pub const CONTENT_COLUMN: &str = "content";

/// Metadata document attached to a record.
///
/// A missing document is always represented as an empty map.
pub type Metadata = Map<String, Value>;

/// The storage model of a vector collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Primary key. Must not be blank.
    pub id: String,
    /// Embedding, exactly `dimension` values long.
    #[serde(default)]
    pub vector: Vec<f32>,
    /// Arbitrary JSON metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional text payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Record {
    /// Creates a record with empty metadata and no content.
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: Metadata::new(),
            content: None,
        }
    }

    /// Sets a single metadata key.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole metadata document.
    #[must_use]
    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the text payload.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Selects which optional fields a read materializes.
///
/// Projection never changes which records match, only what is fetched and
/// decoded for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    /// Fetch and decode the vector.
    pub include_vector: bool,
    /// Fetch and decode the metadata document.
    pub include_metadata: bool,
    /// Fetch the text payload.
    pub include_content: bool,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            include_vector: false,
            include_metadata: true,
            include_content: true,
        }
    }
}

impl Projection {
    /// Projection that materializes every field.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            include_vector: true,
            include_metadata: true,
            include_content: true,
        }
    }

    /// Drops the fields this projection excludes from `record`.
    pub fn apply(&self, record: &mut Record) {
        if !self.include_vector {
            record.vector = Vec::new();
        }
        if !self.include_metadata {
            record.metadata = Metadata::new();
        }
        if !self.include_content {
            record.content = None;
        }
    }
}

/// A matched record with its ranking values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The record, populated according to the projection.
    pub record: Record,
    /// Raw metric distance, lower is more similar.
    pub distance: f64,
    /// Metric-normalized score, higher is more similar.
    pub score: f64,
}

/// Checks a vector against the collection dimension.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] when the lengths differ.
pub fn validate_dimension(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Validates a whole write batch before any I/O happens.
///
/// The first invalid record fails the batch; nothing is skipped.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a blank ID and
/// [`Error::DimensionMismatch`] for a vector of the wrong length.
pub fn validate_records(records: &[Record], dimension: usize) -> Result<()> {
    for (index, record) in records.iter().enumerate() {
        if record.id.trim().is_empty() {
            return Err(Error::Validation(format!("record at index {index} has an empty id")));
        }
        validate_dimension(&record.vector, dimension)?;
    }
    Ok(())
}

/// Parses a stored metadata document.
///
/// Empty input and JSON `null` both decode to an empty map.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the text is not a JSON object.
pub fn parse_metadata(raw: &str) -> Result<Metadata> {
    if raw.trim().is_empty() {
        return Ok(Metadata::new());
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Metadata::new()),
        other => Err(Error::Serialization(format!(
            "metadata must be a JSON object, got {other}"
        ))),
    }
}

/// Encodes a vector as a JSON array (`[1.0,0.5]`).
///
/// The same text is accepted by pgvector's `vector` input function and by
/// SQL Server's `OPENJSON`.
///
/// # Errors
///
/// Returns [`Error::Validation`] for NaN or infinite components.
pub fn encode_vector(vector: &[f32]) -> Result<String> {
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(Error::Validation(format!(
            "vector component {index} is not a finite number"
        )));
    }
    Ok(serde_json::to_string(vector)?)
}

/// Decodes a vector stored as a JSON array or as pgvector text.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the text is not an array of numbers.
pub fn decode_vector(raw: &str) -> Result<Vec<f32>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<f32>>(raw)
        .map_err(|e| Error::Serialization(format!("invalid vector text: {e}")))
}
