//! The backend-agnostic collection contract.
//!
//! A backend implements [`VectorStore`] and [`Collection`]. A new engine is
//! added by implementing these two traits, never by branching inside an
//! existing backend.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::record::{Projection, Record, SearchResult};

/// How `ensure_collection` treats an existing table whose shape drifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureMode {
    /// Fail on any schema drift.
    Strict,
    /// Add missing optional columns. Never destructive.
    AutoMigrate,
}

impl EnsureMode {
    /// Picks the backend default when no mode was requested.
    #[must_use]
    pub const fn default_for(strict_by_default: bool) -> Self {
        if strict_by_default {
            Self::Strict
        } else {
            Self::AutoMigrate
        }
    }
}

impl fmt::Display for EnsureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::AutoMigrate => "auto_migrate",
        })
    }
}

/// Physical requirements of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection (table) name.
    pub name: String,
    /// Vector dimension, greater than zero.
    pub dimension: usize,
    /// Distance metric; cosine when unset.
    #[serde(default)]
    pub metric: Option<DistanceMetric>,
    /// Ensure mode; backend default when unset.
    #[serde(default)]
    pub mode: Option<EnsureMode>,
}

impl CollectionSpec {
    /// Creates a spec with the default metric and mode.
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: None,
            mode: None,
        }
    }

    /// Sets the metric.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Sets the ensure mode.
    #[must_use]
    pub fn with_mode(mut self, mode: EnsureMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Validates the spec and fills in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for a blank name or a zero
    /// dimension.
    pub fn resolve(&self, strict_by_default: bool) -> Result<ResolvedSpec> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::SchemaMismatch("collection name is empty".into()));
        }
        if self.dimension == 0 {
            return Err(Error::SchemaMismatch("dimension must be > 0".into()));
        }
        Ok(ResolvedSpec {
            name: name.to_string(),
            dimension: self.dimension,
            metric: self.metric.unwrap_or_default(),
            mode: self
                .mode
                .unwrap_or(EnsureMode::default_for(strict_by_default)),
        })
    }
}

/// A validated [`CollectionSpec`] with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpec {
    /// Trimmed collection name.
    pub name: String,
    /// Vector dimension.
    pub dimension: usize,
    /// Pinned metric.
    pub metric: DistanceMetric,
    /// Effective ensure mode.
    pub mode: EnsureMode,
}

/// Options for [`Collection::search_by_vector`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Optional predicate applied before ranking.
    pub filter: Option<Filter>,
    /// Fields to materialize.
    pub projection: Projection,
    /// Drop results whose distance is greater than this.
    pub threshold: Option<f64>,
}

impl SearchOptions {
    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Sets the distance threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Vector index implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMethod {
    /// Graph-based index.
    #[default]
    Hnsw,
    /// Cluster-based index.
    IvfFlat,
}

impl IndexMethod {
    /// Engine name of the method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hnsw => "hnsw",
            Self::IvfFlat => "ivfflat",
        }
    }
}

impl fmt::Display for IndexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HNSW tuning. Zero means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HnswOptions {
    /// Neighbors per node (default 16).
    pub m: u32,
    /// Candidate list size during construction (default 64).
    pub ef_construction: u32,
}

/// IVFFlat tuning. Zero means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IvfFlatOptions {
    /// Number of clusters (default 100).
    pub lists: u32,
}

/// Vector index request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VectorIndexOptions {
    /// Index name; `idx_<collection>_vector_<method>` when unset.
    pub name: Option<String>,
    /// Index method.
    pub method: IndexMethod,
    /// Operator class metric; the collection metric when unset.
    pub metric: Option<DistanceMetric>,
    /// HNSW tuning.
    pub hnsw: HnswOptions,
    /// IVFFlat tuning.
    pub ivfflat: IvfFlatOptions,
}

/// Metadata document index request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataIndexOptions {
    /// Index name; `idx_<collection>_metadata` when unset.
    pub name: Option<String>,
    /// Use the path-optimized operator class.
    pub use_path_ops: bool,
}

/// Index creation request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Vector index, if any.
    pub vector: Option<VectorIndexOptions>,
    /// Metadata index, if any.
    pub metadata: Option<MetadataIndexOptions>,
}

impl IndexOptions {
    /// Returns true if no index is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vector.is_none() && self.metadata.is_none()
    }
}

/// Creates and resolves collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection handle type.
    type Collection: Collection;

    /// Creates or validates the collection described by `spec`.
    ///
    /// Idempotent and safe to call concurrently for the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] when the spec is invalid or the
    /// stored shape, dimension or metric disagrees with it.
    async fn ensure_collection(&self, ctx: &Context, spec: &CollectionSpec)
        -> Result<Self::Collection>;

    /// Returns a handle without checking storage.
    fn collection(&self, name: &str, dimension: usize, metric: DistanceMetric) -> Self::Collection;
}

/// An operational vector collection.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Distance metric.
    fn metric(&self) -> DistanceMetric;

    /// Inserts records. Fails on duplicate IDs.
    async fn insert(&self, ctx: &Context, records: &[Record]) -> Result<()>;

    /// Inserts or fully replaces records by ID.
    async fn upsert(&self, ctx: &Context, records: &[Record]) -> Result<()>;

    /// Fetches one record with every field populated.
    async fn get(&self, ctx: &Context, id: &str) -> Result<Record>;

    /// Deletes records by ID and returns how many existed.
    async fn delete(&self, ctx: &Context, ids: &[String]) -> Result<u64>;

    /// Counts records matching `filter` (all records when `None`).
    async fn count(&self, ctx: &Context, filter: Option<&Filter>) -> Result<u64>;

    /// Returns up to `top_k` records ordered by distance, then ID.
    async fn search_by_vector(
        &self,
        ctx: &Context,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>>;

    /// Creates the requested indexes.
    async fn ensure_indexes(&self, ctx: &Context, options: &IndexOptions) -> Result<()>;
}

/// Rejects a zero `top_k` before any I/O.
///
/// # Errors
///
/// Returns [`Error::Validation`] when `top_k` is zero.
pub fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(Error::Validation("top_k must be > 0".into()));
    }
    Ok(())
}
