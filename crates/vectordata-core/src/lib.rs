//! # vectordata core
//!
//! Backend-agnostic vector collections over relational engines.
//!
//! This crate holds everything that does not talk to a database:
//!
//! - **Contract**: the [`VectorStore`] and [`Collection`] traits
//! - **Filters**: a portable predicate AST, a normalizer, a full-pushdown SQL
//!   compiler and an in-process evaluator
//! - **Ranking**: distance and score per metric, and a bounded top-K heap
//! - **Ambient**: cancellation/deadline [`Context`], configuration and
//!   logging setup
//!
//! Backends live in `vectordata-postgres` (native pgvector operators) and
//! `vectordata-mssql` (no native vector support).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vectordata_core::{CollectionSpec, Context, FieldRef, Filter, Record, SearchOptions, VectorStore};
//!
//! let ctx = Context::new();
//! let docs = store.ensure_collection(&ctx, &CollectionSpec::new("docs", 3)).await?;
//!
//! docs.upsert(&ctx, &[Record::new("a", vec![1.0, 0.0, 0.0]).with_metadata("lang", "en")]).await?;
//!
//! let options = SearchOptions::default().with_filter(Filter::eq(FieldRef::metadata(["lang"]), "en"));
//! let hits = docs.search_by_vector(&ctx, &[1.0, 0.0, 0.0], 10, &options).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::float_cmp)]

pub mod codec;
pub mod collection;
pub mod config;
#[cfg(test)]
mod config_tests;
pub mod context;
pub mod distance;
pub mod error;
pub mod filter;
pub mod logging;
pub mod record;
pub mod topk;

pub use codec::{Codec, TypedCollection, TypedSearchResult};
pub use collection::{
    validate_top_k, Collection, CollectionSpec, EnsureMode, HnswOptions, IndexMethod,
    IndexOptions, IvfFlatOptions, MetadataIndexOptions, ResolvedSpec, SearchOptions,
    VectorIndexOptions, VectorStore,
};
pub use config::{
    ConfigError, LoggingConfig, MssqlConfig, PostgresConfig, VectorDataConfig, WriteConfig,
};
pub use context::Context;
pub use distance::DistanceMetric;
pub use error::{BoxError, Error, Result};
pub use filter::{
    compile_filter_sql, CompiledFilter, FieldRef, Filter, FilterSqlConfig, FilterValue,
    RecordMatcher, SqlArg,
};
pub use logging::init_logging;
pub use record::{
    decode_vector, encode_vector, parse_metadata, validate_dimension, validate_records, Metadata,
    Projection, Record, SearchResult, CONTENT_COLUMN, ID_COLUMN, METADATA_COLUMN, VECTOR_COLUMN,
};
pub use topk::{Candidate, TopK};
