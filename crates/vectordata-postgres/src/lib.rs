//! # vectordata PostgreSQL backend
//!
//! Collections stored in pgvector tables:
//!
//! ```text
//! "id" text PRIMARY KEY, "vector" vector(N), "metadata" jsonb, "content" text
//! ```
//!
//! Filters compile to SQL in full, and searches run as a single statement
//! ranked by the pgvector distance operator for the collection metric
//! (`<=>`, `<->`, `<#>`).
//!
//! ```rust,ignore
//! use vectordata_core::{CollectionSpec, Context, VectorDataConfig, VectorStore};
//! use vectordata_postgres::PostgresVectorStore;
//!
//! let config = VectorDataConfig::load()?;
//! let store = PostgresVectorStore::connect(&config).await?;
//! let docs = store.ensure_collection(&Context::new(), &CollectionSpec::new("docs", 768)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod collection;
mod helpers;
mod schema;
#[cfg(test)]
mod schema_tests;
mod search;
mod statements;
mod store;

pub use collection::PgCollection;
pub use store::{PostgresVectorStore, StoreOptions};
