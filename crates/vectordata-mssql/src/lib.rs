//! # vectordata SQL Server backend
//!
//! Collections stored in plain tables, vectors as JSON arrays:
//!
//! ```text
//! [id] NVARCHAR(255) PRIMARY KEY, [vector] NVARCHAR(MAX), [metadata] NVARCHAR(MAX), [content] NVARCHAR(MAX) NULL
//! ```
//!
//! Dimension and metric live in a `__vector_collections` registry table.
//! SQL Server has no vector operators, so search picks one of two plans:
//!
//! - **ranked**: the filter is accepted by the restricted compiler and
//!   distances are computed in SQL over `OPENJSON`;
//! - **streaming**: rows are streamed and the filter, distance and top-K
//!   run in-process.
//!
//! ```rust,ignore
//! use vectordata_core::{CollectionSpec, Context, VectorDataConfig, VectorStore};
//! use vectordata_mssql::MssqlVectorStore;
//!
//! let config = VectorDataConfig::load()?;
//! let store = MssqlVectorStore::connect(&config).await?;
//! let docs = store.ensure_collection(&Context::new(), &CollectionSpec::new("docs", 384)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod collection;
mod helpers;
mod pushdown;
mod ranking;
#[cfg(test)]
mod ranking_tests;
mod schema;
mod statements;
#[cfg(test)]
mod statements_tests;
mod store;
mod streaming;

pub use collection::MssqlCollection;
pub use pushdown::{compile_restricted, Pushdown};
pub use store::{MssqlVectorStore, StoreOptions};
