//! Error types for `vectordata`.
//!
//! Every backend reports failures through this one enum so callers can match
//! on the kind of failure without knowing which engine produced it. Driver
//! errors are never surfaced bare: they are wrapped in [`Error::Storage`]
//! together with the operation and collection that failed.

use thiserror::Error;

/// Result type alias for `vectordata` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed driver error carried by [`Error::Storage`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in `vectordata` operations.
///
/// Error codes follow the pattern `VD-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Record not found (VD-001).
    #[error("[VD-001] Record '{0}' not found")]
    NotFound(String),

    /// Vector dimension mismatch (VD-002).
    #[error("[VD-002] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Collection dimension.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// Collection spec invalid, or stored schema disagrees with it (VD-003).
    #[error("[VD-003] Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Malformed filter tree or unknown field reference (VD-004).
    #[error("[VD-004] Invalid filter: {0}")]
    InvalidFilter(String),

    /// Invalid input detected before any I/O (VD-005).
    #[error("[VD-005] Validation error: {0}")]
    Validation(String),

    /// Operation not supported by this backend (VD-006).
    #[error("[VD-006] Unsupported: {0}")]
    Unsupported(String),

    /// The caller cancelled the operation (VD-007).
    #[error("[VD-007] Operation cancelled")]
    Cancelled,

    /// The caller's deadline elapsed before the operation finished (VD-008).
    #[error("[VD-008] Deadline exceeded")]
    DeadlineExceeded,

    /// Storage engine error (VD-009).
    #[error("[VD-009] Storage error during {operation} on '{collection}': {source}")]
    Storage {
        /// Operation that failed (e.g. `upsert`, `ensure_collection`).
        operation: &'static str,
        /// Collection (or schema object) the operation targeted.
        collection: String,
        /// Underlying driver error.
        #[source]
        source: BoxError,
    },

    /// Configuration error (VD-010).
    #[error("[VD-010] Configuration error: {0}")]
    Config(String),

    /// Encoding or decoding of stored values failed (VD-011).
    #[error("[VD-011] Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wraps a driver error with the operation and collection it belongs to.
    pub fn storage<E>(operation: &'static str, collection: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Storage {
            operation,
            collection: collection.into(),
            source: source.into(),
        }
    }

    /// Returns the error code (e.g., "VD-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "VD-001",
            Self::DimensionMismatch { .. } => "VD-002",
            Self::SchemaMismatch(_) => "VD-003",
            Self::InvalidFilter(_) => "VD-004",
            Self::Validation(_) => "VD-005",
            Self::Unsupported(_) => "VD-006",
            Self::Cancelled => "VD-007",
            Self::DeadlineExceeded => "VD-008",
            Self::Storage { .. } => "VD-009",
            Self::Config(_) => "VD-010",
            Self::Serialization(_) => "VD-011",
        }
    }

    /// Returns true if retrying the same call might succeed.
    ///
    /// Data errors (bad filter, wrong dimension, schema drift) never fix
    /// themselves; storage failures and interrupted calls may.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Cancelled | Self::DeadlineExceeded
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
