//! Structured filters over record columns and metadata.
//!
//! A [`Filter`] is a closed predicate tree. It carries no backend knowledge:
//! the same tree is compiled into SQL by [`compile_filter_sql`], into a
//! restricted SQL dialect by backends with weaker JSON support, or
//! evaluated in-process by [`RecordMatcher`]. Every strategy canonicalizes
//! field references through [`FieldRef::normalize`] first, so they agree on
//! what a reference means.
//!
//! ## Usage
//!
//! ```rust
//! use vectordata_core::filter::{FieldRef, Filter};
//!
//! // category = "news" AND rank > 1
//! let filter = Filter::and(vec![
//!     Filter::eq(FieldRef::metadata(["category"]), "news"),
//!     Filter::gt(FieldRef::metadata(["rank"]), 1),
//! ]);
//! # let _ = filter;
//! ```

mod builders;
mod matching;
mod normalize;
mod sql;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub use matching::RecordMatcher;
pub use sql::{compile_filter_sql, CompiledFilter, FilterSqlConfig, SqlArg};

/// A reference to a queryable field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRef {
    /// A fixed column of the collection table (`id`, `content`).
    Column {
        /// Column name.
        name: String,
    },
    /// A path into the metadata document.
    Metadata {
        /// Keys walked from the document root, outermost first.
        path: Vec<String>,
    },
}

/// A scalar filter operand.
///
/// Numbers are carried as `f64`; integers beyond 2^53 lose precision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// JSON `null`.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
}

impl FilterValue {
    /// Returns the numeric value, if this is a number.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Re-encodes the value as a JSON scalar.
    ///
    /// Integral numbers are emitted as JSON integers so `10` stays `10`
    /// rather than becoming `10.0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] for NaN or infinite numbers, which
    /// JSON cannot represent.
    pub fn to_json(&self) -> Result<Value> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::Bool(b) => Ok(Value::Bool(*b)),
            Self::String(s) => Ok(Value::String(s.clone())),
            Self::Number(n) => number_to_json(*n),
        }
    }

    /// Renders the value as text for lexical comparison.
    ///
    /// Booleans render as `true`/`false`, null as `null` and numbers in
    /// their shortest round-trip decimal form.
    #[must_use]
    pub fn render_text(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::String(s) => s.clone(),
            Self::Number(n) => render_number(*n),
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_json(n: f64) -> Result<Value> {
    if is_integral(n) {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| Error::InvalidFilter(format!("number {n} cannot be encoded as JSON")))
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn render_number(n: f64) -> String {
    if is_integral(n) {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

/// A predicate tree over record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// `field == value`
    Eq {
        /// Field to test.
        field: FieldRef,
        /// Value to compare against.
        value: FilterValue,
    },
    /// `field` equals one of `values` (must be non-empty).
    In {
        /// Field to test.
        field: FieldRef,
        /// Candidate values.
        values: Vec<FilterValue>,
    },
    /// `field > value`
    Gt {
        /// Field to test.
        field: FieldRef,
        /// Lower bound (exclusive).
        value: FilterValue,
    },
    /// `field < value`
    Lt {
        /// Field to test.
        field: FieldRef,
        /// Upper bound (exclusive).
        value: FilterValue,
    },
    /// The field is present. An explicit JSON `null` counts as present.
    Exists {
        /// Field to test.
        field: FieldRef,
    },
    /// Every child matches (must be non-empty).
    And {
        /// Conjuncts.
        children: Vec<Filter>,
    },
    /// At least one child matches (must be non-empty).
    Or {
        /// Disjuncts.
        children: Vec<Filter>,
    },
    /// The child does not match.
    Not {
        /// Negated filter.
        child: Box<Filter>,
    },
}

impl Filter {
    /// Parses a filter from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if the JSON does not describe a
    /// filter tree (unknown node type, missing `child`, wrong field shape).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidFilter(e.to_string()))
    }

    /// Serializes the filter to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
