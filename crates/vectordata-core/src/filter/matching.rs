//! In-process filter evaluation against decoded records.
//!
//! Used when a filter cannot be pushed into the storage engine. Semantics
//! follow the SQL compilers: a missing field never matches a comparison,
//! `Exists` tests presence (an explicit JSON `null` is present), an
//! explicit `null` is never ordered, and numbers compare numerically while
//! everything else compares as text.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;

use super::{render_number, FieldRef, Filter, FilterValue};
use crate::error::{Error, Result};
use crate::record::{Record, CONTENT_COLUMN, ID_COLUMN};

/// A filter prepared for repeated evaluation.
///
/// Construction normalizes the tree and rejects unknown columns once, so
/// evaluating a row cannot fail.
#[derive(Debug, Clone, Default)]
pub struct RecordMatcher {
    filter: Option<Filter>,
}

impl RecordMatcher {
    /// Prepares `filter`; `None` matches every record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] for a malformed tree or a column
    /// other than `id` and `content`.
    pub fn new(filter: Option<&Filter>) -> Result<Self> {
        let filter = filter.map(Filter::normalize).transpose()?;
        if let Some(filter) = &filter {
            check_columns(filter)?;
        }
        Ok(Self { filter })
    }

    /// Returns true if this matcher accepts every record.
    #[must_use]
    pub const fn is_match_all(&self) -> bool {
        self.filter.is_none()
    }

    /// Evaluates the filter against `record`.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| eval(filter, record))
    }
}

impl Filter {
    /// Evaluates this filter against a single record.
    ///
    /// # Errors
    ///
    /// Same as [`RecordMatcher::new`].
    pub fn matches(&self, record: &Record) -> Result<bool> {
        Ok(RecordMatcher::new(Some(self))?.matches(record))
    }
}

fn check_columns(filter: &Filter) -> Result<()> {
    match filter {
        Filter::Eq { field, .. }
        | Filter::In { field, .. }
        | Filter::Gt { field, .. }
        | Filter::Lt { field, .. }
        | Filter::Exists { field } => match field {
            FieldRef::Column { name } if name != ID_COLUMN && name != CONTENT_COLUMN => {
                Err(Error::InvalidFilter(format!("unknown column '{name}'")))
            }
            _ => Ok(()),
        },
        Filter::And { children } | Filter::Or { children } => {
            children.iter().try_for_each(check_columns)
        }
        Filter::Not { child } => check_columns(child),
    }
}

fn eval(filter: &Filter, record: &Record) -> bool {
    match filter {
        Filter::Eq { field, value } => {
            resolve(field, record).is_some_and(|left| values_equal(&left, value))
        }
        Filter::In { field, values } => resolve(field, record)
            .is_some_and(|left| values.iter().any(|value| values_equal(&left, value))),
        Filter::Gt { field, value } => resolve(field, record)
            .is_some_and(|left| compare_values(&left, value) == Some(Ordering::Greater)),
        Filter::Lt { field, value } => resolve(field, record)
            .is_some_and(|left| compare_values(&left, value) == Some(Ordering::Less)),
        Filter::Exists { field } => resolve(field, record).is_some(),
        Filter::And { children } => children.iter().all(|child| eval(child, record)),
        Filter::Or { children } => children.iter().any(|child| eval(child, record)),
        Filter::Not { child } => !eval(child, record),
    }
}

/// A resolved field value borrowed from the record.
enum Resolved<'a> {
    Text(&'a str),
    Json(&'a Value),
}

/// Resolves a normalized reference; `None` means the value does not exist.
fn resolve<'a>(field: &FieldRef, record: &'a Record) -> Option<Resolved<'a>> {
    match field {
        FieldRef::Column { name } => match name.as_str() {
            ID_COLUMN => Some(Resolved::Text(&record.id)),
            CONTENT_COLUMN => record.content.as_deref().map(Resolved::Text),
            _ => None,
        },
        FieldRef::Metadata { path } => {
            let (first, rest) = path.split_first()?;
            let mut current = record.metadata.get(first)?;
            for segment in rest {
                current = current.as_object()?.get(segment)?;
            }
            Some(Resolved::Json(current))
        }
    }
}

fn values_equal(left: &Resolved<'_>, right: &FilterValue) -> bool {
    match (left, right) {
        (Resolved::Json(Value::Null), FilterValue::Null) => true,
        (Resolved::Json(Value::Number(l)), FilterValue::Number(r)) => l.as_f64() == Some(*r),
        (Resolved::Json(Value::Bool(l)), FilterValue::Bool(r)) => l == r,
        (Resolved::Json(Value::String(l)), FilterValue::String(r)) => l == r,
        (Resolved::Text(l), FilterValue::String(r)) => *l == r.as_str(),
        _ => false,
    }
}

fn compare_values(left: &Resolved<'_>, right: &FilterValue) -> Option<Ordering> {
    if matches!(left, Resolved::Json(Value::Null)) {
        return None;
    }
    if let FilterValue::Number(r) = right {
        if let Some(l) = numeric(left) {
            return l.partial_cmp(r);
        }
    }
    Some(text(left).as_ref().cmp(right.render_text().as_str()))
}

/// Numeric view of a resolved value. Numeric text counts, matching the
/// engines' cast of extracted JSON text to a floating-point type.
fn numeric(value: &Resolved<'_>) -> Option<f64> {
    match value {
        Resolved::Json(Value::Number(n)) => n.as_f64(),
        Resolved::Json(Value::String(s)) => parse_numeric_text(s),
        Resolved::Text(s) => parse_numeric_text(s),
        Resolved::Json(_) => None,
    }
}

fn parse_numeric_text(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn text<'a>(value: &'a Resolved<'_>) -> Cow<'a, str> {
    match value {
        Resolved::Text(s) => Cow::Borrowed(s),
        Resolved::Json(Value::String(s)) => Cow::Borrowed(s),
        Resolved::Json(Value::Number(n)) => match n.as_f64() {
            Some(f) if n.is_f64() => Cow::Owned(render_number(f)),
            _ => Cow::Owned(n.to_string()),
        },
        Resolved::Json(other) => Cow::Owned(other.to_string()),
    }
}
