//! Builder methods for creating filters and field references.

use super::{FieldRef, Filter, FilterValue};

impl FieldRef {
    /// References a fixed column.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column { name: name.into() }
    }

    /// References a path in the metadata document.
    #[must_use]
    pub fn metadata<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Metadata {
            path: path.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter {
    /// Creates an equality filter.
    #[must_use]
    pub fn eq(field: FieldRef, value: impl Into<FilterValue>) -> Self {
        Self::Eq {
            field,
            value: value.into(),
        }
    }

    /// Creates a membership filter.
    #[must_use]
    pub fn is_in<I, V>(field: FieldRef, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        Self::In {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a greater-than filter.
    #[must_use]
    pub fn gt(field: FieldRef, value: impl Into<FilterValue>) -> Self {
        Self::Gt {
            field,
            value: value.into(),
        }
    }

    /// Creates a less-than filter.
    #[must_use]
    pub fn lt(field: FieldRef, value: impl Into<FilterValue>) -> Self {
        Self::Lt {
            field,
            value: value.into(),
        }
    }

    /// Creates a presence filter.
    #[must_use]
    pub fn exists(field: FieldRef) -> Self {
        Self::Exists { field }
    }

    /// Creates an AND filter.
    #[must_use]
    pub fn and(children: Vec<Filter>) -> Self {
        Self::And { children }
    }

    /// Creates an OR filter.
    #[must_use]
    pub fn or(children: Vec<Filter>) -> Self {
        Self::Or { children }
    }

    /// Creates a NOT filter.
    #[must_use]
    pub fn not(child: Filter) -> Self {
        Self::Not {
            child: Box::new(child),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for FilterValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for FilterValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u64> for FilterValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
