//! Canonicalization of field references and filter trees.

use super::{FieldRef, Filter};
use crate::error::{Error, Result};

impl FieldRef {
    /// Returns the canonical form of this reference.
    ///
    /// Column names and every metadata path segment are trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] for an empty column name, an empty
    /// path or an empty path segment.
    pub fn normalize(&self) -> Result<Self> {
        match self {
            Self::Column { name } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::InvalidFilter("column field name is empty".into()));
                }
                Ok(Self::Column {
                    name: name.to_string(),
                })
            }
            Self::Metadata { path } => {
                if path.is_empty() {
                    return Err(Error::InvalidFilter("metadata path is empty".into()));
                }
                let path = path
                    .iter()
                    .map(|segment| {
                        let trimmed = segment.trim();
                        if trimmed.is_empty() {
                            Err(Error::InvalidFilter("metadata path segment is empty".into()))
                        } else {
                            Ok(trimmed.to_string())
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Metadata { path })
            }
        }
    }
}

impl Filter {
    /// Returns a structurally validated copy with every field reference
    /// normalized.
    ///
    /// Column names are not checked against any whitelist here; each
    /// execution strategy knows its own columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] for an empty `And`/`Or`, an empty
    /// `In` or any invalid field reference.
    pub fn normalize(&self) -> Result<Self> {
        Ok(match self {
            Self::Eq { field, value } => Self::Eq {
                field: field.normalize()?,
                value: value.clone(),
            },
            Self::In { field, values } => {
                if values.is_empty() {
                    return Err(Error::InvalidFilter("IN requires at least one value".into()));
                }
                Self::In {
                    field: field.normalize()?,
                    values: values.clone(),
                }
            }
            Self::Gt { field, value } => Self::Gt {
                field: field.normalize()?,
                value: value.clone(),
            },
            Self::Lt { field, value } => Self::Lt {
                field: field.normalize()?,
                value: value.clone(),
            },
            Self::Exists { field } => Self::Exists {
                field: field.normalize()?,
            },
            Self::And { children } => Self::And {
                children: normalize_group("AND", children)?,
            },
            Self::Or { children } => Self::Or {
                children: normalize_group("OR", children)?,
            },
            Self::Not { child } => Self::Not {
                child: Box::new(child.normalize()?),
            },
        })
    }
}

fn normalize_group(op: &str, children: &[Filter]) -> Result<Vec<Filter>> {
    if children.is_empty() {
        return Err(Error::InvalidFilter(format!(
            "{op} requires at least one child"
        )));
    }
    children.iter().map(Filter::normalize).collect()
}
