//! Full-pushdown SQL compilation (PostgreSQL dialect).
//!
//! Produces one parenthesized boolean fragment plus positional arguments.
//! Filter values are never interpolated into SQL text: every scalar is a
//! `$n` bind parameter. Column references must be whitelisted in
//! [`FilterSqlConfig`]; metadata path segments are emitted as single-quoted
//! literals with quotes doubled.
//!
//! A comparison over a missing value (or an explicit JSON `null`) yields
//! `NULL`, which `WHERE` drops like `FALSE`; `NOT` folds it to `FALSE`
//! before negating, as the in-process evaluator does. Whitelisted columns
//! hold text, so they only equal string values; ordering compares numbers
//! numerically when the text parses as one and bytes (`COLLATE "C"`)
//! otherwise.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{FieldRef, Filter, FilterValue};
use crate::error::{Error, Result};

/// Text that `f64::from_str` accepts as a number, modulo whitespace.
/// Magnitudes beyond `f64` still match and fail the cast.
const NUMERIC_TEXT: &str = r"^\s*[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?\s*$";

/// A bind argument produced by a filter compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    /// Text parameter.
    Text(String),
    /// Double-precision parameter.
    Float(f64),
    /// Boolean parameter.
    Bool(bool),
    /// JSON document parameter (bound as `jsonb` on PostgreSQL).
    Json(Value),
    /// SQL `NULL`.
    Null,
}

impl From<&FilterValue> for SqlArg {
    fn from(value: &FilterValue) -> Self {
        match value {
            FilterValue::Null => Self::Null,
            FilterValue::Bool(b) => Self::Bool(*b),
            FilterValue::Number(n) => Self::Float(*n),
            FilterValue::String(s) => Self::Text(s.clone()),
        }
    }
}

/// A compiled filter fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFilter {
    /// Boolean SQL fragment without the `WHERE` keyword. Empty when there is
    /// no filter.
    pub sql: String,
    /// Arguments in placeholder order.
    pub args: Vec<SqlArg>,
    /// First placeholder number not used by this fragment.
    pub next_arg: usize,
}

impl CompiledFilter {
    /// Returns true if the fragment is empty (no filter).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Column whitelist and metadata expression used by [`compile_filter_sql`].
#[derive(Debug, Clone, Default)]
pub struct FilterSqlConfig {
    column_exprs: BTreeMap<String, String>,
    metadata_expr: String,
}

impl FilterSqlConfig {
    /// Creates a config whose metadata document lives in `metadata_expr`.
    #[must_use]
    pub fn new(metadata_expr: impl Into<String>) -> Self {
        Self {
            column_exprs: BTreeMap::new(),
            metadata_expr: metadata_expr.into(),
        }
    }

    /// Whitelists a logical column name and its pre-quoted SQL expression.
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.column_exprs.insert(name.into(), expr.into());
        self
    }
}

/// Compiles `filter` into a SQL fragment whose placeholders start at
/// `start_arg` (clamped to 1).
///
/// # Errors
///
/// Returns [`Error::InvalidFilter`] for a malformed tree, an unknown column
/// or a number JSON cannot encode.
pub fn compile_filter_sql(
    filter: Option<&Filter>,
    config: &FilterSqlConfig,
    start_arg: usize,
) -> Result<CompiledFilter> {
    let start_arg = start_arg.max(1);
    let Some(filter) = filter else {
        return Ok(CompiledFilter {
            next_arg: start_arg,
            ..CompiledFilter::default()
        });
    };

    let normalized = filter.normalize()?;
    let mut compiler = SqlCompiler {
        config,
        args: Vec::new(),
        next_arg: start_arg,
    };
    let sql = compiler.compile(&normalized)?;
    Ok(CompiledFilter {
        sql,
        args: compiler.args,
        next_arg: compiler.next_arg,
    })
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Column(&'a str),
    Metadata(&'a [String]),
}

struct SqlCompiler<'c> {
    config: &'c FilterSqlConfig,
    args: Vec<SqlArg>,
    next_arg: usize,
}

impl<'c> SqlCompiler<'c> {
    fn compile(&mut self, filter: &Filter) -> Result<String> {
        match filter {
            Filter::Eq { field, value } => match self.resolve(field)? {
                Target::Column(expr) => match value {
                    FilterValue::String(s) => {
                        let ph = self.bind(SqlArg::Text(s.clone()));
                        Ok(format!("({expr} = {ph})"))
                    }
                    _ => Ok("(FALSE)".to_string()),
                },
                Target::Metadata(path) => {
                    let ph = self.bind_jsonb(value)?;
                    Ok(format!(
                        "({} = {ph}::jsonb)",
                        self.jsonb_path_expr(path)
                    ))
                }
            },
            Filter::In { field, values } => {
                let target = self.resolve(field)?;
                let mut parts = Vec::with_capacity(values.len());
                for value in values {
                    match (target, value) {
                        (Target::Column(_), FilterValue::String(s)) => {
                            parts.push(self.bind(SqlArg::Text(s.clone())));
                        }
                        (Target::Column(_), _) => {}
                        (Target::Metadata(_), _) => {
                            parts.push(format!("{}::jsonb", self.bind_jsonb(value)?));
                        }
                    }
                }
                if parts.is_empty() {
                    return Ok("(FALSE)".to_string());
                }
                let lhs = match target {
                    Target::Column(expr) => expr.to_string(),
                    Target::Metadata(path) => self.jsonb_path_expr(path),
                };
                Ok(format!("({lhs} IN ({}))", parts.join(", ")))
            }
            Filter::Gt { field, value } => self.compile_range(field, value, ">"),
            Filter::Lt { field, value } => self.compile_range(field, value, "<"),
            Filter::Exists { field } => match self.resolve(field)? {
                Target::Column(expr) => Ok(format!("({expr} IS NOT NULL)")),
                Target::Metadata(path) => {
                    Ok(format!("({} IS NOT NULL)", self.jsonb_path_expr(path)))
                }
            },
            Filter::And { children } => self.compile_group("AND", children),
            Filter::Or { children } => self.compile_group("OR", children),
            Filter::Not { child } => {
                Ok(format!("(NOT COALESCE({}, FALSE))", self.compile(child)?))
            }
        }
    }

    fn compile_range(&mut self, field: &FieldRef, value: &FilterValue, op: &str) -> Result<String> {
        let text_expr = match self.resolve(field)? {
            Target::Column(expr) => expr.to_string(),
            Target::Metadata(path) => self.text_path_expr(path),
        };
        let text_ph = self.bind(SqlArg::Text(value.render_text()));
        let Some(number) = value.as_f64() else {
            return Ok(format!("(({text_expr}) COLLATE \"C\" {op} {text_ph})"));
        };
        let number_ph = self.bind(SqlArg::Float(number));
        Ok(format!(
            "(CASE WHEN ({text_expr}) ~ '{NUMERIC_TEXT}' \
             THEN ({text_expr})::double precision {op} {number_ph} \
             ELSE ({text_expr}) COLLATE \"C\" {op} {text_ph} END)"
        ))
    }

    fn compile_group(&mut self, op: &str, children: &[Filter]) -> Result<String> {
        if children.is_empty() {
            return Err(Error::InvalidFilter(format!(
                "{op} requires at least one child"
            )));
        }
        let parts = children
            .iter()
            .map(|child| self.compile(child))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("({})", parts.join(&format!(" {op} "))))
    }

    fn resolve<'f>(&self, field: &'f FieldRef) -> Result<Target<'f>>
    where
        'c: 'f,
    {
        match field {
            FieldRef::Column { name } => self
                .config
                .column_exprs
                .get(name)
                .filter(|expr| !expr.is_empty())
                .map(|expr| Target::Column(expr.as_str()))
                .ok_or_else(|| Error::InvalidFilter(format!("unknown column '{name}'"))),
            FieldRef::Metadata { path } => {
                if self.config.metadata_expr.is_empty() {
                    return Err(Error::InvalidFilter(
                        "metadata expression not configured".into(),
                    ));
                }
                Ok(Target::Metadata(path))
            }
        }
    }

    fn bind(&mut self, arg: SqlArg) -> String {
        let ph = format!("${}", self.next_arg);
        self.next_arg += 1;
        self.args.push(arg);
        ph
    }

    fn bind_jsonb(&mut self, value: &FilterValue) -> Result<String> {
        let json = value.to_json()?;
        Ok(self.bind(SqlArg::Json(json)))
    }

    fn jsonb_path_expr(&self, path: &[String]) -> String {
        format!(
            "({} #> ARRAY[{}])",
            self.config.metadata_expr,
            quoted_path(path)
        )
    }

    fn text_path_expr(&self, path: &[String]) -> String {
        format!(
            "jsonb_extract_path_text({}, {})",
            self.config.metadata_expr,
            quoted_path(path)
        )
    }
}

fn quoted_path(path: &[String]) -> String {
    path.iter()
        .map(String::as_str)
        .map(single_quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
