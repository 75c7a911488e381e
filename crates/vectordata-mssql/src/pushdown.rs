//! Restricted filter pushdown for SQL Server.
//!
//! SQL Server can navigate JSON with `JSON_VALUE`, `JSON_PATH_EXISTS` and
//! `OPENJSON`, but has no typed JSON equality and compares text under the
//! column collation. The compiler therefore accepts only the shapes it can
//! express with exactly the in-process semantics and returns a
//! [`Pushdown::Unsupported`] verdict for everything else. The caller then
//! plans a streaming scan instead; the verdict is never surfaced as an
//! error.
//!
//! | Node                       | Pushed down as                                  |
//! |----------------------------|-------------------------------------------------|
//! | column `=` / `IN` string   | exact binary text equality                      |
//! | column `>` / `<`           | refused                                         |
//! | metadata `=` / `IN` scalar | `OPENJSON` lookup checking the JSON value type  |
//! | metadata `=` null          | refused                                         |
//! | metadata `>` / `<` number  | `TRY_CONVERT(float, JSON_VALUE(..))`            |
//! | metadata `>` / `<` other   | refused                                         |
//! | `EXISTS`                   | `IS NOT NULL` / `JSON_PATH_EXISTS`              |
//! | `NOT`                      | `CASE WHEN .. THEN 0 ELSE 1 END = 1`            |

use vectordata_core::{
    CompiledFilter, Error, FieldRef, Filter, FilterValue, Result, SqlArg, CONTENT_COLUMN,
    ID_COLUMN, METADATA_COLUMN,
};

use crate::helpers::{json_path, quote_ident};

/// Feasibility verdict of the restricted compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum Pushdown {
    /// The filter runs inside SQL Server.
    Compiled(CompiledFilter),
    /// The filter must be evaluated in-process; carries the reason.
    Unsupported(String),
}

/// Compiles `filter` into a T-SQL fragment whose `@P` placeholders start at
/// `start_arg` (clamped to 1).
///
/// # Errors
///
/// Returns [`Error::InvalidFilter`] for a malformed tree or an unknown
/// column. Shapes that are valid but not expressible are reported through
/// [`Pushdown::Unsupported`], not as errors.
pub fn compile_restricted(filter: Option<&Filter>, start_arg: usize) -> Result<Pushdown> {
    let start_arg = start_arg.max(1);
    let Some(filter) = filter else {
        return Ok(Pushdown::Compiled(CompiledFilter {
            next_arg: start_arg,
            ..CompiledFilter::default()
        }));
    };

    let normalized = filter.normalize()?;
    let mut compiler = RestrictedCompiler {
        args: Vec::new(),
        next_arg: start_arg,
    };
    match compiler.compile(&normalized) {
        Ok(sql) => Ok(Pushdown::Compiled(CompiledFilter {
            sql,
            args: compiler.args,
            next_arg: compiler.next_arg,
        })),
        Err(Failure::Refused(reason)) => Ok(Pushdown::Unsupported(reason)),
        Err(Failure::Invalid(err)) => Err(err),
    }
}

enum Failure {
    Invalid(Error),
    Refused(String),
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::Invalid(err)
    }
}

type Step<T> = std::result::Result<T, Failure>;

fn refuse<T>(reason: impl Into<String>) -> Step<T> {
    Err(Failure::Refused(reason.into()))
}

struct RestrictedCompiler {
    args: Vec<SqlArg>,
    next_arg: usize,
}

impl RestrictedCompiler {
    fn compile(&mut self, filter: &Filter) -> Step<String> {
        match filter {
            Filter::Eq { field, value } => self.compile_eq(field, value),
            Filter::In { field, values } => {
                let parts = values
                    .iter()
                    .map(|value| self.compile_eq(field, value))
                    .collect::<Step<Vec<_>>>()?;
                Ok(format!("({})", parts.join(" OR ")))
            }
            Filter::Gt { field, value } => self.compile_range(field, value, ">"),
            Filter::Lt { field, value } => self.compile_range(field, value, "<"),
            Filter::Exists { field } => match field {
                FieldRef::Column { name } => Ok(format!("({} IS NOT NULL)", column_expr(name)?)),
                FieldRef::Metadata { path } => {
                    let ph = self.bind(SqlArg::Text(json_path(path)));
                    Ok(format!("(JSON_PATH_EXISTS({}, {ph}) = 1)", metadata_expr()))
                }
            },
            Filter::And { children } => self.compile_group("AND", children),
            Filter::Or { children } => self.compile_group("OR", children),
            // A leaf over a missing value is UNKNOWN, which the evaluator
            // treats as no-match; `CASE` folds it to false before negating.
            Filter::Not { child } => Ok(format!(
                "(CASE WHEN {} THEN 0 ELSE 1 END = 1)",
                self.compile(child)?
            )),
        }
    }

    fn compile_eq(&mut self, field: &FieldRef, value: &FilterValue) -> Step<String> {
        match field {
            FieldRef::Column { name } => {
                let expr = column_expr(name)?;
                let FilterValue::String(text) = value else {
                    return refuse(format!("column '{name}' compared with a non-string value"));
                };
                let ph = self.bind(SqlArg::Text(text.clone()));
                Ok(exact_text_eq(&expr, &ph))
            }
            FieldRef::Metadata { path } => self.compile_metadata_eq(path, value),
        }
    }

    /// Looks the leaf up in its parent object with `OPENJSON`, which reports
    /// the JSON type of each member, so `"1"` never equals `1`.
    fn compile_metadata_eq(&mut self, path: &[String], value: &FilterValue) -> Step<String> {
        let (condition, arg) = match value {
            FilterValue::Null => return refuse("metadata equality with null"),
            FilterValue::String(s) => (
                "j.[type] = 1 AND ".to_string() + &exact_text_eq("j.[value]", "{value}"),
                SqlArg::Text(s.clone()),
            ),
            FilterValue::Number(n) => (
                "j.[type] = 2 AND TRY_CONVERT(float, j.[value]) = {value}".to_string(),
                SqlArg::Float(*n),
            ),
            FilterValue::Bool(b) => (
                "j.[type] = 3 AND j.[value] = {value}".to_string(),
                SqlArg::Text(b.to_string()),
            ),
        };

        let Some((leaf, parent)) = path.split_last() else {
            return Err(Failure::Invalid(Error::InvalidFilter(
                "metadata path is empty".into(),
            )));
        };
        let parent_ph = self.bind(SqlArg::Text(json_path(parent)));
        let key_ph = self.bind(SqlArg::Text(leaf.clone()));
        let value_ph = self.bind(arg);
        let parent_doc = format!("JSON_QUERY({}, {parent_ph})", metadata_expr());
        Ok(format!(
            "(EXISTS (SELECT 1 FROM OPENJSON({parent_doc}) AS j WHERE LEFT({parent_doc}, 1) = N'{{' AND j.[key] = {key_ph} AND {}))",
            condition.replace("{value}", &value_ph)
        ))
    }

    fn compile_range(&mut self, field: &FieldRef, value: &FilterValue, op: &str) -> Step<String> {
        match field {
            FieldRef::Column { name } => {
                column_expr(name)?;
                refuse(format!("ordering on column '{name}' depends on collation"))
            }
            FieldRef::Metadata { path } => {
                let FilterValue::Number(n) = value else {
                    return refuse("metadata ordering against a non-numeric value");
                };
                let path_ph = self.bind(SqlArg::Text(json_path(path)));
                let value_ph = self.bind(SqlArg::Float(*n));
                Ok(format!(
                    "(TRY_CONVERT(float, JSON_VALUE({}, {path_ph})) {op} {value_ph})",
                    metadata_expr()
                ))
            }
        }
    }

    fn compile_group(&mut self, op: &str, children: &[Filter]) -> Step<String> {
        if children.is_empty() {
            return Err(Failure::Invalid(Error::InvalidFilter(format!(
                "{op} requires at least one child"
            ))));
        }
        let parts = children
            .iter()
            .map(|child| self.compile(child))
            .collect::<Step<Vec<_>>>()?;
        Ok(format!("({})", parts.join(&format!(" {op} "))))
    }

    fn bind(&mut self, arg: SqlArg) -> String {
        let ph = format!("@P{}", self.next_arg);
        self.next_arg += 1;
        self.args.push(arg);
        ph
    }
}

fn column_expr(name: &str) -> Step<String> {
    if name == ID_COLUMN || name == CONTENT_COLUMN {
        Ok(quote_ident(name))
    } else {
        Err(Failure::Invalid(Error::InvalidFilter(format!(
            "unknown column '{name}'"
        ))))
    }
}

fn metadata_expr() -> String {
    quote_ident(METADATA_COLUMN)
}

/// Text equality that ignores neither case nor trailing spaces.
pub(crate) fn exact_text_eq(lhs: &str, rhs: &str) -> String {
    format!(
        "({lhs} = {rhs} AND CAST(CAST({lhs} AS NVARCHAR(MAX)) AS VARBINARY(MAX)) = CAST(CAST({rhs} AS NVARCHAR(MAX)) AS VARBINARY(MAX)))"
    )
}
