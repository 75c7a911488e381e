//! Identifier quoting, JSON paths, argument binding and row decoding.

use tiberius::{Query, Row};
use vectordata_core::{Error, Result, SqlArg};

/// Quotes an identifier with brackets, doubling embedded `]`.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// `[schema].[table]`
pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// JSON path for metadata segments: `$."a"."b"`.
///
/// Every segment is quoted so keys with dots or spaces address a single
/// member. An empty slice yields the root `$`.
pub(crate) fn json_path(segments: &[String]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        path.push_str(".\"");
        path.push_str(&segment.replace('\\', "\\\\").replace('"', "\\\""));
        path.push('"');
    }
    path
}

/// True for column types that hold text.
pub(crate) fn is_string_type(data_type: &str) -> bool {
    ["nvarchar", "varchar", "nchar", "char", "ntext", "text"]
        .iter()
        .any(|t| data_type.eq_ignore_ascii_case(t))
}

/// Binds one compiled filter argument.
pub(crate) fn bind_arg(query: &mut Query<'_>, arg: &SqlArg) {
    match arg {
        SqlArg::Text(s) => query.bind(s.clone()),
        SqlArg::Float(n) => query.bind(*n),
        SqlArg::Bool(b) => query.bind(*b),
        SqlArg::Json(v) => query.bind(v.to_string()),
        SqlArg::Null => query.bind(Option::<String>::None),
    }
}

/// Reads an optional text column.
pub(crate) fn text_column(row: &Row, column: &str) -> Result<Option<String>> {
    row.try_get::<&str, _>(column)
        .map(|value| value.map(str::to_string))
        .map_err(|e| Error::Serialization(format!("failed to decode column {column}: {e}")))
}

/// Reads a required text column.
pub(crate) fn required_text(row: &Row, column: &str) -> Result<String> {
    text_column(row, column)?
        .ok_or_else(|| Error::Serialization(format!("column {column} is NULL")))
}

/// Pooled client type.
pub(crate) type Connection = <bb8_tiberius::ConnectionManager as bb8::ManageConnection>::Connection;

/// Runs a batch of plain statements and drains every result set.
pub(crate) async fn simple_exec(conn: &mut Connection, sql: &str) -> tiberius::Result<()> {
    conn.simple_query(sql).await?.into_results().await?;
    Ok(())
}
