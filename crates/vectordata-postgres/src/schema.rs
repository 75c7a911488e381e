//! Collection table lifecycle: create, validate, additively migrate.
//!
//! The table's `vector(N)` type carries the dimension, so nothing else is
//! persisted. The metric is a property of the handle (it selects the
//! operator) and is not stored.

use sqlx::{PgConnection, Row};
use tracing::{debug, info};
use vectordata_core::{EnsureMode, Error, ResolvedSpec, Result};

use crate::helpers::{parse_vector_dimension, quote_ident};

/// One row of `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
}

impl ColumnInfo {
    fn is_text(&self) -> bool {
        matches!(self.data_type.as_str(), "text" | "character varying")
    }
}

/// `CREATE TABLE` for the canonical shape.
pub(crate) fn create_table_statement(table: &str, dimension: usize) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {table} ("id" text PRIMARY KEY, "vector" vector({dimension}) NOT NULL, "metadata" jsonb NOT NULL DEFAULT '{{}}'::jsonb, "content" text)"#
    )
}

/// Checks an existing table and returns the `ALTER TABLE` statements that
/// bring it to the canonical shape.
///
/// Required columns (`id`, `vector`) and the primary key are never
/// repaired. Optional columns (`metadata`, `content`) are added in
/// auto-migrate mode only.
pub(crate) fn plan_column_migration(
    table: &str,
    columns: &[ColumnInfo],
    has_primary_key: bool,
    mode: EnsureMode,
) -> Result<Vec<String>> {
    let find = |name: &str| columns.iter().find(|c| c.name == name);

    match find("id") {
        None => return Err(mismatch(table, "missing column \"id\"")),
        Some(col) if !col.is_text() => {
            return Err(mismatch(
                table,
                &format!("column \"id\" has type {}, expected text", col.data_type),
            ))
        }
        Some(_) => {}
    }
    if !has_primary_key {
        return Err(mismatch(table, "column \"id\" is not the primary key"));
    }
    match find("vector") {
        None => return Err(mismatch(table, "missing column \"vector\"")),
        Some(col) if col.udt_name != "vector" => {
            return Err(mismatch(
                table,
                &format!("column \"vector\" has type {}, expected vector", col.udt_name),
            ))
        }
        Some(_) => {}
    }

    let mut statements = Vec::new();

    match find("metadata") {
        Some(col) if col.udt_name != "jsonb" => {
            return Err(mismatch(
                table,
                &format!("column \"metadata\" has type {}, expected jsonb", col.udt_name),
            ))
        }
        Some(_) => {}
        None if mode == EnsureMode::Strict => {
            return Err(mismatch(table, "missing column \"metadata\""))
        }
        None => statements.push(format!(
            r#"ALTER TABLE {table} ADD COLUMN IF NOT EXISTS "metadata" jsonb NOT NULL DEFAULT '{{}}'::jsonb"#
        )),
    }

    match find("content") {
        Some(col) if !col.is_text() => {
            return Err(mismatch(
                table,
                &format!("column \"content\" has type {}, expected text", col.data_type),
            ))
        }
        Some(_) => {}
        None if mode == EnsureMode::Strict => {
            return Err(mismatch(table, "missing column \"content\""))
        }
        None => statements.push(format!(
            r#"ALTER TABLE {table} ADD COLUMN IF NOT EXISTS "content" text"#
        )),
    }

    Ok(statements)
}

/// Compares the stored `vector(N)` type with the requested dimension.
pub(crate) fn check_dimension(table: &str, formatted: Option<&str>, expected: usize) -> Result<()> {
    let formatted = formatted.ok_or_else(|| mismatch(table, "missing column \"vector\""))?;
    let actual = parse_vector_dimension(formatted).ok_or_else(|| {
        mismatch(
            table,
            &format!("column \"vector\" has type {formatted}, expected vector({expected})"),
        )
    })?;
    if actual != expected {
        return Err(Error::SchemaMismatch(format!(
            "{table}: stored dimension {actual} does not match requested dimension {expected}"
        )));
    }
    Ok(())
}

/// Runs the whole ensure sequence on one connection.
///
/// The caller holds a transaction with an advisory lock on the table name,
/// so concurrent ensures of the same collection run one after another.
pub(crate) async fn ensure_table(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
    spec: &ResolvedSpec,
    ensure_extension: bool,
) -> Result<()> {
    let storage = |e: sqlx::Error| Error::storage("ensure_collection", &spec.name, e);

    if ensure_extension {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
    }
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
        .execute(&mut *conn)
        .await
        .map_err(storage)?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)",
    )
    .bind(schema)
    .bind(&spec.name)
    .fetch_one(&mut *conn)
    .await
    .map_err(storage)?;

    if exists {
        let columns = load_columns(conn, schema, &spec.name).await.map_err(storage)?;
        let has_pk = has_primary_key(conn, schema, &spec.name).await.map_err(storage)?;
        let statements = plan_column_migration(table, &columns, has_pk, spec.mode)?;
        for statement in &statements {
            info!(collection = %spec.name, statement = %statement, "Migrating collection table");
            sqlx::query(statement)
                .execute(&mut *conn)
                .await
                .map_err(storage)?;
        }
        debug!(collection = %spec.name, migrated = statements.len(), "Validated existing table");
    } else {
        sqlx::query(&create_table_statement(table, spec.dimension))
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
        info!(collection = %spec.name, dimension = spec.dimension, "Created collection table");
    }

    let formatted: Option<String> = sqlx::query_scalar(
        "SELECT format_type(a.atttypid, a.atttypmod) FROM pg_attribute a \
         WHERE a.attrelid = to_regclass($1) AND a.attname = 'vector' AND NOT a.attisdropped",
    )
    .bind(table)
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;
    check_dimension(table, formatted.as_deref(), spec.dimension)
}

async fn load_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> std::result::Result<Vec<ColumnInfo>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT column_name::text AS column_name, data_type::text AS data_type, udt_name::text AS udt_name \
         FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                udt_name: row.try_get("udt_name")?,
            })
        })
        .collect()
}

async fn has_primary_key(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> std::result::Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name \
          AND tc.table_schema = kcu.table_schema \
          AND tc.table_name = kcu.table_name \
         WHERE tc.constraint_type = 'PRIMARY KEY' \
           AND tc.table_schema = $1 AND tc.table_name = $2 AND kcu.column_name = 'id')",
    )
    .bind(schema)
    .bind(table)
    .fetch_one(&mut *conn)
    .await
}

fn mismatch(table: &str, detail: &str) -> Error {
    Error::SchemaMismatch(format!("{table}: {detail}"))
}
