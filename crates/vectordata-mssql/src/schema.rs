//! Collection table lifecycle and the collection registry.
//!
//! Vectors are stored as JSON text, so neither the dimension nor the metric
//! can be read back from the column type. Both are persisted in a registry
//! table, one row per collection, in the same schema as the collections.

use std::str::FromStr;

use tiberius::Query;
use tracing::{debug, info};
use vectordata_core::{Context, DistanceMetric, EnsureMode, Error, ResolvedSpec, Result};

use crate::helpers::{is_string_type, qualified_table, quote_ident, simple_exec, Connection};

/// Registry table name.
pub(crate) const REGISTRY_TABLE: &str = "__vector_collections";

/// Collation of the `id` column. Binary, so key identity is the same
/// byte-exact comparison reads and deletes use.
pub(crate) const ID_COLLATION: &str = "Latin1_General_100_BIN2";

/// One row of `INFORMATION_SCHEMA.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub collation: Option<String>,
}

/// What `ensure` does with the registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistryAction {
    Keep,
    Write,
}

/// `CREATE TABLE` for the canonical shape, guarded by `OBJECT_ID`.
pub(crate) fn create_table_statement(table: &str) -> String {
    format!(
        "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {table} ([id] NVARCHAR(255) COLLATE {ID_COLLATION} NOT NULL PRIMARY KEY, [vector] NVARCHAR(MAX) NOT NULL, [metadata] NVARCHAR(MAX) NOT NULL DEFAULT N'{{}}', [content] NVARCHAR(MAX) NULL)",
        table.replace('\'', "''")
    )
}

/// `CREATE TABLE` for the registry, guarded by `OBJECT_ID`.
pub(crate) fn create_registry_statement(schema: &str) -> String {
    let registry = qualified_table(schema, REGISTRY_TABLE);
    format!(
        "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {registry} ([name] NVARCHAR(255) NOT NULL PRIMARY KEY, [dimension] INT NOT NULL, [metric] NVARCHAR(64) NOT NULL)",
        registry.replace('\'', "''")
    )
}

/// Upsert of one registry row: `@P1` name, `@P2` dimension, `@P3` metric.
pub(crate) fn write_registry_statement(schema: &str) -> String {
    format!(
        "MERGE {} WITH (HOLDLOCK) AS r USING (SELECT @P1 AS [name], @P2 AS [dimension], @P3 AS [metric]) AS s ON r.[name] = s.[name] \
         WHEN MATCHED THEN UPDATE SET r.[dimension] = s.[dimension], r.[metric] = s.[metric] \
         WHEN NOT MATCHED THEN INSERT ([name], [dimension], [metric]) VALUES (s.[name], s.[dimension], s.[metric]);",
        qualified_table(schema, REGISTRY_TABLE)
    )
}

/// Checks an existing table and returns the `ALTER TABLE` statements that
/// bring it to the canonical shape.
///
/// Every column must hold text. `id` and `vector` are required, `id` must
/// be the primary key and use a binary collation; `metadata` and `content`
/// are added in auto-migrate mode only.
pub(crate) fn plan_column_migration(
    table: &str,
    columns: &[ColumnInfo],
    has_primary_key: bool,
    mode: EnsureMode,
) -> Result<Vec<String>> {
    let find = |name: &str| columns.iter().find(|c| c.name.eq_ignore_ascii_case(name));
    let check_type = |col: &ColumnInfo| {
        if is_string_type(&col.data_type) {
            Ok(())
        } else {
            Err(mismatch(
                table,
                &format!(
                    "column [{}] has type {}, expected a string type",
                    col.name, col.data_type
                ),
            ))
        }
    };

    for required in ["id", "vector"] {
        let col = find(required)
            .ok_or_else(|| mismatch(table, &format!("missing column [{required}]")))?;
        check_type(col)?;
    }
    if !has_primary_key {
        return Err(mismatch(table, "column [id] is not the primary key"));
    }
    if let Some(id) = find("id") {
        if !id.collation.as_deref().is_some_and(is_binary_collation) {
            return Err(mismatch(
                table,
                &format!(
                    "column [id] uses collation {}, expected a binary collation such as {ID_COLLATION}",
                    id.collation.as_deref().unwrap_or("(none)")
                ),
            ));
        }
    }

    let optional = [
        ("metadata", "NVARCHAR(MAX) NOT NULL DEFAULT N'{}'"),
        ("content", "NVARCHAR(MAX) NULL"),
    ];
    let mut statements = Vec::new();
    for (name, definition) in optional {
        match find(name) {
            Some(col) => check_type(col)?,
            None if mode == EnsureMode::Strict => {
                return Err(mismatch(table, &format!("missing column [{name}]")))
            }
            None => statements.push(format!(
                "ALTER TABLE {table} ADD {} {definition}",
                quote_ident(name)
            )),
        }
    }
    Ok(statements)
}

/// Compares the registry row with the requested spec.
///
/// A missing row is repaired in auto-migrate mode. A stored dimension or
/// metric that disagrees is never corrected.
pub(crate) fn check_registry(
    table: &str,
    stored: Option<(i64, &str)>,
    spec: &ResolvedSpec,
) -> Result<RegistryAction> {
    let Some((dimension, metric)) = stored else {
        return match spec.mode {
            EnsureMode::Strict => Err(mismatch(table, "collection is not registered")),
            EnsureMode::AutoMigrate => Ok(RegistryAction::Write),
        };
    };
    if usize::try_from(dimension).ok() != Some(spec.dimension) {
        return Err(Error::SchemaMismatch(format!(
            "{table}: stored dimension {dimension} does not match requested dimension {}",
            spec.dimension
        )));
    }
    let metric = DistanceMetric::from_str(metric)?;
    if metric != spec.metric {
        return Err(Error::SchemaMismatch(format!(
            "{table}: stored metric {metric} does not match requested metric {}",
            spec.metric
        )));
    }
    Ok(RegistryAction::Keep)
}

/// Runs the whole ensure sequence on one connection.
///
/// The caller holds an open transaction; an application lock on the schema
/// serializes concurrent ensures until it commits. Statements are not raced
/// against `ctx`; cancellation is observed between them so the caller can
/// always roll back.
pub(crate) async fn ensure_table(
    ctx: &Context,
    conn: &mut Connection,
    schema: &str,
    spec: &ResolvedSpec,
) -> Result<()> {
    let storage = |e: tiberius::error::Error| Error::storage("ensure_collection", &spec.name, e);
    let table = qualified_table(schema, &spec.name);

    conn.execute(
        "DECLARE @r INT; EXEC @r = sp_getapplock @Resource = @P1, @LockMode = 'Exclusive', @LockOwner = 'Transaction', @LockTimeout = -1; \
         IF @r < 0 THROW 50000, N'could not acquire the collection lock', 1;",
        &[&format!("vectordata:{schema}")],
    )
    .await
    .map_err(storage)?;
    ctx.check()?;
    conn.execute(
        "IF SCHEMA_ID(@P1) IS NULL BEGIN DECLARE @sql NVARCHAR(MAX) = N'CREATE SCHEMA ' + QUOTENAME(@P1); EXEC(@sql); END",
        &[&schema],
    )
    .await
    .map_err(storage)?;
    simple_exec(conn, &create_registry_statement(schema))
        .await
        .map_err(storage)?;

    let exists = scalar_count(
        conn,
        "SELECT COUNT(1) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2",
        schema,
        &spec.name,
    )
    .await
    .map_err(storage)?
        > 0;
    ctx.check()?;

    let action = if exists {
        let columns = load_columns(conn, schema, &spec.name)
            .await
            .map_err(storage)?;
        let has_pk = scalar_count(
            conn,
            "SELECT COUNT(1) FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
               ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
              AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
              AND tc.TABLE_NAME = kcu.TABLE_NAME \
             WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
               AND tc.TABLE_SCHEMA = @P1 AND tc.TABLE_NAME = @P2 AND kcu.COLUMN_NAME = 'id'",
            schema,
            &spec.name,
        )
        .await
        .map_err(storage)?
            > 0;
        let statements = plan_column_migration(&table, &columns, has_pk, spec.mode)?;
        for statement in &statements {
            ctx.check()?;
            info!(collection = %spec.name, statement = %statement, "Migrating collection table");
            simple_exec(conn, statement).await.map_err(storage)?;
        }
        debug!(collection = %spec.name, migrated = statements.len(), "Validated existing table");

        let stored = read_registry(conn, schema, &spec.name)
            .await
            .map_err(storage)?;
        check_registry(
            &table,
            stored.as_ref().map(|(d, m)| (*d, m.as_str())),
            spec,
        )?
    } else {
        simple_exec(conn, &create_table_statement(&table))
            .await
            .map_err(storage)?;
        info!(collection = %spec.name, dimension = spec.dimension, "Created collection table");
        RegistryAction::Write
    };

    if action == RegistryAction::Write {
        let dimension = i32::try_from(spec.dimension)
            .map_err(|_| Error::SchemaMismatch(format!("dimension {} is too large", spec.dimension)))?;
        let mut query = Query::new(write_registry_statement(schema));
        query.bind(spec.name.clone());
        query.bind(dimension);
        query.bind(spec.metric.as_str());
        query.execute(conn).await.map_err(storage)?;
        info!(collection = %spec.name, metric = %spec.metric, "Registered collection");
    }
    Ok(())
}

async fn scalar_count(
    conn: &mut Connection,
    sql: &str,
    schema: &str,
    table: &str,
) -> tiberius::Result<i32> {
    let row = conn.query(sql, &[&schema, &table]).await?.into_row().await?;
    Ok(row
        .map(|r| r.try_get::<i32, _>(0))
        .transpose()?
        .flatten()
        .unwrap_or(0))
}

async fn load_columns(
    conn: &mut Connection,
    schema: &str,
    table: &str,
) -> tiberius::Result<Vec<ColumnInfo>> {
    let rows = conn
        .query(
            "SELECT COLUMN_NAME, DATA_TYPE, COLLATION_NAME FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2",
            &[&schema, &table],
        )
        .await?
        .into_first_result()
        .await?;

    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                data_type: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
                collation: row.try_get::<&str, _>(2)?.map(str::to_string),
            })
        })
        .collect()
}

async fn read_registry(
    conn: &mut Connection,
    schema: &str,
    name: &str,
) -> tiberius::Result<Option<(i64, String)>> {
    let sql = format!(
        "SELECT [dimension], [metric] FROM {} WHERE [name] = @P1",
        qualified_table(schema, REGISTRY_TABLE)
    );
    let Some(row) = conn.query(sql, &[&name]).await?.into_row().await? else {
        return Ok(None);
    };
    let dimension = row.try_get::<i32, _>(0)?.unwrap_or_default();
    let metric = row.try_get::<&str, _>(1)?.unwrap_or_default().to_string();
    Ok(Some((i64::from(dimension), metric)))
}

/// `_BIN` and `_BIN2` collations compare code points.
pub(crate) fn is_binary_collation(collation: &str) -> bool {
    let upper = collation.to_ascii_uppercase();
    upper.ends_with("_BIN") || upper.ends_with("_BIN2")
}

fn mismatch(table: &str, detail: &str) -> Error {
    Error::SchemaMismatch(format!("{table}: {detail}"))
}
