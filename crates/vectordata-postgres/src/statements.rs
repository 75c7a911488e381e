//! SQL text for writes and index DDL.

use std::collections::HashSet;
use std::fmt::Write as _;

use vectordata_core::{DistanceMetric, IndexMethod, IndexOptions, Record};

use crate::helpers::{metric_opclass, quote_ident};

/// Rows per multi-row `INSERT`: four parameters each, and PostgreSQL
/// accepts at most 65535 per statement.
pub(crate) const MAX_INSERT_ROWS: usize = 65_535 / 4;

const DEFAULT_HNSW_M: u32 = 16;
const DEFAULT_HNSW_EF_CONSTRUCTION: u32 = 64;
const DEFAULT_IVFFLAT_LISTS: u32 = 100;

/// Multi-row `INSERT` for `rows` records, four parameters per row.
///
/// With `upsert` the statement replaces every non-key column on conflict.
pub(crate) fn insert_statement(table: &str, rows: usize, upsert: bool) -> String {
    let mut sql = format!(r#"INSERT INTO {table} ("id", "vector", "metadata", "content") VALUES "#);
    for row in 0..rows {
        let base = row * 4;
        if row > 0 {
            sql.push_str(", ");
        }
        let _ = write!(
            sql,
            "(${}, ${}::vector, ${}::jsonb, ${})",
            base + 1,
            base + 2,
            base + 3,
            base + 4
        );
    }
    if upsert {
        sql.push_str(
            r#" ON CONFLICT ("id") DO UPDATE SET "vector" = EXCLUDED."vector", "metadata" = EXCLUDED."metadata", "content" = EXCLUDED."content""#,
        );
    }
    sql
}

/// Keeps the last occurrence of each ID, in order of those occurrences.
///
/// A single `ON CONFLICT DO UPDATE` statement cannot touch the same row
/// twice, so repeated IDs inside one upsert batch collapse to the last one.
pub(crate) fn last_write_wins(records: &[Record]) -> Vec<&Record> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut kept: Vec<&Record> = records
        .iter()
        .rev()
        .filter(|record| seen.insert(record.id.as_str()))
        .collect();
    kept.reverse();
    kept
}

/// `CREATE INDEX IF NOT EXISTS` statements for the requested indexes.
pub(crate) fn index_statements(
    collection: &str,
    table: &str,
    metric: DistanceMetric,
    options: &IndexOptions,
) -> Vec<String> {
    let mut statements = Vec::new();

    if let Some(vector) = &options.vector {
        let name = explicit_name(vector.name.as_deref()).unwrap_or_else(|| {
            format!("idx_{collection}_vector_{}", vector.method.as_str())
        });
        let opclass = metric_opclass(vector.metric.unwrap_or(metric));
        let with = match vector.method {
            IndexMethod::Hnsw => format!(
                "m = {}, ef_construction = {}",
                or_default(vector.hnsw.m, DEFAULT_HNSW_M),
                or_default(vector.hnsw.ef_construction, DEFAULT_HNSW_EF_CONSTRUCTION)
            ),
            IndexMethod::IvfFlat => format!(
                "lists = {}",
                or_default(vector.ivfflat.lists, DEFAULT_IVFFLAT_LISTS)
            ),
        };
        statements.push(format!(
            r#"CREATE INDEX IF NOT EXISTS {} ON {table} USING {} ("vector" {opclass}) WITH ({with})"#,
            quote_ident(&name),
            vector.method.as_str(),
        ));
    }

    if let Some(metadata) = &options.metadata {
        let name = explicit_name(metadata.name.as_deref())
            .unwrap_or_else(|| format!("idx_{collection}_metadata"));
        let column = if metadata.use_path_ops {
            r#""metadata" jsonb_path_ops"#
        } else {
            r#""metadata""#
        };
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} USING gin ({column})",
            quote_ident(&name)
        ));
    }

    statements
}

fn explicit_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

const fn or_default(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}
