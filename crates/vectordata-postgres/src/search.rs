//! Native pushdown search plans.
//!
//! One statement does everything: the pgvector operator computes the
//! distance, the compiled filter and the optional threshold go into `WHERE`,
//! and the engine orders and limits. Rows come back already ranked.

use sqlx::postgres::PgRow;
use sqlx::Row;
use vectordata_core::{
    compile_filter_sql, decode_vector, encode_vector, parse_metadata, DistanceMetric, Error,
    Projection, Record, Result, SearchOptions, SearchResult, SqlArg,
};

use crate::helpers::{filter_config, metric_operator};

/// A ready-to-bind search statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SearchPlan {
    /// Statement text.
    pub sql: String,
    /// Arguments `$1..$n-1`; `$1` is the query vector.
    pub args: Vec<SqlArg>,
    /// Bound last, as `$n`.
    pub limit: i64,
}

/// Builds the ranked, filtered, limited retrieval for one query vector.
pub(crate) fn build_search_plan(
    table: &str,
    metric: DistanceMetric,
    vector: &[f32],
    top_k: usize,
    options: &SearchOptions,
) -> Result<SearchPlan> {
    let distance_expr = format!(r#"("vector" {} $1::vector)"#, metric_operator(metric));

    let projection = options.projection;
    let mut columns = vec![r#""id""#.to_string()];
    if projection.include_vector {
        columns.push(r#""vector"::text AS "vector""#.to_string());
    }
    if projection.include_metadata {
        columns.push(r#""metadata"::text AS "metadata""#.to_string());
    }
    if projection.include_content {
        columns.push(r#""content""#.to_string());
    }
    columns.push(format!("{distance_expr} AS distance"));

    let mut args = vec![SqlArg::Text(encode_vector(vector)?)];
    let mut predicates = Vec::new();

    let compiled = compile_filter_sql(options.filter.as_ref(), &filter_config(), 2)?;
    let mut next_arg = compiled.next_arg;
    if !compiled.is_empty() {
        predicates.push(compiled.sql);
        args.extend(compiled.args);
    }

    if let Some(threshold) = options.threshold {
        predicates.push(format!("({distance_expr} <= ${next_arg})"));
        args.push(SqlArg::Float(threshold));
        next_arg += 1;
    }

    let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    sql.push_str(&format!(
        r#" ORDER BY distance ASC, "id" ASC LIMIT ${next_arg}"#
    ));

    Ok(SearchPlan {
        sql,
        args,
        limit: i64::try_from(top_k).unwrap_or(i64::MAX),
    })
}

/// Decodes one search row according to the projection.
pub(crate) fn decode_search_row(
    row: &PgRow,
    projection: Projection,
    metric: DistanceMetric,
) -> Result<SearchResult> {
    let distance: f64 = row.try_get("distance").map_err(decode_error)?;
    let mut record = Record::new(row.try_get::<String, _>("id").map_err(decode_error)?, Vec::new());
    if projection.include_vector {
        let text: String = row.try_get("vector").map_err(decode_error)?;
        record.vector = decode_vector(&text)?;
    }
    if projection.include_metadata {
        let text: Option<String> = row.try_get("metadata").map_err(decode_error)?;
        record.metadata = parse_metadata(text.as_deref().unwrap_or_default())?;
    }
    if projection.include_content {
        record.content = row.try_get("content").map_err(decode_error)?;
    }
    Ok(SearchResult {
        record,
        distance,
        score: metric.score(distance),
    })
}

/// Decodes a full row selected by `SELECT_ALL_COLUMNS`.
pub(crate) fn decode_record(row: &PgRow) -> Result<Record> {
    let vector: String = row.try_get("vector").map_err(decode_error)?;
    let metadata: Option<String> = row.try_get("metadata").map_err(decode_error)?;
    Ok(Record {
        id: row.try_get("id").map_err(decode_error)?,
        vector: decode_vector(&vector)?,
        metadata: parse_metadata(metadata.as_deref().unwrap_or_default())?,
        content: row.try_get("content").map_err(decode_error)?,
    })
}

/// Column list that materializes a whole record.
pub(crate) const SELECT_ALL_COLUMNS: &str =
    r#""id", "vector"::text AS "vector", "metadata"::text AS "metadata", "content""#;

fn decode_error(err: sqlx::Error) -> Error {
    Error::Serialization(format!("failed to decode row: {err}"))
}
