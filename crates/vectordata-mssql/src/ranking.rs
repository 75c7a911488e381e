//! Server-side ranking over JSON-encoded vectors.
//!
//! SQL Server has no vector type, so vectors are stored as JSON arrays and
//! exploded with `OPENJSON`. The query vector is bound once (`@P1`) and
//! joined by element index against every stored vector; the dot product,
//! squared norm and squared L2 sum are aggregated per row and the metric
//! expression is applied to the aggregates.

use tiberius::Row;
use vectordata_core::{
    encode_vector, CompiledFilter, DistanceMetric, Error, Projection, Record, Result,
    SearchOptions, SearchResult, SqlArg, CONTENT_COLUMN, ID_COLUMN, METADATA_COLUMN,
    VECTOR_COLUMN,
};

use crate::helpers::{quote_ident, required_text};
use crate::streaming::decode_columns;

/// A ranked search statement and its bind values, in placeholder order:
/// `vector`, `dimension`, `args...`, `top_k`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RankedQuery {
    pub sql: String,
    pub vector: String,
    pub dimension: i64,
    pub args: Vec<SqlArg>,
    pub top_k: i64,
}

/// Distance expression over the `agg` and `qn` aggregates.
pub(crate) const fn distance_expr(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => {
            "CASE WHEN agg.norm_sq = 0 OR qn.norm = 0 THEN 1.0 ELSE 1.0 - agg.dot / (SQRT(agg.norm_sq) * qn.norm) END"
        }
        DistanceMetric::L2 => "SQRT(agg.l2_sq)",
        DistanceMetric::InnerProduct => "-agg.dot",
    }
}

/// Builds the ranked statement. `filter` must have been compiled with
/// placeholders starting at `@P3`.
pub(crate) fn build_ranked_query(
    table: &str,
    metric: DistanceMetric,
    vector: &[f32],
    top_k: usize,
    options: &SearchOptions,
    filter: CompiledFilter,
) -> Result<RankedQuery> {
    let dimension = i64::try_from(vector.len())
        .map_err(|_| Error::Validation("query vector is too long".into()))?;
    let top_k = i64::try_from(top_k)
        .map_err(|_| Error::Validation("top_k is too large".into()))?;
    let mut args = filter.args;
    let mut next_arg = filter.next_arg.max(3);

    let mut columns = vec![format!("t.{}", quote_ident(ID_COLUMN))];
    for (included, column) in projected_columns(options.projection) {
        if included {
            columns.push(format!("t.{}", quote_ident(column)));
        }
    }

    let mut sql = format!(
        concat!(
            "WITH q AS (SELECT CAST([key] AS INT) AS idx, CAST([value] AS FLOAT) AS val FROM OPENJSON(@P1)), ",
            "qn AS (SELECT SQRT(SUM(val * val)) AS norm FROM q) ",
            "SELECT {columns}, s.distance AS [distance] FROM {table} AS t ",
            "CROSS APPLY (SELECT COUNT(*) AS dims, ",
            "SUM(CAST(v.[value] AS FLOAT) * q.val) AS dot, ",
            "SUM(CAST(v.[value] AS FLOAT) * CAST(v.[value] AS FLOAT)) AS norm_sq, ",
            "SUM(SQUARE(CAST(v.[value] AS FLOAT) - q.val)) AS l2_sq ",
            "FROM OPENJSON(t.{vector}) AS v LEFT JOIN q ON q.idx = CAST(v.[key] AS INT)) AS agg ",
            "CROSS JOIN qn ",
            "CROSS APPLY (SELECT {distance} AS distance) AS s ",
            "WHERE agg.dims = @P2"
        ),
        columns = columns.join(", "),
        table = table,
        vector = quote_ident(VECTOR_COLUMN),
        distance = distance_expr(metric),
    );
    if !filter.sql.is_empty() {
        sql.push_str(" AND ");
        sql.push_str(&filter.sql);
    }
    if let Some(threshold) = options.threshold {
        sql.push_str(&format!(" AND s.distance <= @P{next_arg}"));
        args.push(SqlArg::Float(threshold));
        next_arg += 1;
    }
    sql.push_str(&format!(
        " ORDER BY s.distance ASC, t.{} ASC OFFSET 0 ROWS FETCH NEXT @P{next_arg} ROWS ONLY",
        quote_ident(ID_COLUMN)
    ));

    Ok(RankedQuery {
        sql,
        vector: encode_vector(vector)?,
        dimension,
        args,
        top_k,
    })
}

fn projected_columns(projection: Projection) -> [(bool, &'static str); 3] {
    [
        (projection.include_vector, VECTOR_COLUMN),
        (projection.include_metadata, METADATA_COLUMN),
        (projection.include_content, CONTENT_COLUMN),
    ]
}

/// Decodes one ranked row.
pub(crate) fn decode_ranked_row(
    row: &Row,
    projection: Projection,
    metric: DistanceMetric,
) -> Result<SearchResult> {
    let id = required_text(row, ID_COLUMN)?;
    let mut record = Record::new(id, Vec::new());
    decode_columns(row, projection, &mut record)?;
    let distance = row
        .try_get::<f64, _>("distance")
        .map_err(|e| Error::Serialization(format!("failed to decode distance: {e}")))?
        .ok_or_else(|| Error::Serialization("distance is NULL".into()))?;
    Ok(SearchResult {
        record,
        distance,
        score: metric.score(distance),
    })
}
