//! Identifier quoting, operator selection and argument binding.

use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use vectordata_core::{
    DistanceMetric, FilterSqlConfig, SqlArg, CONTENT_COLUMN, ID_COLUMN, METADATA_COLUMN,
};

/// Quotes an identifier, doubling embedded double quotes.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"schema"."table"`
pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// pgvector distance operator for a metric.
pub(crate) const fn metric_operator(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "<=>",
        DistanceMetric::L2 => "<->",
        DistanceMetric::InnerProduct => "<#>",
    }
}

/// pgvector index operator class for a metric.
pub(crate) const fn metric_opclass(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "vector_cosine_ops",
        DistanceMetric::L2 => "vector_l2_ops",
        DistanceMetric::InnerProduct => "vector_ip_ops",
    }
}

/// Parses the dimension out of `format_type` output such as `vector(768)`.
pub(crate) fn parse_vector_dimension(formatted: &str) -> Option<usize> {
    formatted
        .trim()
        .strip_prefix("vector(")?
        .strip_suffix(')')?
        .trim()
        .parse()
        .ok()
}

/// Filter compiler settings for the canonical table shape.
pub(crate) fn filter_config() -> FilterSqlConfig {
    FilterSqlConfig::new(quote_ident(METADATA_COLUMN))
        .with_column(ID_COLUMN, quote_ident(ID_COLUMN))
        .with_column(CONTENT_COLUMN, quote_ident(CONTENT_COLUMN))
}

/// Binds one compiled filter argument.
pub(crate) fn bind_arg<'q>(
    query: Query<'q, Postgres, PgArguments>,
    arg: &SqlArg,
) -> Query<'q, Postgres, PgArguments> {
    match arg {
        SqlArg::Text(s) => query.bind(s.clone()),
        SqlArg::Float(n) => query.bind(*n),
        SqlArg::Bool(b) => query.bind(*b),
        SqlArg::Json(v) => query.bind(sqlx::types::Json(v.clone())),
        SqlArg::Null => query.bind(Option::<String>::None),
    }
}

/// Binds every argument in order.
pub(crate) fn bind_args<'q>(
    query: Query<'q, Postgres, PgArguments>,
    args: &[SqlArg],
) -> Query<'q, Postgres, PgArguments> {
    args.iter().fold(query, bind_arg)
}
