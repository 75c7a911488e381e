//! Tests for `ranking` module

use crate::pushdown::{compile_restricted, Pushdown};
use crate::ranking::*;
use vectordata_core::{
    CompiledFilter, DistanceMetric, FieldRef, Filter, Projection, SearchOptions, SqlArg,
};

const TABLE: &str = "[dbo].[docs]";

fn no_filter() -> CompiledFilter {
    CompiledFilter {
        next_arg: 3,
        ..CompiledFilter::default()
    }
}

#[test]
fn test_distance_expr_per_metric() {
    assert!(distance_expr(DistanceMetric::Cosine).starts_with("CASE WHEN agg.norm_sq = 0"));
    assert_eq!(distance_expr(DistanceMetric::L2), "SQRT(agg.l2_sq)");
    assert_eq!(distance_expr(DistanceMetric::InnerProduct), "-agg.dot");
}

#[test]
fn test_ranked_query_without_filter() {
    // Arrange
    let options = SearchOptions::default();

    // Act
    let query =
        build_ranked_query(TABLE, DistanceMetric::L2, &[1.0, 0.5], 4, &options, no_filter())
            .unwrap();

    // Assert
    assert!(query.sql.starts_with("WITH q AS (SELECT CAST([key] AS INT) AS idx"));
    assert!(query
        .sql
        .contains("SELECT t.[id], t.[metadata], t.[content], s.distance AS [distance] FROM [dbo].[docs] AS t"));
    assert!(query.sql.contains("FROM OPENJSON(t.[vector]) AS v"));
    assert!(query.sql.contains("CROSS APPLY (SELECT SQRT(agg.l2_sq) AS distance) AS s"));
    assert!(query.sql.ends_with(
        "WHERE agg.dims = @P2 ORDER BY s.distance ASC, t.[id] ASC OFFSET 0 ROWS FETCH NEXT @P3 ROWS ONLY"
    ));
    assert_eq!(query.vector, "[1.0,0.5]");
    assert_eq!(query.dimension, 2);
    assert!(query.args.is_empty());
    assert_eq!(query.top_k, 4);
}

#[test]
fn test_ranked_query_with_filter_threshold_and_projection() {
    // Arrange
    let filter = Filter::gt(FieldRef::metadata(["rank"]), 3);
    let Pushdown::Compiled(compiled) = compile_restricted(Some(&filter), 3).unwrap() else {
        panic!("expected pushdown");
    };
    let options = SearchOptions::default()
        .with_filter(filter)
        .with_threshold(0.25)
        .with_projection(Projection::all());

    // Act
    let query =
        build_ranked_query(TABLE, DistanceMetric::Cosine, &[0.0, 1.0], 10, &options, compiled)
            .unwrap();

    // Assert
    assert!(query
        .sql
        .contains("SELECT t.[id], t.[vector], t.[metadata], t.[content], s.distance"));
    assert!(query.sql.contains(concat!(
        "WHERE agg.dims = @P2 AND (TRY_CONVERT(float, JSON_VALUE([metadata], @P3)) > @P4) ",
        "AND s.distance <= @P5 ORDER BY s.distance ASC, t.[id] ASC OFFSET 0 ROWS FETCH NEXT @P6 ROWS ONLY"
    )));
    assert_eq!(
        query.args,
        vec![
            SqlArg::Text("$.\"rank\"".into()),
            SqlArg::Float(3.0),
            SqlArg::Float(0.25),
        ]
    );
}

#[test]
fn test_ranked_query_rejects_non_finite_vector() {
    let result = build_ranked_query(
        TABLE,
        DistanceMetric::Cosine,
        &[f32::NAN],
        1,
        &SearchOptions::default(),
        no_filter(),
    );
    assert!(result.is_err());
}
