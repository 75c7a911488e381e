//! Streaming top-K: rows are read one at a time, filtered and scored
//! in-process, and only the `k` best candidates are kept.

use tiberius::Row;
use tracing::warn;
use vectordata_core::{
    decode_vector, parse_metadata, Candidate, CompiledFilter, DistanceMetric, Error, Projection,
    Record, RecordMatcher, Result, SearchResult, TopK, CONTENT_COLUMN, ID_COLUMN,
    METADATA_COLUMN, VECTOR_COLUMN,
};

use crate::helpers::{quote_ident, required_text, text_column};

/// `SELECT` over the collection with an optional pushed-down predicate.
pub(crate) fn scan_statement(table: &str, with_vector: bool, filter: &CompiledFilter) -> String {
    let mut columns = vec![quote_ident(ID_COLUMN)];
    if with_vector {
        columns.push(quote_ident(VECTOR_COLUMN));
    }
    columns.push(quote_ident(METADATA_COLUMN));
    columns.push(quote_ident(CONTENT_COLUMN));

    let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filter.sql);
    }
    sql
}

/// Fills the optional fields of `record` selected by `projection`.
pub(crate) fn decode_columns(row: &Row, projection: Projection, record: &mut Record) -> Result<()> {
    if projection.include_vector {
        if let Some(raw) = text_column(row, VECTOR_COLUMN)? {
            record.vector = decode_vector(&raw)?;
        }
    }
    if projection.include_metadata {
        if let Some(raw) = text_column(row, METADATA_COLUMN)? {
            record.metadata = parse_metadata(&raw)?;
        }
    }
    if projection.include_content {
        record.content = text_column(row, CONTENT_COLUMN)?;
    }
    Ok(())
}

/// Decodes a row produced by [`scan_statement`].
pub(crate) fn decode_scan_row(row: &Row, with_vector: bool) -> Result<Record> {
    let mut record = Record::new(required_text(row, ID_COLUMN)?, Vec::new());
    let projection = Projection {
        include_vector: with_vector,
        ..Projection::all()
    };
    decode_columns(row, projection, &mut record)?;
    Ok(record)
}

/// Bounded in-process ranking of streamed records.
#[derive(Debug)]
pub(crate) struct StreamingRanker<'a> {
    collection: &'a str,
    query: &'a [f32],
    metric: DistanceMetric,
    threshold: Option<f64>,
    matcher: RecordMatcher,
    top: TopK,
    scanned: usize,
}

impl<'a> StreamingRanker<'a> {
    pub(crate) fn new(
        collection: &'a str,
        query: &'a [f32],
        metric: DistanceMetric,
        top_k: usize,
        threshold: Option<f64>,
        matcher: RecordMatcher,
    ) -> Self {
        Self {
            collection,
            query,
            metric,
            threshold,
            matcher,
            top: TopK::new(top_k),
            scanned: 0,
        }
    }

    /// Filters, scores and offers one record.
    ///
    /// A stored vector of the wrong length fails the whole search.
    pub(crate) fn offer(&mut self, record: Record) -> Result<()> {
        self.scanned += 1;
        if !self.matcher.matches(&record) {
            return Ok(());
        }
        if record.vector.len() != self.query.len() {
            warn!(
                collection = %self.collection,
                id = %record.id,
                expected = self.query.len(),
                actual = record.vector.len(),
                "Stored vector has the wrong dimension"
            );
            return Err(Error::DimensionMismatch {
                expected: self.query.len(),
                actual: record.vector.len(),
            });
        }
        let distance = self.metric.distance(self.query, &record.vector)?;
        if self.threshold.is_some_and(|t| distance > t) {
            return Ok(());
        }
        self.top.push(Candidate { distance, record });
        Ok(())
    }

    /// Rows offered so far.
    pub(crate) fn scanned(&self) -> usize {
        self.scanned
    }

    /// Best-first results with `projection` applied.
    pub(crate) fn finish(self, projection: Projection) -> Vec<SearchResult> {
        let metric = self.metric;
        self.top
            .into_sorted_vec()
            .into_iter()
            .map(|candidate| {
                let mut record = candidate.record;
                projection.apply(&mut record);
                SearchResult {
                    record,
                    distance: candidate.distance,
                    score: metric.score(candidate.distance),
                }
            })
            .collect()
    }
}
