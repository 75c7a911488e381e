//! `Collection` over one SQL Server table.
//!
//! Search and count choose a plan per call. A filter the restricted
//! compiler accepts runs inside SQL Server; any other filter is evaluated
//! in-process over a streamed scan.

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_tiberius::ConnectionManager;
use futures::TryStreamExt;
use tiberius::Query;
use tracing::{debug, instrument, warn};
use vectordata_core::{
    encode_vector, validate_dimension, validate_records, validate_top_k, Collection,
    CompiledFilter, Context, DistanceMetric, Error, Filter, IndexOptions, Record, RecordMatcher,
    Result, SearchOptions, SearchResult,
};

use crate::helpers::{bind_arg, qualified_table, simple_exec, Connection};
use crate::pushdown::{compile_restricted, Pushdown};
use crate::ranking::{build_ranked_query, decode_ranked_row};
use crate::statements::{
    delete_statement, get_statement, insert_statement, upsert_statement, BEGIN_WRITE, COMMIT,
    MAX_DELETE_IDS, MAX_INSERT_ROWS, ROLLBACK_IF_OPEN,
};
use crate::store::StoreOptions;
use crate::streaming::{decode_scan_row, scan_statement, StreamingRanker};

/// Placeholder of the first filter argument in a ranked query.
const RANKED_FILTER_START: usize = 3;

/// Handle to a collection table. Cheap to clone.
#[derive(Clone)]
pub struct MssqlCollection {
    pool: Pool<ConnectionManager>,
    name: String,
    table: String,
    dimension: usize,
    metric: DistanceMetric,
    batch_size: usize,
    server_side_search: bool,
}

impl std::fmt::Debug for MssqlCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlCollection")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

struct EncodedRow<'a> {
    id: &'a str,
    vector: String,
    metadata: String,
    content: Option<&'a str>,
}

impl MssqlCollection {
    pub(crate) fn new(
        pool: Pool<ConnectionManager>,
        options: &StoreOptions,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            pool,
            name: name.to_string(),
            table: qualified_table(&options.schema, name),
            dimension,
            metric,
            batch_size: options.batch_size.max(1),
            server_side_search: options.server_side_search,
        }
    }

    /// Fully qualified, bracket-quoted table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn connection(
        &self,
        ctx: &Context,
        operation: &'static str,
    ) -> Result<PooledConnection<'_, ConnectionManager>> {
        ctx.run(async {
            self.pool
                .get()
                .await
                .map_err(|e| Error::storage(operation, &self.name, e))
        })
        .await
    }

    fn storage(&self, operation: &'static str) -> impl Fn(tiberius::error::Error) -> Error + '_ {
        move |e| Error::storage(operation, &self.name, e)
    }

    /// Writes `records` one transaction per chunk. A failed chunk is rolled
    /// back; chunks committed before it stay committed.
    async fn write(
        &self,
        ctx: &Context,
        records: &[Record],
        upsert: bool,
        operation: &'static str,
    ) -> Result<()> {
        validate_records(records, self.dimension)?;
        let rows = records
            .iter()
            .map(|record| {
                Ok(EncodedRow {
                    id: &record.id,
                    vector: encode_vector(&record.vector)?,
                    metadata: serde_json::to_string(&record.metadata)?,
                    content: record.content.as_deref(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let chunk_size = if upsert {
            self.batch_size
        } else {
            self.batch_size.min(MAX_INSERT_ROWS)
        };
        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            ctx.check()?;
            let mut conn = self.connection(ctx, operation).await?;
            simple_exec(&mut conn, BEGIN_WRITE)
                .await
                .map_err(self.storage(operation))?;
            let written = self
                .write_chunk(ctx, &mut conn, chunk, upsert, operation)
                .await;
            if let Err(err) = written {
                if let Err(rollback) = simple_exec(&mut conn, ROLLBACK_IF_OPEN).await {
                    warn!(collection = %self.name, error = %rollback, "Rollback failed");
                }
                warn!(collection = %self.name, chunk = index, error = %err, "Write chunk rejected");
                return Err(err);
            }
            debug!(collection = %self.name, chunk = index, rows = chunk.len(), "Wrote chunk");
        }
        Ok(())
    }

    /// Runs inside an open transaction and commits it. Statements are not
    /// raced against `ctx`, so the caller can always roll back.
    async fn write_chunk(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        chunk: &[EncodedRow<'_>],
        upsert: bool,
        operation: &'static str,
    ) -> Result<()> {
        if upsert {
            let sql = upsert_statement(&self.table);
            for row in chunk {
                ctx.check()?;
                let mut query = Query::new(sql.as_str());
                bind_row(&mut query, row);
                query
                    .execute(&mut *conn)
                    .await
                    .map_err(self.storage(operation))?;
            }
        } else {
            ctx.check()?;
            let sql = insert_statement(&self.table, chunk.len());
            let mut query = Query::new(sql.as_str());
            for row in chunk {
                bind_row(&mut query, row);
            }
            query
                .execute(&mut *conn)
                .await
                .map_err(self.storage(operation))?;
        }
        simple_exec(conn, COMMIT)
            .await
            .map_err(self.storage(operation))
    }

    async fn search_ranked(
        &self,
        ctx: &Context,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
        filter: CompiledFilter,
    ) -> Result<Vec<SearchResult>> {
        let plan = build_ranked_query(&self.table, self.metric, vector, top_k, options, filter)?;
        debug!(collection = %self.name, plan = "ranked", sql = %plan.sql, "Planned search");

        ctx.run(async {
            let mut conn = self.connection(ctx, "search").await?;
            let mut query = Query::new(plan.sql.as_str());
            query.bind(plan.vector.as_str());
            query.bind(plan.dimension);
            for arg in &plan.args {
                bind_arg(&mut query, arg);
            }
            query.bind(plan.top_k);
            let rows = query
                .query(&mut *conn)
                .await
                .map_err(self.storage("search"))?
                .into_first_result()
                .await
                .map_err(self.storage("search"))?;
            rows.iter()
                .map(|row| decode_ranked_row(row, options.projection, self.metric))
                .collect()
        })
        .await
    }

    async fn search_streaming(
        &self,
        ctx: &Context,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
        filter: CompiledFilter,
        matcher: RecordMatcher,
    ) -> Result<Vec<SearchResult>> {
        let sql = scan_statement(&self.table, true, &filter);
        debug!(collection = %self.name, plan = "streaming", sql = %sql, "Planned search");

        ctx.run(async {
            let mut conn = self.connection(ctx, "search").await?;
            let mut query = Query::new(sql.as_str());
            for arg in &filter.args {
                bind_arg(&mut query, arg);
            }
            let mut rows = query
                .query(&mut *conn)
                .await
                .map_err(self.storage("search"))?
                .into_row_stream();

            let mut ranker = StreamingRanker::new(
                &self.name,
                vector,
                self.metric,
                top_k,
                options.threshold,
                matcher,
            );
            while let Some(row) = rows.try_next().await.map_err(self.storage("search"))? {
                ctx.check()?;
                ranker.offer(decode_scan_row(&row, true)?)?;
            }
            debug!(collection = %self.name, scanned = ranker.scanned(), "Streamed search");
            Ok(ranker.finish(options.projection))
        })
        .await
    }

    async fn count_streaming(&self, ctx: &Context, matcher: RecordMatcher) -> Result<u64> {
        let sql = scan_statement(&self.table, false, &CompiledFilter::default());
        ctx.run(async {
            let mut conn = self.connection(ctx, "count").await?;
            let mut rows = conn
                .simple_query(sql.as_str())
                .await
                .map_err(self.storage("count"))?
                .into_row_stream();
            let mut count = 0_u64;
            while let Some(row) = rows.try_next().await.map_err(self.storage("count"))? {
                ctx.check()?;
                if matcher.matches(&decode_scan_row(&row, false)?) {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
    }
}

fn bind_row<'a>(query: &mut Query<'a>, row: &'a EncodedRow<'_>) {
    query.bind(row.id);
    query.bind(row.vector.as_str());
    query.bind(row.metadata.as_str());
    query.bind(row.content);
}

#[async_trait]
impl Collection for MssqlCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[instrument(
        skip(self, ctx, records),
        fields(backend = "mssql", collection = %self.name, operation = "insert", count = records.len())
    )]
    async fn insert(&self, ctx: &Context, records: &[Record]) -> Result<()> {
        self.write(ctx, records, false, "insert").await
    }

    #[instrument(
        skip(self, ctx, records),
        fields(backend = "mssql", collection = %self.name, operation = "upsert", count = records.len())
    )]
    async fn upsert(&self, ctx: &Context, records: &[Record]) -> Result<()> {
        self.write(ctx, records, true, "upsert").await
    }

    #[instrument(skip(self, ctx), fields(backend = "mssql", collection = %self.name, operation = "get"))]
    async fn get(&self, ctx: &Context, id: &str) -> Result<Record> {
        let sql = get_statement(&self.table);
        let row = ctx
            .run(async {
                let mut conn = self.connection(ctx, "get").await?;
                let row = conn
                    .query(sql.as_str(), &[&id])
                    .await
                    .map_err(self.storage("get"))?
                    .into_row()
                    .await
                    .map_err(self.storage("get"));
                row
            })
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        decode_scan_row(&row, true)
    }

    #[instrument(
        skip(self, ctx, ids),
        fields(backend = "mssql", collection = %self.name, operation = "delete", count = ids.len())
    )]
    async fn delete(&self, ctx: &Context, ids: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_DELETE_IDS) {
            let sql = delete_statement(&self.table, chunk.len());
            deleted += ctx
                .run(async {
                    let mut conn = self.connection(ctx, "delete").await?;
                    let mut query = Query::new(sql.as_str());
                    for id in chunk {
                        query.bind(id.as_str());
                    }
                    let result = query
                        .execute(&mut *conn)
                        .await
                        .map_err(self.storage("delete"))?;
                    Ok(result.total())
                })
                .await?;
        }
        Ok(deleted)
    }

    #[instrument(skip(self, ctx, filter), fields(backend = "mssql", collection = %self.name, operation = "count"))]
    async fn count(&self, ctx: &Context, filter: Option<&Filter>) -> Result<u64> {
        let compiled = match compile_restricted(filter, 1)? {
            Pushdown::Compiled(compiled) => compiled,
            Pushdown::Unsupported(reason) => {
                warn!(collection = %self.name, reason = %reason, "Filter not pushed down, counting in-process");
                return self.count_streaming(ctx, RecordMatcher::new(filter)?).await;
            }
        };

        let mut sql = format!("SELECT COUNT_BIG(*) FROM {}", self.table);
        if !compiled.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&compiled.sql);
        }
        let count = ctx
            .run(async {
                let mut conn = self.connection(ctx, "count").await?;
                let mut query = Query::new(sql.as_str());
                for arg in &compiled.args {
                    bind_arg(&mut query, arg);
                }
                let row = query
                    .query(&mut *conn)
                    .await
                    .map_err(self.storage("count"))?
                    .into_row()
                    .await
                    .map_err(self.storage("count"))?;
                Ok(row
                    .map(|r| r.try_get::<i64, _>(0))
                    .transpose()
                    .map_err(self.storage("count"))?
                    .flatten()
                    .unwrap_or(0))
            })
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(
        skip(self, ctx, vector, options),
        fields(backend = "mssql", collection = %self.name, operation = "search")
    )]
    async fn search_by_vector(
        &self,
        ctx: &Context,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        validate_top_k(top_k)?;
        validate_dimension(vector, self.dimension)?;

        let start = if self.server_side_search {
            RANKED_FILTER_START
        } else {
            1
        };
        match compile_restricted(options.filter.as_ref(), start)? {
            Pushdown::Compiled(filter) if self.server_side_search => {
                self.search_ranked(ctx, vector, top_k, options, filter).await
            }
            Pushdown::Compiled(filter) => {
                self.search_streaming(ctx, vector, top_k, options, filter, RecordMatcher::default())
                    .await
            }
            Pushdown::Unsupported(reason) => {
                warn!(collection = %self.name, reason = %reason, "Filter not pushed down, searching in-process");
                let matcher = RecordMatcher::new(options.filter.as_ref())?;
                self.search_streaming(
                    ctx,
                    vector,
                    top_k,
                    options,
                    CompiledFilter::default(),
                    matcher,
                )
                .await
            }
        }
    }

    #[instrument(skip(self, _ctx, options), fields(backend = "mssql", collection = %self.name, operation = "ensure_indexes"))]
    async fn ensure_indexes(&self, _ctx: &Context, options: &IndexOptions) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }
        Err(Error::Unsupported(
            "SQL Server collections do not support vector or metadata indexes".into(),
        ))
    }
}
