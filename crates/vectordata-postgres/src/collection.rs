//! `Collection` over one pgvector table.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};
use vectordata_core::{
    compile_filter_sql, encode_vector, validate_dimension, validate_records, validate_top_k,
    Collection, Context, DistanceMetric, Error, Filter, IndexOptions, Record, Result,
    SearchOptions, SearchResult,
};

use crate::helpers::{bind_args, filter_config, qualified_table};
use crate::search::{build_search_plan, decode_record, decode_search_row, SELECT_ALL_COLUMNS};
use crate::statements::{index_statements, insert_statement, last_write_wins};

/// Handle to a collection table. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgCollection {
    pool: PgPool,
    name: String,
    table: String,
    dimension: usize,
    metric: DistanceMetric,
    batch_size: usize,
}

/// A record ready to bind: vector and metadata already encoded as text.
struct EncodedRow<'a> {
    id: &'a str,
    vector: String,
    metadata: String,
    content: Option<&'a str>,
}

impl PgCollection {
    pub(crate) fn new(
        pool: PgPool,
        schema: &str,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
        batch_size: usize,
    ) -> Self {
        Self {
            pool,
            name: name.to_string(),
            table: qualified_table(schema, name),
            dimension,
            metric,
            batch_size: batch_size.max(1),
        }
    }

    /// Fully qualified, quoted table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn write(
        &self,
        ctx: &Context,
        records: &[Record],
        upsert: bool,
        operation: &'static str,
    ) -> Result<()> {
        validate_records(records, self.dimension)?;
        let selected: Vec<&Record> = if upsert {
            last_write_wins(records)
        } else {
            records.iter().collect()
        };
        let rows = selected
            .into_iter()
            .map(|record| {
                Ok(EncodedRow {
                    id: &record.id,
                    vector: encode_vector(&record.vector)?,
                    metadata: serde_json::to_string(&record.metadata)?,
                    content: record.content.as_deref(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for (index, chunk) in rows.chunks(self.batch_size).enumerate() {
            ctx.check()?;
            let sql = insert_statement(&self.table, chunk.len(), upsert);
            let query = chunk.iter().fold(sqlx::query(&sql), |query, row| {
                query
                    .bind(row.id)
                    .bind(&row.vector)
                    .bind(&row.metadata)
                    .bind(row.content)
            });
            ctx.run(async {
                query
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::storage(operation, &self.name, e))
            })
            .await?;
            debug!(collection = %self.name, chunk = index, rows = chunk.len(), "Wrote chunk");
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for PgCollection {
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
        fields(backend = "postgres", collection = %self.name, operation = "insert", count = records.len())
    )]
    async fn insert(&self, ctx: &Context, records: &[Record]) -> Result<()> {
        self.write(ctx, records, false, "insert").await
    }

    #[instrument(
        skip(self, ctx, records),
        fields(backend = "postgres", collection = %self.name, operation = "upsert", count = records.len())
    )]
    async fn upsert(&self, ctx: &Context, records: &[Record]) -> Result<()> {
        self.write(ctx, records, true, "upsert").await
    }

    #[instrument(skip(self, ctx), fields(backend = "postgres", collection = %self.name, operation = "get"))]
    async fn get(&self, ctx: &Context, id: &str) -> Result<Record> {
        let sql = format!(
            r#"SELECT {SELECT_ALL_COLUMNS} FROM {} WHERE "id" = $1"#,
            self.table
        );
        let row = ctx
            .run(async {
                sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| Error::storage("get", &self.name, e))
            })
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        decode_record(&row)
    }

    #[instrument(
        skip(self, ctx, ids),
        fields(backend = "postgres", collection = %self.name, operation = "delete", count = ids.len())
    )]
    async fn delete(&self, ctx: &Context, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(r#"DELETE FROM {} WHERE "id" = ANY($1)"#, self.table);
        let result = ctx
            .run(async {
                sqlx::query(&sql)
                    .bind(ids)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::storage("delete", &self.name, e))
            })
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, ctx, filter), fields(backend = "postgres", collection = %self.name, operation = "count"))]
    async fn count(&self, ctx: &Context, filter: Option<&Filter>) -> Result<u64> {
        let compiled = compile_filter_sql(filter, &filter_config(), 1)?;
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        if !compiled.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&compiled.sql);
        }
        let row = ctx
            .run(async {
                bind_args(sqlx::query(&sql), &compiled.args)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| Error::storage("count", &self.name, e))
            })
            .await?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| Error::storage("count", &self.name, e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(
        skip(self, ctx, vector, options),
        fields(backend = "postgres", collection = %self.name, operation = "search")
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
        let plan = build_search_plan(&self.table, self.metric, vector, top_k, options)?;
        debug!(collection = %self.name, plan = "native", sql = %plan.sql, "Planned search");

        let rows = ctx
            .run(async {
                bind_args(sqlx::query(&plan.sql), &plan.args)
                    .bind(plan.limit)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| Error::storage("search", &self.name, e))
            })
            .await?;

        rows.iter()
            .map(|row| decode_search_row(row, options.projection, self.metric))
            .collect()
    }

    #[instrument(skip(self, ctx, options), fields(backend = "postgres", collection = %self.name, operation = "ensure_indexes"))]
    async fn ensure_indexes(&self, ctx: &Context, options: &IndexOptions) -> Result<()> {
        for statement in index_statements(&self.name, &self.table, self.metric, options) {
            ctx.run(async {
                sqlx::query(&statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::storage("ensure_indexes", &self.name, e))
            })
            .await?;
            info!(collection = %self.name, statement = %statement, "Ensured index");
        }
        Ok(())
    }
}
