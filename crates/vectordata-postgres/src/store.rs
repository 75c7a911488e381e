//! `VectorStore` over a PostgreSQL pool.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, instrument};
use vectordata_core::{
    CollectionSpec, Context, DistanceMetric, Error, PostgresConfig, Result, VectorDataConfig,
    VectorStore,
};

use crate::collection::PgCollection;
use crate::helpers::qualified_table;
use crate::schema::ensure_table;
use crate::statements::MAX_INSERT_ROWS;

const DEFAULT_BATCH_SIZE: usize = 500;

/// Store-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Schema holding collection tables.
    pub schema: String,
    /// Run `CREATE EXTENSION IF NOT EXISTS vector` on ensure.
    pub ensure_extension: bool,
    /// Mode used when a spec does not choose one.
    pub strict_by_default: bool,
    /// Rows per `INSERT` statement.
    pub batch_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            ensure_extension: true,
            strict_by_default: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl From<&PostgresConfig> for StoreOptions {
    fn from(config: &PostgresConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            ensure_extension: config.ensure_extension,
            strict_by_default: config.strict_by_default,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl StoreOptions {
    /// Sets the write batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Trims the schema name and rejects unusable settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for an empty schema and
    /// [`Error::Config`] for a batch size of zero or one whose `INSERT`
    /// would exceed the bind parameter limit.
    pub fn validate(mut self) -> Result<Self> {
        self.schema = self.schema.trim().to_string();
        if self.schema.is_empty() {
            return Err(Error::SchemaMismatch("schema name is empty".into()));
        }
        if !(1..=MAX_INSERT_ROWS).contains(&self.batch_size) {
            return Err(Error::Config(format!(
                "batch_size {} is out of range [1, {MAX_INSERT_ROWS}]",
                self.batch_size
            )));
        }
        Ok(self)
    }
}

/// PostgreSQL + pgvector store.
#[derive(Debug, Clone)]
pub struct PostgresVectorStore {
    pool: PgPool,
    options: StoreOptions,
}

impl PostgresVectorStore {
    /// Wraps an existing pool.
    ///
    /// # Errors
    ///
    /// Returns an error when `options` fail [`StoreOptions::validate`].
    pub fn new(pool: PgPool, options: StoreOptions) -> Result<Self> {
        Ok(Self {
            pool,
            options: options.validate()?,
        })
    }

    /// Opens a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration or a missing
    /// URL and [`Error::Storage`] when the pool cannot connect.
    pub async fn connect(config: &VectorDataConfig) -> Result<Self> {
        config.validate()?;
        let pg = &config.postgres;
        if pg.url.trim().is_empty() {
            return Err(Error::Config("postgres.url is empty".into()));
        }
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .connect(&pg.url)
            .await
            .map_err(|e| Error::storage("connect", &pg.schema, e))?;
        info!(schema = %pg.schema, max_connections = pg.max_connections, "Connected to PostgreSQL");
        Self::new(
            pool,
            StoreOptions::from(pg).with_batch_size(config.write.batch_size),
        )
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Store settings.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

#[async_trait]
impl VectorStore for PostgresVectorStore {
    type Collection = PgCollection;

    #[instrument(
        skip(self, ctx, spec),
        fields(backend = "postgres", collection = %spec.name, operation = "ensure_collection")
    )]
    async fn ensure_collection(&self, ctx: &Context, spec: &CollectionSpec) -> Result<PgCollection> {
        let resolved = spec.resolve(self.options.strict_by_default)?;
        let schema = self.options.schema.as_str();
        let table = qualified_table(schema, &resolved.name);

        ctx.run(async {
            let storage = |e: sqlx::Error| Error::storage("ensure_collection", &resolved.name, e);
            let mut tx = self.pool.begin().await.map_err(storage)?;
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(format!("vectordata:{table}"))
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            ensure_table(
                &mut tx,
                schema,
                &table,
                &resolved,
                self.options.ensure_extension,
            )
            .await?;
            tx.commit().await.map_err(storage)
        })
        .await?;

        Ok(self.collection(&resolved.name, resolved.dimension, resolved.metric))
    }

    fn collection(&self, name: &str, dimension: usize, metric: DistanceMetric) -> PgCollection {
        PgCollection::new(
            self.pool.clone(),
            &self.options.schema,
            name,
            dimension,
            metric,
            self.options.batch_size,
        )
    }
}
