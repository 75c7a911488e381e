//! `VectorStore` over a pool of SQL Server clients.

use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use tracing::{info, instrument, warn};
use vectordata_core::{
    CollectionSpec, Context, DistanceMetric, Error, MssqlConfig, Result, VectorDataConfig,
    VectorStore,
};

use crate::collection::MssqlCollection;
use crate::helpers::simple_exec;
use crate::schema::ensure_table;
use crate::statements::{BEGIN_WRITE, COMMIT, ROLLBACK_IF_OPEN};

const DEFAULT_BATCH_SIZE: usize = 500;

/// Store-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Schema holding collection tables and the registry.
    pub schema: String,
    /// Mode used when a spec does not choose one.
    pub strict_by_default: bool,
    /// Rank inside SQL Server when the filter can be pushed down.
    pub server_side_search: bool,
    /// Records per write transaction.
    pub batch_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            schema: "dbo".to_string(),
            strict_by_default: true,
            server_side_search: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl From<&MssqlConfig> for StoreOptions {
    fn from(config: &MssqlConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            strict_by_default: config.strict_by_default,
            server_side_search: config.server_side_search,
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
    /// [`Error::Config`] for a zero batch size.
    pub fn validate(mut self) -> Result<Self> {
        self.schema = self.schema.trim().to_string();
        if self.schema.is_empty() {
            return Err(Error::SchemaMismatch("schema name is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".into()));
        }
        Ok(self)
    }
}

/// SQL Server store.
#[derive(Clone)]
pub struct MssqlVectorStore {
    pool: Pool<ConnectionManager>,
    options: StoreOptions,
}

impl std::fmt::Debug for MssqlVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlVectorStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MssqlVectorStore {
    /// Wraps an existing pool.
    ///
    /// # Errors
    ///
    /// Returns an error when `options` fail [`StoreOptions::validate`].
    pub fn new(pool: Pool<ConnectionManager>, options: StoreOptions) -> Result<Self> {
        Ok(Self {
            pool,
            options: options.validate()?,
        })
    }

    /// Opens a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing or malformed connection
    /// string and [`Error::Storage`] when the pool cannot connect.
    pub async fn connect(config: &VectorDataConfig) -> Result<Self> {
        config.validate()?;
        let mssql = &config.mssql;
        if mssql.connection_string.trim().is_empty() {
            return Err(Error::Config("mssql.connection_string is empty".into()));
        }
        let client_config = tiberius::Config::from_ado_string(&mssql.connection_string)
            .map_err(|e| Error::Config(format!("invalid mssql.connection_string: {e}")))?;
        let pool = Pool::builder()
            .max_size(mssql.max_connections)
            .build(ConnectionManager::new(client_config))
            .await
            .map_err(|e| Error::storage("connect", &mssql.schema, e))?;
        info!(schema = %mssql.schema, max_connections = mssql.max_connections, "Connected to SQL Server");
        Self::new(
            pool,
            StoreOptions::from(mssql).with_batch_size(config.write.batch_size),
        )
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<ConnectionManager> {
        &self.pool
    }

    /// Store settings.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

#[async_trait]
impl VectorStore for MssqlVectorStore {
    type Collection = MssqlCollection;

    #[instrument(
        skip(self, ctx, spec),
        fields(backend = "mssql", collection = %spec.name, operation = "ensure_collection")
    )]
    async fn ensure_collection(
        &self,
        ctx: &Context,
        spec: &CollectionSpec,
    ) -> Result<MssqlCollection> {
        let resolved = spec.resolve(self.options.strict_by_default)?;
        let schema = self.options.schema.as_str();
        let storage = |e: tiberius::error::Error| Error::storage("ensure_collection", &resolved.name, e);

        let mut conn = ctx
            .run(async {
                self.pool
                    .get()
                    .await
                    .map_err(|e| Error::storage("ensure_collection", &resolved.name, e))
            })
            .await?;
        simple_exec(&mut conn, BEGIN_WRITE).await.map_err(storage)?;
        let ensured = ensure_table(ctx, &mut conn, schema, &resolved).await;
        match ensured {
            Ok(()) => simple_exec(&mut conn, COMMIT).await.map_err(storage)?,
            Err(err) => {
                if let Err(rollback) = simple_exec(&mut conn, ROLLBACK_IF_OPEN).await {
                    warn!(collection = %resolved.name, error = %rollback, "Rollback failed");
                }
                return Err(err);
            }
        }

        Ok(self.collection(&resolved.name, resolved.dimension, resolved.metric))
    }

    fn collection(&self, name: &str, dimension: usize, metric: DistanceMetric) -> MssqlCollection {
        MssqlCollection::new(
            self.pool.clone(),
            &self.options,
            name,
            dimension,
            metric,
        )
    }
}
