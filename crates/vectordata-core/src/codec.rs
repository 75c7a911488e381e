//! Typed access on top of record collections.

use std::marker::PhantomData;

use crate::collection::{Collection, SearchOptions};
use crate::context::Context;
use crate::error::Result;
use crate::record::Record;

/// Maps an application type to and from [`Record`].
pub trait Codec<T>: Send + Sync {
    /// Encodes a value as a record.
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::Error::Serialization`] or
    /// [`crate::Error::Validation`] when the value cannot be stored.
    fn encode(&self, value: &T) -> Result<Record>;

    /// Decodes a stored record.
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::Error::Serialization`] when the
    /// record does not describe a `T`.
    fn decode(&self, record: Record) -> Result<T>;
}

/// A decoded search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedSearchResult<T> {
    /// The decoded item.
    pub item: T,
    /// Raw metric distance.
    pub distance: f64,
    /// Metric-normalized score.
    pub score: f64,
}

/// A [`Collection`] that reads and writes `T` through a [`Codec`].
#[derive(Debug)]
pub struct TypedCollection<C, K, T> {
    base: C,
    codec: K,
    _item: PhantomData<fn() -> T>,
}

impl<C, K, T> TypedCollection<C, K, T>
where
    C: Collection,
    K: Codec<T>,
{
    /// Wraps `base` with `codec`.
    pub fn new(base: C, codec: K) -> Self {
        Self {
            base,
            codec,
            _item: PhantomData,
        }
    }

    /// The underlying record collection.
    pub fn inner(&self) -> &C {
        &self.base
    }

    /// Encodes and inserts `values`.
    pub async fn insert(&self, ctx: &Context, values: &[T]) -> Result<()> {
        let records = self.encode_many(values)?;
        self.base.insert(ctx, &records).await
    }

    /// Encodes and upserts `values`.
    pub async fn upsert(&self, ctx: &Context, values: &[T]) -> Result<()> {
        let records = self.encode_many(values)?;
        self.base.upsert(ctx, &records).await
    }

    /// Fetches and decodes one item.
    pub async fn get(&self, ctx: &Context, id: &str) -> Result<T> {
        let record = self.base.get(ctx, id).await?;
        self.codec.decode(record)
    }

    /// Searches and decodes every hit.
    pub async fn search_by_vector(
        &self,
        ctx: &Context,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<TypedSearchResult<T>>> {
        let results = self
            .base
            .search_by_vector(ctx, vector, top_k, options)
            .await?;
        results
            .into_iter()
            .map(|result| {
                Ok(TypedSearchResult {
                    item: self.codec.decode(result.record)?,
                    distance: result.distance,
                    score: result.score,
                })
            })
            .collect()
    }

    fn encode_many(&self, values: &[T]) -> Result<Vec<Record>> {
        values.iter().map(|value| self.codec.encode(value)).collect()
    }
}
