//! Integration tests against a live SQL Server.
//!
//! These tests require `MSSQL_TEST_DSN` to be set to an ADO.NET connection
//! string, e.g.
//! `server=tcp:localhost,1433;user=sa;password=Passw0rd!;TrustServerCertificate=true`.
//! Each test works in its own schema, dropped at the end.
//!
//! Run with: `cargo test -p vectordata-mssql --test integration_test -- --ignored`

#![allow(clippy::pedantic)]

use std::env;

use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use serde_json::json;
use vectordata_core::{
    Collection, CollectionSpec, Context, DistanceMetric, EnsureMode, Error, FieldRef, Filter,
    FilterValue, IndexOptions, LoggingConfig, MetadataIndexOptions, Projection, Record,
    RecordMatcher, SearchOptions, VectorStore,
};
use vectordata_mssql::{MssqlVectorStore, StoreOptions};

struct TestStore {
    pool: Pool<ConnectionManager>,
    schema: String,
}

impl TestStore {
    fn store(&self, server_side_search: bool) -> anyhow::Result<MssqlVectorStore> {
        let options = StoreOptions {
            schema: self.schema.clone(),
            server_side_search,
            ..StoreOptions::default()
        };
        Ok(MssqlVectorStore::new(self.pool.clone(), options)?)
    }

    async fn exec(&self, sql: &str) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        conn.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn drop_schema(self) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        conn.execute(
            "DECLARE @sql NVARCHAR(MAX) = N''; \
             SELECT @sql += N'DROP TABLE ' + QUOTENAME(s.name) + N'.' + QUOTENAME(t.name) + N'; ' \
               FROM sys.tables t JOIN sys.schemas s ON s.schema_id = t.schema_id WHERE s.name = @P1; \
             EXEC(@sql); \
             DECLARE @drop NVARCHAR(MAX) = N'DROP SCHEMA ' + QUOTENAME(@P1); EXEC(@drop);",
            &[&self.schema.as_str()],
        )
        .await?;
        Ok(())
    }
}

async fn test_store() -> anyhow::Result<Option<TestStore>> {
    let Ok(dsn) = env::var("MSSQL_TEST_DSN") else {
        eprintln!("Skipping: MSSQL_TEST_DSN not set");
        return Ok(None);
    };
    vectordata_core::init_logging(&LoggingConfig::default());

    let config = tiberius::Config::from_ado_string(&dsn)?;
    let pool = Pool::builder()
        .max_size(4)
        .build(ConnectionManager::new(config))
        .await?;
    let schema = format!("vd_test_{}", uuid::Uuid::new_v4().simple());
    Ok(Some(TestStore { pool, schema }))
}

fn news_records() -> Vec<Record> {
    vec![
        Record::new("a", vec![1.0, 0.0])
            .with_metadata("category", "news")
            .with_metadata("rank", 1)
            .with_content("first"),
        Record::new("b", vec![0.8, 0.2])
            .with_metadata("category", "news")
            .with_metadata("rank", 2)
            .with_content("second"),
        Record::new("c", vec![0.0, 1.0])
            .with_metadata("category", "other")
            .with_metadata("rank", 3),
    ]
}

fn equivalence_records() -> Vec<Record> {
    vec![
        Record::new("a", vec![1.0, 0.0])
            .with_metadata("category", "news")
            .with_metadata("rank", 1)
            .with_metadata("name", "apple")
            .with_content("alpha"),
        Record::new("b", vec![0.9, 0.1])
            .with_metadata("category", "news")
            .with_metadata("rank", 2.5)
            .with_metadata("flags", json!({"pinned": true}))
            .with_content("Beta"),
        Record::new("c", vec![0.7, 0.3])
            .with_metadata("category", "other")
            .with_metadata("rank", "7")
            .with_metadata("name", "pear"),
        Record::new("d", vec![0.5, 0.5])
            .with_metadata("rank", serde_json::Value::Null)
            .with_metadata("flags", 1),
        Record::new("e", vec![0.1, 0.9]),
        Record::new("10", vec![0.0, 1.0])
            .with_metadata("category", "news")
            .with_content("gamma"),
    ]
}

fn equivalence_filters() -> Vec<(&'static str, Filter)> {
    let id = || FieldRef::column("id");
    let content = || FieldRef::column("content");
    let rank = || FieldRef::metadata(["rank"]);
    let category = || FieldRef::metadata(["category"]);
    let pinned = || FieldRef::metadata(["flags", "pinned"]);
    vec![
        ("id = a", Filter::eq(id(), "a")),
        ("id = 10 (number)", Filter::eq(id(), 10)),
        ("id in [a, 10]", Filter::is_in(id(), ["a", "10"])),
        ("id in [1, 2] (numbers)", Filter::is_in(id(), [1, 2])),
        ("id > b", Filter::gt(id(), "b")),
        ("id < 5 (number)", Filter::lt(id(), 5)),
        ("id > 5 (number)", Filter::gt(id(), 5)),
        ("content = alpha", Filter::eq(content(), "alpha")),
        ("content > b", Filter::gt(content(), "b")),
        ("content exists", Filter::exists(content())),
        ("category = news", Filter::eq(category(), "news")),
        ("category in [news, other]", Filter::is_in(category(), ["news", "other"])),
        ("rank = 1", Filter::eq(rank(), 1)),
        ("rank = \"7\"", Filter::eq(rank(), "7")),
        ("rank = null", Filter::eq(rank(), FilterValue::Null)),
        ("rank > 1", Filter::gt(rank(), 1)),
        ("rank < 5", Filter::lt(rank(), 5)),
        ("name > b", Filter::gt(FieldRef::metadata(["name"]), "b")),
        ("rank exists", Filter::exists(rank())),
        ("flags.pinned exists", Filter::exists(pinned())),
        ("flags.pinned = true", Filter::eq(pinned(), true)),
        (
            "category = news and rank > 1",
            Filter::and(vec![Filter::eq(category(), "news"), Filter::gt(rank(), 1)]),
        ),
        (
            "id = e or flags.pinned exists",
            Filter::or(vec![Filter::eq(id(), "e"), Filter::exists(pinned())]),
        ),
        ("not rank > 1", Filter::not(Filter::gt(rank(), 1))),
        ("not content = alpha", Filter::not(Filter::eq(content(), "alpha"))),
        ("not rank exists", Filter::not(Filter::exists(rank()))),
        ("not missing = x", Filter::not(Filter::eq(FieldRef::metadata(["missing"]), "x"))),
        (
            "not (category = news and rank < 2)",
            Filter::not(Filter::and(vec![
                Filter::eq(category(), "news"),
                Filter::lt(rank(), 2),
            ])),
        ),
        (
            "not (flags.pinned = true or content > b)",
            Filter::not(Filter::or(vec![
                Filter::eq(pinned(), true),
                Filter::gt(content(), "b"),
            ])),
        ),
    ]
}

fn expected_ids(filter: &Filter, records: &[Record]) -> anyhow::Result<Vec<String>> {
    let matcher = RecordMatcher::new(Some(filter))?;
    let mut ids: Vec<String> = records
        .iter()
        .filter(|r| matcher.matches(r))
        .map(|r| r.id.clone())
        .collect();
    ids.sort();
    Ok(ids)
}

async fn pushed_down_ids<C: Collection>(
    ctx: &Context,
    docs: &C,
    filter: &Filter,
) -> anyhow::Result<(Vec<String>, u64)> {
    let options = SearchOptions::default().with_filter(filter.clone());
    let hits = docs.search_by_vector(ctx, &[1.0, 0.0], 100, &options).await?;
    let mut ids: Vec<String> = hits.into_iter().map(|h| h.record.id).collect();
    ids.sort();
    let count = docs.count(ctx, Some(filter)).await?;
    Ok((ids, count))
}

#[tokio::test]
#[ignore] // Run with --ignored flag when MSSQL_TEST_DSN is set
async fn test_ranked_and_streaming_plans_agree() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let spec = CollectionSpec::new("docs", 2);
    let ranked = t.store(true)?.ensure_collection(&ctx, &spec).await?;
    let streamed = t.store(false)?.ensure_collection(&ctx, &spec).await?;
    ranked.upsert(&ctx, &news_records()).await?;

    for docs in [&ranked, &streamed] {
        let hits = docs
            .search_by_vector(&ctx, &[1.0, 0.0], 2, &SearchOptions::default())
            .await?;
        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].record.content.as_deref(), Some("first"));
    }

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_pushed_down_filter_and_count() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let docs = t
        .store(true)?
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;
    docs.upsert(&ctx, &news_records()).await?;
    let filter = Filter::and(vec![
        Filter::eq(FieldRef::metadata(["category"]), "news"),
        Filter::gt(FieldRef::metadata(["rank"]), 1),
    ]);

    let hits = docs
        .search_by_vector(
            &ctx,
            &[1.0, 0.0],
            10,
            &SearchOptions::default().with_filter(filter.clone()),
        )
        .await?;

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "b");
    assert_eq!(docs.count(&ctx, Some(&filter)).await?, 1);
    assert_eq!(docs.count(&ctx, None).await?, 3);

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_unsupported_filter_falls_back_to_streaming() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let docs = t
        .store(true)?
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;
    docs.upsert(
        &ctx,
        &[
            Record::new("a", vec![1.0, 0.0]).with_metadata("note", serde_json::Value::Null),
            Record::new("b", vec![0.9, 0.1]).with_metadata("note", "x"),
            Record::new("Z", vec![0.0, 1.0]),
        ],
    )
    .await?;

    // Metadata null equality and column ordering are refused by the
    // restricted compiler.
    let null_note = Filter::eq(FieldRef::metadata(["note"]), FilterValue::Null);
    let hits = docs
        .search_by_vector(
            &ctx,
            &[1.0, 0.0],
            10,
            &SearchOptions::default().with_filter(null_note.clone()),
        )
        .await?;
    let after_a = Filter::gt(FieldRef::column("id"), "a");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "a");
    assert_eq!(docs.count(&ctx, Some(&null_note)).await?, 1);
    assert_eq!(docs.count(&ctx, Some(&after_a)).await?, 1);

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_exact_id_and_text_matching() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let docs = t
        .store(true)?
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;
    docs.upsert(&ctx, &[Record::new("Doc", vec![1.0, 0.0]).with_content("Hello")])
        .await?;

    let lower = Filter::eq(FieldRef::column("content"), "hello");
    let exact = Filter::eq(FieldRef::column("content"), "Hello");

    assert!(matches!(docs.get(&ctx, "doc").await, Err(Error::NotFound(_))));
    assert_eq!(docs.count(&ctx, Some(&lower)).await?, 0);
    assert_eq!(docs.count(&ctx, Some(&exact)).await?, 1);
    assert_eq!(docs.delete(&ctx, &["doc".to_string()]).await?, 0);

    // A case variant is a separate record, never an update of "Doc".
    docs.upsert(&ctx, &[Record::new("doc", vec![0.0, 1.0]).with_content("lower")])
        .await?;
    let upper = docs.get(&ctx, "Doc").await?;
    let lower_doc = docs.get(&ctx, "doc").await?;
    assert_eq!(upper.id, "Doc");
    assert_eq!(upper.content.as_deref(), Some("Hello"));
    assert_eq!(lower_doc.id, "doc");
    assert_eq!(lower_doc.vector, vec![0.0, 1.0]);
    assert_eq!(docs.count(&ctx, None).await?, 2);

    assert_eq!(docs.delete(&ctx, &["Doc".to_string()]).await?, 1);
    assert_eq!(docs.get(&ctx, "doc").await?.content.as_deref(), Some("lower"));

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_typed_metadata_equality() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let docs = t
        .store(true)?
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;
    docs.upsert(
        &ctx,
        &[
            Record::new("n", vec![1.0, 0.0]).with_metadata("v", 1),
            Record::new("s", vec![1.0, 0.0]).with_metadata("v", "1"),
            Record::new("b", vec![1.0, 0.0]).with_metadata("v", true),
        ],
    )
    .await?;

    let number = Filter::eq(FieldRef::metadata(["v"]), 1);
    let text = Filter::eq(FieldRef::metadata(["v"]), "1");
    let boolean = Filter::eq(FieldRef::metadata(["v"]), true);
    let any = Filter::is_in(FieldRef::metadata(["v"]), [FilterValue::Number(1.0), FilterValue::Bool(true)]);

    assert_eq!(docs.count(&ctx, Some(&number)).await?, 1);
    assert_eq!(docs.count(&ctx, Some(&text)).await?, 1);
    assert_eq!(docs.count(&ctx, Some(&boolean)).await?, 1);
    assert_eq!(docs.count(&ctx, Some(&any)).await?, 2);

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_upsert_replaces_and_insert_rejects_duplicates() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let docs = t
        .store(true)?
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;
    docs.insert(&ctx, &news_records()).await?;
    docs.upsert(&ctx, &[Record::new("a", vec![0.0, 1.0])]).await?;

    let a = docs.get(&ctx, "a").await?;
    assert_eq!(a.vector, vec![0.0, 1.0]);
    assert!(a.metadata.is_empty());
    assert!(a.content.is_none());

    let dup = docs.insert(&ctx, &[Record::new("b", vec![1.0, 1.0])]).await;
    assert!(matches!(dup, Err(Error::Storage { .. })));
    assert_eq!(docs.count(&ctx, None).await?, 3);

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_concurrent_upserts_converge() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let docs = t
        .store(true)?
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;

    let writers = (0..8).map(|i| {
        let docs = docs.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let record = Record::new("shared", vec![i as f32, 1.0])
                .with_metadata("writer", i)
                .with_content(format!("writer {i}"));
            docs.upsert(&ctx, &[record]).await
        })
    });
    for writer in futures::future::join_all(writers).await {
        writer??;
    }

    let shared = docs.get(&ctx, "shared").await?;
    let writer = shared.metadata["writer"].as_i64().unwrap_or(-1);
    assert_eq!(shared.vector[0], writer as f32);
    assert_eq!(shared.content, Some(format!("writer {writer}")));
    assert_eq!(docs.count(&ctx, None).await?, 1);

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_ensure_validates_registry_and_columns() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let store = t.store(true)?;
    let spec = CollectionSpec::new("docs", 3).with_metric(DistanceMetric::L2);
    store.ensure_collection(&ctx, &spec).await?;
    store.ensure_collection(&ctx, &spec).await?;

    let other_dim = store
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 4).with_metric(DistanceMetric::L2))
        .await;
    let other_metric = store
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 3))
        .await;
    assert!(matches!(other_dim, Err(Error::SchemaMismatch(_))));
    assert!(matches!(other_metric, Err(Error::SchemaMismatch(_))));

    // A legacy table keyed under a case-insensitive collation is refused.
    t.exec(&format!(
        "CREATE TABLE [{0}].[folded] ([id] NVARCHAR(255) COLLATE SQL_Latin1_General_CP1_CI_AS NOT NULL PRIMARY KEY, [vector] NVARCHAR(MAX) NOT NULL)",
        t.schema
    ))
    .await?;
    let folded = store
        .ensure_collection(
            &ctx,
            &CollectionSpec::new("folded", 2).with_mode(EnsureMode::AutoMigrate),
        )
        .await;
    assert!(matches!(folded, Err(Error::SchemaMismatch(msg)) if msg.contains("collation")));

    // A legacy table with only the required columns and no registry row.
    t.exec(&format!(
        "CREATE TABLE [{0}].[legacy] ([id] NVARCHAR(255) COLLATE Latin1_General_100_BIN2 NOT NULL PRIMARY KEY, [vector] NVARCHAR(MAX) NOT NULL)",
        t.schema
    ))
    .await?;
    let legacy = CollectionSpec::new("legacy", 2);
    let strict = store
        .ensure_collection(&ctx, &legacy.clone().with_mode(EnsureMode::Strict))
        .await;
    assert!(matches!(strict, Err(Error::SchemaMismatch(_))));
    let migrated = store
        .ensure_collection(&ctx, &legacy.clone().with_mode(EnsureMode::AutoMigrate))
        .await?;
    migrated
        .upsert(&ctx, &[Record::new("x", vec![1.0, 0.0]).with_content("migrated")])
        .await?;
    assert_eq!(migrated.get(&ctx, "x").await?.content.as_deref(), Some("migrated"));
    store
        .ensure_collection(&ctx, &legacy.with_mode(EnsureMode::Strict))
        .await?;

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_concurrent_ensure_is_idempotent() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let store = t.store(true)?;
    let spec = CollectionSpec::new("docs", 2);

    let tasks = (0..6).map(|_| {
        let store = store.clone();
        let spec = spec.clone();
        tokio::spawn(async move { store.ensure_collection(&Context::new(), &spec).await })
    });
    for task in futures::future::join_all(tasks).await {
        task??;
    }

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_projection_threshold_and_stored_dimension() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let store = t.store(false)?;
    let docs = store
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;
    docs.upsert(&ctx, &news_records()).await?;

    let options = SearchOptions::default()
        .with_threshold(0.1)
        .with_projection(Projection::all());
    let hits = docs.search_by_vector(&ctx, &[1.0, 0.0], 10, &options).await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].record.vector, vec![1.0, 0.0]);

    // A row written behind the collection's back with the wrong length.
    t.exec(&format!(
        "INSERT INTO [{0}].[docs] ([id], [vector], [metadata]) VALUES (N'bad', N'[1.0]', N'{{}}')",
        t.schema
    ))
    .await?;
    let err = docs
        .search_by_vector(&ctx, &[1.0, 0.0], 10, &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_index_requests_and_cancellation() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let docs = t
        .store(true)?
        .ensure_collection(&ctx, &CollectionSpec::new("docs", 2))
        .await?;

    let index = IndexOptions {
        metadata: Some(MetadataIndexOptions::default()),
        ..IndexOptions::default()
    };
    assert!(matches!(
        docs.ensure_indexes(&ctx, &index).await,
        Err(Error::Unsupported(_))
    ));

    let cancelled = Context::new();
    cancelled.cancel();
    let err = docs.upsert(&cancelled, &news_records()).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(docs.count(&ctx, None).await?, 0);

    t.drop_schema().await
}

#[tokio::test]
#[ignore]
async fn test_pushdown_plans_agree_with_evaluator() -> anyhow::Result<()> {
    let Some(t) = test_store().await? else {
        return Ok(());
    };
    let ctx = Context::new();
    let spec = CollectionSpec::new("docs", 2);
    let ranked = t.store(true)?.ensure_collection(&ctx, &spec).await?;
    let streamed = t.store(false)?.ensure_collection(&ctx, &spec).await?;
    let records = equivalence_records();
    ranked.upsert(&ctx, &records).await?;

    for (name, filter) in equivalence_filters() {
        let expected = expected_ids(&filter, &records)?;
        for (plan, docs) in [("ranked", &ranked), ("streaming", &streamed)] {
            let (ids, count) = pushed_down_ids(&ctx, docs, &filter).await?;
            assert_eq!(ids, expected, "{plan} search with `{name}`");
            assert_eq!(count, expected.len() as u64, "{plan} count with `{name}`");
        }
    }

    // Records without `rank` are counted by its negation.
    let not_ranked = Filter::not(Filter::gt(FieldRef::metadata(["rank"]), 1));
    assert_eq!(ranked.count(&ctx, Some(&not_ranked)).await?, 4);

    t.drop_schema().await
}
