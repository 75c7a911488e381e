//! Tests for `schema` module

use crate::schema::*;
use vectordata_core::{EnsureMode, Error};

const TABLE: &str = r#""public"."docs""#;

fn column(name: &str, data_type: &str, udt_name: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        udt_name: udt_name.to_string(),
    }
}

fn canonical_columns() -> Vec<ColumnInfo> {
    vec![
        column("id", "text", "text"),
        column("vector", "USER-DEFINED", "vector"),
        column("metadata", "jsonb", "jsonb"),
        column("content", "text", "text"),
    ]
}

#[test]
fn test_create_table_statement() {
    assert_eq!(
        create_table_statement(TABLE, 3),
        r#"CREATE TABLE IF NOT EXISTS "public"."docs" ("id" text PRIMARY KEY, "vector" vector(3) NOT NULL, "metadata" jsonb NOT NULL DEFAULT '{}'::jsonb, "content" text)"#
    );
}

#[test]
fn test_canonical_table_needs_no_migration() {
    let statements =
        plan_column_migration(TABLE, &canonical_columns(), true, EnsureMode::Strict).unwrap();
    assert!(statements.is_empty());
}

#[test]
fn test_missing_optional_columns_fail_in_strict_mode() {
    // Arrange
    let columns: Vec<ColumnInfo> = canonical_columns()
        .into_iter()
        .filter(|c| c.name != "content")
        .collect();

    // Act
    let err = plan_column_migration(TABLE, &columns, true, EnsureMode::Strict).unwrap_err();

    // Assert
    assert!(matches!(err, Error::SchemaMismatch(msg) if msg.contains("content")));
}

#[test]
fn test_missing_optional_columns_are_added_in_auto_migrate() {
    // Arrange
    let columns = vec![
        column("id", "text", "text"),
        column("vector", "USER-DEFINED", "vector"),
    ];

    // Act
    let statements =
        plan_column_migration(TABLE, &columns, true, EnsureMode::AutoMigrate).unwrap();

    // Assert
    assert_eq!(
        statements,
        vec![
            r#"ALTER TABLE "public"."docs" ADD COLUMN IF NOT EXISTS "metadata" jsonb NOT NULL DEFAULT '{}'::jsonb"#.to_string(),
            r#"ALTER TABLE "public"."docs" ADD COLUMN IF NOT EXISTS "content" text"#.to_string(),
        ]
    );
}

#[test]
fn test_required_columns_are_never_repaired() {
    let columns: Vec<ColumnInfo> = canonical_columns()
        .into_iter()
        .filter(|c| c.name != "vector")
        .collect();

    let err = plan_column_migration(TABLE, &columns, true, EnsureMode::AutoMigrate).unwrap_err();

    assert!(matches!(err, Error::SchemaMismatch(_)));
}

#[test]
fn test_missing_primary_key_is_rejected() {
    let err =
        plan_column_migration(TABLE, &canonical_columns(), false, EnsureMode::AutoMigrate)
            .unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(msg) if msg.contains("primary key")));
}

#[test]
fn test_wrong_column_types_are_rejected() {
    let mut columns = canonical_columns();
    columns[2] = column("metadata", "json", "json");
    assert!(plan_column_migration(TABLE, &columns, true, EnsureMode::AutoMigrate).is_err());

    let mut columns = canonical_columns();
    columns[0] = column("id", "bigint", "int8");
    assert!(plan_column_migration(TABLE, &columns, true, EnsureMode::AutoMigrate).is_err());

    let mut columns = canonical_columns();
    columns[1] = column("vector", "ARRAY", "_float4");
    assert!(plan_column_migration(TABLE, &columns, true, EnsureMode::AutoMigrate).is_err());
}

#[test]
fn test_varchar_id_is_accepted() {
    let mut columns = canonical_columns();
    columns[0] = column("id", "character varying", "varchar");
    assert!(plan_column_migration(TABLE, &columns, true, EnsureMode::Strict).is_ok());
}

#[test]
fn test_check_dimension() {
    assert!(check_dimension(TABLE, Some("vector(3)"), 3).is_ok());

    let err = check_dimension(TABLE, Some("vector(4)"), 3).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(msg) if msg.contains("dimension 4")));

    assert!(check_dimension(TABLE, Some("vector"), 3).is_err());
    assert!(check_dimension(TABLE, None, 3).is_err());
}
