//! Tests for `statements` module

use crate::statements::*;

#[test]
fn test_insert_statement_numbers_rows() {
    assert_eq!(
        insert_statement("[dbo].[docs]", 2),
        "INSERT INTO [dbo].[docs] ([id], [vector], [metadata], [content]) VALUES (@P1, @P2, @P3, @P4), (@P5, @P6, @P7, @P8)"
    );
}

#[test]
fn test_insert_chunk_uses_two_thousand_parameters() {
    assert!(insert_statement("[t]", MAX_INSERT_ROWS).ends_with("@P2000)"));
}

#[test]
fn test_upsert_statement_locks_key_range() {
    let sql = upsert_statement("[dbo].[docs]");
    assert!(sql.starts_with("UPDATE [dbo].[docs] WITH (UPDLOCK, SERIALIZABLE) SET"));
    assert!(sql.contains("IF @@ROWCOUNT = 0 INSERT INTO [dbo].[docs]"));
}

#[test]
fn test_upsert_matches_ids_like_get() {
    // Arrange
    let upsert = upsert_statement("[dbo].[docs]");
    let get = get_statement("[dbo].[docs]");
    let id_match = get.split(" WHERE ").nth(1).unwrap();

    // Act
    let update_where = upsert.split(" WHERE ").nth(1).unwrap();

    // Assert - the update finds a row only when get would return it
    assert!(update_where.starts_with(&format!("{id_match};")));
}

#[test]
fn test_delete_statement() {
    let sql = delete_statement("[dbo].[docs]", 2);
    assert_eq!(
        sql,
        concat!(
            "DELETE FROM [dbo].[docs] WHERE [id] IN (@P1, @P2) AND CAST(CAST([id] AS NVARCHAR(MAX)) AS VARBINARY(MAX)) ",
            "IN (CAST(CAST(@P1 AS NVARCHAR(MAX)) AS VARBINARY(MAX)), CAST(CAST(@P2 AS NVARCHAR(MAX)) AS VARBINARY(MAX)))"
        )
    );
}

#[test]
fn test_get_statement_compares_bytes() {
    let sql = get_statement("[dbo].[docs]");
    assert!(sql.starts_with("SELECT [id], [vector], [metadata], [content] FROM [dbo].[docs] WHERE ([id] = @P1 AND"));
    assert!(sql.contains("AS VARBINARY(MAX))"));
}
