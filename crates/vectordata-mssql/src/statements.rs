//! Read-by-ID, write and delete statements.
//!
//! SQL Server accepts at most 2100 parameters per request, which bounds
//! both the rows of a multi-row `INSERT` and the IDs of an `IN` list.
//! ID lookups compare bytes so a case-insensitive collation never matches
//! a different ID; the upsert's update uses the same comparison.

use crate::pushdown::exact_text_eq;

/// Rows per multi-row `INSERT` (four parameters each).
pub(crate) const MAX_INSERT_ROWS: usize = 500;

/// IDs per `DELETE ... IN (...)`.
pub(crate) const MAX_DELETE_IDS: usize = 2000;

/// Multi-row `INSERT` binding `id, vector, metadata, content` per row.
pub(crate) fn insert_statement(table: &str, rows: usize) -> String {
    let values = (0..rows)
        .map(|row| {
            let base = row * 4;
            format!(
                "(@P{}, @P{}, @P{}, @P{})",
                base + 1,
                base + 2,
                base + 3,
                base + 4
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ([id], [vector], [metadata], [content]) VALUES {values}")
}

/// Update-else-insert for one record.
///
/// `UPDLOCK, SERIALIZABLE` takes a key-range lock on a missing ID, so two
/// concurrent upserts of the same new ID cannot both reach the `INSERT`.
/// An ID that equals a stored one only under padding rules (trailing
/// spaces) updates nothing and then fails on the primary key.
pub(crate) fn upsert_statement(table: &str) -> String {
    format!(
        "UPDATE {table} WITH (UPDLOCK, SERIALIZABLE) SET [vector] = @P2, [metadata] = @P3, [content] = @P4 WHERE {}; \
         IF @@ROWCOUNT = 0 INSERT INTO {table} ([id], [vector], [metadata], [content]) VALUES (@P1, @P2, @P3, @P4);",
        exact_text_eq("[id]", "@P1")
    )
}

/// `SELECT` of one record by `@P1`.
pub(crate) fn get_statement(table: &str) -> String {
    format!(
        "SELECT [id], [vector], [metadata], [content] FROM {table} WHERE {}",
        exact_text_eq("[id]", "@P1")
    )
}

/// `DELETE` of `ids` bound IDs.
pub(crate) fn delete_statement(table: &str, ids: usize) -> String {
    let placeholders: Vec<String> = (1..=ids).map(|n| format!("@P{n}")).collect();
    let binary: Vec<String> = placeholders
        .iter()
        .map(|ph| format!("CAST(CAST({ph} AS NVARCHAR(MAX)) AS VARBINARY(MAX))"))
        .collect();
    format!(
        "DELETE FROM {table} WHERE [id] IN ({}) AND CAST(CAST([id] AS NVARCHAR(MAX)) AS VARBINARY(MAX)) IN ({})",
        placeholders.join(", "),
        binary.join(", ")
    )
}

/// Opens a write transaction. `XACT_ABORT` rolls it back on any error.
pub(crate) const BEGIN_WRITE: &str = "SET XACT_ABORT ON; BEGIN TRANSACTION;";

/// Commits the open transaction.
pub(crate) const COMMIT: &str = "COMMIT TRANSACTION;";

/// Rolls back whatever is still open.
pub(crate) const ROLLBACK_IF_OPEN: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION;";
