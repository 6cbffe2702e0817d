//! Statement execution over a SQLite connection.
//!
//! Every statement is validated before it reaches the driver, logged at
//! debug level, and bound positionally from the snippet's parameters.

use std::sync::Arc;

use futures::TryStreamExt;
use oxide_snippet::{sql, FromSqlValue, SqlSnippet, SqlValue};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection};
use sqlx::Sqlite;
use tracing::debug;

use crate::error::{MapperError, Result};
use crate::row::{ColumnIndex, SqlRow};

/// Binds a SqlValue parameter to a raw query.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Float(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
    }
}

fn prepare(snippet: &SqlSnippet) -> Result<Query<'_, Sqlite, SqliteArguments<'_>>> {
    snippet.validate()?;
    debug!(sql = %snippet.text(), params = snippet.params().len(), "Executing SQL");
    Ok(snippet
        .params()
        .iter()
        .cloned()
        .fold(sqlx::query(snippet.text()), bind_value))
}

/// Executes a statement and returns the number of affected rows.
pub async fn execute_update(conn: &mut SqliteConnection, snippet: &SqlSnippet) -> Result<u64> {
    let result = prepare(snippet)?.execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Runs a query and hands every decoded row to `on_row`, in cursor order.
///
/// Returns the number of rows read. The column index is built from the
/// first row and shared by all rows.
pub async fn fetch_rows<F>(
    conn: &mut SqliteConnection,
    snippet: &SqlSnippet,
    mut on_row: F,
) -> Result<usize>
where
    F: FnMut(SqlRow) -> Result<()> + Send,
{
    let query = prepare(snippet)?;
    let mut rows = query.fetch(&mut *conn);
    let mut columns: Option<Arc<ColumnIndex>> = None;
    let mut count = 0;
    while let Some(row) = rows.try_next().await? {
        let index = columns.get_or_insert_with(|| Arc::new(ColumnIndex::of(&row)));
        on_row(SqlRow::decode(&row, Arc::clone(index))?)?;
        count += 1;
    }
    Ok(count)
}

/// Executes an insert and returns the values of `key_column` for the
/// inserted rows, in insertion order.
///
/// SQLite documents the row order of `RETURNING` as unspecified. For a
/// single multi-row `INSERT ... VALUES` it emits rows in `VALUES` order,
/// and callers that assign keys by position rely on that. Only the row
/// count is checked.
pub async fn insert_returning_keys(
    conn: &mut SqliteConnection,
    insert: &SqlSnippet,
    key_column: &str,
) -> Result<Vec<SqlValue>> {
    let statement = insert.clone().append(sql(format!("RETURNING {key_column}")));
    let mut keys = Vec::new();
    fetch_rows(conn, &statement, |row| {
        keys.push(row.value(0).clone());
        Ok(())
    })
    .await?;
    Ok(keys)
}

/// Returns the first column of the first row, or `None` for an empty result.
pub async fn query_first_value(
    conn: &mut SqliteConnection,
    snippet: &SqlSnippet,
) -> Result<Option<SqlValue>> {
    let mut first = None;
    fetch_rows(conn, snippet, |row| {
        if first.is_none() {
            first = Some(row.value(0).clone());
        }
        Ok(())
    })
    .await?;
    Ok(first)
}

/// Returns the first column of the first row converted to `V`.
pub async fn query_scalar<V: FromSqlValue>(
    conn: &mut SqliteConnection,
    snippet: &SqlSnippet,
) -> Result<V> {
    let value = query_first_value(conn, snippet)
        .await?
        .ok_or(MapperError::NotFound)?;
    V::from_sql_value(value).map_err(|source| MapperError::Conversion {
        column: String::from("scalar"),
        source,
    })
}
