//! Result rows decoded into [`SqlValue`]s.

use std::collections::HashMap;
use std::sync::Arc;

use oxide_snippet::{FromSqlValue, SqlValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};

use crate::error::{MapperError, Result};

/// Column names of a result set with case-insensitive lookup.
///
/// Built once per result set and shared by all of its rows. When a name
/// occurs twice, lookups return the first position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Indexes the given column names.
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            positions.entry(name.to_lowercase()).or_insert(position);
        }
        Self { names, positions }
    }

    /// Indexes the columns of a row.
    #[must_use]
    pub fn of(row: &SqliteRow) -> Self {
        Self::new(
            row.columns()
                .iter()
                .map(|column| column.name().to_owned())
                .collect(),
        )
    }

    /// Position of a column, ignoring case.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(&name.to_lowercase()).copied()
    }

    /// Column names in result order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One decoded result row.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Arc<ColumnIndex>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Creates a row from already decoded values.
    #[must_use]
    pub const fn new(columns: Arc<ColumnIndex>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub(crate) fn decode(row: &SqliteRow, columns: Arc<ColumnIndex>) -> Result<Self> {
        let values = (0..row.len())
            .map(|index| decode_value(row, index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, values })
    }

    /// The shared column index.
    #[must_use]
    pub fn columns(&self) -> &Arc<ColumnIndex> {
        &self.columns
    }

    /// The value at a position, `NULL` when out of range.
    #[must_use]
    pub fn value(&self, position: usize) -> &SqlValue {
        self.values.get(position).unwrap_or(&SqlValue::Null)
    }

    /// The value of a named column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .position(column)
            .and_then(|position| self.values.get(position))
    }

    /// Converts a named column.
    pub fn get_as<V: FromSqlValue>(&self, column: &str) -> Result<V> {
        let value = self
            .get(column)
            .ok_or_else(|| MapperError::MissingKeyColumn(column.to_owned()))?;
        V::from_sql_value(value.clone()).map_err(|source| MapperError::Conversion {
            column: column.to_owned(),
            source,
        })
    }

    /// Consumes the row.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_info = raw.type_info();
    let value = match type_info.name() {
        "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get(index)?),
        "REAL" => SqlValue::Float(row.try_get(index)?),
        "BLOB" => SqlValue::Blob(row.try_get(index)?),
        "TEXT" => SqlValue::Text(row.try_get(index)?),
        _ => row
            .try_get::<i64, _>(index)
            .map(SqlValue::Int)
            .or_else(|_| row.try_get::<f64, _>(index).map(SqlValue::Float))
            .or_else(|_| row.try_get::<String, _>(index).map(SqlValue::Text))?,
    };
    Ok(value)
}
