//! Table metadata read from the live SQLite schema.
//!
//! Tables are introspected with `pragma_table_info` and
//! `pragma_foreign_key_list`. Results are cached per lowercased table name;
//! tables registered explicitly on the [`SchemaRegistry`] take precedence
//! over introspection.

use std::collections::HashMap;
use std::sync::Arc;

use oxide_snippet::ValueKind;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::cache::MemoCache;
use crate::error::{MapperError, Result};

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetaData {
    /// Column name as declared.
    pub name: String,
    /// Declared SQL type, possibly empty.
    pub sql_type: String,
    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,
}

impl ColumnMetaData {
    /// A non-key column.
    #[must_use]
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_owned(),
            sql_type: sql_type.to_owned(),
            is_primary_key: false,
        }
    }

    /// Marks the column as (part of) the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// The value kind implied by the declared type, using SQLite's type
    /// affinity rules.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        let declared = self.sql_type.to_uppercase();
        if declared.contains("INT") {
            ValueKind::Integer
        } else if declared.contains("CHAR") || declared.contains("CLOB") || declared.contains("TEXT")
        {
            ValueKind::Text
        } else if declared.is_empty() || declared.contains("BLOB") {
            ValueKind::Blob
        } else if declared.contains("BOOL") {
            ValueKind::Boolean
        } else {
            ValueKind::Real
        }
    }
}

/// A foreign key from one table's column to another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    /// The referencing column.
    pub fk_column: String,
    /// The referenced table.
    pub referenced_table: String,
    /// The referenced column; `None` means the referenced table's primary key.
    pub referenced_column: Option<String>,
}

impl ForeignKeySpec {
    /// Creates a foreign key description.
    #[must_use]
    pub fn new(fk_column: &str, referenced_table: &str, referenced_column: Option<&str>) -> Self {
        Self {
            fk_column: fk_column.to_owned(),
            referenced_table: referenced_table.to_owned(),
            referenced_column: referenced_column.map(ToOwned::to_owned),
        }
    }
}

/// The structure of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetaData {
    /// Table name as given by the caller or the schema.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnMetaData>,
    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKeySpec>,
}

impl TableMetaData {
    /// Creates a table without columns.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnMetaData) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKeySpec) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Finds a column, ignoring case.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<&ColumnMetaData> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The primary-key columns in declaration order.
    #[must_use]
    pub fn pk_columns(&self) -> Vec<&ColumnMetaData> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// The single primary-key column.
    pub fn unique_pk_column(&self) -> Result<&ColumnMetaData> {
        match self.pk_columns().as_slice() {
            [] => Err(MapperError::NoPrimaryKey(self.name.clone())),
            [pk] => Ok(pk),
            _ => Err(MapperError::CompositePrimaryKey(self.name.clone())),
        }
    }

    /// The single foreign key referencing `table`.
    pub fn unique_fk_to(&self, table: &str) -> Result<&ForeignKeySpec> {
        let candidates: Vec<&ForeignKeySpec> = self
            .foreign_keys
            .iter()
            .filter(|fk| fk.referenced_table.eq_ignore_ascii_case(table))
            .collect();
        match candidates.as_slice() {
            [fk] => Ok(fk),
            [] => Err(MapperError::NoForeignKey {
                table: self.name.clone(),
                target: table.to_owned(),
            }),
            _ => {
                warn!(table = %self.name, target = %table, count = candidates.len(), "Ambiguous foreign key");
                Err(MapperError::AmbiguousForeignKey {
                    table: self.name.clone(),
                    target: table.to_owned(),
                    count: candidates.len(),
                })
            }
        }
    }
}

/// Looks up and caches table metadata.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    explicit: HashMap<String, Arc<TableMetaData>>,
    cache: MemoCache<String, Arc<TableMetaData>>,
}

impl SchemaRegistry {
    /// Creates an empty registry that introspects every table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table description that replaces introspection.
    #[must_use]
    pub fn with_table(mut self, table: TableMetaData) -> Self {
        self.explicit
            .insert(table.name.to_lowercase(), Arc::new(table));
        self
    }

    /// Returns the metadata of a table, or `None` if it does not exist.
    pub async fn table_metadata(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
    ) -> Result<Option<Arc<TableMetaData>>> {
        let key = table.to_lowercase();
        if let Some(explicit) = self.explicit.get(&key) {
            return Ok(Some(Arc::clone(explicit)));
        }
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached));
        }
        Ok(introspect(conn, table)
            .await?
            .map(|loaded| self.cache.insert_if_absent(key, Arc::new(loaded))))
    }

    /// Returns the metadata of a table that must exist.
    pub async fn required_table(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
    ) -> Result<Arc<TableMetaData>> {
        let found = self.table_metadata(conn, table).await?;
        found.ok_or_else(|| {
            warn!(table = %table, "Table not found");
            MapperError::TableNotFound(table.to_owned())
        })
    }

    /// Forgets introspected tables; explicit tables stay. Missing tables are
    /// never cached.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

async fn introspect(conn: &mut SqliteConnection, table: &str) -> Result<Option<TableMetaData>> {
    debug!(table = %table, "Introspecting table");

    let columns: Vec<(String, String, i64)> =
        sqlx::query_as("SELECT name, type, pk FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;
    if columns.is_empty() {
        return Ok(None);
    }

    let foreign_keys: Vec<(String, String, Option<String>)> = sqlx::query_as(
        r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let mut metadata = TableMetaData::new(table);
    for (name, sql_type, pk) in columns {
        metadata.columns.push(ColumnMetaData {
            name,
            sql_type,
            is_primary_key: pk > 0,
        });
    }
    for (fk_column, referenced_table, referenced_column) in foreign_keys {
        metadata.foreign_keys.push(ForeignKeySpec {
            fk_column,
            referenced_table,
            referenced_column,
        });
    }
    Ok(Some(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    fn person() -> TableMetaData {
        TableMetaData::new("person")
            .column(ColumnMetaData::new("id", "INTEGER").primary_key())
            .column(ColumnMetaData::new("name", "VARCHAR(100)"))
    }

    #[test]
    fn test_unique_pk_column() {
        assert_eq!(person().unique_pk_column().unwrap().name, "id");

        let composite = TableMetaData::new("link")
            .column(ColumnMetaData::new("a", "INTEGER").primary_key())
            .column(ColumnMetaData::new("b", "INTEGER").primary_key());
        assert!(matches!(
            composite.unique_pk_column(),
            Err(MapperError::CompositePrimaryKey(_))
        ));

        let none = TableMetaData::new("log").column(ColumnMetaData::new("msg", "TEXT"));
        assert!(matches!(
            none.unique_pk_column(),
            Err(MapperError::NoPrimaryKey(_))
        ));
    }

    #[test]
    fn test_unique_fk_to() {
        let address = TableMetaData::new("address")
            .column(ColumnMetaData::new("person_id", "INTEGER"))
            .foreign_key(ForeignKeySpec::new("person_id", "Person", Some("id")));
        assert_eq!(address.unique_fk_to("person").unwrap().fk_column, "person_id");
        assert!(matches!(
            address.unique_fk_to("city"),
            Err(MapperError::NoForeignKey { .. })
        ));

        let ambiguous = address
            .clone()
            .foreign_key(ForeignKeySpec::new("owner_id", "person", None));
        assert!(matches!(
            ambiguous.unique_fk_to("person"),
            Err(MapperError::AmbiguousForeignKey { count: 2, .. })
        ));
    }

    #[test]
    fn test_find_column_ignores_case() {
        assert!(person().find_column("NAME").is_some());
        assert!(person().find_column("missing").is_none());
    }

    #[test]
    fn test_value_kind_affinity() {
        assert_eq!(ColumnMetaData::new("a", "BIGINT").value_kind(), ValueKind::Integer);
        assert_eq!(ColumnMetaData::new("a", "VARCHAR(20)").value_kind(), ValueKind::Text);
        assert_eq!(ColumnMetaData::new("a", "DOUBLE").value_kind(), ValueKind::Real);
        assert_eq!(ColumnMetaData::new("a", "").value_kind(), ValueKind::Blob);
    }

    #[tokio::test]
    async fn test_introspection() {
        let mut conn = SqliteConnection::connect(":memory:").await.unwrap();
        for ddl in [
            "CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE address (id INTEGER PRIMARY KEY, person_id INTEGER REFERENCES person(id), street TEXT)",
        ] {
            sqlx::query(ddl).execute(&mut conn).await.unwrap();
        }

        let registry = SchemaRegistry::new();
        let address = registry
            .required_table(&mut conn, "address")
            .await
            .unwrap();
        assert_eq!(address.columns.len(), 3);
        assert_eq!(address.unique_pk_column().unwrap().name, "id");
        let fk = address.unique_fk_to("person").unwrap();
        assert_eq!(fk.fk_column, "person_id");
        assert_eq!(fk.referenced_column.as_deref(), Some("id"));

        let person = registry.required_table(&mut conn, "PERSON").await.unwrap();
        assert!(!person.find_column("name").unwrap().is_primary_key);

        assert!(matches!(
            registry.required_table(&mut conn, "missing").await,
            Err(MapperError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_and_explicit_tables() {
        let mut conn = SqliteConnection::connect(":memory:").await.unwrap();
        let registry = SchemaRegistry::new().with_table(person());

        // Explicit tables need no database table.
        let first = registry.required_table(&mut conn, "person").await.unwrap();
        let second = registry.required_table(&mut conn, "Person").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        sqlx::query("CREATE TABLE tag (id INTEGER PRIMARY KEY)")
            .execute(&mut conn)
            .await
            .unwrap();
        let tag = registry.required_table(&mut conn, "tag").await.unwrap();
        let again = registry.required_table(&mut conn, "tag").await.unwrap();
        assert!(Arc::ptr_eq(&tag, &again));

        registry.clear_cache();
        let reloaded = registry.required_table(&mut conn, "tag").await.unwrap();
        assert!(!Arc::ptr_eq(&tag, &reloaded));
    }
}
