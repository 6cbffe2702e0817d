//! Primary-key strategies and key generators.
//!
//! A table either lets the database assign keys ([`PkStrategy::AutoIncrement`])
//! or expects the caller to supply them ([`PkStrategy::Provided`]), in which
//! case an optional [`PkGenerator`] produces keys for beans on insert.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use oxide_snippet::{SqlSnippet, SqlValue, ValueKind};
use sqlx::SqliteConnection;

use crate::engine;
use crate::error::Result;
use crate::schema::TableMetaData;

/// Produces primary-key values for new rows.
pub trait PkGenerator: Send + Sync {
    /// Returns a new key of the given kind, or `None` to leave the bean's
    /// current key untouched.
    fn new_key<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        kind: ValueKind,
    ) -> BoxFuture<'a, Result<Option<SqlValue>>>;
}

/// Reads the next key from a query, e.g. a sequence table.
#[derive(Debug, Clone)]
pub struct SqlKeyGenerator {
    query: SqlSnippet,
}

impl SqlKeyGenerator {
    /// Uses the first column of the first row returned by `query`.
    #[must_use]
    pub const fn new(query: SqlSnippet) -> Self {
        Self { query }
    }
}

impl PkGenerator for SqlKeyGenerator {
    fn new_key<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        _kind: ValueKind,
    ) -> BoxFuture<'a, Result<Option<SqlValue>>> {
        async move { engine::query_first_value(conn, &self.query).await }.boxed()
    }
}

/// Generates keys with a plain function.
pub struct FnKeyGenerator<F> {
    generate: F,
}

impl<F> FnKeyGenerator<F>
where
    F: Fn(ValueKind) -> SqlValue + Send + Sync,
{
    /// Wraps a key function.
    pub const fn new(generate: F) -> Self {
        Self { generate }
    }
}

impl<F> fmt::Debug for FnKeyGenerator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnKeyGenerator").finish_non_exhaustive()
    }
}

impl<F> PkGenerator for FnKeyGenerator<F>
where
    F: Fn(ValueKind) -> SqlValue + Send + Sync,
{
    fn new_key<'a>(
        &'a self,
        _conn: &'a mut SqliteConnection,
        kind: ValueKind,
    ) -> BoxFuture<'a, Result<Option<SqlValue>>> {
        let key = (self.generate)(kind);
        async move { Ok(Some(key)) }.boxed()
    }
}

/// How a table's primary key is filled on insert.
#[derive(Clone)]
pub enum PkStrategy {
    /// The database assigns the key; it is read back after the insert.
    AutoIncrement,
    /// The key comes from the bean, or from the generator if one is set.
    Provided(Option<Arc<dyn PkGenerator>>),
}

impl fmt::Debug for PkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoIncrement => f.write_str("AutoIncrement"),
            Self::Provided(generator) => f
                .debug_tuple("Provided")
                .field(&generator.as_ref().map(|_| ".."))
                .finish(),
        }
    }
}

impl PkStrategy {
    /// Returns true if the database assigns keys.
    #[must_use]
    pub const fn is_auto_increment(&self) -> bool {
        matches!(self, Self::AutoIncrement)
    }

    /// Asks the generator for a new key. Returns `None` for auto-increment
    /// tables and for provided keys without a generator.
    pub async fn new_primary_key(
        &self,
        conn: &mut SqliteConnection,
        kind: ValueKind,
    ) -> Result<Option<SqlValue>> {
        match self {
            Self::Provided(Some(generator)) => generator.new_key(conn, kind).await,
            Self::AutoIncrement | Self::Provided(None) => Ok(None),
        }
    }
}

/// Decides the key strategy of a table.
pub trait PkStrategyDecider: Send + Sync {
    /// `generator` is the key generator configured for the table, if any.
    fn decide(&self, table: &TableMetaData, generator: Option<Arc<dyn PkGenerator>>)
        -> PkStrategy;
}

/// SQLite rules: a single `INTEGER PRIMARY KEY` column aliases the rowid and
/// auto-increments; every other key is provided.
///
/// A configured generator always wins over auto-increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlitePkStrategyDecider;

impl PkStrategyDecider for SqlitePkStrategyDecider {
    fn decide(
        &self,
        table: &TableMetaData,
        generator: Option<Arc<dyn PkGenerator>>,
    ) -> PkStrategy {
        if generator.is_some() {
            return PkStrategy::Provided(generator);
        }
        match table.pk_columns().as_slice() {
            [pk] if pk.sql_type.eq_ignore_ascii_case("INTEGER") => PkStrategy::AutoIncrement,
            _ => PkStrategy::Provided(None),
        }
    }
}
