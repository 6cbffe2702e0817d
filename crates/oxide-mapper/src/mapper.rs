//! The mapper facade: queries and bean persistence.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use oxide_snippet::{FromSqlValue, SqlSnippet, SqlValue, ToSqlValue};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::beans::PropertyValue;
use crate::config::SqlMapperBuilder;
use crate::engine;
use crate::error::{MapperError, Result};
use crate::mapping::{BeanMapping, BeanMappingRegistry};
use crate::pk::PkStrategy;
use crate::query::{MapperQuery, ToManyQuery};
use crate::statements;

/// Reads and writes beans over a SQLite connection.
///
/// The mapper holds only caches and configuration; connections are passed
/// to each call, so transactions stay with the caller:
///
/// ```rust,no_run
/// # use oxide_mapper::{Bean, SqlMapper, AccessorBeans};
/// # #[derive(Debug, Default, Clone, Bean)]
/// # struct Person { id: i64, name: String }
/// # async fn run(pool: sqlx::SqlitePool) -> oxide_mapper::Result<()> {
/// let mapper = SqlMapper::builder()
///     .with_beans(AccessorBeans::new().register::<Person>())
///     .build();
///
/// let mut tx = pool.begin().await?;
/// let person = mapper
///     .insert(&mut *tx, Person { id: 0, name: "Arno".into() })
///     .await?;
/// tx.commit().await?;
/// assert_ne!(person.id, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqlMapper {
    registry: BeanMappingRegistry,
}

impl SqlMapper {
    /// Starts a mapper configuration.
    pub fn builder() -> SqlMapperBuilder {
        SqlMapperBuilder::new()
    }

    pub(crate) const fn new(registry: BeanMappingRegistry) -> Self {
        Self { registry }
    }

    /// The mapping registry.
    #[must_use]
    pub const fn registry(&self) -> &BeanMappingRegistry {
        &self.registry
    }

    /// Drops every cached mapping, relation and table description.
    pub fn clear_cache(&self) {
        self.registry.clear_cache();
    }

    /// A query returning `T` beans. Nothing runs until the query is
    /// executed.
    pub fn query<T: Send + 'static>(&self, sql: SqlSnippet) -> MapperQuery<'_, T> {
        MapperQuery::new(self, sql)
    }

    /// Selects one bean by primary key.
    pub async fn query_by_pk<T, K>(&self, conn: &mut SqliteConnection, pk: K) -> Result<Option<T>>
    where
        T: Send + 'static,
        K: ToSqlValue + Send,
    {
        let mapping = self.registry.mapping::<T>(conn).await?;
        let sql = statements::select_by_pk(&mapping, pk.to_sql_value())?;
        self.query::<T>(sql).optional(conn).await
    }

    /// `SELECT * FROM` the table of `T`, ready to be extended with filters.
    pub async fn select_all<T: 'static>(&self, conn: &mut SqliteConnection) -> Result<SqlSnippet> {
        let mapping = self.registry.mapping::<T>(conn).await?;
        Ok(statements::select_all(&mapping))
    }

    /// Groups the beans returned by `sql` by `key_column`, collecting each
    /// group into `C`.
    pub fn query_for_to_many<K, T, C>(&self, key_column: &str, sql: SqlSnippet) -> ToManyQuery<'_, K, T, C>
    where
        K: FromSqlValue + Eq + Hash + Send + 'static,
        T: Send + 'static,
        C: FromIterator<T> + 'static,
    {
        self.query_for_to_many_with(key_column, sql, |beans: Vec<T>| beans.into_iter().collect())
    }

    /// Groups into vectors, in cursor order.
    pub fn query_for_to_many_vec<K, T>(&self, key_column: &str, sql: SqlSnippet) -> ToManyQuery<'_, K, T, Vec<T>>
    where
        K: FromSqlValue + Eq + Hash + Send + 'static,
        T: Send + 'static,
    {
        self.query_for_to_many_with(key_column, sql, |beans: Vec<T>| beans)
    }

    /// Groups into sets.
    pub fn query_for_to_many_set<K, T>(&self, key_column: &str, sql: SqlSnippet) -> ToManyQuery<'_, K, T, HashSet<T>>
    where
        K: FromSqlValue + Eq + Hash + Send + 'static,
        T: Eq + Hash + Send + 'static,
    {
        self.query_for_to_many(key_column, sql)
    }

    /// Groups with a custom reducer applied to each group's beans.
    pub fn query_for_to_many_with<K, T, C, F>(
        &self,
        key_column: &str,
        sql: SqlSnippet,
        reducer: F,
    ) -> ToManyQuery<'_, K, T, C>
    where
        K: FromSqlValue + Eq + Hash + Send + 'static,
        T: Send + 'static,
        F: Fn(Vec<T>) -> C + Send + Sync + 'static,
    {
        ToManyQuery::new(self, key_column, sql, Arc::new(reducer))
    }

    /// Executes a statement and returns the number of affected rows.
    pub async fn execute_update(&self, conn: &mut SqliteConnection, sql: &SqlSnippet) -> Result<u64> {
        engine::execute_update(conn, sql).await
    }

    /// Returns the first column of the first row.
    pub async fn query_scalar<V: FromSqlValue>(&self, conn: &mut SqliteConnection, sql: &SqlSnippet) -> Result<V> {
        engine::query_scalar(conn, sql).await
    }

    /// Inserts a bean into its default table and returns it with its key.
    pub async fn insert<T: Send + Sync + 'static>(&self, conn: &mut SqliteConnection, bean: T) -> Result<T> {
        let mapping = self.registry.mapping::<T>(conn).await?;
        insert_one(conn, &mapping, bean).await
    }

    /// Inserts a bean into `table`.
    pub async fn insert_into<T: Send + Sync + 'static>(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        bean: T,
    ) -> Result<T> {
        let mapping = self.registry.mapping_for_table::<T>(conn, Some(table)).await?;
        insert_one(conn, &mapping, bean).await
    }

    /// Inserts beans into their default table with one statement and
    /// returns them with their keys, in input order.
    pub async fn insert_many<T: Send + Sync + 'static>(
        &self,
        conn: &mut SqliteConnection,
        beans: Vec<T>,
    ) -> Result<Vec<T>> {
        self.batch_insert::<T>().extend(beans).execute(conn).await
    }

    /// Collects beans for one multi-row insert.
    pub fn batch_insert<T: Send + Sync + 'static>(&self) -> BatchInsert<'_, T> {
        BatchInsert {
            mapper: self,
            entries: Vec::new(),
        }
    }

    /// Updates every mapped column of a bean by primary key. Returns true
    /// if exactly one row changed.
    pub async fn update<T: Send + Sync + 'static>(&self, conn: &mut SqliteConnection, bean: &T) -> Result<bool> {
        let mapping = self.registry.mapping::<T>(conn).await?;
        let sql = statements::update(&mapping, bean)?;
        Ok(engine::execute_update(conn, &sql).await? == 1)
    }

    /// Deletes a bean by its primary key. Returns true if exactly one row
    /// was removed.
    pub async fn delete<T: Send + Sync + 'static>(&self, conn: &mut SqliteConnection, bean: &T) -> Result<bool> {
        let mapping = self.registry.mapping::<T>(conn).await?;
        let pk = mapping.require_pk()?.property().get(bean);
        let sql = statements::delete_by_pk(&mapping, pk)?;
        Ok(engine::execute_update(conn, &sql).await? == 1)
    }

    /// Deletes the `T` row with the given key.
    pub async fn delete_by_pk<T, K>(&self, conn: &mut SqliteConnection, pk: K) -> Result<bool>
    where
        T: 'static,
        K: ToSqlValue + Send,
    {
        let mapping = self.registry.mapping::<T>(conn).await?;
        let sql = statements::delete_by_pk(&mapping, pk.to_sql_value())?;
        Ok(engine::execute_update(conn, &sql).await? == 1)
    }

    /// Updates only the named properties of the `T` row with the given key.
    ///
    /// Names that are not mapped properties of `T` are skipped. Returns true
    /// if the row exists.
    pub async fn patch<T, K, I, N>(&self, conn: &mut SqliteConnection, pk: K, values: I) -> Result<bool>
    where
        T: 'static,
        K: ToSqlValue + Send,
        I: IntoIterator<Item = (N, SqlValue)> + Send,
        N: AsRef<str>,
    {
        let mapping = self.registry.mapping::<T>(conn).await?;
        let sql = statements::patch(&mapping, pk.to_sql_value(), values)?;
        Ok(engine::execute_update(conn, &sql).await? == 1)
    }
}

/// Applies a generated key to the bean if the strategy has a generator.
async fn with_new_key<T: 'static>(
    conn: &mut SqliteConnection,
    mapping: &BeanMapping<T>,
    bean: T,
) -> Result<T> {
    let Some(pk) = mapping.pk() else {
        return Ok(bean);
    };
    let kind = pk
        .property()
        .value_kind()
        .unwrap_or_else(|| pk.column().value_kind());
    match mapping.pk_strategy().new_primary_key(conn, kind).await? {
        Some(key) => pk.property().set(bean, PropertyValue::Sql(key)),
        None => Ok(bean),
    }
}

/// Assigns generated keys to beans by position; `keys` must be in insertion
/// order, see [`engine::insert_returning_keys`].
fn apply_keys<T: 'static>(mapping: &BeanMapping<T>, beans: Vec<T>, keys: Vec<SqlValue>) -> Result<Vec<T>> {
    if keys.len() != beans.len() {
        return Err(MapperError::GeneratedKeyCount {
            expected: beans.len(),
            actual: keys.len(),
        });
    }
    let pk = mapping.require_pk()?;
    beans
        .into_iter()
        .zip(keys)
        .map(|(bean, key)| pk.property().set(bean, PropertyValue::Sql(key)))
        .collect()
}

async fn insert_one<T: Send + Sync + 'static>(
    conn: &mut SqliteConnection,
    mapping: &BeanMapping<T>,
    bean: T,
) -> Result<T> {
    match (mapping.pk_strategy(), mapping.pk()) {
        (PkStrategy::AutoIncrement, Some(pk)) => {
            let sql = statements::insert(mapping, &bean);
            let keys = engine::insert_returning_keys(conn, &sql, &pk.column().name).await?;
            let mut beans = apply_keys(mapping, vec![bean], keys)?;
            beans.pop().ok_or(MapperError::GeneratedKeyCount {
                expected: 1,
                actual: 0,
            })
        }
        (PkStrategy::AutoIncrement, None) => {
            engine::execute_update(conn, &statements::insert(mapping, &bean)).await?;
            Ok(bean)
        }
        (PkStrategy::Provided(_), _) => {
            let bean = with_new_key(conn, mapping, bean).await?;
            engine::execute_update(conn, &statements::insert(mapping, &bean)).await?;
            Ok(bean)
        }
    }
}

/// A multi-row insert under construction.
///
/// All beans must resolve to the same mapping; a mix of tables fails before
/// anything is written.
#[must_use]
pub struct BatchInsert<'m, T> {
    mapper: &'m SqlMapper,
    entries: Vec<(Option<String>, T)>,
}

impl<T: Send + Sync + 'static> BatchInsert<'_, T> {
    /// Adds a bean bound for its default table.
    pub fn push(mut self, bean: T) -> Self {
        self.entries.push((None, bean));
        self
    }

    /// Adds a bean bound for `table`.
    pub fn push_into(mut self, table: &str, bean: T) -> Self {
        self.entries.push((Some(table.to_owned()), bean));
        self
    }

    /// Adds beans bound for their default table.
    pub fn extend(mut self, beans: impl IntoIterator<Item = T>) -> Self {
        self.entries.extend(beans.into_iter().map(|bean| (None, bean)));
        self
    }

    /// Number of collected beans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no bean was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts all beans and returns them with their keys, in input order.
    pub async fn execute(self, conn: &mut SqliteConnection) -> Result<Vec<T>> {
        let registry = self.mapper.registry();
        let mut mapping: Option<Arc<BeanMapping<T>>> = None;
        let mut beans = Vec::with_capacity(self.entries.len());
        for (table, bean) in self.entries {
            let resolved = registry.mapping_for_table::<T>(conn, table.as_deref()).await?;
            let first = mapping.get_or_insert_with(|| Arc::clone(&resolved));
            if !Arc::ptr_eq(first, &resolved) {
                return Err(MapperError::MixedBatch {
                    first: first.label(),
                    other: resolved.label(),
                });
            }
            beans.push(bean);
        }
        let Some(mapping) = mapping else {
            return Ok(beans);
        };
        debug!(mapping = %mapping.label(), rows = beans.len(), "Batch insert");

        if mapping.insert_columns().is_empty() {
            let mut inserted = Vec::with_capacity(beans.len());
            for bean in beans {
                inserted.push(insert_one(conn, &mapping, bean).await?);
            }
            return Ok(inserted);
        }

        if !mapping.pk_strategy().is_auto_increment() {
            let mut keyed = Vec::with_capacity(beans.len());
            for bean in beans {
                keyed.push(with_new_key(conn, &mapping, bean).await?);
            }
            beans = keyed;
        }

        let sql = statements::insert_many(&mapping, beans.iter());
        match (mapping.pk_strategy(), mapping.pk()) {
            (PkStrategy::AutoIncrement, Some(pk)) => {
                let keys = engine::insert_returning_keys(conn, &sql, &pk.column().name).await?;
                apply_keys(&mapping, beans, keys)
            }
            _ => {
                engine::execute_update(conn, &sql).await?;
                Ok(beans)
            }
        }
    }
}
