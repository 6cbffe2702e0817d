//! Bean queries, grouped to-many queries and relation injection.

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use oxide_snippet::{FromSqlValue, SqlSnippet, SqlValue};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::beans::{BeanMetaData, PropertyType, PropertyValue};
use crate::engine;
use crate::error::{MapperError, Result};
use crate::mapper::SqlMapper;
use crate::provided::{KeyValue, ProvidedProperties, ProvidedValues};
use crate::relations::{check_relation_types, ManyToManySpec};
use crate::row::{ColumnIndex, SqlRow};

/// Where each property's value sits in a result row.
struct RowLayout {
    scalars: Vec<(usize, usize)>,
    keys: Vec<usize>,
}

/// A collection property filled from provided values.
struct ProvidedTarget {
    index: usize,
    values: Arc<ProvidedValues>,
    key_column: String,
}

/// Turns rows into beans, injecting provided collections.
pub(crate) struct RowMapper<T> {
    metadata: Arc<BeanMetaData<T>>,
    provided: Vec<ProvidedTarget>,
}

impl<T: Send + 'static> RowMapper<T> {
    /// `default_key` locates the owner key for provided values that do not
    /// name their own key column.
    pub(crate) fn new(
        metadata: Arc<BeanMetaData<T>>,
        provided: &ProvidedProperties,
        default_key: Option<String>,
    ) -> Result<Self> {
        let bean = metadata.bean_type().short_name().to_owned();
        let mut targets = Vec::new();
        for (name, values) in provided.iter() {
            let (index, property) = metadata.require_property(name)?;
            match property.declared_type() {
                PropertyType::Collection { collection, .. }
                    if collection == values.collection_type() => {}
                PropertyType::Collection { collection, .. } => {
                    return Err(MapperError::RelationTypeMismatch {
                        bean,
                        property: name.to_owned(),
                        declared: collection.name().to_owned(),
                        requested: values.collection_type().name().to_owned(),
                    })
                }
                PropertyType::Scalar(_) => {
                    return Err(MapperError::NotARelation {
                        bean,
                        property: name.to_owned(),
                    })
                }
            }
            let key_column = match (values.key_column(), &default_key) {
                (Some(column), _) => column.to_owned(),
                (None, Some(column)) => column.clone(),
                (None, None) => return Err(MapperError::NoPrimaryKey(bean)),
            };
            targets.push(ProvidedTarget {
                index,
                values: Arc::clone(values),
                key_column,
            });
        }
        Ok(Self {
            metadata,
            provided: targets,
        })
    }

    fn layout(&self, columns: &ColumnIndex) -> Result<RowLayout> {
        let scalars = self
            .metadata
            .properties()
            .iter()
            .enumerate()
            .filter(|(_, property)| property.value_kind().is_some())
            .filter_map(|(index, property)| {
                columns
                    .position(property.column_name())
                    .map(|position| (index, position))
            })
            .collect();
        let keys = self
            .provided
            .iter()
            .map(|target| {
                columns
                    .position(&target.key_column)
                    .ok_or_else(|| MapperError::MissingKeyColumn(target.key_column.clone()))
            })
            .collect::<Result<_>>()?;
        Ok(RowLayout { scalars, keys })
    }

    fn extract(&self, layout: &RowLayout, row: &SqlRow) -> Result<T> {
        let mut values: Vec<(usize, PropertyValue)> = layout
            .scalars
            .iter()
            .map(|&(index, position)| (index, PropertyValue::Sql(row.value(position).clone())))
            .collect();
        for (target, &position) in self.provided.iter().zip(&layout.keys) {
            if let Some(collection) = target.values.get(row.value(position)) {
                values.push((target.index, PropertyValue::Provided(collection)));
            }
        }
        self.metadata.instantiate(values)
    }

    /// Runs `sql` and hands each row with its bean to `on_bean`.
    pub(crate) async fn for_each<F>(
        &self,
        conn: &mut SqliteConnection,
        sql: &SqlSnippet,
        mut on_bean: F,
    ) -> Result<()>
    where
        F: FnMut(&SqlRow, T) -> Result<()> + Send,
    {
        let mut layout: Option<RowLayout> = None;
        engine::fetch_rows(conn, sql, |row| {
            let current = match layout.take() {
                Some(current) => current,
                None => self.layout(row.columns())?,
            };
            let bean = self.extract(&current, &row);
            layout = Some(current);
            on_bean(&row, bean?)
        })
        .await?;
        Ok(())
    }
}

/// Resolves the owner primary key column for provided values that do not
/// name their own key column.
async fn provided_key_column<T: 'static>(
    mapper: &SqlMapper,
    conn: &mut SqliteConnection,
    provided: &ProvidedProperties,
) -> Result<Option<String>> {
    if provided.iter().all(|(_, values)| values.key_column().is_some()) {
        return Ok(None);
    }
    let mapping = mapper.registry().mapping::<T>(conn).await?;
    Ok(Some(mapping.require_pk()?.column().name.clone()))
}

/// Groups the beans of a query by the value of one column.
async fn group_by_key<K, T, C, P, B>(
    mapper: &SqlMapper,
    conn: &mut SqliteConnection,
    sql: &SqlSnippet,
    key_column: &str,
    provided: &ProvidedProperties,
    parse_key: P,
    build: B,
) -> Result<HashMap<K, C>>
where
    K: Eq + Hash + Send,
    T: Send + 'static,
    P: Fn(&SqlValue) -> Result<Option<K>> + Send + Sync,
    B: Fn(Vec<T>) -> C + Send,
{
    let metadata = mapper.registry().metadata::<T>()?;
    let key_for_provided = provided_key_column::<T>(mapper, conn, provided).await?;
    let rows = RowMapper::new(metadata, provided, key_for_provided)?;

    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    let mut key_position: Option<usize> = None;
    rows.for_each(conn, sql, |row, bean| {
        let position = match key_position {
            Some(position) => position,
            None => {
                let position = row
                    .columns()
                    .position(key_column)
                    .ok_or_else(|| MapperError::MissingKeyColumn(key_column.to_owned()))?;
                key_position = Some(position);
                position
            }
        };
        if let Some(key) = parse_key(row.value(position))? {
            groups.entry(key).or_default().push(bean);
        }
        Ok(())
    })
    .await?;

    Ok(groups
        .into_iter()
        .map(|(key, beans)| (key, build(beans)))
        .collect())
}

/// A source of provided values computed from the owner query.
trait Injection: Send + Sync {
    fn property(&self) -> &str;

    fn provide<'a>(
        &'a self,
        mapper: &'a SqlMapper,
        conn: &'a mut SqliteConnection,
        owner_query: &'a SqlSnippet,
    ) -> BoxFuture<'a, Result<ProvidedValues>>;
}

struct ManyToManyInjection<O, E, C> {
    property: String,
    _types: PhantomData<fn() -> (O, E, C)>,
}

impl<O, E, C> Injection for ManyToManyInjection<O, E, C>
where
    O: 'static,
    E: Send + 'static,
    C: FromIterator<E> + Send + Sync + 'static,
{
    fn property(&self) -> &str {
        &self.property
    }

    fn provide<'a>(
        &'a self,
        mapper: &'a SqlMapper,
        conn: &'a mut SqliteConnection,
        owner_query: &'a SqlSnippet,
    ) -> BoxFuture<'a, Result<ProvidedValues>> {
        async move {
            let spec = mapper
                .registry()
                .many_to_many::<O>(conn, &self.property)
                .await?;
            check_relation_types::<E, C>(&spec.owner, &spec.property, &spec.element, &spec.collection)?;
            let kind = spec.key_kind;
            let groups = group_by_key::<KeyValue, E, C, _, _>(
                mapper,
                conn,
                &spec.detail_query(owner_query),
                ManyToManySpec::KEY_ALIAS,
                &ProvidedProperties::new(),
                |value| Ok(KeyValue::from_sql(value, kind)),
                |beans| beans.into_iter().collect(),
            )
            .await?;
            Ok(ProvidedValues::from_groups(kind, groups))
        }
        .boxed()
    }
}

struct OneToManyInjection<O, E, C> {
    property: String,
    _types: PhantomData<fn() -> (O, E, C)>,
}

impl<O, E, C> Injection for OneToManyInjection<O, E, C>
where
    O: 'static,
    E: Send + 'static,
    C: FromIterator<E> + Send + Sync + 'static,
{
    fn property(&self) -> &str {
        &self.property
    }

    fn provide<'a>(
        &'a self,
        mapper: &'a SqlMapper,
        conn: &'a mut SqliteConnection,
        owner_query: &'a SqlSnippet,
    ) -> BoxFuture<'a, Result<ProvidedValues>> {
        async move {
            let spec = mapper
                .registry()
                .one_to_many::<O>(conn, &self.property)
                .await?;
            check_relation_types::<E, C>(&spec.owner, &spec.property, &spec.element, &spec.collection)?;
            let kind = spec.key_kind;
            let groups = group_by_key::<KeyValue, E, C, _, _>(
                mapper,
                conn,
                &spec.detail_query(owner_query),
                spec.key_column(),
                &ProvidedProperties::new(),
                |value| Ok(KeyValue::from_sql(value, kind)),
                |beans| beans.into_iter().collect(),
            )
            .await?;
            Ok(ProvidedValues::from_groups(kind, groups).keyed_by(&spec.owner_key_column))
        }
        .boxed()
    }
}

/// A query returning beans of type `T`.
///
/// Collection properties can be filled from explicitly provided values or
/// from relations, each costing one extra statement per relation.
#[must_use]
pub struct MapperQuery<'m, T> {
    mapper: &'m SqlMapper,
    sql: SqlSnippet,
    provided: ProvidedProperties,
    injections: Vec<Box<dyn Injection>>,
    _bean: PhantomData<fn() -> T>,
}

impl<'m, T: Send + 'static> MapperQuery<'m, T> {
    pub(crate) fn new(mapper: &'m SqlMapper, sql: SqlSnippet) -> Self {
        Self {
            mapper,
            sql,
            provided: ProvidedProperties::new(),
            injections: Vec::new(),
            _bean: PhantomData,
        }
    }

    /// The owner query.
    pub const fn sql(&self) -> &SqlSnippet {
        &self.sql
    }

    /// Fills `property` from pre-fetched collections keyed by the bean's
    /// primary key. A property can be provided only once.
    pub fn with_property_values(mut self, property: &str, values: impl Into<ProvidedValues>) -> Result<Self> {
        self.provided.insert(property, values.into())?;
        Ok(self)
    }

    /// Fills `property` through its many-to-many relation.
    pub fn with_many_to_many<E, C>(mut self, property: &str) -> Self
    where
        E: Send + 'static,
        C: FromIterator<E> + Send + Sync + 'static,
    {
        self.injections.push(Box::new(ManyToManyInjection::<T, E, C> {
            property: property.to_owned(),
            _types: PhantomData,
        }));
        self
    }

    /// Fills `property` through its one-to-many relation.
    pub fn with_one_to_many<E, C>(mut self, property: &str) -> Self
    where
        E: Send + 'static,
        C: FromIterator<E> + Send + Sync + 'static,
    {
        self.injections.push(Box::new(OneToManyInjection::<T, E, C> {
            property: property.to_owned(),
            _types: PhantomData,
        }));
        self
    }

    async fn for_each<F>(&self, conn: &mut SqliteConnection, on_bean: F) -> Result<()>
    where
        F: FnMut(&SqlRow, T) -> Result<()> + Send,
    {
        let mut provided = self.provided.clone();
        for injection in &self.injections {
            debug!(property = %injection.property(), "Loading related beans");
            let values = injection.provide(self.mapper, conn, &self.sql).await?;
            provided.insert(injection.property(), values)?;
        }
        let metadata = self.mapper.registry().metadata::<T>()?;
        let key_column = provided_key_column::<T>(self.mapper, conn, &provided).await?;
        RowMapper::new(metadata, &provided, key_column)?
            .for_each(conn, &self.sql, on_bean)
            .await
    }

    /// All beans, in cursor order.
    pub async fn list(&self, conn: &mut SqliteConnection) -> Result<Vec<T>> {
        let mut beans = Vec::new();
        self.for_each(conn, |_, bean| {
            beans.push(bean);
            Ok(())
        })
        .await?;
        Ok(beans)
    }

    /// Exactly one bean.
    pub async fn single(&self, conn: &mut SqliteConnection) -> Result<T> {
        self.optional(conn).await?.ok_or(MapperError::NotFound)
    }

    /// At most one bean.
    pub async fn optional(&self, conn: &mut SqliteConnection) -> Result<Option<T>> {
        let mut found = None;
        self.for_each(conn, |_, bean| {
            if found.is_some() {
                return Err(MapperError::MultipleRows);
            }
            found = Some(bean);
            Ok(())
        })
        .await?;
        Ok(found)
    }
}

type Collector<T, C> = Arc<dyn Fn(Vec<T>) -> C + Send + Sync>;

/// A query whose beans are grouped by a key column into one collection per
/// key.
///
/// Beans keep cursor order within their group. Rows with a `NULL` key are
/// skipped.
#[must_use]
pub struct ToManyQuery<'m, K, T, C> {
    mapper: &'m SqlMapper,
    key_column: String,
    sql: SqlSnippet,
    provided: ProvidedProperties,
    collect: Collector<T, C>,
    _key: PhantomData<fn() -> K>,
}

impl<'m, K, T, C> ToManyQuery<'m, K, T, C>
where
    K: FromSqlValue + Eq + Hash + Send,
    T: Send + 'static,
{
    pub(crate) fn new(
        mapper: &'m SqlMapper,
        key_column: &str,
        sql: SqlSnippet,
        collect: Collector<T, C>,
    ) -> Self {
        Self {
            mapper,
            key_column: key_column.to_owned(),
            sql,
            provided: ProvidedProperties::new(),
            collect,
            _key: PhantomData,
        }
    }

    /// Fills a collection property of the grouped beans from pre-fetched
    /// values keyed by their primary key.
    pub fn with_property_values(mut self, property: &str, values: impl Into<ProvidedValues>) -> Result<Self> {
        self.provided.insert(property, values.into())?;
        Ok(self)
    }

    /// Runs the query.
    pub async fn execute(&self, conn: &mut SqliteConnection) -> Result<HashMap<K, C>> {
        let key_column = self.key_column.as_str();
        let collect = Arc::clone(&self.collect);
        group_by_key::<K, T, C, _, _>(
            self.mapper,
            conn,
            &self.sql,
            key_column,
            &self.provided,
            |value| {
                if value.is_null() {
                    return Ok(None);
                }
                K::from_sql_value(value.clone())
                    .map(Some)
                    .map_err(|source| MapperError::Conversion {
                        column: key_column.to_owned(),
                        source,
                    })
            },
            move |beans| collect(beans),
        )
        .await
    }
}
