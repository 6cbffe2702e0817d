//! Pre-fetched collections keyed by owner key.
//!
//! Provided values fill collection properties during row extraction: for
//! each owner row, the value of the owner's key column selects the
//! collection to inject. Owners without an entry keep their default.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use oxide_snippet::{FromSqlValue, SqlValue, ToSqlValue, ValueKind};

use crate::beans::BeanType;
use crate::error::{MapperError, Result};

/// A normalized lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
    /// Binary key.
    Blob(Vec<u8>),
}

impl KeyValue {
    /// Normalizes a column value for a key of the given kind. `NULL` has no
    /// key.
    #[must_use]
    pub fn from_sql(value: &SqlValue, kind: ValueKind) -> Option<Self> {
        let key = match (value, kind) {
            (SqlValue::Null, _) => return None,
            (SqlValue::Int(i), ValueKind::Text) => Self::Text(i.to_string()),
            (SqlValue::Int(i), _) => Self::Int(*i),
            (SqlValue::Bool(b), _) => Self::Int(i64::from(*b)),
            (SqlValue::Text(s), ValueKind::Integer | ValueKind::Boolean) => {
                s.parse().map_or_else(|_| Self::Text(s.clone()), Self::Int)
            }
            (SqlValue::Text(s), _) => Self::Text(s.clone()),
            (SqlValue::Float(f), _) => Self::Text(f.to_string()),
            (SqlValue::Blob(b), _) => Self::Blob(b.clone()),
        };
        Some(key)
    }
}

/// Collections for one property, keyed by owner key.
///
/// The owner key is read from the owner's primary key column unless the
/// values name another owner column.
pub struct ProvidedValues {
    kind: ValueKind,
    collection: BeanType,
    key_column: Option<String>,
    values: HashMap<KeyValue, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for ProvidedValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvidedValues")
            .field("kind", &self.kind)
            .field("collection", &self.collection)
            .field("key_column", &self.key_column)
            .field("keys", &self.values.len())
            .finish()
    }
}

impl ProvidedValues {
    /// Wraps a map from owner key to collection. Entries with a `NULL` key
    /// are dropped.
    #[must_use]
    pub fn new<K, C>(values: HashMap<K, C>) -> Self
    where
        K: ToSqlValue + FromSqlValue,
        C: Send + Sync + 'static,
    {
        let values = values
            .into_iter()
            .filter_map(|(key, collection)| {
                let key = KeyValue::from_sql(&key.to_sql_value(), K::KIND)?;
                let collection: Arc<dyn Any + Send + Sync> = Arc::new(collection);
                Some((key, collection))
            })
            .collect();
        Self {
            kind: K::KIND,
            collection: BeanType::of::<C>(),
            key_column: None,
            values,
        }
    }

    pub(crate) fn from_groups<C>(kind: ValueKind, groups: HashMap<KeyValue, C>) -> Self
    where
        C: Send + Sync + 'static,
    {
        Self {
            kind,
            collection: BeanType::of::<C>(),
            key_column: None,
            values: groups
                .into_iter()
                .map(|(key, collection)| {
                    let collection: Arc<dyn Any + Send + Sync> = Arc::new(collection);
                    (key, collection)
                })
                .collect(),
        }
    }

    /// Looks owners up by `column` instead of their primary key.
    #[must_use]
    pub fn keyed_by(mut self, column: &str) -> Self {
        self.key_column = Some(column.to_owned());
        self
    }

    /// The owner column holding the lookup key, if not the primary key.
    #[must_use]
    pub fn key_column(&self) -> Option<&str> {
        self.key_column.as_deref()
    }

    /// The collection for an owner key.
    #[must_use]
    pub fn get(&self, key: &SqlValue) -> Option<Arc<dyn Any + Send + Sync>> {
        KeyValue::from_sql(key, self.kind).and_then(|key| self.values.get(&key).cloned())
    }

    /// The type of the held collections.
    #[must_use]
    pub const fn collection_type(&self) -> BeanType {
        self.collection
    }

    /// Number of owner keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no owner has a collection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, C> From<HashMap<K, C>> for ProvidedValues
where
    K: ToSqlValue + FromSqlValue + Eq + Hash,
    C: Send + Sync + 'static,
{
    fn from(values: HashMap<K, C>) -> Self {
        Self::new(values)
    }
}

/// Provided values per property name.
#[derive(Debug, Clone, Default)]
pub struct ProvidedProperties {
    by_name: HashMap<String, Arc<ProvidedValues>>,
}

impl ProvidedProperties {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds values for a property; a property can be provided only once.
    pub fn with(mut self, property: &str, values: ProvidedValues) -> Result<Self> {
        self.insert(property, values)?;
        Ok(self)
    }

    pub(crate) fn insert(&mut self, property: &str, values: ProvidedValues) -> Result<()> {
        if self.by_name.contains_key(property) {
            return Err(MapperError::DuplicateProvidedProperty(property.to_owned()));
        }
        self.by_name.insert(property.to_owned(), Arc::new(values));
        Ok(())
    }

    /// Returns true if nothing is provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Returns true if the property has provided values.
    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.by_name.contains_key(property)
    }

    /// Iterates over (property, values).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<ProvidedValues>)> {
        self.by_name.iter().map(|(name, values)| (name.as_str(), values))
    }
}
