//! Bean metadata: property descriptors, type tokens and instantiation.
//!
//! A bean is any Rust type whose instances map to table rows. Its
//! [`BeanMetaData`] lists the properties with their column names, declared
//! types, accessors and relation hints, and knows how to create a bean from
//! a set of property values.
//!
//! Two introspection styles are supported:
//! - [`AccessorBean`]: a `Default` type with mutable setters, usually
//!   implemented through `#[derive(Bean)]`.
//! - [`BuilderBean`]: an immutable type assembled through a builder, with
//!   copy-on-write `with_*` operations.

mod accessor;
mod builder;
mod registry;

pub use accessor::{accessor_metadata, AccessorBean, AccessorBeans};
pub use builder::{builder_metadata, BuilderBean, BuilderBeans, BuilderProperty};
pub use registry::{BeanMetaDataRegistry, CompositeBeanMetaDataRegistry};

pub(crate) use registry::metadata_for;

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use oxide_snippet::{FromSqlValue, SnippetError, SqlValue, ToSqlValue, ValueKind};

use crate::error::{MapperError, Result};

/// A runtime token for a Rust type.
#[derive(Debug, Clone, Copy)]
pub struct BeanType {
    id: TypeId,
    name: &'static str,
}

impl BeanType {
    /// Returns the token for `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The type id.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The type name without module path or generic arguments.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for BeanType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BeanType {}

impl Hash for BeanType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// A single column value.
    Scalar(ValueKind),
    /// A collection of beans, filled through a relation.
    Collection {
        /// The element bean type.
        element: BeanType,
        /// The collection type itself, e.g. `Vec<Address>`.
        collection: BeanType,
    },
}

/// A relation declared on a collection property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationHint {
    /// Detail rows reference the owner through a foreign key.
    OneToMany(OneToManyHint),
    /// Owner and detail are linked through a join table.
    ManyToMany(ManyToManyHint),
}

/// Optional overrides for a one-to-many relation. Missing parts are derived
/// from the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OneToManyHint {
    /// The detail table; defaults to the element bean's table.
    pub detail_table: Option<String>,
    /// The foreign-key column in the detail table.
    pub foreign_key: Option<String>,
}

/// A many-to-many declaration. Only the join table is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToManyHint {
    /// The join table.
    pub join_table: String,
    /// Join-table column referencing the owner.
    pub fk_to_owner: Option<String>,
    /// Join-table column referencing the detail.
    pub fk_to_detail: Option<String>,
    /// The detail table; defaults to the element bean's table.
    pub detail_table: Option<String>,
    /// Primary-key column of the detail table.
    pub detail_pk: Option<String>,
}

impl ManyToManyHint {
    /// Declares a join table, leaving everything else to the schema.
    #[must_use]
    pub fn new(join_table: &str) -> Self {
        Self {
            join_table: join_table.to_owned(),
            fk_to_owner: None,
            fk_to_detail: None,
            detail_table: None,
            detail_pk: None,
        }
    }
}

/// A value handed to a property setter.
#[derive(Clone)]
pub enum PropertyValue {
    /// A column value read from a row.
    Sql(SqlValue),
    /// A pre-fetched collection for a relation property.
    Provided(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(value) => f.debug_tuple("Sql").field(value).finish(),
            Self::Provided(_) => f.write_str("Provided(..)"),
        }
    }
}

type Getter<T> = Arc<dyn Fn(&T) -> SqlValue + Send + Sync>;
type Setter<T> = Arc<dyn Fn(T, PropertyValue) -> Result<T> + Send + Sync>;

/// Describes one property of a bean.
pub struct BeanProperty<T> {
    name: String,
    column_name: String,
    declared_type: PropertyType,
    relation: Option<RelationHint>,
    getter: Option<Getter<T>>,
    setter: Setter<T>,
}

impl<T> Clone for BeanProperty<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            column_name: self.column_name.clone(),
            declared_type: self.declared_type,
            relation: self.relation.clone(),
            getter: self.getter.clone(),
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<T> fmt::Debug for BeanProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanProperty")
            .field("name", &self.name)
            .field("column_name", &self.column_name)
            .field("declared_type", &self.declared_type)
            .field("relation", &self.relation)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> BeanProperty<T> {
    /// A scalar property with a copy-on-write setter.
    #[must_use]
    pub fn scalar<V>(name: &str, get: fn(&T) -> V, with: fn(T, V) -> T) -> Self
    where
        V: ToSqlValue + FromSqlValue + 'static,
    {
        let property = name.to_owned();
        Self::new(
            name,
            PropertyType::Scalar(V::KIND),
            Some(Arc::new(move |bean: &T| get(bean).to_sql_value())),
            Arc::new(move |bean, value| {
                let value = convert::<V>(&property, value)?;
                Ok(with(bean, value))
            }),
        )
    }

    /// A scalar property with a mutable setter.
    #[must_use]
    pub fn field<V>(name: &str, get: fn(&T) -> V, set: fn(&mut T, V)) -> Self
    where
        V: ToSqlValue + FromSqlValue + 'static,
    {
        let property = name.to_owned();
        Self::new(
            name,
            PropertyType::Scalar(V::KIND),
            Some(Arc::new(move |bean: &T| get(bean).to_sql_value())),
            Arc::new(move |mut bean, value| {
                set(&mut bean, convert::<V>(&property, value)?);
                Ok(bean)
            }),
        )
    }

    /// A collection property of `E` beans held as `C`, with a copy-on-write
    /// setter.
    #[must_use]
    pub fn to_many<E, C>(name: &str, with: fn(T, C) -> T) -> Self
    where
        E: 'static,
        C: Clone + Send + Sync + 'static,
    {
        let property = name.to_owned();
        Self::new(
            name,
            collection_type::<E, C>(),
            None,
            Arc::new(move |bean, value| {
                let value = downcast_collection::<T, C>(&property, value)?;
                Ok(with(bean, value))
            }),
        )
    }

    /// A collection property of `E` beans held as `C`, with a mutable setter.
    #[must_use]
    pub fn collection<E, C>(name: &str, set: fn(&mut T, C)) -> Self
    where
        E: 'static,
        C: Clone + Send + Sync + 'static,
    {
        let property = name.to_owned();
        Self::new(
            name,
            collection_type::<E, C>(),
            None,
            Arc::new(move |mut bean, value| {
                set(&mut bean, downcast_collection::<T, C>(&property, value)?);
                Ok(bean)
            }),
        )
    }

    fn new(
        name: &str,
        declared_type: PropertyType,
        getter: Option<Getter<T>>,
        setter: Setter<T>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            column_name: name.to_owned(),
            declared_type,
            relation: None,
            getter,
            setter,
        }
    }

    /// Maps the property to a column with a different name.
    #[must_use]
    pub fn with_column(mut self, column: &str) -> Self {
        column.clone_into(&mut self.column_name);
        self
    }

    /// Attaches a relation hint to a collection property.
    #[must_use]
    pub fn with_relation(mut self, relation: RelationHint) -> Self {
        self.relation = Some(relation);
        self
    }
}

impl<T> BeanProperty<T> {
    /// Reads the property as a SQL value. Collections read as `NULL`.
    pub fn get(&self, bean: &T) -> SqlValue {
        self.getter
            .as_ref()
            .map_or(SqlValue::Null, |getter| getter(bean))
    }

    /// Returns the bean with this property replaced by `value`.
    pub fn set(&self, bean: T, value: PropertyValue) -> Result<T> {
        (self.setter)(bean, value)
    }

    /// The property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The column the property maps to.
    #[must_use]
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// The declared type.
    #[must_use]
    pub const fn declared_type(&self) -> PropertyType {
        self.declared_type
    }

    /// The relation hint, if any.
    #[must_use]
    pub const fn relation(&self) -> Option<&RelationHint> {
        self.relation.as_ref()
    }

    /// The scalar kind, or `None` for collections.
    #[must_use]
    pub const fn value_kind(&self) -> Option<ValueKind> {
        match self.declared_type {
            PropertyType::Scalar(kind) => Some(kind),
            PropertyType::Collection { .. } => None,
        }
    }
}

fn collection_type<E: 'static, C: 'static>() -> PropertyType {
    PropertyType::Collection {
        element: BeanType::of::<E>(),
        collection: BeanType::of::<C>(),
    }
}

fn convert<V: FromSqlValue>(property: &str, value: PropertyValue) -> Result<V> {
    match value {
        PropertyValue::Sql(value) => V::from_sql_value(value),
        PropertyValue::Provided(_) => Err(SnippetError::Conversion {
            expected: V::KIND,
            found: "collection",
        }),
    }
    .map_err(|source| MapperError::Conversion {
        column: property.to_owned(),
        source,
    })
}

fn downcast_collection<T, C: Clone + 'static>(property: &str, value: PropertyValue) -> Result<C> {
    let requested = match value {
        PropertyValue::Provided(any) => match any.downcast_ref::<C>() {
            Some(collection) => return Ok(collection.clone()),
            None => "another collection type",
        },
        PropertyValue::Sql(value) => value.type_name(),
    };
    Err(MapperError::RelationTypeMismatch {
        bean: std::any::type_name::<T>().to_owned(),
        property: property.to_owned(),
        declared: std::any::type_name::<C>().to_owned(),
        requested: requested.to_owned(),
    })
}

type Instantiator<T> =
    Arc<dyn Fn(&[BeanProperty<T>], Vec<(usize, PropertyValue)>) -> Result<T> + Send + Sync>;

/// The full description of a bean type.
pub struct BeanMetaData<T> {
    bean_type: BeanType,
    table_name: Option<String>,
    properties: Vec<BeanProperty<T>>,
    instantiate: Instantiator<T>,
}

impl<T> fmt::Debug for BeanMetaData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanMetaData")
            .field("bean_type", &self.bean_type)
            .field("table_name", &self.table_name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> BeanMetaData<T> {
    /// Creates metadata from properties and an instantiation function.
    ///
    /// `instantiate` receives the property list and `(property index, value)`
    /// pairs and must return a bean with those properties set.
    pub fn new<F>(table_name: Option<&str>, properties: Vec<BeanProperty<T>>, instantiate: F) -> Self
    where
        F: Fn(&[BeanProperty<T>], Vec<(usize, PropertyValue)>) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            bean_type: BeanType::of::<T>(),
            table_name: table_name.map(ToOwned::to_owned),
            properties,
            instantiate: Arc::new(instantiate),
        }
    }
}

impl<T> BeanMetaData<T> {
    /// The bean type.
    #[must_use]
    pub const fn bean_type(&self) -> BeanType {
        self.bean_type
    }

    /// Explicit table name, if the bean declares one.
    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    /// All properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[BeanProperty<T>] {
        &self.properties
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&BeanProperty<T>> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Position of a property by name.
    #[must_use]
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub(crate) fn require_property(&self, name: &str) -> Result<(usize, &BeanProperty<T>)> {
        self.properties
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
            .ok_or_else(|| MapperError::UnknownProperty {
                bean: self.bean_type.short_name().to_owned(),
                property: name.to_owned(),
            })
    }

    /// Creates a bean from `(property index, value)` pairs.
    pub fn instantiate(&self, values: Vec<(usize, PropertyValue)>) -> Result<T> {
        (self.instantiate)(&self.properties, values)
    }
}

/// Type-erased view of [`BeanMetaData`], as stored by the registries.
pub trait AnyBeanMetaData: Send + Sync {
    /// The described bean type.
    fn bean_type(&self) -> BeanType;

    /// Explicit table name, if declared.
    fn table_name(&self) -> Option<&str>;

    /// Converts into `Any` for downcasting to `BeanMetaData<T>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: 'static> AnyBeanMetaData for BeanMetaData<T> {
    fn bean_type(&self) -> BeanType {
        self.bean_type
    }

    fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Tag {
        id: i64,
        label: String,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Post {
        id: i64,
        tags: Vec<Tag>,
    }

    fn label() -> BeanProperty<Tag> {
        BeanProperty::field("label", |t: &Tag| t.label.clone(), |t, v| t.label = v)
            .with_column("tag_label")
    }

    #[test]
    fn test_bean_type_names() {
        let ty = BeanType::of::<Vec<Tag>>();
        assert_eq!(ty.short_name(), "Vec");
        assert_eq!(BeanType::of::<Tag>().short_name(), "Tag");
        assert_eq!(BeanType::of::<Tag>(), BeanType::of::<Tag>());
        assert_ne!(BeanType::of::<Tag>(), BeanType::of::<Post>());
    }

    #[test]
    fn test_field_get_and_set() {
        let property = label();
        assert_eq!(property.column_name(), "tag_label");
        assert_eq!(property.value_kind(), Some(ValueKind::Text));

        let tag = property
            .set(Tag::default(), PropertyValue::Sql(SqlValue::Text("rust".into())))
            .unwrap();
        assert_eq!(tag.label, "rust");
        assert_eq!(property.get(&tag), SqlValue::Text("rust".into()));
    }

    #[test]
    fn test_scalar_conversion_error_names_property() {
        let err = label()
            .set(Tag::default(), PropertyValue::Sql(SqlValue::Int(3)))
            .unwrap_err();
        assert!(matches!(err, MapperError::Conversion { column, .. } if column == "label"));
    }

    #[test]
    fn test_collection_setter_downcasts() {
        let property: BeanProperty<Post> =
            BeanProperty::collection::<Tag, Vec<Tag>>("tags", |p, v| p.tags = v);
        assert!(property.value_kind().is_none());
        assert_eq!(property.get(&Post::default()), SqlValue::Null);

        let tags = vec![Tag {
            id: 1,
            label: "a".into(),
        }];
        let provided: Arc<dyn Any + Send + Sync> = Arc::new(tags.clone());
        let post = property
            .set(Post::default(), PropertyValue::Provided(provided))
            .unwrap();
        assert_eq!(post.tags, tags);

        let wrong: Arc<dyn Any + Send + Sync> = Arc::new(vec![1_i64]);
        let err = property
            .set(Post::default(), PropertyValue::Provided(wrong))
            .unwrap_err();
        assert!(matches!(err, MapperError::RelationTypeMismatch { .. }));
    }

    #[test]
    fn test_copy_on_write_scalar() {
        let property: BeanProperty<Tag> = BeanProperty::scalar(
            "id",
            |t: &Tag| t.id,
            |t, id| Tag { id, ..t },
        );
        let tag = property
            .set(Tag::default(), PropertyValue::Sql(SqlValue::Int(9)))
            .unwrap();
        assert_eq!(tag.id, 9);
    }

    #[test]
    fn test_metadata_lookup() {
        let metadata = BeanMetaData::new(Some("tags"), vec![label()], |_, _| Ok(Tag::default()));
        assert_eq!(metadata.table_name(), Some("tags"));
        assert_eq!(metadata.property_index("label"), Some(0));
        assert!(metadata.property("missing").is_none());
        assert!(matches!(
            metadata.require_property("missing"),
            Err(MapperError::UnknownProperty { .. })
        ));
    }

    /// Reads metadata without a lifetime bound on the bean type.
    fn describe<T>(metadata: &BeanMetaData<T>, bean: &T) -> Vec<(String, SqlValue)> {
        metadata
            .properties()
            .iter()
            .map(|property| (property.column_name().to_owned(), property.get(bean)))
            .collect()
    }

    #[test]
    fn test_metadata_readable_from_unbounded_generics() {
        let metadata = BeanMetaData::new(None, vec![label()], |_, _| Ok(Tag::default()));
        let tag = Tag {
            id: 1,
            label: "db".into(),
        };
        assert_eq!(
            describe(&metadata, &tag),
            [(String::from("tag_label"), SqlValue::Text("db".into()))]
        );
        assert_eq!(metadata.bean_type().short_name(), "Tag");
    }
}
