//! Builder-style beans: immutable types assembled through a builder.

use std::any::TypeId;
use std::sync::Arc;

use oxide_snippet::{FromSqlValue, ToSqlValue};

use super::registry::Registrations;
use super::{
    downcast_collection, AnyBeanMetaData, BeanMetaData, BeanMetaDataRegistry, BeanProperty,
    BeanType, PropertyValue, RelationHint,
};
use crate::error::{MapperError, Result};

type BuilderSetter<B> = Arc<dyn Fn(&mut B, PropertyValue) -> Result<()> + Send + Sync>;

/// A bean without a blank instance: rows are collected into a builder,
/// and existing beans are changed through `with_*` operations.
pub trait BuilderBean: Send + Sync + Sized + 'static {
    /// The mutable builder.
    type Builder: Default;

    /// The bean's properties in declaration order.
    fn properties() -> Vec<BuilderProperty<Self>>;

    /// Completes a builder, or reports what is missing.
    fn build(builder: Self::Builder) -> std::result::Result<Self, String>;

    /// Explicit table name. `None` defers to the table-name extractor.
    #[must_use]
    fn table_name() -> Option<&'static str> {
        None
    }
}

/// A property of a builder-style bean: the bean view plus the builder setter.
pub struct BuilderProperty<T: BuilderBean> {
    property: BeanProperty<T>,
    on_builder: BuilderSetter<T::Builder>,
}

impl<T: BuilderBean> BuilderProperty<T> {
    /// A scalar property.
    #[must_use]
    pub fn scalar<V>(
        name: &str,
        get: fn(&T) -> V,
        with: fn(T, V) -> T,
        on_builder: fn(&mut T::Builder, V),
    ) -> Self
    where
        V: ToSqlValue + FromSqlValue + 'static,
    {
        let property = BeanProperty::scalar(name, get, with);
        let column = name.to_owned();
        Self {
            property,
            on_builder: Arc::new(move |builder, value| {
                on_builder(builder, super::convert::<V>(&column, value)?);
                Ok(())
            }),
        }
    }

    /// A collection of `E` beans held as `C`.
    #[must_use]
    pub fn to_many<E, C>(name: &str, with: fn(T, C) -> T, on_builder: fn(&mut T::Builder, C)) -> Self
    where
        E: 'static,
        C: Clone + Send + Sync + 'static,
    {
        let property = BeanProperty::to_many::<E, C>(name, with);
        let name = name.to_owned();
        Self {
            property,
            on_builder: Arc::new(move |builder, value| {
                on_builder(builder, downcast_collection::<T, C>(&name, value)?);
                Ok(())
            }),
        }
    }

    /// Maps the property to a column with a different name.
    #[must_use]
    pub fn with_column(mut self, column: &str) -> Self {
        self.property = self.property.with_column(column);
        self
    }

    /// Attaches a relation hint.
    #[must_use]
    pub fn with_relation(mut self, relation: RelationHint) -> Self {
        self.property = self.property.with_relation(relation);
        self
    }
}

/// Builds the metadata of a builder-style bean.
#[must_use]
pub fn builder_metadata<T: BuilderBean>() -> BeanMetaData<T>
where
    T::Builder: 'static,
{
    let (properties, setters): (Vec<_>, Vec<_>) = T::properties()
        .into_iter()
        .map(|p| (p.property, p.on_builder))
        .unzip();
    BeanMetaData::new(T::table_name(), properties, move |_, values| {
        let mut builder = T::Builder::default();
        for (index, value) in values {
            if let Some(setter) = setters.get(index) {
                setter(&mut builder, value)?;
            }
        }
        T::build(builder).map_err(|message| MapperError::BeanConstruction {
            bean: BeanType::of::<T>().short_name().to_owned(),
            message,
        })
    })
}

fn erased<T: BuilderBean>() -> Arc<dyn AnyBeanMetaData>
where
    T::Builder: 'static,
{
    Arc::new(builder_metadata::<T>())
}

/// Registry of builder-style beans.
#[derive(Debug, Default)]
pub struct BuilderBeans {
    registrations: Registrations,
}

impl BuilderBeans {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bean type.
    #[must_use]
    pub fn register<T: BuilderBean>(mut self) -> Self
    where
        T::Builder: 'static,
    {
        self.registrations.add(TypeId::of::<T>(), erased::<T>);
        self
    }
}

impl BeanMetaDataRegistry for BuilderBeans {
    fn can_handle(&self, bean_type: &BeanType) -> bool {
        self.registrations.contains(bean_type)
    }

    fn bean_metadata(&self, bean_type: &BeanType) -> Result<Arc<dyn AnyBeanMetaData>> {
        self.registrations.metadata(bean_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beans::metadata_for;
    use oxide_snippet::SqlValue;

    #[derive(Debug, Clone, PartialEq)]
    struct City {
        id: i64,
        name: String,
    }

    #[derive(Default)]
    struct CityBuilder {
        id: Option<i64>,
        name: Option<String>,
    }

    impl BuilderBean for City {
        type Builder = CityBuilder;

        fn properties() -> Vec<BuilderProperty<Self>> {
            vec![
                BuilderProperty::scalar("id", |c: &Self| c.id, |c, id| Self { id, ..c }, |b, v| {
                    b.id = Some(v);
                }),
                BuilderProperty::scalar(
                    "name",
                    |c: &Self| c.name.clone(),
                    |c, name| Self { name, ..c },
                    |b, v| b.name = Some(v),
                ),
            ]
        }

        fn build(builder: CityBuilder) -> std::result::Result<Self, String> {
            Ok(Self {
                id: builder.id.unwrap_or_default(),
                name: builder.name.ok_or("name is required")?,
            })
        }
    }

    #[test]
    fn test_builder_instantiation() {
        let registry = BuilderBeans::new().register::<City>();
        let metadata = metadata_for::<City>(&registry).unwrap();
        let city = metadata
            .instantiate(vec![
                (0, PropertyValue::Sql(SqlValue::Int(3))),
                (1, PropertyValue::Sql(SqlValue::Text("Graz".into()))),
            ])
            .unwrap();
        assert_eq!(
            city,
            City {
                id: 3,
                name: "Graz".into()
            }
        );
    }

    #[test]
    fn test_builder_reports_missing_values() {
        let metadata = builder_metadata::<City>();
        let err = metadata.instantiate(vec![]).unwrap_err();
        assert!(matches!(err, MapperError::BeanConstruction { message, .. } if message == "name is required"));
    }

    #[test]
    fn test_with_operation_copies() {
        let metadata = builder_metadata::<City>();
        let original = City {
            id: 1,
            name: "Linz".into(),
        };
        let changed = metadata.properties()[0]
            .set(original.clone(), PropertyValue::Sql(SqlValue::Int(2)))
            .unwrap();
        assert_eq!(changed.id, 2);
        assert_eq!(original.id, 1);
    }

    #[test]
    fn test_unregistered_type_is_not_handled() {
        let registry = BuilderBeans::new();
        assert!(!registry.can_handle(&BeanType::of::<City>()));
    }
}
