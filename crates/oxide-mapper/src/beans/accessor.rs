//! Accessor-style beans: `Default` types with mutable setters.

use std::any::TypeId;
use std::sync::Arc;

use super::registry::Registrations;
use super::{AnyBeanMetaData, BeanMetaData, BeanMetaDataRegistry, BeanProperty, BeanType};
use crate::error::Result;

/// A bean that starts from `Default` and is filled property by property.
///
/// Usually derived:
///
/// ```rust
/// use oxide_mapper::Bean;
///
/// #[derive(Debug, Default, Clone, Bean)]
/// #[bean(table = "person")]
/// struct Person {
///     id: i64,
///     #[column(name = "name")]
///     full_name: String,
/// }
/// ```
pub trait AccessorBean: Default + Send + Sync + 'static {
    /// The bean's properties in declaration order.
    fn properties() -> Vec<BeanProperty<Self>>;

    /// Explicit table name. `None` defers to the table-name extractor.
    #[must_use]
    fn table_name() -> Option<&'static str> {
        None
    }
}

/// Builds the metadata of an accessor-style bean.
#[must_use]
pub fn accessor_metadata<T: AccessorBean>() -> BeanMetaData<T> {
    BeanMetaData::new(T::table_name(), T::properties(), |properties, values| {
        let mut bean = T::default();
        for (index, value) in values {
            if let Some(property) = properties.get(index) {
                bean = property.set(bean, value)?;
            }
        }
        Ok(bean)
    })
}

fn erased<T: AccessorBean>() -> Arc<dyn AnyBeanMetaData> {
    Arc::new(accessor_metadata::<T>())
}

/// Registry of accessor-style beans.
///
/// Only registered types are handled; metadata is built on first use and
/// cached per type.
#[derive(Debug, Default)]
pub struct AccessorBeans {
    registrations: Registrations,
}

impl AccessorBeans {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bean type.
    #[must_use]
    pub fn register<T: AccessorBean>(mut self) -> Self {
        self.registrations.add(TypeId::of::<T>(), erased::<T>);
        self
    }
}

impl BeanMetaDataRegistry for AccessorBeans {
    fn can_handle(&self, bean_type: &BeanType) -> bool {
        self.registrations.contains(bean_type)
    }

    fn bean_metadata(&self, bean_type: &BeanType) -> Result<Arc<dyn AnyBeanMetaData>> {
        self.registrations.metadata(bean_type)
    }
}
