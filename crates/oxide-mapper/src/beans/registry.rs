//! Metadata registries and their composition.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{AnyBeanMetaData, BeanMetaData, BeanType};
use crate::cache::MemoCache;
use crate::error::{MapperError, Result};

/// Source of bean metadata.
pub trait BeanMetaDataRegistry: Send + Sync {
    /// Returns true if this registry can describe the bean type.
    fn can_handle(&self, bean_type: &BeanType) -> bool;

    /// Returns the metadata of a bean type.
    ///
    /// Repeated calls for the same type return the same instance.
    fn bean_metadata(&self, bean_type: &BeanType) -> Result<Arc<dyn AnyBeanMetaData>>;
}

/// Fetches typed metadata from a registry.
pub(crate) fn metadata_for<T: 'static>(
    registry: &dyn BeanMetaDataRegistry,
) -> Result<Arc<BeanMetaData<T>>> {
    let bean_type = BeanType::of::<T>();
    let erased = registry.bean_metadata(&bean_type)?;
    erased
        .into_any()
        .downcast::<BeanMetaData<T>>()
        .map_err(|_| MapperError::UnmappedBean(bean_type.name().to_owned()))
}

type Factory = fn() -> Arc<dyn AnyBeanMetaData>;

/// Registered bean types with their lazily built metadata.
#[derive(Default)]
pub(crate) struct Registrations {
    factories: HashMap<TypeId, Factory>,
    built: MemoCache<TypeId, Arc<dyn AnyBeanMetaData>>,
}

impl fmt::Debug for Registrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrations")
            .field("types", &self.factories.len())
            .field("built", &self.built.len())
            .finish()
    }
}

impl Registrations {
    pub(crate) fn add(&mut self, id: TypeId, factory: Factory) {
        self.factories.insert(id, factory);
    }

    pub(crate) fn contains(&self, bean_type: &BeanType) -> bool {
        self.factories.contains_key(&bean_type.id())
    }

    pub(crate) fn metadata(&self, bean_type: &BeanType) -> Result<Arc<dyn AnyBeanMetaData>> {
        let factory = self
            .factories
            .get(&bean_type.id())
            .ok_or_else(|| MapperError::UnmappedBean(bean_type.name().to_owned()))?;
        Ok(self.built.get_or_insert_with(bean_type.id(), *factory))
    }
}

type Predicate = Arc<dyn Fn(&BeanType) -> bool + Send + Sync>;

/// Routes each bean type to the first registry whose predicate accepts it.
///
/// Registries are consulted in the order they were added. The routing
/// decision is cached per type, so predicates run once per type.
pub struct CompositeBeanMetaDataRegistry {
    registries: Vec<(Predicate, Arc<dyn BeanMetaDataRegistry>)>,
    routing: MemoCache<TypeId, Option<usize>>,
}

impl fmt::Debug for CompositeBeanMetaDataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeBeanMetaDataRegistry")
            .field("registries", &self.registries.len())
            .finish_non_exhaustive()
    }
}

impl Default for CompositeBeanMetaDataRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl CompositeBeanMetaDataRegistry {
    /// A composite with no registries; it handles nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            registries: Vec::new(),
            routing: MemoCache::new(),
        }
    }

    /// Adds a registry for the types accepted by `predicate`.
    #[must_use]
    pub fn with_registry<R, P>(mut self, registry: R, predicate: P) -> Self
    where
        R: BeanMetaDataRegistry + 'static,
        P: Fn(&BeanType) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(predicate);
        self.registries.push((predicate, Arc::new(registry)));
        self.routing.clear();
        self
    }

    /// Adds a registry for every type it can handle itself.
    #[must_use]
    pub fn with_handled<R>(mut self, registry: R) -> Self
    where
        R: BeanMetaDataRegistry + 'static,
    {
        let registry: Arc<dyn BeanMetaDataRegistry> = Arc::new(registry);
        let probe = Arc::clone(&registry);
        let predicate: Predicate = Arc::new(move |ty: &BeanType| probe.can_handle(ty));
        self.registries.push((predicate, registry));
        self.routing.clear();
        self
    }

    fn route(&self, bean_type: &BeanType) -> Option<&Arc<dyn BeanMetaDataRegistry>> {
        let index = self.routing.get_or_insert_with(bean_type.id(), || {
            self.registries
                .iter()
                .position(|(accepts, _)| accepts(bean_type))
        })?;
        self.registries.get(index).map(|(_, registry)| registry)
    }
}

impl BeanMetaDataRegistry for CompositeBeanMetaDataRegistry {
    fn can_handle(&self, bean_type: &BeanType) -> bool {
        self.route(bean_type).is_some()
    }

    fn bean_metadata(&self, bean_type: &BeanType) -> Result<Arc<dyn AnyBeanMetaData>> {
        self.route(bean_type)
            .ok_or_else(|| MapperError::UnmappedBean(bean_type.name().to_owned()))?
            .bean_metadata(bean_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beans::{AccessorBean, AccessorBeans, BeanProperty};

    #[derive(Debug, Default, Clone)]
    struct Person {
        id: i64,
    }

    impl AccessorBean for Person {
        fn properties() -> Vec<BeanProperty<Self>> {
            vec![BeanProperty::field("id", |p: &Self| p.id, |p, v| p.id = v)]
        }
    }

    #[derive(Debug, Default, Clone)]
    struct Unregistered;

    impl AccessorBean for Unregistered {
        fn properties() -> Vec<BeanProperty<Self>> {
            Vec::new()
        }

        fn table_name() -> Option<&'static str> {
            Some("nothing")
        }
    }

    #[test]
    fn test_metadata_is_cached() {
        let registry = AccessorBeans::new().register::<Person>();
        let first = metadata_for::<Person>(&registry).unwrap();
        let second = metadata_for::<Person>(&registry).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unregistered_type_is_unmapped() {
        let registry = AccessorBeans::new().register::<Person>();
        assert!(matches!(
            metadata_for::<Unregistered>(&registry),
            Err(MapperError::UnmappedBean(_))
        ));
    }

    #[test]
    fn test_composite_first_match_wins() {
        let composite = CompositeBeanMetaDataRegistry::empty()
            .with_registry(AccessorBeans::new(), |ty| ty.short_name() == "Person")
            .with_handled(AccessorBeans::new().register::<Person>());

        // The first registry claims Person but cannot describe it.
        assert!(composite.can_handle(&BeanType::of::<Person>()));
        assert!(metadata_for::<Person>(&composite).is_err());
    }

    #[test]
    fn test_composite_routes_by_handled_types() {
        let composite = CompositeBeanMetaDataRegistry::empty()
            .with_handled(AccessorBeans::new().register::<Person>());
        assert!(composite.can_handle(&BeanType::of::<Person>()));
        assert!(!composite.can_handle(&BeanType::of::<Unregistered>()));
        assert!(metadata_for::<Person>(&composite).is_ok());
    }

    #[test]
    fn test_empty_composite_handles_nothing() {
        let composite = CompositeBeanMetaDataRegistry::default();
        assert!(!composite.can_handle(&BeanType::of::<Person>()));
    }
}
