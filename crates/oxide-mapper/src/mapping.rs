//! Bean mappings: the intersection of a bean's properties with a table's
//! columns, plus the table's key strategy.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::debug;

use crate::beans::{metadata_for, AnyBeanMetaData, BeanMetaData, BeanMetaDataRegistry, BeanProperty, BeanType};
use crate::cache::MemoCache;
use crate::error::{MapperError, Result};
use crate::naming::TableNameExtractor;
use crate::pk::{PkGenerator, PkStrategy, PkStrategyDecider};
use crate::relations::{ManyToManySpec, OneToManySpec};
use crate::schema::{ColumnMetaData, SchemaRegistry, TableMetaData};

/// A bean property bound to a table column.
pub struct MappedColumn<T> {
    index: usize,
    property: BeanProperty<T>,
    column: ColumnMetaData,
}

impl<T> MappedColumn<T> {
    /// Position of the property in the bean metadata.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The bean property.
    #[must_use]
    pub const fn property(&self) -> &BeanProperty<T> {
        &self.property
    }

    /// The table column.
    #[must_use]
    pub const fn column(&self) -> &ColumnMetaData {
        &self.column
    }
}

/// How one bean type maps to one table.
///
/// Only scalar properties whose column exists in the table are mapped;
/// everything else is transient for statement building.
pub struct BeanMapping<T> {
    metadata: Arc<BeanMetaData<T>>,
    table: Arc<TableMetaData>,
    pk_strategy: PkStrategy,
    columns: Vec<MappedColumn<T>>,
    pk: Option<usize>,
}

impl<T> fmt::Debug for BeanMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanMapping")
            .field("bean", &self.metadata.bean_type())
            .field("table", &self.table.name)
            .field("pk_strategy", &self.pk_strategy)
            .field(
                "columns",
                &self.columns.iter().map(|c| &c.column.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: 'static> BeanMapping<T> {
    /// Intersects the bean's properties with the table's columns.
    #[must_use]
    pub fn new(
        metadata: Arc<BeanMetaData<T>>,
        table: Arc<TableMetaData>,
        pk_strategy: PkStrategy,
    ) -> Self {
        let columns: Vec<MappedColumn<T>> = metadata
            .properties()
            .iter()
            .enumerate()
            .filter(|(_, property)| property.value_kind().is_some())
            .filter_map(|(index, property)| {
                table
                    .find_column(property.column_name())
                    .map(|column| MappedColumn {
                        index,
                        property: property.clone(),
                        column: column.clone(),
                    })
            })
            .collect();
        let pk = match table.pk_columns().as_slice() {
            [pk] => columns
                .iter()
                .position(|mapped| mapped.column.name == pk.name),
            _ => None,
        };
        Self {
            metadata,
            table,
            pk_strategy,
            columns,
            pk,
        }
    }
}

impl<T> BeanMapping<T> {
    /// The bean metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Arc<BeanMetaData<T>> {
        &self.metadata
    }

    /// The table metadata.
    #[must_use]
    pub fn table(&self) -> &TableMetaData {
        &self.table
    }

    /// The table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// The key strategy.
    #[must_use]
    pub const fn pk_strategy(&self) -> &PkStrategy {
        &self.pk_strategy
    }

    /// Mapped columns in property order.
    #[must_use]
    pub fn columns(&self) -> &[MappedColumn<T>] {
        &self.columns
    }

    /// The mapped column of a property.
    #[must_use]
    pub fn column_for_property(&self, name: &str) -> Option<&MappedColumn<T>> {
        self.columns.iter().find(|c| c.property.name() == name)
    }

    /// The mapped property of a column, ignoring case.
    #[must_use]
    pub fn property_for_column(&self, column: &str) -> Option<&MappedColumn<T>> {
        self.columns
            .iter()
            .find(|c| c.column.name.eq_ignore_ascii_case(column))
    }

    /// The primary-key property, if the table has a single-column key that
    /// the bean maps.
    #[must_use]
    pub fn pk(&self) -> Option<&MappedColumn<T>> {
        self.pk.and_then(|index| self.columns.get(index))
    }

    /// The primary-key property, or why there is none.
    pub fn require_pk(&self) -> Result<&MappedColumn<T>> {
        self.pk().ok_or_else(|| {
            if self.table.pk_columns().len() > 1 {
                MapperError::CompositePrimaryKey(self.table.name.clone())
            } else {
                MapperError::NoPrimaryKey(self.label())
            }
        })
    }

    /// Columns written by an insert: all mapped columns, minus the key when
    /// the database assigns it.
    #[must_use]
    pub fn insert_columns(&self) -> Vec<&MappedColumn<T>> {
        let skip_pk = self.pk_strategy.is_auto_increment();
        self.columns
            .iter()
            .enumerate()
            .filter(|(position, _)| !(skip_pk && Some(*position) == self.pk))
            .map(|(_, column)| column)
            .collect()
    }

    /// Mapped columns other than the primary key.
    #[must_use]
    pub fn non_pk_columns(&self) -> Vec<&MappedColumn<T>> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != self.pk)
            .map(|(_, column)| column)
            .collect()
    }

    /// `Bean -> table`, for messages.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{} -> {}",
            self.metadata.bean_type().short_name(),
            self.table.name
        )
    }
}

type ErasedMapping = Arc<dyn Any + Send + Sync>;

/// Resolves and caches bean mappings and relation descriptions.
///
/// Mappings are cached per (bean type, table), relations per (owner type,
/// property). Two lookups with the same key return the same `Arc`.
pub struct BeanMappingRegistry {
    beans: Arc<dyn BeanMetaDataRegistry>,
    schema: SchemaRegistry,
    table_names: Arc<dyn TableNameExtractor>,
    pk_decider: Arc<dyn PkStrategyDecider>,
    pk_generators: HashMap<String, Arc<dyn PkGenerator>>,
    mappings: MemoCache<(TypeId, String), ErasedMapping>,
    pub(crate) one_to_many: MemoCache<(TypeId, String), Arc<OneToManySpec>>,
    pub(crate) many_to_many: MemoCache<(TypeId, String), Arc<ManyToManySpec>>,
}

impl fmt::Debug for BeanMappingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanMappingRegistry")
            .field("schema", &self.schema)
            .field("mappings", &self.mappings.len())
            .field("one_to_many", &self.one_to_many.len())
            .field("many_to_many", &self.many_to_many.len())
            .finish_non_exhaustive()
    }
}

impl BeanMappingRegistry {
    pub(crate) fn new(
        beans: Arc<dyn BeanMetaDataRegistry>,
        schema: SchemaRegistry,
        table_names: Arc<dyn TableNameExtractor>,
        pk_decider: Arc<dyn PkStrategyDecider>,
        pk_generators: HashMap<String, Arc<dyn PkGenerator>>,
    ) -> Self {
        Self {
            beans,
            schema,
            table_names,
            pk_decider,
            pk_generators: pk_generators
                .into_iter()
                .map(|(table, generator)| (table.to_lowercase(), generator))
                .collect(),
            mappings: MemoCache::new(),
            one_to_many: MemoCache::new(),
            many_to_many: MemoCache::new(),
        }
    }

    /// Returns true if the bean metadata registry handles the type.
    #[must_use]
    pub fn can_handle(&self, bean_type: &BeanType) -> bool {
        self.beans.can_handle(bean_type)
    }

    /// Typed bean metadata.
    pub fn metadata<T: 'static>(&self) -> Result<Arc<BeanMetaData<T>>> {
        metadata_for::<T>(self.beans.as_ref())
    }

    /// The table a bean type maps to by default.
    pub fn default_table_name(&self, bean_type: &BeanType) -> Result<String> {
        let metadata: Arc<dyn AnyBeanMetaData> = self.beans.bean_metadata(bean_type)?;
        Ok(self.table_names.table_name(&*metadata))
    }

    /// The schema collaborator.
    #[must_use]
    pub const fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// The mapping of `T` to its default table.
    pub async fn mapping<T: 'static>(&self, conn: &mut SqliteConnection) -> Result<Arc<BeanMapping<T>>> {
        self.mapping_for_table(conn, None).await
    }

    /// The mapping of `T` to `table`, or to its default table.
    pub async fn mapping_for_table<T: 'static>(
        &self,
        conn: &mut SqliteConnection,
        table: Option<&str>,
    ) -> Result<Arc<BeanMapping<T>>> {
        let metadata = self.metadata::<T>()?;
        let table_name = match table {
            Some(table) => table.to_owned(),
            None => self.table_names.table_name(&*metadata),
        };
        let key = (TypeId::of::<T>(), table_name.to_lowercase());
        let erased = match self.mappings.get(&key) {
            Some(found) => found,
            None => {
                let table = self.schema.required_table(conn, &table_name).await?;
                let generator = self.pk_generators.get(&key.1).cloned();
                let pk_strategy = self.pk_decider.decide(&table, generator);
                let mapping = BeanMapping::new(metadata, table, pk_strategy);
                debug!(mapping = ?mapping, "Resolved bean mapping");
                let erased: ErasedMapping = Arc::new(mapping);
                self.mappings.insert_if_absent(key, erased)
            }
        };
        erased
            .downcast::<BeanMapping<T>>()
            .map_err(|_| MapperError::UnmappedBean(BeanType::of::<T>().name().to_owned()))
    }

    /// Drops cached mappings, relations and introspected tables.
    pub fn clear_cache(&self) {
        self.mappings.clear();
        self.one_to_many.clear();
        self.many_to_many.clear();
        self.schema.clear_cache();
    }
}
