//! Mapper configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::beans::{BeanMetaDataRegistry, CompositeBeanMetaDataRegistry};
use crate::mapper::SqlMapper;
use crate::mapping::BeanMappingRegistry;
use crate::naming::{SnakeCaseTableNames, TableNameExtractor};
use crate::pk::{PkGenerator, PkStrategyDecider, SqlitePkStrategyDecider};
use crate::schema::{SchemaRegistry, TableMetaData};

/// Builder for [`SqlMapper`].
///
/// Defaults: no bean types, snake-case table names, SQLite key rules and
/// no key generators.
#[must_use]
pub struct SqlMapperBuilder {
    beans: Arc<dyn BeanMetaDataRegistry>,
    schema: SchemaRegistry,
    table_names: Arc<dyn TableNameExtractor>,
    pk_decider: Arc<dyn PkStrategyDecider>,
    pk_generators: HashMap<String, Arc<dyn PkGenerator>>,
}

impl fmt::Debug for SqlMapperBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlMapperBuilder")
            .field("schema", &self.schema)
            .field("pk_generators", &self.pk_generators.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for SqlMapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlMapperBuilder {
    /// Creates a builder with the defaults.
    pub fn new() -> Self {
        Self {
            beans: Arc::new(CompositeBeanMetaDataRegistry::empty()),
            schema: SchemaRegistry::new(),
            table_names: Arc::new(SnakeCaseTableNames),
            pk_decider: Arc::new(SqlitePkStrategyDecider),
            pk_generators: HashMap::new(),
        }
    }

    /// Sets the source of bean metadata.
    pub fn with_beans(mut self, beans: impl BeanMetaDataRegistry + 'static) -> Self {
        self.beans = Arc::new(beans);
        self
    }

    /// Sets the default table-name convention.
    pub fn with_table_names(mut self, table_names: impl TableNameExtractor + 'static) -> Self {
        self.table_names = Arc::new(table_names);
        self
    }

    /// Sets the key strategy decider.
    pub fn with_pk_strategy_decider(mut self, decider: impl PkStrategyDecider + 'static) -> Self {
        self.pk_decider = Arc::new(decider);
        self
    }

    /// Generates primary keys for rows inserted into `table`.
    pub fn with_pk_generator(mut self, table: &str, generator: impl PkGenerator + 'static) -> Self {
        self.pk_generators
            .insert(table.to_owned(), Arc::new(generator));
        self
    }

    /// Describes a table explicitly instead of introspecting it.
    pub fn with_table(mut self, table: TableMetaData) -> Self {
        self.schema = self.schema.with_table(table);
        self
    }

    /// Builds the mapper.
    pub fn build(self) -> SqlMapper {
        SqlMapper::new(BeanMappingRegistry::new(
            self.beans,
            self.schema,
            self.table_names,
            self.pk_decider,
            self.pk_generators,
        ))
    }
}
