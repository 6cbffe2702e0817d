//! One-to-many and many-to-many relation resolution.
//!
//! A relation is declared on a collection property of an owner bean.
//! Whatever the declaration leaves open is derived from the schema: the
//! detail table from the element bean's table name, foreign keys from the
//! unique key pointing at the owner (or detail) table, and the detail key
//! from the detail table's single primary-key column.

use std::any::TypeId;
use std::sync::Arc;

use oxide_snippet::{concat, sql, SqlSnippet, ValueKind};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::beans::{
    BeanProperty, BeanType, ManyToManyHint, OneToManyHint, PropertyType, RelationHint,
};
use crate::error::{MapperError, Result};
use crate::mapping::{BeanMapping, BeanMappingRegistry};
use crate::schema::ForeignKeySpec;

/// A resolved one-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneToManySpec {
    /// The owner bean type.
    pub owner: BeanType,
    /// The collection property on the owner.
    pub property: String,
    /// The table holding the detail rows.
    pub detail_table: String,
    /// The detail table's foreign key to the owner.
    pub foreign_key: ForeignKeySpec,
    /// The owner column the foreign key references.
    pub owner_key_column: String,
    /// The detail bean type.
    pub element: BeanType,
    /// The collection type of the property.
    pub collection: BeanType,
    /// Kind of the owner key, used to match grouping keys.
    pub key_kind: ValueKind,
}

impl OneToManySpec {
    /// Column of the detail query that holds the owner key.
    #[must_use]
    pub fn key_column(&self) -> &str {
        &self.foreign_key.fk_column
    }

    /// Selects the detail rows of every owner returned by `owner_query`.
    #[must_use]
    pub fn detail_query(&self, owner_query: &SqlSnippet) -> SqlSnippet {
        concat([
            sql(format!(
                "SELECT d.* FROM {} d WHERE d.{} IN (SELECT x.{} FROM (",
                self.detail_table, self.foreign_key.fk_column, self.owner_key_column
            )),
            owner_query.clone(),
            sql(") x)"),
        ])
    }
}

/// A resolved many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToManySpec {
    /// The owner bean type.
    pub owner: BeanType,
    /// The collection property on the owner.
    pub property: String,
    /// The join table.
    pub join_table: String,
    /// Join-table column referencing the owner.
    pub fk_to_owner: String,
    /// Join-table column referencing the detail.
    pub fk_to_detail: String,
    /// The owner's primary-key column.
    pub owner_pk: String,
    /// The detail table.
    pub detail_table: String,
    /// The detail table's primary-key column.
    pub detail_pk: String,
    /// The detail bean type.
    pub element: BeanType,
    /// The collection type of the property.
    pub collection: BeanType,
    /// Kind of the owner key, used to match grouping keys.
    pub key_kind: ValueKind,
}

impl ManyToManySpec {
    /// Alias of the owner-key column in the detail query.
    pub const KEY_ALIAS: &'static str = "owner_key__";

    /// Selects the detail rows of every owner returned by `owner_query`,
    /// each tagged with its owner's key.
    #[must_use]
    pub fn detail_query(&self, owner_query: &SqlSnippet) -> SqlSnippet {
        concat([
            sql(format!(
                "SELECT j.{fk_to_owner} AS {alias}, d.* FROM {detail} d \
                 INNER JOIN {join} j ON d.{detail_pk} = j.{fk_to_detail} \
                 WHERE j.{fk_to_owner} IN (SELECT x.{owner_pk} FROM (",
                fk_to_owner = self.fk_to_owner,
                alias = Self::KEY_ALIAS,
                detail = self.detail_table,
                join = self.join_table,
                detail_pk = self.detail_pk,
                fk_to_detail = self.fk_to_detail,
                owner_pk = self.owner_pk,
            )),
            owner_query.clone(),
            sql(") x)"),
        ])
    }
}

/// Checks that a resolved relation holds `E` elements in a `C` collection.
pub(crate) fn check_relation_types<E: 'static, C: 'static>(
    owner: &BeanType,
    property: &str,
    element: &BeanType,
    collection: &BeanType,
) -> Result<()> {
    let requested_element = BeanType::of::<E>();
    let requested_collection = BeanType::of::<C>();
    if *element == requested_element && *collection == requested_collection {
        Ok(())
    } else {
        Err(MapperError::RelationTypeMismatch {
            bean: owner.short_name().to_owned(),
            property: property.to_owned(),
            declared: collection.name().to_owned(),
            requested: requested_collection.name().to_owned(),
        })
    }
}

fn collection_types<T>(owner: &BeanType, property: &BeanProperty<T>) -> Result<(BeanType, BeanType)> {
    match property.declared_type() {
        PropertyType::Collection {
            element,
            collection,
        } => Ok((element, collection)),
        PropertyType::Scalar(_) => Err(MapperError::NotARelation {
            bean: owner.short_name().to_owned(),
            property: property.name().to_owned(),
        }),
    }
}

fn key_kind<T>(mapping: &BeanMapping<T>, column: &str) -> ValueKind {
    mapping
        .property_for_column(column)
        .and_then(|mapped| mapped.property().value_kind())
        .or_else(|| mapping.table().find_column(column).map(|c| c.value_kind()))
        .unwrap_or(ValueKind::Integer)
}

impl BeanMappingRegistry {
    /// Resolves a one-to-many relation of owner `O`.
    pub async fn one_to_many<O: 'static>(
        &self,
        conn: &mut SqliteConnection,
        property: &str,
    ) -> Result<Arc<OneToManySpec>> {
        let key = (TypeId::of::<O>(), property.to_owned());
        if let Some(found) = self.one_to_many.get(&key) {
            return Ok(found);
        }
        let spec = self.resolve_one_to_many::<O>(conn, property).await?;
        debug!(relation = ?spec, "Resolved one-to-many relation");
        Ok(self.one_to_many.insert_if_absent(key, Arc::new(spec)))
    }

    async fn resolve_one_to_many<O: 'static>(
        &self,
        conn: &mut SqliteConnection,
        property: &str,
    ) -> Result<OneToManySpec> {
        let owner = self.mapping::<O>(conn).await?;
        let owner_type = owner.metadata().bean_type();
        let (_, declared) = owner.metadata().require_property(property)?;
        let (element, collection) = collection_types(&owner_type, declared)?;
        let hint = match declared.relation() {
            Some(RelationHint::OneToMany(hint)) => hint.clone(),
            _ => OneToManyHint::default(),
        };

        let detail_table = match hint.detail_table {
            Some(table) => table,
            None => self.default_table_name(&element)?,
        };
        let foreign_key = match hint.foreign_key {
            Some(fk_column) => ForeignKeySpec::new(&fk_column, owner.table_name(), None),
            None => self
                .schema()
                .required_table(conn, &detail_table)
                .await?
                .unique_fk_to(owner.table_name())?
                .clone(),
        };
        let owner_key_column = match &foreign_key.referenced_column {
            Some(column) => column.clone(),
            None => owner.require_pk()?.column().name.clone(),
        };

        Ok(OneToManySpec {
            owner: owner_type,
            property: property.to_owned(),
            key_kind: key_kind(&owner, &owner_key_column),
            detail_table,
            foreign_key,
            owner_key_column,
            element,
            collection,
        })
    }

    /// Resolves a many-to-many relation of owner `O`.
    pub async fn many_to_many<O: 'static>(
        &self,
        conn: &mut SqliteConnection,
        property: &str,
    ) -> Result<Arc<ManyToManySpec>> {
        let key = (TypeId::of::<O>(), property.to_owned());
        if let Some(found) = self.many_to_many.get(&key) {
            return Ok(found);
        }
        let spec = self.resolve_many_to_many::<O>(conn, property).await?;
        debug!(relation = ?spec, "Resolved many-to-many relation");
        Ok(self.many_to_many.insert_if_absent(key, Arc::new(spec)))
    }

    async fn resolve_many_to_many<O: 'static>(
        &self,
        conn: &mut SqliteConnection,
        property: &str,
    ) -> Result<ManyToManySpec> {
        let owner = self.mapping::<O>(conn).await?;
        let owner_type = owner.metadata().bean_type();
        let (_, declared) = owner.metadata().require_property(property)?;
        let (element, collection) = collection_types(&owner_type, declared)?;
        let hint: ManyToManyHint = match declared.relation() {
            Some(RelationHint::ManyToMany(hint)) => hint.clone(),
            _ => {
                return Err(MapperError::MissingManyToMany {
                    bean: owner_type.short_name().to_owned(),
                    property: property.to_owned(),
                })
            }
        };

        let owner_pk = owner.require_pk()?.column().name.clone();
        let join = self.schema().required_table(conn, &hint.join_table).await?;
        let fk_to_owner = match hint.fk_to_owner {
            Some(column) => column,
            None => join.unique_fk_to(owner.table_name())?.fk_column.clone(),
        };
        let detail_table = match hint.detail_table {
            Some(table) => table,
            None => self.default_table_name(&element)?,
        };
        let fk_to_detail = match hint.fk_to_detail {
            Some(column) => column,
            None => join.unique_fk_to(&detail_table)?.fk_column.clone(),
        };
        let detail_pk = match hint.detail_pk {
            Some(column) => column,
            None => self
                .schema()
                .required_table(conn, &detail_table)
                .await?
                .unique_pk_column()?
                .name
                .clone(),
        };

        Ok(ManyToManySpec {
            owner: owner_type,
            property: property.to_owned(),
            key_kind: key_kind(&owner, &owner_pk),
            join_table: hint.join_table,
            fk_to_owner,
            fk_to_detail,
            owner_pk,
            detail_table,
            detail_pk,
            element,
            collection,
        })
    }
}
