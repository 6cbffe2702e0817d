//! # oxide-mapper
//!
//! Maps SQLite rows to typed beans while leaving the SQL to you.
//!
//! Queries are [`SqlSnippet`]s built with the `oxide-snippet` algebra; the
//! mapper binds their parameters, reads the rows back into beans, and
//! builds insert, update, delete and patch statements from bean mappings.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use oxide_mapper::{sql, AccessorBeans, Bean, SqlMapper};
//!
//! #[derive(Debug, Default, Clone, Bean)]
//! struct Address {
//!     id: i64,
//!     person_id: i64,
//!     street: String,
//! }
//!
//! #[derive(Debug, Default, Clone, Bean)]
//! struct Person {
//!     id: i64,
//!     name: String,
//!     #[one_to_many]
//!     addresses: Vec<Address>,
//! }
//!
//! # async fn run(pool: sqlx::SqlitePool) -> oxide_mapper::Result<()> {
//! let mapper = SqlMapper::builder()
//!     .with_beans(
//!         AccessorBeans::new()
//!             .register::<Person>()
//!             .register::<Address>(),
//!     )
//!     .build();
//!
//! let mut conn = pool.acquire().await?;
//! let people: Vec<Person> = mapper
//!     .query(sql!("SELECT * FROM person WHERE name < ? LIMIT ?", "m", 20))
//!     .with_one_to_many::<Address, Vec<Address>>("addresses")
//!     .list(&mut conn)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Beans
//!
//! Bean metadata comes from a [`BeanMetaDataRegistry`]. Two styles are
//! provided: [`AccessorBean`] for `Default` types with mutable fields
//! (derive it with `#[derive(Bean)]`) and [`BuilderBean`] for immutable
//! types assembled through a builder. A [`CompositeBeanMetaDataRegistry`]
//! combines several registries.
//!
//! ## Tables and keys
//!
//! Table metadata is read with SQLite pragmas and cached. A single
//! `INTEGER PRIMARY KEY` is assigned by the database and read back with
//! `RETURNING`; other keys come from the bean or from a [`PkGenerator`]
//! configured per table.

extern crate self as oxide_mapper;

pub mod beans;
mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod mapping;
pub mod naming;
pub mod pk;
pub mod provided;
pub mod query;
pub mod relations;
pub mod row;
pub mod schema;
pub mod statements;

pub use beans::{
    accessor_metadata, builder_metadata, AccessorBean, AccessorBeans, AnyBeanMetaData, BeanMetaData,
    BeanMetaDataRegistry, BeanProperty, BeanType, BuilderBean, BuilderBeans, BuilderProperty,
    CompositeBeanMetaDataRegistry, ManyToManyHint, OneToManyHint, PropertyType, PropertyValue,
    RelationHint,
};
pub use config::SqlMapperBuilder;
pub use error::{MapperError, Result};
pub use mapper::{BatchInsert, SqlMapper};
pub use mapping::{BeanMapping, BeanMappingRegistry, MappedColumn};
pub use naming::{to_snake_case, SnakeCaseTableNames, TableNameExtractor};
pub use oxide_mapper_derive::Bean;
pub use oxide_snippet::{
    comma_separated, concat, params, sql, FromSqlValue, SnippetError, SqlBuilder, SqlSnippet, SqlValue,
    ToSqlValue, ValueKind,
};
pub use pk::{FnKeyGenerator, PkGenerator, PkStrategy, PkStrategyDecider, SqlKeyGenerator, SqlitePkStrategyDecider};
pub use provided::{KeyValue, ProvidedProperties, ProvidedValues};
pub use query::{MapperQuery, ToManyQuery};
pub use relations::{ManyToManySpec, OneToManySpec};
pub use row::{ColumnIndex, SqlRow};
pub use schema::{ColumnMetaData, ForeignKeySpec, SchemaRegistry, TableMetaData};
