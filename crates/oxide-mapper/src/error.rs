//! Error types for the mapper.

use oxide_snippet::SnippetError;
use thiserror::Error;

/// Mapper errors.
///
/// Configuration errors (unmapped types, missing tables, ambiguous keys)
/// surface at resolution time and indicate a mismatch between code and
/// schema. Consistency errors abort batch operations. Every failure of the
/// underlying driver is reported as [`MapperError::Database`].
#[derive(Debug, Error)]
pub enum MapperError {
    /// No metadata registry handles the bean type.
    #[error("{0} is not a mapped bean type")]
    UnmappedBean(String),

    /// The table a bean maps to does not exist.
    #[error("table {0} does not exist")]
    TableNotFound(String),

    /// A table has no foreign key to the requested table.
    #[error("table {table} has no foreign key referencing {target}")]
    NoForeignKey {
        /// The table holding the foreign keys.
        table: String,
        /// The referenced table.
        target: String,
    },

    /// A table has more than one foreign key to the requested table.
    #[error("table {table} has {count} foreign keys referencing {target}, expected exactly one")]
    AmbiguousForeignKey {
        /// The table holding the foreign keys.
        table: String,
        /// The referenced table.
        target: String,
        /// Number of candidate keys.
        count: usize,
    },

    /// An operation needs a primary key the bean or table does not have.
    #[error("{0} has no primary key")]
    NoPrimaryKey(String),

    /// An operation needs a single-column primary key.
    #[error("table {0} has a composite primary key")]
    CompositePrimaryKey(String),

    /// The bean has no property with the given name.
    #[error("{bean} has no property {property}")]
    UnknownProperty {
        /// Bean type name.
        bean: String,
        /// Property name.
        property: String,
    },

    /// The property is not a collection of beans.
    #[error("property {property} of {bean} is not a collection of beans")]
    NotARelation {
        /// Bean type name.
        bean: String,
        /// Property name.
        property: String,
    },

    /// A many-to-many relation was requested for a property without a
    /// join-table declaration.
    #[error("property {property} of {bean} has no many-to-many declaration")]
    MissingManyToMany {
        /// Bean type name.
        bean: String,
        /// Property name.
        property: String,
    },

    /// A relation or provided value does not have the expected Rust type.
    #[error("property {property} of {bean} holds {declared}, not {requested}")]
    RelationTypeMismatch {
        /// Bean type name.
        bean: String,
        /// Property name.
        property: String,
        /// The declared type.
        declared: String,
        /// The type that was supplied or requested.
        requested: String,
    },

    /// The query result lacks a column needed to group or look up rows.
    #[error("query result has no column {0}")]
    MissingKeyColumn(String),

    /// The same property was given provided values twice.
    #[error("provided values for property {0} would be overwritten")]
    DuplicateProvidedProperty(String),

    /// A builder-style bean rejected the collected property values.
    #[error("cannot construct {bean}: {message}")]
    BeanConstruction {
        /// Bean type name.
        bean: String,
        /// Reason reported by the bean's builder.
        message: String,
    },

    /// A batch insert resolved to more than one bean mapping.
    #[error("multi-row insert only for beans of the same mapping: {first} and {other}")]
    MixedBatch {
        /// Mapping of the first element.
        first: String,
        /// The first mapping that differs.
        other: String,
    },

    /// The number of generated keys differs from the number of inserted rows.
    #[error("inserting {expected} rows returned {actual} generated keys")]
    GeneratedKeyCount {
        /// Rows inserted.
        expected: usize,
        /// Keys returned.
        actual: usize,
    },

    /// A column value could not be converted into the property type.
    #[error("column {column}: {source}")]
    Conversion {
        /// Column or property name.
        column: String,
        /// Underlying conversion error.
        #[source]
        source: SnippetError,
    },

    /// A snippet failed validation.
    #[error("invalid snippet: {0}")]
    Snippet(#[from] SnippetError),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No row matched a single-row query.
    #[error("object not found")]
    NotFound,

    /// More than one row matched a single-row query.
    #[error("multiple rows returned when one was expected")]
    MultipleRows,
}

/// Result type alias for mapper operations.
pub type Result<T> = std::result::Result<T, MapperError>;
