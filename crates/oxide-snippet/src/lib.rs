//! # oxide-snippet
//!
//! Composable SQL fragments with positionally bound parameters.
//!
//! This crate provides:
//! - [`SqlSnippet`], an immutable (text, parameters) pair
//! - [`concat`], [`comma_separated`] and [`params`] to compose snippets
//! - the [`sql!`] macro to build a snippet from text and parameters
//! - [`SqlValue`] with [`ToSqlValue`] / [`FromSqlValue`] conversions
//!
//! ## Composition
//!
//! Snippets compose freely. Parameters always follow the text they belong
//! to, in left-to-right order, regardless of nesting depth:
//!
//! ```rust
//! use oxide_snippet::{concat, sql, SqlSnippet, SqlValue};
//!
//! fn has_permission(person_id: SqlSnippet, user_id: i64) -> SqlSnippet {
//!     concat([
//!         sql("EXISTS (SELECT * FROM person_permissions WHERE person_id="),
//!         person_id,
//!         sql!("AND user_id=?)", user_id),
//!     ])
//! }
//!
//! let query = concat([
//!     sql!("SELECT p.* FROM person p WHERE p.name < ? AND", "zzz"),
//!     has_permission(sql("p.id"), 5),
//!     sql!("LIMIT ? OFFSET ?", 20, 20),
//! ]);
//!
//! assert_eq!(
//!     query.params(),
//!     &[
//!         SqlValue::Text("zzz".into()),
//!         SqlValue::Int(5),
//!         SqlValue::Int(20),
//!         SqlValue::Int(20),
//!     ]
//! );
//! ```

pub mod error;
pub mod scan;
mod snippet;
pub mod value;

pub use error::SnippetError;
pub use scan::count_placeholders;
pub use snippet::{comma_separated, concat, params, sql, SqlBuilder, SqlSnippet};
pub use value::{FromSqlValue, SqlValue, ToSqlValue, ValueKind};
