//! SQL values and parameter handling.
//!
//! Values travel in two directions: [`ToSqlValue`] turns Rust values into
//! bound parameters, [`FromSqlValue`] turns column values read from a row
//! back into Rust values.

use std::fmt;

use crate::error::SnippetError;

/// A SQL value that can be used as a parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
}

/// The declared scalar type of a value, independent of any particular value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Whole numbers, stored as 64-bit signed integers.
    Integer,
    /// Floating point numbers.
    Real,
    /// UTF-8 text, also used for timestamps.
    Text,
    /// Booleans, stored as `0`/`1` integers.
    Boolean,
    /// Raw bytes.
    Blob,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Blob => "blob",
        };
        f.write_str(name)
    }
}

impl SqlValue {
    /// Returns whether this is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns a short name for the runtime type of this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    /// Returns the parameter placeholder.
    #[must_use]
    pub const fn placeholder() -> &'static str {
        "?"
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

impl ToSqlValue for i64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(self)
    }
}

impl ToSqlValue for i32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for i16 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for u32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for f32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(f64::from(self))
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl ToSqlValue for &String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl ToSqlValue for &[u8] {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self.to_vec())
    }
}

/// Trait for types that can be read back from a SQL value.
///
/// Conversions are lenient where the storage engine is: integers widen to
/// floats, `0`/`1` integers read as booleans, and `NULL` only converts into
/// `Option<T>`.
pub trait FromSqlValue: Sized {
    /// The declared kind of values of this type.
    const KIND: ValueKind;

    /// Converts a SQL value into `Self`.
    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError>;
}

fn mismatch(expected: ValueKind, value: &SqlValue) -> SnippetError {
    SnippetError::Conversion {
        expected,
        found: value.type_name(),
    }
}

impl FromSqlValue for i64 {
    const KIND: ValueKind = ValueKind::Integer;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        match value {
            SqlValue::Int(i) => Ok(i),
            SqlValue::Bool(b) => Ok(Self::from(b)),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromSqlValue for i32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        let wide = i64::from_sql_value(value)?;
        Self::try_from(wide).map_err(|_| SnippetError::OutOfRange {
            value: wide,
            target: "i32",
        })
    }
}

impl FromSqlValue for i16 {
    const KIND: ValueKind = ValueKind::Integer;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        let wide = i64::from_sql_value(value)?;
        Self::try_from(wide).map_err(|_| SnippetError::OutOfRange {
            value: wide,
            target: "i16",
        })
    }
}

impl FromSqlValue for u32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        let wide = i64::from_sql_value(value)?;
        Self::try_from(wide).map_err(|_| SnippetError::OutOfRange {
            value: wide,
            target: "u32",
        })
    }
}

impl FromSqlValue for f64 {
    const KIND: ValueKind = ValueKind::Real;

    #[allow(clippy::cast_precision_loss)]
    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        match value {
            SqlValue::Float(f) => Ok(f),
            SqlValue::Int(i) => Ok(i as Self),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromSqlValue for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        match value {
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(i) => Ok(i != 0),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromSqlValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        match value {
            SqlValue::Text(s) => Ok(s),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    const KIND: ValueKind = ValueKind::Blob;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        match value {
            SqlValue::Blob(b) => Ok(b),
            SqlValue::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

#[cfg(feature = "chrono")]
mod temporal {
    use chrono::{DateTime, NaiveDateTime, Utc};

    use super::{mismatch, FromSqlValue, SqlValue, ToSqlValue, ValueKind};
    use crate::error::SnippetError;

    const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    impl ToSqlValue for DateTime<Utc> {
        fn to_sql_value(self) -> SqlValue {
            SqlValue::Text(self.to_rfc3339())
        }
    }

    impl FromSqlValue for DateTime<Utc> {
        const KIND: ValueKind = ValueKind::Text;

        fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
            match value {
                SqlValue::Text(s) => DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| SnippetError::Parse(e.to_string())),
                other => Err(mismatch(Self::KIND, &other)),
            }
        }
    }

    impl ToSqlValue for NaiveDateTime {
        fn to_sql_value(self) -> SqlValue {
            SqlValue::Text(self.format(NAIVE_FORMAT).to_string())
        }
    }

    impl FromSqlValue for NaiveDateTime {
        const KIND: ValueKind = ValueKind::Text;

        fn from_sql_value(value: SqlValue) -> Result<Self, SnippetError> {
            match value {
                SqlValue::Text(s) => Self::parse_from_str(&s, NAIVE_FORMAT)
                    .map_err(|e| SnippetError::Parse(e.to_string())),
                other => Err(mismatch(Self::KIND, &other)),
            }
        }
    }
}
