//! Error types for snippet construction and value conversion.

use thiserror::Error;

use crate::value::ValueKind;

/// Errors raised while building snippets or converting values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnippetError {
    /// The number of `?` placeholders does not match the bound parameters.
    #[error("snippet has {placeholders} placeholder(s) but {params} parameter(s): {text}")]
    ParamCountMismatch {
        /// The offending SQL text.
        text: String,
        /// Placeholders found in the text.
        placeholders: usize,
        /// Parameters bound to the snippet.
        params: usize,
    },

    /// A value could not be converted into the requested Rust type.
    #[error("cannot convert {found} value into {expected}")]
    Conversion {
        /// The kind the target type expects.
        expected: ValueKind,
        /// The runtime type of the value.
        found: &'static str,
    },

    /// An integer does not fit the requested Rust type.
    #[error("value {value} is out of range for {target}")]
    OutOfRange {
        /// The value read.
        value: i64,
        /// The target type name.
        target: &'static str,
    },

    /// A text value could not be parsed into the requested type.
    #[error("parse error: {0}")]
    Parse(String),
}
