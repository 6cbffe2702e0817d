//! The SQL snippet algebra.
//!
//! A [`SqlSnippet`] pairs SQL text with the parameters bound to its `?`
//! placeholders. Snippets are immutable values: every composition returns a
//! new snippet whose parameters are the operands' parameters in left-to-right
//! order, so text and parameters can never drift apart no matter how deeply
//! fragments are nested.
//!
//! # Example
//!
//! ```rust
//! use oxide_snippet::{concat, sql};
//!
//! let pagination = sql!("LIMIT ? OFFSET ?", 20, 60);
//! let query = concat([sql!("SELECT * FROM person WHERE name < ?", "zzz"), pagination]);
//!
//! assert_eq!(query.text(), "SELECT * FROM person WHERE name < ? LIMIT ? OFFSET ?");
//! assert_eq!(query.params().len(), 3);
//! ```

use std::fmt;

use crate::error::SnippetError;
use crate::scan::count_placeholders;
use crate::value::{SqlValue, ToSqlValue};

/// An immutable SQL fragment with its positionally bound parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlSnippet {
    text: String,
    params: Vec<SqlValue>,
}

impl SqlSnippet {
    /// Creates a snippet from text and already converted parameters.
    ///
    /// The placeholder count is not checked here; see [`SqlSnippet::try_new`]
    /// and [`SqlSnippet::validate`].
    #[must_use]
    pub fn new(text: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    /// Creates a snippet, rejecting it if the number of placeholders in
    /// `text` differs from the number of parameters.
    pub fn try_new(text: impl Into<String>, params: Vec<SqlValue>) -> Result<Self, SnippetError> {
        let snippet = Self::new(text, params);
        snippet.validate()?;
        Ok(snippet)
    }

    /// The empty fragment.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            text: String::new(),
            params: Vec::new(),
        }
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the bound parameters in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Splits the snippet into its text and parameters.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.text, self.params)
    }

    /// Returns true if the snippet has no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Checks that the placeholder count matches the parameter count.
    pub fn validate(&self) -> Result<(), SnippetError> {
        let placeholders = count_placeholders(&self.text);
        if placeholders == self.params.len() {
            Ok(())
        } else {
            Err(SnippetError::ParamCountMismatch {
                text: self.text.clone(),
                placeholders,
                params: self.params.len(),
            })
        }
    }

    /// Returns a new snippet with `other` appended after a space.
    #[must_use]
    pub fn append(self, other: Self) -> Self {
        concat([self, other])
    }
}

impl fmt::Display for SqlSnippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.text, self.params)
    }
}

impl FromIterator<SqlSnippet> for SqlSnippet {
    fn from_iter<I: IntoIterator<Item = SqlSnippet>>(iter: I) -> Self {
        concat(iter)
    }
}

impl Extend<SqlSnippet> for SqlSnippet {
    fn extend<I: IntoIterator<Item = SqlSnippet>>(&mut self, iter: I) {
        let current = std::mem::take(self);
        *self = concat(std::iter::once(current).chain(iter));
    }
}

/// Creates a snippet from literal text without parameters.
#[must_use]
pub fn sql(text: impl Into<String>) -> SqlSnippet {
    SqlSnippet::new(text, Vec::new())
}

/// Joins snippets with single spaces, keeping parameters in left-to-right
/// order. Empty snippets are skipped, which keeps the operation associative.
/// A blank snippet that still carries parameters is kept.
pub fn concat<I>(snippets: I) -> SqlSnippet
where
    I: IntoIterator<Item = SqlSnippet>,
{
    join(snippets, " ")
}

/// Joins snippets with commas. An empty input yields the empty fragment.
pub fn comma_separated<I>(snippets: I) -> SqlSnippet
where
    I: IntoIterator<Item = SqlSnippet>,
{
    join(snippets, ",")
}

fn join<I>(snippets: I, separator: &str) -> SqlSnippet
where
    I: IntoIterator<Item = SqlSnippet>,
{
    let mut text = String::new();
    let mut params = Vec::new();
    for snippet in snippets {
        if snippet.is_empty() && snippet.params.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str(separator);
        }
        text.push_str(&snippet.text);
        params.extend(snippet.params);
    }
    SqlSnippet { text, params }
}

/// Creates `?,?,...` with one placeholder per value, for `VALUES (...)` or
/// `IN (...)` lists.
pub fn params<I, V>(values: I) -> SqlSnippet
where
    I: IntoIterator<Item = V>,
    V: ToSqlValue,
{
    let params: Vec<SqlValue> = values.into_iter().map(ToSqlValue::to_sql_value).collect();
    let placeholders: Vec<&str> = params.iter().map(|_| SqlValue::placeholder()).collect();
    SqlSnippet {
        text: placeholders.join(","),
        params,
    }
}

/// An incremental snippet builder.
///
/// Useful when a statement is assembled in a loop; each `append` behaves like
/// [`concat`] with the fragments collected so far.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    parts: Vec<SqlSnippet>,
}

impl SqlBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Appends a snippet.
    pub fn append(&mut self, snippet: SqlSnippet) -> &mut Self {
        self.parts.push(snippet);
        self
    }

    /// Appends literal text without parameters.
    pub fn append_sql(&mut self, text: impl Into<String>) -> &mut Self {
        self.append(sql(text))
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(SqlSnippet::is_empty)
    }

    /// Builds the snippet.
    #[must_use]
    pub fn build(self) -> SqlSnippet {
        concat(self.parts)
    }
}

/// Builds a [`SqlSnippet`] from text and any number of parameters.
///
/// ```rust
/// use oxide_snippet::sql;
///
/// let s = sql!("SELECT * FROM person WHERE id = ? AND name = ?", 1_i64, "Arno");
/// assert_eq!(s.params().len(), 2);
/// ```
#[macro_export]
macro_rules! sql {
    ($text:expr $(,)?) => {
        $crate::SqlSnippet::new($text, ::std::vec::Vec::new())
    };
    ($text:expr, $($param:expr),+ $(,)?) => {
        $crate::SqlSnippet::new(
            $text,
            ::std::vec![$($crate::ToSqlValue::to_sql_value($param)),+],
        )
    };
}
