//! Bean-to-table naming.

use crate::beans::AnyBeanMetaData;

/// Derives the default table name of a bean.
pub trait TableNameExtractor: Send + Sync {
    /// Returns the table the bean maps to when no table is given per call.
    fn table_name(&self, bean: &dyn AnyBeanMetaData) -> String;
}

/// Uses the bean's declared table, or the snake-cased type name.
///
/// `PersonAddress` maps to `person_address`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseTableNames;

impl TableNameExtractor for SnakeCaseTableNames {
    fn table_name(&self, bean: &dyn AnyBeanMetaData) -> String {
        bean.table_name().map_or_else(
            || to_snake_case(bean.bean_type().short_name()),
            ToOwned::to_owned,
        )
    }
}

/// Converts `PascalCase` to `snake_case`.
#[must_use]
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
