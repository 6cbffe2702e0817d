//! Statement builders over bean mappings.
//!
//! Builders only produce snippets; executing them is the mapper's job.

use oxide_snippet::{comma_separated, concat, params, sql, SqlBuilder, SqlSnippet, SqlValue};
use tracing::debug;

use crate::error::Result;
use crate::mapping::{BeanMapping, MappedColumn};

fn column_list<T>(columns: &[&MappedColumn<T>]) -> SqlSnippet {
    comma_separated(columns.iter().map(|c| sql(c.column().name.clone())))
}

fn assignment(column: &str, value: SqlValue) -> SqlSnippet {
    SqlSnippet::new(format!("{column}=?"), vec![value])
}

/// `INSERT INTO t (cols) VALUES (?, ...)` for one bean. The key column is
/// included unless the database assigns it.
pub fn insert<T: 'static>(mapping: &BeanMapping<T>, bean: &T) -> SqlSnippet {
    let columns = mapping.insert_columns();
    if columns.is_empty() {
        return sql(format!("INSERT INTO {} DEFAULT VALUES", mapping.table_name()));
    }
    concat([
        sql(format!("INSERT INTO {} (", mapping.table_name())),
        column_list(&columns),
        sql(") VALUES ("),
        params(columns.iter().map(|c| c.property().get(bean))),
        sql(")"),
    ])
}

/// One multi-row insert for several beans of the same mapping.
///
/// The mapping must have at least one insert column.
pub fn insert_many<'b, T, I>(mapping: &BeanMapping<T>, beans: I) -> SqlSnippet
where
    T: 'static,
    I: IntoIterator<Item = &'b T>,
{
    let columns = mapping.insert_columns();
    let rows = beans.into_iter().map(|bean| {
        concat([
            sql("("),
            params(columns.iter().map(|c| c.property().get(bean))),
            sql(")"),
        ])
    });

    let mut builder = SqlBuilder::new();
    builder
        .append_sql(format!("INSERT INTO {} (", mapping.table_name()))
        .append(column_list(&columns))
        .append_sql(") VALUES")
        .append(comma_separated(rows));
    builder.build()
}

/// `UPDATE t SET col=?, ... WHERE pk=?` with every mapped non-key column.
///
/// A bean without non-key columns assigns the key to itself, so the
/// statement still reports whether the row exists.
pub fn update<T: 'static>(mapping: &BeanMapping<T>, bean: &T) -> Result<SqlSnippet> {
    let pk = mapping.require_pk()?;
    let mut assignments: Vec<SqlSnippet> = mapping
        .non_pk_columns()
        .into_iter()
        .map(|c| assignment(&c.column().name, c.property().get(bean)))
        .collect();
    if assignments.is_empty() {
        assignments.push(sql(format!("{0}={0}", pk.column().name)));
    }
    Ok(concat([
        sql(format!("UPDATE {} SET", mapping.table_name())),
        comma_separated(assignments),
        where_pk(&pk.column().name, pk.property().get(bean)),
    ]))
}

/// `UPDATE t SET ... WHERE pk=?` for the named properties only.
///
/// Names that are not properties of the bean, or whose property has no
/// column, are skipped.
pub fn patch<T, I, N>(mapping: &BeanMapping<T>, pk: SqlValue, values: I) -> Result<SqlSnippet>
where
    I: IntoIterator<Item = (N, SqlValue)>,
    N: AsRef<str>,
{
    let key = mapping.require_pk()?;
    let mut assignments = Vec::new();
    for (name, value) in values {
        let name = name.as_ref();
        match mapping.column_for_property(name) {
            Some(mapped) => assignments.push(assignment(&mapped.column().name, value)),
            None => debug!(property = %name, table = %mapping.table_name(), "Skipping unmapped patch property"),
        }
    }
    if assignments.is_empty() {
        assignments.push(sql(format!("{0}={0}", key.column().name)));
    }
    Ok(concat([
        sql(format!("UPDATE {} SET", mapping.table_name())),
        comma_separated(assignments),
        where_pk(&key.column().name, pk),
    ]))
}

/// `DELETE FROM t WHERE pk=?`.
pub fn delete_by_pk<T>(mapping: &BeanMapping<T>, pk: SqlValue) -> Result<SqlSnippet> {
    let key = mapping.require_pk()?;
    Ok(concat([
        sql(format!("DELETE FROM {}", mapping.table_name())),
        where_pk(&key.column().name, pk),
    ]))
}

/// `SELECT * FROM t`.
pub fn select_all<T>(mapping: &BeanMapping<T>) -> SqlSnippet {
    sql(format!("SELECT * FROM {}", mapping.table_name()))
}

/// `SELECT * FROM t WHERE pk=?`.
pub fn select_by_pk<T>(mapping: &BeanMapping<T>, pk: SqlValue) -> Result<SqlSnippet> {
    let key = mapping.require_pk()?;
    Ok(concat([select_all(mapping), where_pk(&key.column().name, pk)]))
}

fn where_pk(column: &str, value: SqlValue) -> SqlSnippet {
    SqlSnippet::new(format!("WHERE {column}=?"), vec![value])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::beans::{AccessorBean, BeanProperty};
    use crate::pk::PkStrategy;
    use crate::schema::{ColumnMetaData, TableMetaData};

    #[derive(Debug, Default, Clone)]
    struct Person {
        id: i64,
        name: String,
        city: String,
    }

    impl AccessorBean for Person {
        fn properties() -> Vec<BeanProperty<Self>> {
            vec![
                BeanProperty::field("id", |p: &Self| p.id, |p, v| p.id = v),
                BeanProperty::field("name", |p: &Self| p.name.clone(), |p, v| p.name = v),
                BeanProperty::field("city", |p: &Self| p.city.clone(), |p, v| p.city = v),
            ]
        }
    }

    fn mapping(strategy: PkStrategy) -> BeanMapping<Person> {
        let table = TableMetaData::new("person")
            .column(ColumnMetaData::new("id", "INTEGER").primary_key())
            .column(ColumnMetaData::new("name", "TEXT"))
            .column(ColumnMetaData::new("city", "TEXT"));
        BeanMapping::new(
            Arc::new(crate::beans::accessor_metadata::<Person>()),
            Arc::new(table),
            strategy,
        )
    }

    fn arno() -> Person {
        Person {
            id: 7,
            name: "Arno".into(),
            city: "Graz".into(),
        }
    }

    #[test]
    fn test_insert_skips_auto_increment_key() {
        let s = insert(&mapping(PkStrategy::AutoIncrement), &arno());
        assert_eq!(s.text(), "INSERT INTO person ( name,city ) VALUES ( ?,? )");
        assert_eq!(
            s.params(),
            &[SqlValue::Text("Arno".into()), SqlValue::Text("Graz".into())]
        );
    }

    #[test]
    fn test_insert_includes_provided_key() {
        let s = insert(&mapping(PkStrategy::Provided(None)), &arno());
        assert_eq!(s.text(), "INSERT INTO person ( id,name,city ) VALUES ( ?,?,? )");
        assert_eq!(s.params()[0], SqlValue::Int(7));
    }

    #[test]
    fn test_insert_many_orders_parameters_by_row() {
        let other = Person {
            id: 8,
            name: "Bea".into(),
            city: "Wien".into(),
        };
        let beans = [arno(), other];
        let s = insert_many(&mapping(PkStrategy::AutoIncrement), beans.iter());
        assert_eq!(
            s.text(),
            "INSERT INTO person ( name,city ) VALUES ( ?,? ),( ?,? )"
        );
        assert_eq!(
            s.params(),
            &[
                SqlValue::Text("Arno".into()),
                SqlValue::Text("Graz".into()),
                SqlValue::Text("Bea".into()),
                SqlValue::Text("Wien".into()),
            ]
        );
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_update_statement() {
        let s = update(&mapping(PkStrategy::AutoIncrement), &arno()).unwrap();
        assert_eq!(s.text(), "UPDATE person SET name=?,city=? WHERE id=?");
        assert_eq!(s.params().last(), Some(&SqlValue::Int(7)));
    }

    #[test]
    fn test_patch_skips_unknown_properties() {
        let s = patch(
            &mapping(PkStrategy::AutoIncrement),
            SqlValue::Int(7),
            [("city", SqlValue::Text("Linz".into())), ("shoe_size", SqlValue::Int(44))],
        )
        .unwrap();
        assert_eq!(s.text(), "UPDATE person SET city=? WHERE id=?");
        assert_eq!(
            s.params(),
            &[SqlValue::Text("Linz".into()), SqlValue::Int(7)]
        );
    }

    #[test]
    fn test_patch_without_columns_is_still_valid() {
        let s = patch(
            &mapping(PkStrategy::AutoIncrement),
            SqlValue::Int(7),
            Vec::<(&str, SqlValue)>::new(),
        )
        .unwrap();
        assert_eq!(s.text(), "UPDATE person SET id=id WHERE id=?");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_delete_and_select_by_pk() {
        let m = mapping(PkStrategy::AutoIncrement);
        assert_eq!(
            delete_by_pk(&m, SqlValue::Int(1)).unwrap().text(),
            "DELETE FROM person WHERE id=?"
        );
        assert_eq!(
            select_by_pk(&m, SqlValue::Int(1)).unwrap().text(),
            "SELECT * FROM person WHERE id=?"
        );
    }
}
