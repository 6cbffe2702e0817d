//! Insert, update, delete and patch through bean mappings.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{builder, connection, count, create_test_pool, mapper, person, seed, Invoice, Person, Tag};
use oxide_mapper::{sql, FnKeyGenerator, MapperError, SqlKeyGenerator, SqlValue};

#[tokio::test]
async fn test_insert_reads_back_generated_key() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let anna = mapper.insert(&mut conn, person("Anna", Some("Graz"))).await.unwrap();
    let bert = mapper.insert(&mut conn, person("Bert", None)).await.unwrap();
    assert!(anna.id > 0);
    assert_ne!(anna.id, bert.id);

    let loaded: Person = mapper.query_by_pk(&mut conn, anna.id).await.unwrap().unwrap();
    assert_eq!(loaded, anna);
    let missing: Option<Person> = mapper.query_by_pk(&mut conn, 999_i64).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_insert_into_other_table() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let archived = mapper
        .insert_into(&mut conn, "person_archive", person("Dora", None))
        .await
        .unwrap();
    assert!(archived.id > 0);
    assert_eq!(count(&mut conn, "person_archive").await, 1);
    assert_eq!(count(&mut conn, "person").await, 0);
}

#[tokio::test]
async fn test_insert_many_returns_keys_in_input_order() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let inserted = mapper
        .insert_many(
            &mut conn,
            vec![person("Anna", None), person("Bert", Some("Wien")), person("Carl", None)],
        )
        .await
        .unwrap();

    assert_eq!(inserted.len(), 3);
    for bean in &inserted {
        let loaded: Person = mapper.query_by_pk(&mut conn, bean.id).await.unwrap().unwrap();
        assert_eq!(&loaded, bean);
    }
    assert!(inserted.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[tokio::test]
async fn test_mixed_batch_fails_before_any_insert() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let err = mapper
        .batch_insert::<Person>()
        .push(person("Anna", None))
        .push_into("person_archive", person("Bert", None))
        .execute(&mut conn)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MapperError::MixedBatch { ref first, ref other }
            if first == "Person -> person" && other == "Person -> person_archive"
    ));
    assert_eq!(count(&mut conn, "person").await, 0);
    assert_eq!(count(&mut conn, "person_archive").await, 0);
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let batch = mapper.batch_insert::<Person>();
    assert!(batch.is_empty());
    assert!(batch.execute(&mut conn).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_generated_text_keys() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let counter = Arc::new(AtomicUsize::new(1));
    let next = Arc::clone(&counter);
    let mapper = builder()
        .with_pk_generator(
            "tag",
            FnKeyGenerator::new(move |_| SqlValue::Text(format!("T{}", next.fetch_add(1, Ordering::SeqCst)))),
        )
        .build();

    let single = mapper
        .insert(
            &mut conn,
            Tag {
                code: String::new(),
                label: "first".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(single.code, "T1");

    let batch = mapper
        .insert_many(
            &mut conn,
            vec![
                Tag {
                    label: "second".into(),
                    ..Tag::default()
                },
                Tag {
                    label: "third".into(),
                    ..Tag::default()
                },
            ],
        )
        .await
        .unwrap();
    let codes: Vec<&str> = batch.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, ["T2", "T3"]);
    assert_eq!(counter.load(Ordering::SeqCst), 4);

    let third: Tag = mapper.query_by_pk(&mut conn, "T3").await.unwrap().unwrap();
    assert_eq!(third.label, "third");
}

#[tokio::test]
async fn test_provided_key_without_generator_uses_bean_value() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let tag = mapper
        .insert(
            &mut conn,
            Tag {
                code: "rust".into(),
                label: "Rust".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(tag.code, "rust");
    assert_eq!(count(&mut conn, "tag").await, 1);
}

#[tokio::test]
async fn test_sequence_table_generator() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = builder()
        .with_pk_generator(
            "invoice",
            SqlKeyGenerator::new(sql(
                "UPDATE sequence SET value = value + 1 WHERE name = 'invoice' RETURNING value",
            )),
        )
        .build();

    let mapping = mapper.registry().mapping::<Invoice>(&mut conn).await.unwrap();
    assert!(!mapping.pk_strategy().is_auto_increment());

    let first = mapper
        .insert(
            &mut conn,
            Invoice {
                number: 0,
                amount: 12.5,
            },
        )
        .await
        .unwrap();
    let rest = mapper
        .insert_many(
            &mut conn,
            vec![
                Invoice {
                    number: 0,
                    amount: 1.0,
                },
                Invoice {
                    number: 0,
                    amount: 2.0,
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(first.number, 1001);
    let numbers: Vec<i64> = rest.iter().map(|i| i.number).collect();
    assert_eq!(numbers, [1002, 1003]);
    let total: f64 = mapper
        .query_scalar(&mut conn, &sql("SELECT SUM(amount) FROM invoice"))
        .await
        .unwrap();
    assert!((total - 15.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_update_reports_whether_row_exists() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let mut anna = mapper.insert(&mut conn, person("Anna", None)).await.unwrap();
    anna.city = Some("Salzburg".into());
    assert!(mapper.update(&mut conn, &anna).await.unwrap());

    let loaded: Person = mapper.query_by_pk(&mut conn, anna.id).await.unwrap().unwrap();
    assert_eq!(loaded.city.as_deref(), Some("Salzburg"));

    let ghost = Person {
        id: anna.id + 100,
        ..person("Ghost", Some("Nowhere"))
    };
    assert!(!mapper.update(&mut conn, &ghost).await.unwrap());
    assert_eq!(count(&mut conn, "person").await, 1);
}

#[tokio::test]
async fn test_delete_by_bean_and_by_key() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    seed(&mut conn).await;
    let mapper = mapper();

    for statement in [
        "DELETE FROM message WHERE sender_id IN (2, 3) OR receiver_id IN (2, 3)",
        "DELETE FROM address WHERE person_id IN (2, 3)",
        "DELETE FROM person_role WHERE person_id IN (2, 3)",
    ] {
        sqlx::query(statement).execute(&mut *conn).await.unwrap();
    }

    let carl: Person = mapper.query_by_pk(&mut conn, 3_i64).await.unwrap().unwrap();
    assert!(mapper.delete(&mut conn, &carl).await.unwrap());
    assert!(!mapper.delete(&mut conn, &carl).await.unwrap());

    assert!(mapper.delete_by_pk::<Person, _>(&mut conn, 2_i64).await.unwrap());
    assert!(!mapper.delete_by_pk::<Person, _>(&mut conn, 2_i64).await.unwrap());
    assert_eq!(count(&mut conn, "person").await, 1);
}

#[tokio::test]
async fn test_patch_skips_unmapped_properties() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    seed(&mut conn).await;
    let mapper = mapper();

    let mut values = HashMap::new();
    values.insert("city", SqlValue::Text("Villach".into()));
    values.insert("shoe_size", SqlValue::Int(44));
    values.insert("addresses", SqlValue::Null);
    assert!(mapper.patch::<Person, _, _, _>(&mut conn, 1_i64, values).await.unwrap());

    let anna: Person = mapper.query_by_pk(&mut conn, 1_i64).await.unwrap().unwrap();
    assert_eq!(anna.name, "Anna");
    assert_eq!(anna.city.as_deref(), Some("Villach"));

    let only_unknown = [("shoe_size", SqlValue::Int(44))];
    assert!(mapper.patch::<Person, _, _, _>(&mut conn, 1_i64, only_unknown).await.unwrap());
    assert!(!mapper
        .patch::<Person, _, _, _>(&mut conn, 42_i64, [("city", SqlValue::Null)])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_composite_key_has_no_single_pk_property() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    let mapper = mapper();

    let mapping = mapper
        .registry()
        .mapping_for_table::<Person>(&mut conn, Some("person_role"))
        .await
        .unwrap();
    assert!(matches!(
        mapping.require_pk(),
        Err(MapperError::CompositePrimaryKey(ref table)) if table == "person_role"
    ));
    assert!(mapping.columns().is_empty());
}

#[tokio::test]
async fn test_single_and_optional_queries() {
    let pool = create_test_pool().await;
    let mut conn = connection(&pool).await;
    seed(&mut conn).await;
    let mapper = mapper();

    let everyone = mapper.select_all::<Person>(&mut conn).await.unwrap();
    assert_eq!(everyone.text(), "SELECT * FROM person");

    let err = mapper.query::<Person>(everyone.clone()).single(&mut conn).await.unwrap_err();
    assert!(matches!(err, MapperError::MultipleRows));

    let nobody = everyone.clone().append(sql!("WHERE name = ?", "Zoe"));
    let err = mapper.query::<Person>(nobody.clone()).single(&mut conn).await.unwrap_err();
    assert!(matches!(err, MapperError::NotFound));
    assert!(mapper.query::<Person>(nobody).optional(&mut conn).await.unwrap().is_none());

    let bert = mapper
        .query::<Person>(everyone.append(sql!("WHERE name = ?", "Bert")))
        .single(&mut conn)
        .await
        .unwrap();
    assert_eq!(bert.id, 2);
    assert_eq!(bert.city, None);
}
