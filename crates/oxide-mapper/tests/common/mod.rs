#![allow(dead_code)]

use oxide_mapper::{AccessorBeans, Bean, SqlMapper, SqlMapperBuilder};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

#[derive(Debug, Default, Clone, PartialEq, Bean)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    #[one_to_many]
    pub addresses: Vec<Address>,
    #[many_to_many(join_table = "person_role")]
    pub roles: Vec<Role>,
}

#[derive(Debug, Default, Clone, PartialEq, Bean)]
pub struct Address {
    pub id: i64,
    pub person_id: Option<i64>,
    pub street: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Bean)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// A second view of the person table whose messages relation needs an
/// explicit foreign key.
#[derive(Debug, Default, Clone, PartialEq, Bean)]
#[bean(table = "person")]
pub struct Correspondent {
    pub id: i64,
    #[column(name = "name")]
    pub display_name: String,
    #[one_to_many(detail_table = "message")]
    pub messages: Vec<Message>,
    #[one_to_many(detail_table = "message", foreign_key = "sender_id")]
    pub sent: Vec<Message>,
    #[column(skip)]
    pub unread: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Bean)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub body: String,
}

/// Text-keyed bean whose keys come from a generator.
#[derive(Debug, Default, Clone, PartialEq, Bean)]
pub struct Tag {
    pub code: String,
    pub label: String,
}

/// Integer-keyed bean whose keys come from a sequence table.
#[derive(Debug, Default, Clone, PartialEq, Bean)]
pub struct Invoice {
    pub number: i64,
    pub amount: f64,
}

/// Owner of a one-to-many relation whose foreign key references a unique
/// column rather than the primary key.
#[derive(Debug, Default, Clone, PartialEq, Bean)]
pub struct Team {
    pub id: i64,
    pub code: i64,
    pub name: String,
    #[one_to_many]
    pub players: Vec<Player>,
}

#[derive(Debug, Default, Clone, PartialEq, Bean)]
pub struct Player {
    pub id: i64,
    pub team_code: i64,
    pub name: String,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT)",
    "CREATE TABLE person_archive (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT)",
    "CREATE TABLE address (
        id INTEGER PRIMARY KEY,
        person_id INTEGER REFERENCES person(id),
        street TEXT NOT NULL
    )",
    "CREATE TABLE role (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE person_role (
        person_id INTEGER NOT NULL REFERENCES person(id),
        role_id INTEGER NOT NULL REFERENCES role(id),
        PRIMARY KEY (person_id, role_id)
    )",
    "CREATE TABLE message (
        id INTEGER PRIMARY KEY,
        sender_id INTEGER NOT NULL REFERENCES person(id),
        receiver_id INTEGER NOT NULL REFERENCES person(id),
        body TEXT NOT NULL
    )",
    "CREATE TABLE person_permissions (person_id INTEGER NOT NULL, user_id INTEGER NOT NULL)",
    "CREATE TABLE tag (code TEXT PRIMARY KEY, label TEXT NOT NULL)",
    "CREATE TABLE invoice (number INTEGER PRIMARY KEY, amount REAL NOT NULL)",
    "CREATE TABLE sequence (name TEXT PRIMARY KEY, value INTEGER NOT NULL)",
    "CREATE TABLE team (id INTEGER PRIMARY KEY, code INTEGER NOT NULL UNIQUE, name TEXT NOT NULL)",
    "CREATE TABLE player (
        id INTEGER PRIMARY KEY,
        team_code INTEGER NOT NULL REFERENCES team(code),
        name TEXT NOT NULL
    )",
    "INSERT INTO sequence (name, value) VALUES ('invoice', 1000)",
];

/// Creates an in-memory database with the test schema.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create pool");
    for ddl in SCHEMA {
        sqlx::query(ddl)
            .execute(&pool)
            .await
            .unwrap_or_else(|e| panic!("Failed to run {ddl}: {e}"));
    }
    pool
}

/// The only connection of the pool; everything in a test runs through it.
pub async fn connection(pool: &SqlitePool) -> PoolConnection<Sqlite> {
    pool.acquire().await.expect("Failed to acquire connection")
}

pub fn beans() -> AccessorBeans {
    AccessorBeans::new()
        .register::<Person>()
        .register::<Address>()
        .register::<Role>()
        .register::<Correspondent>()
        .register::<Message>()
        .register::<Tag>()
        .register::<Invoice>()
        .register::<Team>()
        .register::<Player>()
}

pub fn builder() -> SqlMapperBuilder {
    SqlMapper::builder().with_beans(beans())
}

pub fn mapper() -> SqlMapper {
    builder().build()
}

pub fn person(name: &str, city: Option<&str>) -> Person {
    Person {
        name: name.to_owned(),
        city: city.map(ToOwned::to_owned),
        ..Person::default()
    }
}

/// Seeds three people, their addresses and roles.
///
/// Anna (1) lives at two addresses and is admin and editor, Bert (2) has
/// one address and is editor, Carl (3) has neither.
pub async fn seed(conn: &mut SqliteConnection) {
    for statement in [
        "INSERT INTO person (id, name, city) VALUES (1, 'Anna', 'Graz'), (2, 'Bert', NULL), (3, 'Carl', 'Linz')",
        "INSERT INTO address (id, person_id, street) VALUES (10, 1, 'Hauptplatz 1'), (11, 1, 'Sackstrasse 2'), (12, 2, 'Ring 3'), (13, NULL, 'Nowhere 0')",
        "INSERT INTO role (id, name) VALUES (100, 'admin'), (101, 'editor'), (102, 'viewer')",
        "INSERT INTO person_role (person_id, role_id) VALUES (1, 100), (1, 101), (2, 101)",
        "INSERT INTO message (id, sender_id, receiver_id, body) VALUES (1000, 1, 2, 'hi Bert'), (1001, 2, 1, 'hi Anna'), (1002, 1, 3, 'hi Carl')",
    ] {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .unwrap_or_else(|e| panic!("Failed to seed: {e}"));
    }
}

pub async fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to count")
}

pub fn names(people: &[Person]) -> Vec<&str> {
    people.iter().map(|p| p.name.as_str()).collect()
}

pub fn streets(addresses: &[Address]) -> Vec<&str> {
    let mut streets: Vec<&str> = addresses.iter().map(|a| a.street.as_str()).collect();
    streets.sort_unstable();
    streets
}

pub fn role_names(roles: &[Role]) -> Vec<&str> {
    let mut names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    names
}
