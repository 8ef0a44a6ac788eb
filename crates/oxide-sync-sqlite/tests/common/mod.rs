#![allow(dead_code)]

use oxide_sync::prelude::*;
use oxide_sync_sqlite::SqliteDriver;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// A single-connection in-memory database. The connection is never
/// recycled, so the database lives as long as the pool.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap_or_else(|e| panic!("Failed to open in-memory database: {e}"))
}

/// Synchronizes `entities` with a fresh driver and returns the statements
/// it executed.
pub async fn sync(pool: &SqlitePool, entities: &[EntityMetadata]) -> Vec<String> {
    let driver = SqliteDriver::new(pool.clone());
    SchemaBuilder::new(&driver, entities)
        .with_logger(&NoopLogger)
        .build()
        .await
        .unwrap_or_else(|e| panic!("Failed to synchronize: {e}"));
    driver.executed_statements().await
}

/// Loads the live snapshot of one table.
pub async fn snapshot(pool: &SqlitePool, table: &str) -> Option<TableSnapshot> {
    let driver = SqliteDriver::new(pool.clone());
    driver
        .load_table_snapshots(&[table.to_string()])
        .await
        .unwrap_or_else(|e| panic!("Failed to load {table}: {e}"))
        .pop()
}

pub async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
    snapshot(pool, table).await.is_some()
}

pub fn id_column() -> ColumnMetadata {
    ColumnMetadata::new("id", SqlType::Integer).primary().generated()
}

/// `post(id primary generated, title)`.
pub fn post() -> EntityMetadata {
    EntityMetadata::new("post")
        .column(id_column())
        .column(ColumnMetadata::new("title", SqlType::Text))
}

/// `user(id primary generated, name)`.
pub fn user() -> EntityMetadata {
    EntityMetadata::new("user")
        .column(id_column())
        .column(ColumnMetadata::new("name", SqlType::Varchar(100)).not_null())
}

/// `post` with a many-to-one relation to `user` through `author_id`.
pub fn post_with_author() -> EntityMetadata {
    post()
        .column(ColumnMetadata::new("author_id", SqlType::Integer))
        .relation(
            RelationMetadata::many_to_one("author", "user", "author_id", "id")
                .on_delete(ForeignKeyAction::Cascade),
        )
}

/// `post_tag(post_id, tag_id)` with a composite primary key.
pub fn post_tag() -> EntityMetadata {
    EntityMetadata::new("post_tag")
        .column(ColumnMetadata::new("post_id", SqlType::Integer).primary())
        .column(ColumnMetadata::new("tag_id", SqlType::Integer).primary())
}
