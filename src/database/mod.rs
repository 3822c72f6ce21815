// Copyright 2023 Remi Bernotavicius

use diesel::connection::SimpleConnection as _;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;
pub type ConnectionPool = Pool<ConnectionManager<Connection>>;
pub type PooledConnectionHandle = PooledConnection<ConnectionManager<Connection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// SQLite leaves foreign keys off unless every connection asks for them.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<Connection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

fn build_pool(url: &str, max_size: u32) -> crate::Result<ConnectionPool> {
    let manager = ConnectionManager::<Connection>::new(url);
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;

    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    for migration in applied {
        log::info!("applied migration {migration}");
    }
    Ok(pool)
}

pub fn establish_pool(path: impl AsRef<Path>, max_size: u32) -> crate::Result<ConnectionPool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = path
        .to_str()
        .ok_or_else(|| format!("database path {path:?} is not valid UTF-8"))?;
    build_pool(url, max_size)
}

/// Single-connection in-memory database; every pooled connection would otherwise
/// see its own empty database.
#[cfg(test)]
pub fn test_pool() -> ConnectionPool {
    build_pool(":memory:", 1).unwrap()
}

#[test]
fn migrations() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    conn.revert_all_migrations(MIGRATIONS).unwrap();
    assert!(conn.has_pending_migration(MIGRATIONS).unwrap());

    conn.run_pending_migrations(MIGRATIONS).unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
}

#[test]
fn foreign_keys_enforced() {
    use diesel::RunQueryDsl as _;
    use models::{NewIngredientAmount, NewTagRecipe};

    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let orphan = NewTagRecipe {
        tag_id: 41.into(),
        recipe_id: 42.into(),
    };
    assert!(diesel::insert_into(schema::tag_recipes::table)
        .values(&orphan)
        .execute(&mut conn)
        .is_err());

    let orphan = NewIngredientAmount {
        recipe_id: 1.into(),
        ingredient_id: 1.into(),
        amount: 5,
    };
    assert!(diesel::insert_into(schema::ingredient_amounts::table)
        .values(&orphan)
        .execute(&mut conn)
        .is_err());
}
