//! # SQLite store methods
//!
//! "Low-level" database interactions, maintained as simple functions (rather than stateful
//! structs) that accept a `&mut SqliteConnection`. Callers can obtain a connection from a pool,
//! or open a transaction and pass `&mut *tx` to compose several of these calls atomically.

use log::info;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Error as SqlxError, Sqlite, SqlitePool};

pub mod accounts;
pub mod ledger;
pub mod orders;
pub mod outbox;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::create_database(url).await?;
        info!("Created Sqlite database at {url}");
    }
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
