//! PostgreSQL persistence for Herald.
//!
//! - [`models`]: `FromRow` row structs and their conversion into core types.
//! - [`repositories`]: zero-sized repository structs, one per table family.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}

/// Wrap a core conversion failure so repositories keep returning
/// `sqlx::Error`.
pub(crate) fn decode_error(e: herald_core::error::CoreError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}
