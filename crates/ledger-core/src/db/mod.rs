//! Database access layer for PostgreSQL.
//!
//! Repositories own a pool for standalone reads/writes; mutations that must
//! be atomic with other effects are associated functions over a
//! `&mut PgConnection` so callers can compose them into one transaction.

pub mod balances;
pub mod dead_letters;
pub mod markets;
pub mod positions;
pub mod trades;

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Run database migrations from the migrations directory.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate::Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    Ok(())
}
