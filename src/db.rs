//! Database connection pool and migration management.
//!
//! This module provides utilities for:
//! - Creating a PostgreSQL connection pool with a per-statement timeout
//! - Running database migrations automatically

use sqlx::{
    Pool, Postgres,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::{str::FromStr, time::Duration};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// Every connection is opened with `statement_timeout` set to `query_timeout`,
/// so each database call carries the same upper bound regardless of which
/// handler issued it. The same duration bounds how long a request waits for a
/// free connection.
///
/// # Errors
///
/// Returns an error if:
/// - Database connection string is invalid
/// - Cannot connect to PostgreSQL server
/// - Database authentication fails
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    query_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    pool_options(max_connections, query_timeout)
        .connect_with(connect_options(database_url, query_timeout)?)
        .await
}

/// Same as [`create_pool`] but never touches the network until a query runs.
pub fn create_lazy_pool(
    database_url: &str,
    max_connections: u32,
    query_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    Ok(pool_options(max_connections, query_timeout)
        .connect_lazy_with(connect_options(database_url, query_timeout)?))
}

fn pool_options(max_connections: u32, query_timeout: Duration) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(query_timeout)
}

fn connect_options(
    database_url: &str,
    query_timeout: Duration,
) -> Result<PgConnectOptions, sqlx::Error> {
    let timeout_ms = query_timeout.as_millis().to_string();

    Ok(PgConnectOptions::from_str(database_url)?
        .options([("statement_timeout", timeout_ms.as_str())]))
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each one runs
/// only once.
///
/// # Errors
///
/// Returns an error if a migration file cannot be applied.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro embeds ./migrations at compile time
    sqlx::migrate!("./migrations").run(pool).await
}
