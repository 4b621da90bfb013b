//! PostgreSQL pool and embedded migrations.

use std::time::Duration;

use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

pub type DbPool = Pool<Postgres>;

/// Upper bound on concurrent connections held by the service.
const MAX_CONNECTIONS: u32 = 5;

/// Create the connection pool used by [`crate::store::PgTransactionStore`].
///
/// Waiting for a free connection is capped at 5 seconds so a saturated pool
/// surfaces as a storage error instead of hanging the request.
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the first
/// connection cannot be established.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Apply the migrations in `migrations/` (embedded at compile time).
///
/// Applied versions are tracked in `_sqlx_migrations`, so each file runs once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
