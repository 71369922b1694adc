pub mod schema;
pub mod store;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use zohomirror_common::error::{MirrorError, MirrorResult};

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> MirrorResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| MirrorError::Database(e.to_string()))
}
