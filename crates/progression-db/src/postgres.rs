//! Shared `PostgreSQL` pool for the progression tables.
//!
//! Tables are created by the adapters (`create_schema`) because keyed
//! domains come from configuration, so there are no migrations here. Every
//! query is built at runtime with bound values; only identifiers checked by
//! [`progression_core::Schema`] are interpolated.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::error::DbError;

/// How long a background save waits for a free connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections are closed after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Pool handle shared by every `PostgreSQL` adapter.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Open a pool of at most `max_connections` against `url`.
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] if `url` is not a `PostgreSQL` URL,
    /// [`DbError::Postgres`] if no connection can be established.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("Invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_with(options)
            .await?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// The underlying [`PgPool`], cloned into each adapter.
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for checked-out connections and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_a_config_error() {
        let result = PostgresPool::connect("not a database url", 4).await;
        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
