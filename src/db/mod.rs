//! Database size measurement.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::report::round2;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("size query for database '{database}' failed: {reason}")]
    Query { database: String, reason: String },
}

/// Anything that can report the on-disk size of a named database.
#[async_trait]
pub trait SizeSource: Send + Sync {
    /// Size of `database` in bytes.
    async fn database_size_bytes(&self, database: &str) -> Result<i64, DbError>;
}

/// Convert a byte count to GiB rounded to two decimal places.
pub fn bytes_to_gib(bytes: i64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GIB)
}

/// Query the size of `database` and return it in GiB.
pub async fn measure_size(source: &dyn SizeSource, database: &str) -> Result<f64, DbError> {
    let bytes = source.database_size_bytes(database).await?;
    if bytes < 0 {
        return Err(DbError::Query {
            database: database.to_string(),
            reason: format!("negative size {}", bytes),
        });
    }
    let gib = bytes_to_gib(bytes);
    tracing::debug!(%database, bytes, gib, "measured database size");
    Ok(gib)
}

/// [`SizeSource`] backed by `pg_database_size()` on a PostgreSQL server.
pub struct PgSizeSource {
    pool: PgPool,
}

impl PgSizeSource {
    /// Open a single-connection pool. Fails with [`DbError::Unavailable`]
    /// when the server cannot be reached.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(cfg.connect_timeout_sec))
            .connect(&cfg.url)
            .await
            .map_err(DbError::Unavailable)?;
        tracing::info!("connected to database server");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SizeSource for PgSizeSource {
    async fn database_size_bytes(&self, database: &str) -> Result<i64, DbError> {
        let size: Option<i64> = sqlx::query_scalar("SELECT pg_database_size($1::name)")
            .bind(database)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                e @ (sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                    DbError::Unavailable(e)
                }
                other => DbError::Query {
                    database: database.to_string(),
                    reason: other.to_string(),
                },
            })?;

        size.ok_or_else(|| DbError::Query {
            database: database.to_string(),
            reason: "query returned NULL".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSize(i64);

    #[async_trait]
    impl SizeSource for FixedSize {
        async fn database_size_bytes(&self, _database: &str) -> Result<i64, DbError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_bytes_to_gib_boundaries() {
        assert_eq!(bytes_to_gib(0), 0.0);
        assert_eq!(bytes_to_gib(1_073_741_824), 1.0);
        assert_eq!(bytes_to_gib(2_684_354_560), 2.5);
    }

    #[test]
    fn test_bytes_to_gib_rounds_to_two_places() {
        // 1.234 GiB
        let bytes = (1.234 * BYTES_PER_GIB) as i64;
        assert_eq!(bytes_to_gib(bytes), 1.23);
        // 1.236 GiB
        let bytes = (1.236 * BYTES_PER_GIB) as i64;
        assert_eq!(bytes_to_gib(bytes), 1.24);
        // 8 MiB is 0.0078 GiB
        assert_eq!(bytes_to_gib(8 * 1024 * 1024), 0.01);
        // 1 MiB rounds down to zero
        assert_eq!(bytes_to_gib(1024 * 1024), 0.0);
    }

    #[test]
    fn test_measure_size_converts() {
        let gib = tokio_test::block_on(measure_size(&FixedSize(3_221_225_472), "postgres")).unwrap();
        assert_eq!(gib, 3.0);
    }

    #[test]
    fn test_measure_size_rejects_negative() {
        let err = tokio_test::block_on(measure_size(&FixedSize(-1), "postgres")).unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(err.to_string().contains("postgres"));
    }
}
