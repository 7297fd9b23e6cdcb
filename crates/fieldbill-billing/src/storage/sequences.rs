use crate::error::{BillingError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use fieldbill_common::logging::AUDIT_TARGET;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Durable per-scope counters.
///
/// `increment` must be a single atomic increment-and-read: two callers can
/// never observe the same value for one scope. The first value issued in a
/// fresh scope is 1.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn increment(&self, scope: &str) -> Result<u64>;

    /// Last value issued for `scope`, or 0 if none has been.
    async fn current(&self, scope: &str) -> Result<u64>;
}

/// Process-local counters, one atomic per scope.
#[derive(Clone, Default)]
pub struct InMemorySequenceStore {
    counters: Arc<DashMap<String, AtomicU64>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn increment(&self, scope: &str) -> Result<u64> {
        let counter = self
            .counters
            .entry(scope.to_string())
            .or_insert_with(|| AtomicU64::new(0));

        // Compare-and-swap so an exhausted counter never wraps back to reuse values.
        let previous = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .map_err(|_| {
                error!(target: AUDIT_TARGET, scope = %scope, "Sequence exhausted");
                BillingError::SequenceCollision {
                    scope: scope.to_string(),
                    reason: "counter exhausted".to_string(),
                }
            })?;

        let value = previous + 1;
        debug!(scope = %scope, value, "Issued sequence value");
        Ok(value)
    }

    async fn current(&self, scope: &str) -> Result<u64> {
        Ok(self
            .counters
            .get(scope)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0))
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PgSequenceStore;

#[cfg(feature = "postgres")]
mod postgres {
    use super::SequenceStore;
    use crate::error::{BillingError, Result};
    use async_trait::async_trait;
    use fieldbill_common::logging::AUDIT_TARGET;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use tracing::{error, info};

    /// Counters in a `document_sequences` table, advanced with one
    /// upsert-returning statement per value.
    #[derive(Clone)]
    pub struct PgSequenceStore {
        pool: PgPool,
    }

    impl PgSequenceStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .map_err(|e| BillingError::DatabaseError {
                    operation: "connect".to_string(),
                    source: Box::new(e),
                })?;

            info!(max_connections, "Connected sequence store");
            Ok(Self::new(pool))
        }

        pub async fn ensure_schema(&self) -> Result<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS document_sequences (
                    scope TEXT PRIMARY KEY,
                    last_value BIGINT NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "ensure_schema".to_string(),
                source: Box::new(e),
            })?;
            Ok(())
        }
    }

    #[async_trait]
    impl SequenceStore for PgSequenceStore {
        async fn increment(&self, scope: &str) -> Result<u64> {
            let value: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO document_sequences (scope, last_value)
                VALUES ($1, 1)
                ON CONFLICT (scope)
                DO UPDATE SET last_value = document_sequences.last_value + 1
                RETURNING last_value
                "#,
            )
            .bind(scope)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "increment_sequence".to_string(),
                source: Box::new(e),
            })?;

            match value {
                Some(value) if value > 0 => Ok(value as u64),
                other => {
                    error!(
                        target: AUDIT_TARGET,
                        scope = %scope,
                        returned = ?other,
                        "Sequence store did not return a fresh value"
                    );
                    Err(BillingError::SequenceCollision {
                        scope: scope.to_string(),
                        reason: format!("store returned {:?}", other),
                    })
                }
            }
        }

        async fn current(&self, scope: &str) -> Result<u64> {
            let value: Option<i64> =
                sqlx::query_scalar("SELECT last_value FROM document_sequences WHERE scope = $1")
                    .bind(scope)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| BillingError::DatabaseError {
                        operation: "read_sequence".to_string(),
                        source: Box::new(e),
                    })?;

            Ok(value.map(|v| v.max(0) as u64).unwrap_or(0))
        }
    }
}
