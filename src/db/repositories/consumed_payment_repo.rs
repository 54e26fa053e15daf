use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppResult;

pub struct ConsumedPaymentRepository;

impl ConsumedPaymentRepository {
    /// Record `payment_hash` as spent. Returns true on first use, false on
    /// replay.
    ///
    /// This inserts blindly and lets the primary-key violation answer the
    /// replay question; a read-then-write would race under concurrency.
    pub async fn admit(pool: &SqlitePool, payment_hash: &str) -> AppResult<bool> {
        let result =
            sqlx::query("INSERT INTO consumed_payments (payment_hash, consumed_at) VALUES (?, ?)")
                .bind(payment_hash)
                .bind(Utc::now())
                .execute(pool)
                .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::warn!(payment_hash = %payment_hash, "Replayed payment hash refused");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
