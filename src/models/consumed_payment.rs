use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A redeemed payment hash. A row existing means the capability has been
/// spent and must never authenticate another operation.
#[derive(Debug, Clone, FromRow)]
pub struct ConsumedPayment {
    pub payment_hash: String,
    pub consumed_at: DateTime<Utc>,
}
