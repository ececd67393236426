use crate::store::error::StoreError;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Write-target view of the storefront's orders table. The reconciliation
/// engine performs exactly one mutation against it: flipping an order to
/// `paid` when its intent succeeds.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Marks the order paid. Idempotent: returns `true` only when this call
    /// performed the transition, `false` when the order was already paid.
    async fn mark_paid(&self, order_id: Uuid) -> Result<bool, StoreError>;
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn mark_paid(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders \
             SET status = 'paid', updated_at = NOW() \
             WHERE id = $1 AND status <> 'paid'",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}
