use crate::providers::types::ProviderName;
use crate::store::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl IntentStatus {
    /// Terminal statuses are write-once: no edge leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Succeeded
                | IntentStatus::Failed
                | IntentStatus::Cancelled
                | IntentStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Failed => "failed",
            IntentStatus::Cancelled => "cancelled",
            IntentStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(IntentStatus::Pending),
            "processing" => Ok(IntentStatus::Processing),
            "succeeded" => Ok(IntentStatus::Succeeded),
            "failed" => Ok(IntentStatus::Failed),
            "cancelled" => Ok(IntentStatus::Cancelled),
            "expired" => Ok(IntentStatus::Expired),
            _ => Err(StoreError::new(
                StoreErrorKind::Query,
                format!("unknown intent status: {}", value),
            )),
        }
    }
}

/// One attempt to collect payment for an order, independent of how many
/// provider events describe it.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub provider: ProviderName,
    pub provider_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub provider: ProviderName,
    pub provider_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

/// Result of an atomic conditional transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The conditional write landed; carries the updated intent.
    Applied(PaymentIntent),
    /// The intent was already terminal; carries the untouched current row.
    AlreadyTerminal(PaymentIntent),
}

#[async_trait]
pub trait PaymentIntentStore: Send + Sync {
    async fn create(&self, new_intent: NewPaymentIntent) -> Result<PaymentIntent, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentIntent>, StoreError>;

    async fn find_by_reference(
        &self,
        provider: ProviderName,
        reference: &str,
    ) -> Result<Option<PaymentIntent>, StoreError>;

    /// Transitions the intent to `to` only if its current status is
    /// non-terminal, as a single atomic write. Never a read-modify-write from
    /// two round trips.
    async fn transition(&self, id: Uuid, to: IntentStatus)
        -> Result<TransitionOutcome, StoreError>;

    /// Expires `pending` intents created before the cutoff. Returns how many
    /// rows were expired. Uses the same conditional-write rule, so it can
    /// never clobber an intent that reached a terminal state concurrently.
    async fn expire_stale(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub struct PgPaymentIntentStore {
    pool: PgPool,
}

impl PgPaymentIntentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INTENT_COLUMNS: &str = "id, provider, provider_reference, amount_minor, currency, \
     order_id, customer_id, status, created_at, updated_at";

#[async_trait]
impl PaymentIntentStore for PgPaymentIntentStore {
    async fn create(&self, new_intent: NewPaymentIntent) -> Result<PaymentIntent, StoreError> {
        let row: IntentRow = sqlx::query_as(
            "INSERT INTO payment_intents \
                 (id, provider, provider_reference, amount_minor, currency, order_id, customer_id, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending') \
             RETURNING id, provider, provider_reference, amount_minor, currency, \
                 order_id, customer_id, status, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(new_intent.provider.as_str())
        .bind(&new_intent.provider_reference)
        .bind(new_intent.amount_minor)
        .bind(&new_intent.currency)
        .bind(new_intent.order_id)
        .bind(new_intent.customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        row.into_intent()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentIntent>, StoreError> {
        let row: Option<IntentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_intents WHERE id = $1",
            INTENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        row.map(IntentRow::into_intent).transpose()
    }

    async fn find_by_reference(
        &self,
        provider: ProviderName,
        reference: &str,
    ) -> Result<Option<PaymentIntent>, StoreError> {
        let row: Option<IntentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_intents WHERE provider = $1 AND provider_reference = $2",
            INTENT_COLUMNS
        ))
        .bind(provider.as_str())
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        row.map(IntentRow::into_intent).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        to: IntentStatus,
    ) -> Result<TransitionOutcome, StoreError> {
        let updated: Option<IntentRow> = sqlx::query_as(
            "UPDATE payment_intents \
             SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'processing') \
             RETURNING id, provider, provider_reference, amount_minor, currency, \
                 order_id, customer_id, status, created_at, updated_at",
        )
        .bind(id)
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        match updated {
            Some(row) => Ok(TransitionOutcome::Applied(row.into_intent()?)),
            None => {
                let current = self
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| StoreError::not_found(format!("payment intent {}", id)))?;
                Ok(TransitionOutcome::AlreadyTerminal(current))
            }
        }
    }

    async fn expire_stale(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE payment_intents \
             SET status = 'expired', updated_at = NOW() \
             WHERE status = 'pending' AND created_at < $1",
        )
        .bind(created_before)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, FromRow)]
struct IntentRow {
    id: Uuid,
    provider: String,
    provider_reference: String,
    amount_minor: i64,
    currency: String,
    order_id: Option<Uuid>,
    customer_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IntentRow {
    fn into_intent(self) -> Result<PaymentIntent, StoreError> {
        let provider = ProviderName::from_str(&self.provider).map_err(|_| {
            StoreError::new(
                StoreErrorKind::Query,
                format!("unknown provider in payment_intents row: {}", self.provider),
            )
        })?;
        Ok(PaymentIntent {
            id: self.id,
            provider,
            provider_reference: self.provider_reference,
            amount_minor: self.amount_minor,
            currency: self.currency,
            order_id: self.order_id,
            customer_id: self.customer_id,
            status: IntentStatus::from_str(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_exactly_the_four() {
        assert!(IntentStatus::Succeeded.is_terminal());
        assert!(IntentStatus::Failed.is_terminal());
        assert!(IntentStatus::Cancelled.is_terminal());
        assert!(IntentStatus::Expired.is_terminal());
        assert!(!IntentStatus::Pending.is_terminal());
        assert!(!IntentStatus::Processing.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            IntentStatus::Pending,
            IntentStatus::Processing,
            IntentStatus::Succeeded,
            IntentStatus::Failed,
            IntentStatus::Cancelled,
            IntentStatus::Expired,
        ] {
            assert_eq!(IntentStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(IntentStatus::from_str("refunded").is_err());
    }
}
