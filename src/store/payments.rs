use crate::providers::types::ProviderName;
use crate::store::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

/// Captured payment record, created exactly once when an intent succeeds.
/// Immutable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub payment_intent_id: Uuid,
    pub order_id: Option<Uuid>,
    pub provider: ProviderName,
    pub provider_transaction_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_intent_id: Uuid,
    pub order_id: Option<Uuid>,
    pub provider: ProviderName,
    pub provider_transaction_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Creates the payment record for an intent. Idempotent on
    /// `payment_intent_id`: a concurrent or repeated create returns the row
    /// that already exists instead of inserting a second one.
    async fn create(&self, new_payment: NewPayment) -> Result<Payment, StoreError>;

    async fn find_by_intent(&self, intent_id: Uuid) -> Result<Option<Payment>, StoreError>;
}

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn create(&self, new_payment: NewPayment) -> Result<Payment, StoreError> {
        let inserted: Option<PaymentRow> = sqlx::query_as(
            "INSERT INTO payments \
                 (id, payment_intent_id, order_id, provider, provider_transaction_id, amount_minor, currency) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (payment_intent_id) DO NOTHING \
             RETURNING id, payment_intent_id, order_id, provider, provider_transaction_id, \
                 amount_minor, currency, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(new_payment.payment_intent_id)
        .bind(new_payment.order_id)
        .bind(new_payment.provider.as_str())
        .bind(&new_payment.provider_transaction_id)
        .bind(new_payment.amount_minor)
        .bind(&new_payment.currency)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        match inserted {
            Some(row) => row.into_payment(),
            None => self
                .find_by_intent(new_payment.payment_intent_id)
                .await?
                .ok_or_else(|| {
                    StoreError::not_found(format!(
                        "payment for intent {}",
                        new_payment.payment_intent_id
                    ))
                }),
        }
    }

    async fn find_by_intent(&self, intent_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(
            "SELECT id, payment_intent_id, order_id, provider, provider_transaction_id, \
                 amount_minor, currency, created_at \
             FROM payments WHERE payment_intent_id = $1",
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        row.map(PaymentRow::into_payment).transpose()
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    payment_intent_id: Uuid,
    order_id: Option<Uuid>,
    provider: String,
    provider_transaction_id: Option<String>,
    amount_minor: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, StoreError> {
        let provider = ProviderName::from_str(&self.provider).map_err(|_| {
            StoreError::new(
                StoreErrorKind::Query,
                format!("unknown provider in payments row: {}", self.provider),
            )
        })?;
        Ok(Payment {
            id: self.id,
            payment_intent_id: self.payment_intent_id,
            order_id: self.order_id,
            provider,
            provider_transaction_id: self.provider_transaction_id,
            amount_minor: self.amount_minor,
            currency: self.currency,
            created_at: self.created_at,
        })
    }
}
