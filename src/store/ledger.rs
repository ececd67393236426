use crate::providers::types::ProviderName;
use crate::store::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

pub const DUPLICATE_NOTE: &str = "duplicate, skipped";

/// Append-only record of one inbound provider event. Rows are never deleted;
/// the ledger is both the idempotency key store and the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub provider: ProviderName,
    pub provider_event_id: Option<String>,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub error_message: Option<String>,
    pub payment_intent_id: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub provider: ProviderName,
    pub provider_event_id: Option<String>,
    pub payload: serde_json::Value,
}

/// How `mark_processed` finalized a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The row was finalized as requested.
    Finalized,
    /// Finalizing as a clean success would have violated the processed-rows
    /// uniqueness constraint (a concurrent delivery won the race); the row was
    /// finalized as a duplicate instead.
    DuplicateSkipped,
}

#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Inserts a new row with `processed = false`. Recording is never skipped,
    /// even for events that turn out to be duplicates, so the audit trail is
    /// complete.
    async fn record(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// True iff a row with this key already finished processing. Events
    /// without a provider event id are never reported as duplicates.
    async fn is_duplicate(
        &self,
        provider: ProviderName,
        provider_event_id: &str,
    ) -> Result<bool, StoreError>;

    /// Links a row to the intent it was matched against.
    async fn attach_intent(&self, id: Uuid, intent_id: Uuid) -> Result<(), StoreError>;

    /// Finalizes a row exactly once: `processed = true`, with `error` when the
    /// handler failed. The clean-success path is guarded by the storage-level
    /// uniqueness constraint on (provider, provider_event_id); losing that
    /// race finalizes the row as a duplicate rather than leaving it dangling.
    async fn mark_processed(
        &self,
        id: Uuid,
        error: Option<&str>,
    ) -> Result<MarkOutcome, StoreError>;

    /// Read surface for the admin audit view.
    async fn list_recent(&self, limit: i64) -> Result<Vec<LedgerEntry>, StoreError>;
}

pub struct PgEventLedger {
    pool: PgPool,
}

impl PgEventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LEDGER_COLUMNS: &str = "id, provider, provider_event_id, payload, processed, \
     error_message, payment_intent_id, received_at";

#[async_trait]
impl EventLedger for PgEventLedger {
    async fn record(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let row: LedgerRow = sqlx::query_as(
            "INSERT INTO payment_events (id, provider, provider_event_id, payload, processed) \
             VALUES ($1, $2, $3, $4, false) \
             RETURNING id, provider, provider_event_id, payload, processed, \
                 error_message, payment_intent_id, received_at",
        )
        .bind(Uuid::new_v4())
        .bind(entry.provider.as_str())
        .bind(&entry.provider_event_id)
        .bind(&entry.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        row.into_entry()
    }

    async fn is_duplicate(
        &self,
        provider: ProviderName,
        provider_event_id: &str,
    ) -> Result<bool, StoreError> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
                 SELECT 1 FROM payment_events \
                 WHERE provider = $1 AND provider_event_id = $2 AND processed = true \
             )",
        )
        .bind(provider.as_str())
        .bind(provider_event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(exists.0)
    }

    async fn attach_intent(&self, id: Uuid, intent_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE payment_events SET payment_intent_id = $2 WHERE id = $1")
            .bind(id)
            .bind(intent_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        error: Option<&str>,
    ) -> Result<MarkOutcome, StoreError> {
        // Error rows carry no uniqueness claim; only clean successes contend
        // for the partial unique index on processed rows.
        let result = sqlx::query(
            "UPDATE payment_events \
             SET processed = true, error_message = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx);

        match result {
            Ok(_) => Ok(MarkOutcome::Finalized),
            Err(e) if e.is_unique_violation() && error.is_none() => {
                sqlx::query(
                    "UPDATE payment_events \
                     SET processed = true, error_message = $2 \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(DUPLICATE_NOTE)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;
                Ok(MarkOutcome::DuplicateSkipped)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_events ORDER BY received_at DESC LIMIT $1",
            LEDGER_COLUMNS
        ))
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        rows.into_iter().map(LedgerRow::into_entry).collect()
    }
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    id: Uuid,
    provider: String,
    provider_event_id: Option<String>,
    payload: serde_json::Value,
    processed: bool,
    error_message: Option<String>,
    payment_intent_id: Option<Uuid>,
    received_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_entry(self) -> Result<LedgerEntry, StoreError> {
        let provider = ProviderName::from_str(&self.provider).map_err(|_| {
            StoreError::new(
                StoreErrorKind::Query,
                format!("unknown provider in payment_events row: {}", self.provider),
            )
        })?;
        Ok(LedgerEntry {
            id: self.id,
            provider,
            provider_event_id: self.provider_event_id,
            payload: self.payload,
            processed: self.processed,
            error_message: self.error_message,
            payment_intent_id: self.payment_intent_id,
            received_at: self.received_at,
        })
    }
}
