//! In-memory store implementations.
//!
//! These back the unit and integration tests so the reconciliation core runs
//! without a live database. They preserve the same guarantees as the Postgres
//! implementations: the processed-rows uniqueness check is an atomic
//! insert-if-absent under one lock, and intent transitions are conditional
//! writes that can never leave a terminal state.

use crate::providers::types::ProviderName;
use crate::store::error::StoreError;
use crate::store::intents::{
    IntentStatus, NewPaymentIntent, PaymentIntent, PaymentIntentStore, TransitionOutcome,
};
use crate::store::ledger::{
    EventLedger, LedgerEntry, MarkOutcome, NewLedgerEntry, DUPLICATE_NOTE,
};
use crate::store::orders::OrderStore;
use crate::store::payments::{NewPayment, Payment, PaymentStore};
use crate::store::provider_configs::{ProviderConfig, ProviderConfigStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryPaymentIntentStore {
    inner: Mutex<HashMap<Uuid, PaymentIntent>>,
}

impl InMemoryPaymentIntentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentIntentStore for InMemoryPaymentIntentStore {
    async fn create(&self, new_intent: NewPaymentIntent) -> Result<PaymentIntent, StoreError> {
        let now = Utc::now();
        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            provider: new_intent.provider,
            provider_reference: new_intent.provider_reference,
            amount_minor: new_intent.amount_minor,
            currency: new_intent.currency,
            order_id: new_intent.order_id,
            customer_id: new_intent.customer_id,
            status: IntentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().unwrap();
        if inner.values().any(|existing| {
            existing.provider == intent.provider
                && existing.provider_reference == intent.provider_reference
        }) {
            return Err(StoreError::new(
                crate::store::error::StoreErrorKind::UniqueViolation,
                format!(
                    "intent for {} reference {} already exists",
                    intent.provider, intent.provider_reference
                ),
            ));
        }
        inner.insert(intent.id, intent.clone());
        Ok(intent)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentIntent>, StoreError> {
        Ok(self.inner.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_reference(
        &self,
        provider: ProviderName,
        reference: &str,
    ) -> Result<Option<PaymentIntent>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .values()
            .find(|intent| intent.provider == provider && intent.provider_reference == reference)
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        to: IntentStatus,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let intent = inner
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("payment intent {}", id)))?;
        if intent.status.is_terminal() {
            return Ok(TransitionOutcome::AlreadyTerminal(intent.clone()));
        }
        intent.status = to;
        intent.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(intent.clone()))
    }

    async fn expire_stale(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut expired = 0;
        for intent in inner.values_mut() {
            if intent.status == IntentStatus::Pending && intent.created_at < created_before {
                intent.status = IntentStatus::Expired;
                intent.updated_at = Utc::now();
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[derive(Default)]
struct LedgerInner {
    rows: HashMap<Uuid, LedgerEntry>,
    /// Keys of rows finalized as clean successes; the in-memory stand-in for
    /// the partial unique index.
    processed_keys: HashSet<(ProviderName, String)>,
}

#[derive(Default)]
pub struct InMemoryEventLedger {
    inner: Mutex<LedgerInner>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<_> = inner.rows.values().cloned().collect();
        rows.sort_by_key(|row| row.received_at);
        rows
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn record(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let row = LedgerEntry {
            id: Uuid::new_v4(),
            provider: entry.provider,
            provider_event_id: entry.provider_event_id,
            payload: entry.payload,
            processed: false,
            error_message: None,
            payment_intent_id: None,
            received_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .rows
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn is_duplicate(
        &self,
        provider: ProviderName,
        provider_event_id: &str,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.values().any(|row| {
            row.processed
                && row.provider == provider
                && row.provider_event_id.as_deref() == Some(provider_event_id)
        }))
    }

    async fn attach_intent(&self, id: Uuid, intent_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("ledger row {}", id)))?;
        row.payment_intent_id = Some(intent_id);
        Ok(())
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        error: Option<&str>,
    ) -> Result<MarkOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = {
            let row = inner
                .rows
                .get(&id)
                .ok_or_else(|| StoreError::not_found(format!("ledger row {}", id)))?;
            row.provider_event_id
                .clone()
                .map(|event_id| (row.provider, event_id))
        };

        let outcome = match (key, error) {
            // Clean success with a dedupe key: atomic insert-if-absent.
            (Some(key), None) if !inner.processed_keys.insert(key.clone()) => {
                MarkOutcome::DuplicateSkipped
            }
            _ => MarkOutcome::Finalized,
        };

        let row = inner.rows.get_mut(&id).expect("row checked above");
        row.processed = true;
        row.error_message = match outcome {
            MarkOutcome::DuplicateSkipped => Some(DUPLICATE_NOTE.to_string()),
            MarkOutcome::Finalized => error.map(|e| e.to_string()),
        };
        Ok(outcome)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut rows = self.entries();
        rows.reverse();
        rows.truncate(limit.clamp(1, 500) as usize);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    inner: Mutex<HashMap<Uuid, Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, new_payment: NewPayment) -> Result<Payment, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.get(&new_payment.payment_intent_id) {
            return Ok(existing.clone());
        }
        let payment = Payment {
            id: Uuid::new_v4(),
            payment_intent_id: new_payment.payment_intent_id,
            order_id: new_payment.order_id,
            provider: new_payment.provider,
            provider_transaction_id: new_payment.provider_transaction_id,
            amount_minor: new_payment.amount_minor,
            currency: new_payment.currency,
            created_at: Utc::now(),
        };
        inner.insert(payment.payment_intent_id, payment.clone());
        Ok(payment)
    }

    async fn find_by_intent(&self, intent_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.inner.lock().unwrap().get(&intent_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    paid: Mutex<HashSet<Uuid>>,
    mark_calls: Mutex<Vec<Uuid>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paid(&self, order_id: Uuid) -> bool {
        self.paid.lock().unwrap().contains(&order_id)
    }

    /// Number of times the engine asked for an order to be marked paid,
    /// including idempotent no-ops. Tests assert on this to prove side
    /// effects ran exactly once.
    pub fn mark_calls(&self) -> usize {
        self.mark_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn mark_paid(&self, order_id: Uuid) -> Result<bool, StoreError> {
        self.mark_calls.lock().unwrap().push(order_id);
        Ok(self.paid.lock().unwrap().insert(order_id))
    }
}

#[derive(Default)]
pub struct InMemoryProviderConfigStore {
    inner: Mutex<HashMap<String, ProviderConfig>>,
}

impl InMemoryProviderConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: ProviderConfig) {
        self.inner
            .lock()
            .unwrap()
            .insert(config.provider.clone(), config);
    }
}

#[async_trait]
impl ProviderConfigStore for InMemoryProviderConfigStore {
    async fn find_by_provider(
        &self,
        provider: &str,
    ) -> Result<Option<ProviderConfig>, StoreError> {
        Ok(self.inner.lock().unwrap().get(provider).cloned())
    }

    async fn find_enabled(&self) -> Result<Vec<ProviderConfig>, StoreError> {
        let mut configs: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|config| config.is_enabled)
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_transition_is_write_once() {
        let store = InMemoryPaymentIntentStore::new();
        let intent = store
            .create(NewPaymentIntent {
                provider: ProviderName::Paystack,
                provider_reference: "ord_1".to_string(),
                amount_minor: 5000,
                currency: "GHS".to_string(),
                order_id: None,
                customer_id: None,
            })
            .await
            .unwrap();

        let outcome = store
            .transition(intent.id, IntentStatus::Succeeded)
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Applied(_)));

        // A late failure can no longer move the intent.
        let outcome = store
            .transition(intent.id, IntentStatus::Failed)
            .await
            .unwrap();
        match outcome {
            TransitionOutcome::AlreadyTerminal(current) => {
                assert_eq!(current.status, IntentStatus::Succeeded)
            }
            TransitionOutcome::Applied(_) => panic!("terminal intent must not transition"),
        }
    }

    #[tokio::test]
    async fn duplicate_reference_is_rejected_on_create() {
        let store = InMemoryPaymentIntentStore::new();
        let new_intent = NewPaymentIntent {
            provider: ProviderName::Momo,
            provider_reference: "ord_dup".to_string(),
            amount_minor: 100,
            currency: "GHS".to_string(),
            order_id: None,
            customer_id: None,
        };
        store.create(new_intent.clone()).await.unwrap();
        let err = store.create(new_intent).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn mark_processed_claims_the_key_exactly_once() {
        let ledger = InMemoryEventLedger::new();
        let first = ledger
            .record(NewLedgerEntry {
                provider: ProviderName::Paystack,
                provider_event_id: Some("evt_1".to_string()),
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        let second = ledger
            .record(NewLedgerEntry {
                provider: ProviderName::Paystack,
                provider_event_id: Some("evt_1".to_string()),
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert_eq!(
            ledger.mark_processed(first.id, None).await.unwrap(),
            MarkOutcome::Finalized
        );
        assert_eq!(
            ledger.mark_processed(second.id, None).await.unwrap(),
            MarkOutcome::DuplicateSkipped
        );

        let rows = ledger.entries();
        assert!(rows.iter().all(|row| row.processed));
        assert_eq!(
            rows.iter()
                .filter(|row| row.error_message.is_none())
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn null_event_ids_are_never_deduplicated() {
        let ledger = InMemoryEventLedger::new();
        for _ in 0..2 {
            let row = ledger
                .record(NewLedgerEntry {
                    provider: ProviderName::Momo,
                    provider_event_id: None,
                    payload: serde_json::json!({}),
                })
                .await
                .unwrap();
            assert_eq!(
                ledger.mark_processed(row.id, None).await.unwrap(),
                MarkOutcome::Finalized
            );
        }
    }

    #[tokio::test]
    async fn order_mark_paid_is_idempotent() {
        let store = InMemoryOrderStore::new();
        let order_id = Uuid::new_v4();
        assert!(store.mark_paid(order_id).await.unwrap());
        assert!(!store.mark_paid(order_id).await.unwrap());
        assert!(store.is_paid(order_id));
        assert_eq!(store.mark_calls(), 2);
    }
}
