use crate::providers::error::ProviderError;
use crate::providers::registry::ProviderRegistry;
use crate::providers::types::{EventOutcome, NormalizedEvent, ProviderName};
use crate::reconcile::state_machine::{self, Decision};
use crate::store::error::StoreError;
use crate::store::intents::{PaymentIntent, PaymentIntentStore, TransitionOutcome};
use crate::store::ledger::{EventLedger, LedgerEntry, MarkOutcome, NewLedgerEntry, DUPLICATE_NOTE};
use crate::store::orders::OrderStore;
use crate::store::payments::{NewPayment, PaymentStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Unknown payment reference: {0}")]
    UnknownReference(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// What the webhook handler acknowledges back to the provider. Every variant
/// is a 200 — only signature verification may reject (see `handle_webhook`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// Event applied (or was a terminal-intent no-op).
    Processed,
    /// Ledger already held a processed row for this event id.
    Duplicate,
    /// No intent matches the reference; recorded for manual reconciliation.
    Unmatched,
    /// Payload failed the typed parse; recorded with the parse error.
    Malformed,
    /// Applying the event or one of its side effects failed; recorded with
    /// the error so the sweep can replay it.
    Failed,
}

/// Drives adapters, ledger, state machine and side effects for both ingestion
/// paths. Storage is injected so the whole flow runs against the in-memory
/// stores in tests.
pub struct ReconciliationService {
    registry: Arc<ProviderRegistry>,
    ledger: Arc<dyn EventLedger>,
    intents: Arc<dyn PaymentIntentStore>,
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
}

impl ReconciliationService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        ledger: Arc<dyn EventLedger>,
        intents: Arc<dyn PaymentIntentStore>,
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            registry,
            ledger,
            intents,
            orders,
            payments,
        }
    }

    /// Webhook ingestion path.
    ///
    /// Signature verification happens against the raw body before anything is
    /// persisted: unverified payloads are not trusted enough to enter the
    /// ledger. Past that point the delivery is always acknowledged — errors
    /// are recorded on the ledger row instead of surfaced as non-2xx, because
    /// providers treat non-2xx as "retry" and most of these conditions are
    /// not fixed by retrying.
    pub async fn handle_webhook(
        &self,
        provider: ProviderName,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookAck, ReconcileError> {
        let adapter = self.registry.resolve(provider).await?;

        if !adapter.verify_signature(raw_body, signature) {
            warn!(provider = %provider, "webhook signature verification failed");
            return Err(ReconcileError::InvalidSignature);
        }

        let normalized = adapter.normalize_event(raw_body);

        // Recording must never be skipped once the payload is trusted, even
        // for duplicates and payloads that fail to normalize.
        let row = self
            .ledger
            .record(NewLedgerEntry {
                provider,
                provider_event_id: normalized
                    .as_ref()
                    .ok()
                    .and_then(|event| event.provider_event_id.clone()),
                payload: raw_payload_json(raw_body),
            })
            .await?;

        let (note, ack) = match normalized {
            Err(e) => {
                warn!(provider = %provider, error = %e, "webhook payload failed to normalize");
                (Some(format!("malformed payload: {}", e)), WebhookAck::Malformed)
            }
            Ok(event) => match self.apply_recorded(&row, &event).await {
                Ok(result) => result,
                Err(e) => {
                    error!(provider = %provider, error = %e, "webhook processing failed");
                    (Some(e.to_string()), WebhookAck::Failed)
                }
            },
        };

        self.finalize(row.id, note.as_deref()).await;
        Ok(ack)
    }

    /// Polling ingestion path: a status-query result funnels through the same
    /// apply step as webhooks. Poll results are recorded for audit but carry
    /// no event id, so they never participate in ledger deduplication.
    pub async fn ingest_polled(
        &self,
        event: &NormalizedEvent,
    ) -> Result<PaymentIntent, ReconcileError> {
        let row = self
            .ledger
            .record(NewLedgerEntry {
                provider: event.provider,
                provider_event_id: None,
                payload: serde_json::to_value(event).unwrap_or_else(|_| serde_json::json!({})),
            })
            .await?;

        let intent = match self
            .intents
            .find_by_reference(event.provider, &event.provider_reference)
            .await
        {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                self.finalize(row.id, Some("intent not found")).await;
                return Err(ReconcileError::UnknownReference(
                    event.provider_reference.clone(),
                ));
            }
            Err(e) => {
                self.finalize(row.id, Some(&e.to_string())).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.ledger.attach_intent(row.id, intent.id).await {
            warn!(error = %e, "failed to attach intent to ledger row");
        }

        match self.apply_event(&intent, event).await {
            Ok(updated) => {
                self.finalize(row.id, None).await;
                Ok(updated)
            }
            Err(e) => {
                self.finalize(row.id, Some(&e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn apply_recorded(
        &self,
        row: &LedgerEntry,
        event: &NormalizedEvent,
    ) -> Result<(Option<String>, WebhookAck), ReconcileError> {
        // Dedupe before any intent mutation. Events without an id fall
        // through to the intent-level no-op.
        if let Some(event_id) = &event.provider_event_id {
            if self.ledger.is_duplicate(event.provider, event_id).await? {
                info!(
                    provider = %event.provider,
                    provider_event_id = %event_id,
                    "duplicate event skipped"
                );
                return Ok((Some(DUPLICATE_NOTE.to_string()), WebhookAck::Duplicate));
            }
        }

        let intent = match self
            .intents
            .find_by_reference(event.provider, &event.provider_reference)
            .await?
        {
            Some(intent) => intent,
            None => {
                // Acknowledged anyway: the provider cannot fix this by
                // retrying. Resolution is support-driven.
                warn!(
                    provider = %event.provider,
                    reference = %event.provider_reference,
                    "no intent matches webhook reference"
                );
                return Ok((Some("intent not found".to_string()), WebhookAck::Unmatched));
            }
        };

        if let Err(e) = self.ledger.attach_intent(row.id, intent.id).await {
            warn!(error = %e, "failed to attach intent to ledger row");
        }

        match self.apply_event(&intent, event).await {
            Ok(_) => Ok((None, WebhookAck::Processed)),
            Err(e) => Ok((Some(e.to_string()), WebhookAck::Failed)),
        }
    }

    /// Applies one normalized event to its intent and runs the side effects
    /// the transition asks for. Shared by both ingestion paths.
    async fn apply_event(
        &self,
        intent: &PaymentIntent,
        event: &NormalizedEvent,
    ) -> Result<PaymentIntent, ReconcileError> {
        if event.outcome == EventOutcome::Succeeded {
            if let Some(reported) = event.amount_minor {
                if reported != intent.amount_minor {
                    // Sanity logging only; provider-reported amounts can be
                    // formatted differently and must not block settlement.
                    warn!(
                        intent_id = %intent.id,
                        expected = intent.amount_minor,
                        reported,
                        "amount mismatch on successful payment"
                    );
                }
            }
        }

        let Decision { next, effects } = state_machine::decide(intent.status, event.outcome);
        let Some(next) = next else {
            return Ok(intent.clone());
        };

        let updated = match self.intents.transition(intent.id, next).await? {
            TransitionOutcome::AlreadyTerminal(current) => {
                // Lost the race to another delivery; its winner already ran
                // the side effects.
                info!(
                    intent_id = %intent.id,
                    status = %current.status,
                    "intent already terminal, event is a no-op"
                );
                return Ok(current);
            }
            TransitionOutcome::Applied(updated) => updated,
        };

        info!(
            intent_id = %updated.id,
            provider = %updated.provider,
            from = %intent.status,
            to = %updated.status,
            "payment intent transitioned"
        );

        if effects.create_payment {
            self.payments
                .create(NewPayment {
                    payment_intent_id: updated.id,
                    order_id: updated.order_id,
                    provider: updated.provider,
                    provider_transaction_id: event.provider_transaction_id.clone(),
                    amount_minor: updated.amount_minor,
                    currency: updated.currency.clone(),
                })
                .await?;
        }

        if effects.mark_order_paid {
            if let Some(order_id) = updated.order_id {
                let newly_paid = self.orders.mark_paid(order_id).await?;
                if newly_paid {
                    info!(order_id = %order_id, intent_id = %updated.id, "order marked paid");
                }
            }
        }

        Ok(updated)
    }

    /// Finalization runs regardless of how processing went, so no row is ever
    /// left `processed = false`. A finalization failure is logged rather than
    /// propagated: the webhook response must not turn into a retry storm over
    /// a bookkeeping write.
    async fn finalize(&self, row_id: Uuid, note: Option<&str>) {
        match self.ledger.mark_processed(row_id, note).await {
            Ok(MarkOutcome::Finalized) => {}
            Ok(MarkOutcome::DuplicateSkipped) => {
                info!(row_id = %row_id, "ledger row finalized as duplicate after losing the race");
            }
            Err(e) => {
                error!(row_id = %row_id, error = %e, "failed to finalize ledger row");
            }
        }
    }
}

fn raw_payload_json(raw_body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(raw_body).unwrap_or_else(|_| {
        serde_json::json!({ "raw": String::from_utf8_lossy(raw_body) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_payloads_are_preserved_for_audit() {
        let value = raw_payload_json(b"plain text body");
        assert_eq!(value["raw"], "plain text body");

        let value = raw_payload_json(br#"{"event":"charge.success"}"#);
        assert_eq!(value["event"], "charge.success");
    }
}
