//! End-to-end reconciliation flows over the in-memory stores: the same
//! orchestrator, state machine and adapters the server wires up, minus the
//! database and the HTTP layer.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::{Sha256, Sha512};
use uuid::Uuid;

use storefront_payments::providers::registry::{ProviderRegistry, ProviderSecrets};
use storefront_payments::providers::types::{EventOutcome, NormalizedEvent, ProviderName};
use storefront_payments::reconcile::orchestrator::{
    ReconcileError, ReconciliationService, WebhookAck,
};
use storefront_payments::store::intents::{IntentStatus, NewPaymentIntent, PaymentIntentStore};
use storefront_payments::store::memory::{
    InMemoryEventLedger, InMemoryOrderStore, InMemoryPaymentIntentStore, InMemoryPaymentStore,
    InMemoryProviderConfigStore,
};
use storefront_payments::store::provider_configs::ProviderConfig;

const PAYSTACK_SECRET: &str = "whsec_paystack_test";
const MOMO_SECRET: &str = "momo_webhook_test";

struct Harness {
    service: Arc<ReconciliationService>,
    ledger: Arc<InMemoryEventLedger>,
    intents: Arc<InMemoryPaymentIntentStore>,
    orders: Arc<InMemoryOrderStore>,
    payments: Arc<InMemoryPaymentStore>,
}

fn harness() -> Harness {
    let configs = Arc::new(InMemoryProviderConfigStore::new());
    configs.insert(provider_config(
        "paystack",
        json!({"secret_key": "sk_test", "webhook_secret": PAYSTACK_SECRET}),
    ));
    configs.insert(provider_config(
        "momo",
        json!({"webhook_secret": MOMO_SECRET, "api_key": "sub_key"}),
    ));

    let registry = Arc::new(ProviderRegistry::new(configs, ProviderSecrets::default()));
    let ledger = Arc::new(InMemoryEventLedger::new());
    let intents = Arc::new(InMemoryPaymentIntentStore::new());
    let orders = Arc::new(InMemoryOrderStore::new());
    let payments = Arc::new(InMemoryPaymentStore::new());

    let service = Arc::new(ReconciliationService::new(
        registry,
        ledger.clone(),
        intents.clone(),
        orders.clone(),
        payments.clone(),
    ));

    Harness {
        service,
        ledger,
        intents,
        orders,
        payments,
    }
}

fn provider_config(provider: &str, settings: serde_json::Value) -> ProviderConfig {
    ProviderConfig {
        provider: provider.to_string(),
        display_name: provider.to_string(),
        is_enabled: true,
        is_primary: provider == "paystack",
        test_mode: true,
        settings,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn create_intent(
    harness: &Harness,
    provider: ProviderName,
    reference: &str,
    amount_minor: i64,
    order_id: Option<Uuid>,
) -> Uuid {
    harness
        .intents
        .create(NewPaymentIntent {
            provider,
            provider_reference: reference.to_string(),
            amount_minor,
            currency: "GHS".to_string(),
            order_id,
            customer_id: None,
        })
        .await
        .expect("intent creation should succeed")
        .id
}

fn sign_sha512(payload: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn sign_sha256(payload: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn paystack_success(reference: &str, event_id: i64, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "charge.success",
        "id": event_id,
        "data": {
            "id": event_id * 10,
            "reference": reference,
            "status": "success",
            "amount": amount,
            "currency": "GHS"
        }
    }))
    .unwrap()
}

async fn intent_status(harness: &Harness, intent_id: Uuid) -> IntentStatus {
    harness
        .intents
        .find_by_id(intent_id)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn successful_webhook_settles_intent_order_and_payment() {
    let harness = harness();
    let order_id = Uuid::new_v4();
    let intent_id = create_intent(
        &harness,
        ProviderName::Paystack,
        "ord_success",
        5000,
        Some(order_id),
    )
    .await;

    let body = paystack_success("ord_success", 101, 5000);
    let signature = sign_sha512(&body, PAYSTACK_SECRET);
    let ack = harness
        .service
        .handle_webhook(ProviderName::Paystack, &body, &signature)
        .await
        .expect("webhook should be acknowledged");

    assert_eq!(ack, WebhookAck::Processed);
    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Succeeded);
    assert!(harness.orders.is_paid(order_id));
    assert_eq!(harness.payments.count(), 1);

    let rows = harness.ledger.entries();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].processed);
    assert!(rows[0].error_message.is_none());
    assert_eq!(rows[0].payment_intent_id, Some(intent_id));
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_settle_exactly_once() {
    let harness = harness();
    let order_id = Uuid::new_v4();
    let intent_id = create_intent(
        &harness,
        ProviderName::Paystack,
        "ord_dup",
        5000,
        Some(order_id),
    )
    .await;

    let body = paystack_success("ord_dup", 202, 5000);
    let signature = sign_sha512(&body, PAYSTACK_SECRET);

    let (first, second) = tokio::join!(
        harness
            .service
            .handle_webhook(ProviderName::Paystack, &body, &signature),
        harness
            .service
            .handle_webhook(ProviderName::Paystack, &body, &signature),
    );
    // Both deliveries are acknowledged regardless of which won.
    first.expect("first delivery acknowledged");
    second.expect("second delivery acknowledged");

    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Succeeded);
    assert_eq!(harness.payments.count(), 1, "exactly one payment row");
    assert_eq!(harness.orders.mark_calls(), 1, "order-paid side effect ran once");

    // Both deliveries were recorded and finalized; exactly one claimed the
    // event key as a clean success.
    let rows = harness.ledger.entries();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.processed));
    assert_eq!(
        rows.iter().filter(|row| row.error_message.is_none()).count(),
        1
    );
}

#[tokio::test]
async fn sequential_redelivery_is_skipped_as_duplicate() {
    let harness = harness();
    let intent_id = create_intent(&harness, ProviderName::Paystack, "ord_redeliver", 5000, None)
        .await;

    let body = paystack_success("ord_redeliver", 303, 5000);
    let signature = sign_sha512(&body, PAYSTACK_SECRET);

    let ack = harness
        .service
        .handle_webhook(ProviderName::Paystack, &body, &signature)
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Processed);

    let ack = harness
        .service
        .handle_webhook(ProviderName::Paystack, &body, &signature)
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Duplicate);

    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Succeeded);
    assert_eq!(harness.payments.count(), 1);
}

#[tokio::test]
async fn failed_webhook_leaves_order_untouched_for_retry() {
    let harness = harness();
    let order_id = Uuid::new_v4();
    let intent_id = create_intent(
        &harness,
        ProviderName::Paystack,
        "ord_failed",
        5000,
        Some(order_id),
    )
    .await;

    let body = serde_json::to_vec(&json!({
        "event": "charge.failed",
        "id": 404,
        "data": {"reference": "ord_failed", "status": "failed"}
    }))
    .unwrap();
    let signature = sign_sha512(&body, PAYSTACK_SECRET);
    let ack = harness
        .service
        .handle_webhook(ProviderName::Paystack, &body, &signature)
        .await
        .unwrap();

    assert_eq!(ack, WebhookAck::Processed);
    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Failed);
    assert!(!harness.orders.is_paid(order_id), "order stays pending");
    assert_eq!(harness.payments.count(), 0);
}

#[tokio::test]
async fn late_failure_cannot_downgrade_a_succeeded_intent() {
    let harness = harness();
    let order_id = Uuid::new_v4();
    let intent_id = create_intent(
        &harness,
        ProviderName::Paystack,
        "ord_late",
        5000,
        Some(order_id),
    )
    .await;

    let success = paystack_success("ord_late", 505, 5000);
    harness
        .service
        .handle_webhook(
            ProviderName::Paystack,
            &success,
            &sign_sha512(&success, PAYSTACK_SECRET),
        )
        .await
        .unwrap();

    let failure = serde_json::to_vec(&json!({
        "event": "charge.failed",
        "id": 506,
        "data": {"reference": "ord_late", "status": "failed"}
    }))
    .unwrap();
    let ack = harness
        .service
        .handle_webhook(
            ProviderName::Paystack,
            &failure,
            &sign_sha512(&failure, PAYSTACK_SECRET),
        )
        .await
        .unwrap();

    assert_eq!(ack, WebhookAck::Processed);
    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Succeeded);
    assert!(harness.orders.is_paid(order_id));
    assert_eq!(harness.orders.mark_calls(), 1);
}

#[tokio::test]
async fn invalid_signature_rejects_without_recording_anything() {
    let harness = harness();
    let intent_id = create_intent(&harness, ProviderName::Paystack, "ord_forged", 5000, None)
        .await;

    let body = paystack_success("ord_forged", 606, 5000);
    let result = harness
        .service
        .handle_webhook(ProviderName::Paystack, &body, "forged-signature")
        .await;

    assert!(matches!(result, Err(ReconcileError::InvalidSignature)));
    assert!(harness.ledger.entries().is_empty(), "no ledger row");
    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Pending);
}

#[tokio::test]
async fn amount_mismatch_is_logged_but_does_not_block_settlement() {
    let harness = harness();
    let order_id = Uuid::new_v4();
    let intent_id = create_intent(
        &harness,
        ProviderName::Paystack,
        "ord_mismatch",
        5000,
        Some(order_id),
    )
    .await;

    // Provider reports 4999 against an intent of 5000.
    let body = paystack_success("ord_mismatch", 707, 4999);
    let signature = sign_sha512(&body, PAYSTACK_SECRET);
    let ack = harness
        .service
        .handle_webhook(ProviderName::Paystack, &body, &signature)
        .await
        .unwrap();

    assert_eq!(ack, WebhookAck::Processed);
    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Succeeded);
    assert!(harness.orders.is_paid(order_id));
}

#[tokio::test]
async fn unmatched_reference_is_acknowledged_and_recorded_with_error() {
    let harness = harness();

    let body = paystack_success("ord_ghost", 808, 5000);
    let signature = sign_sha512(&body, PAYSTACK_SECRET);
    let ack = harness
        .service
        .handle_webhook(ProviderName::Paystack, &body, &signature)
        .await
        .unwrap();

    assert_eq!(ack, WebhookAck::Unmatched);
    let rows = harness.ledger.entries();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].processed);
    assert_eq!(rows[0].error_message.as_deref(), Some("intent not found"));
}

#[tokio::test]
async fn malformed_payload_is_recorded_and_acknowledged() {
    let harness = harness();

    let body = b"definitely not json";
    let signature = sign_sha512(body, PAYSTACK_SECRET);
    let ack = harness
        .service
        .handle_webhook(ProviderName::Paystack, body, &signature)
        .await
        .unwrap();

    assert_eq!(ack, WebhookAck::Malformed);
    let rows = harness.ledger.entries();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].processed);
    assert!(rows[0]
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("malformed payload"));
}

#[tokio::test]
async fn momo_events_without_ids_still_settle_exactly_once() {
    let harness = harness();
    let order_id = Uuid::new_v4();
    let intent_id = create_intent(
        &harness,
        ProviderName::Momo,
        "ord_momo",
        5000,
        Some(order_id),
    )
    .await;

    let body = serde_json::to_vec(&json!({
        "externalId": "ord_momo",
        "financialTransactionId": "363440463",
        "status": "SUCCESSFUL",
        "amount": "50.00",
        "currency": "GHS"
    }))
    .unwrap();
    let signature = sign_sha256(&body, MOMO_SECRET);

    // The gateway redelivers the same callback; with no event id the ledger
    // cannot deduplicate, so the terminal-intent no-op has to carry it.
    for _ in 0..3 {
        let ack = harness
            .service
            .handle_webhook(ProviderName::Momo, &body, &signature)
            .await
            .unwrap();
        assert_eq!(ack, WebhookAck::Processed);
    }

    assert_eq!(intent_status(&harness, intent_id).await, IntentStatus::Succeeded);
    assert_eq!(harness.payments.count(), 1);
    assert_eq!(harness.orders.mark_calls(), 1);

    let rows = harness.ledger.entries();
    assert_eq!(rows.len(), 3, "every delivery is audit-recorded");
    assert!(rows.iter().all(|row| row.processed));
}

#[tokio::test]
async fn polling_path_settles_on_the_first_successful_result() {
    let harness = harness();
    let order_id = Uuid::new_v4();
    let intent_id = create_intent(
        &harness,
        ProviderName::Momo,
        "ord_poll",
        5000,
        Some(order_id),
    )
    .await;

    let pending_event = |outcome| NormalizedEvent {
        provider: ProviderName::Momo,
        provider_event_id: None,
        provider_reference: "ord_poll".to_string(),
        provider_transaction_id: Some("363440464".to_string()),
        outcome,
        amount_minor: Some(5000),
        currency: Some("GHS".to_string()),
        occurred_at: Utc::now(),
    };

    // Three pending polls, then success — the waiting page's typical life.
    for _ in 0..3 {
        let intent = harness
            .service
            .ingest_polled(&pending_event(EventOutcome::Pending))
            .await
            .unwrap();
        assert!(!intent.status.is_terminal());
        assert!(!harness.orders.is_paid(order_id));
    }

    let intent = harness
        .service
        .ingest_polled(&pending_event(EventOutcome::Succeeded))
        .await
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Succeeded);
    assert_eq!(intent.id, intent_id);
    assert!(harness.orders.is_paid(order_id));
    assert_eq!(harness.orders.mark_calls(), 1, "paid exactly once, on the 4th poll");
    assert_eq!(harness.payments.count(), 1);

    // Poll results are audit-recorded like webhook events.
    assert_eq!(harness.ledger.entries().len(), 4);
}

#[tokio::test]
async fn polling_an_unknown_reference_reports_it_distinctly() {
    let harness = harness();
    let event = NormalizedEvent {
        provider: ProviderName::Momo,
        provider_event_id: None,
        provider_reference: "ord_missing".to_string(),
        provider_transaction_id: None,
        outcome: EventOutcome::Succeeded,
        amount_minor: None,
        currency: None,
        occurred_at: Utc::now(),
    };
    let result = harness.service.ingest_polled(&event).await;
    assert!(matches!(result, Err(ReconcileError::UnknownReference(_))));

    let rows = harness.ledger.entries();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].processed);
    assert_eq!(rows[0].error_message.as_deref(), Some("intent not found"));
}
