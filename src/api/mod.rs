pub mod health;
pub mod payments;
pub mod webhooks;

use crate::reconcile::orchestrator::ReconciliationService;
use crate::reconcile::verifier::PollingVerifier;
use crate::store::intents::PaymentIntentStore;
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<ReconciliationService>,
    pub verifier: Arc<PollingVerifier>,
    pub intents: Arc<dyn PaymentIntentStore>,
    pub db_pool: PgPool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/webhooks/{provider}",
            post(webhooks::handle_webhook).get(webhooks::handle_challenge),
        )
        .route("/api/payments/verify", post(payments::verify_payment))
        .route("/api/payments/intents", post(payments::create_intent))
        .route("/api/payments/intents/{id}", get(payments::get_intent))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state)
}
