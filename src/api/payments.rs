use crate::api::AppState;
use crate::providers::types::ProviderName;
use crate::reconcile::orchestrator::ReconcileError;
use crate::store::intents::NewPaymentIntent;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub reference: String,
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/payments/verify
///
/// Backs the customer-facing waiting page. Each call performs one provider
/// status query; the page drives the polling interval and gives up after a
/// bounded number of attempts. Transient provider failures come back as a
/// still-pending response so the page's retry loop absorbs them silently.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> impl IntoResponse {
    let provider = match ProviderName::from_str(&payload.provider) {
        Ok(provider) => provider,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(VerifyResponse {
                    success: false,
                    status: "pending",
                    order_id: None,
                    error: Some("unknown provider".to_string()),
                }),
            )
        }
    };
    if payload.reference.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(VerifyResponse {
                success: false,
                status: "pending",
                order_id: None,
                error: Some("reference is required".to_string()),
            }),
        );
    }

    match state.verifier.verify(provider, &payload.reference).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(VerifyResponse {
                success: outcome.status == crate::reconcile::verifier::VerifyStatus::Succeeded,
                status: outcome.status.as_str(),
                order_id: outcome.order_id,
                error: None,
            }),
        ),
        Err(ReconcileError::UnknownReference(reference)) => {
            warn!(reference = %reference, "verification requested for unknown reference");
            (
                StatusCode::OK,
                Json(VerifyResponse {
                    success: false,
                    status: "pending",
                    order_id: None,
                    error: Some("unknown payment reference".to_string()),
                }),
            )
        }
        Err(ReconcileError::Provider(e)) => {
            warn!(provider = %provider, error = %e, "status query failed");
            (
                StatusCode::OK,
                Json(VerifyResponse {
                    success: false,
                    status: "pending",
                    order_id: None,
                    error: Some("provider temporarily unavailable".to_string()),
                }),
            )
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "verification failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(VerifyResponse {
                    success: false,
                    status: "pending",
                    order_id: None,
                    error: Some("verification temporarily unavailable".to_string()),
                }),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub provider: String,
    pub provider_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

/// POST /api/payments/intents
///
/// Checkout's entry point into the engine: creates the pending intent a
/// provider flow will later settle via webhook or poll.
pub async fn create_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> impl IntoResponse {
    let provider = match ProviderName::from_str(&payload.provider) {
        Ok(provider) => provider,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    if payload.amount_minor <= 0 {
        return error_response(StatusCode::BAD_REQUEST, "amount_minor must be positive");
    }
    let currency = payload.currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return error_response(StatusCode::BAD_REQUEST, "currency must be a 3-letter code");
    }
    if payload.provider_reference.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "provider_reference is required");
    }

    match state
        .intents
        .create(NewPaymentIntent {
            provider,
            provider_reference: payload.provider_reference,
            amount_minor: payload.amount_minor,
            currency,
            order_id: payload.order_id,
            customer_id: payload.customer_id,
        })
        .await
    {
        Ok(intent) => {
            info!(intent_id = %intent.id, provider = %provider, "payment intent created");
            (StatusCode::CREATED, Json(intent)).into_response()
        }
        Err(e) if e.is_unique_violation() => {
            error_response(StatusCode::CONFLICT, "reference already has an intent")
        }
        Err(e) => {
            warn!(error = %e, "failed to create payment intent");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to create payment intent",
            )
        }
    }
}

/// GET /api/payments/intents/{id}
pub async fn get_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.intents.find_by_id(id).await {
        Ok(Some(intent)) => (StatusCode::OK, Json(intent)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "payment intent not found"),
        Err(e) => {
            warn!(error = %e, intent_id = %id, "failed to load payment intent");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to load payment intent",
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({"status": "error", "message": message})),
    )
        .into_response()
}
