use crate::api::AppState;
use crate::providers::types::ProviderName;
use crate::reconcile::orchestrator::ReconcileError;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, warn};

/// POST /webhooks/{provider}
///
/// Consumes the raw body — signature verification runs over the exact bytes
/// the provider sent, so the payload must not be parsed or re-serialized
/// first. Responds 200 with a JSON ack for every delivery that passes
/// verification, including duplicates, unmatched references and internal
/// failures: providers treat non-2xx as "retry", and none of those conditions
/// are fixed by a retry. Only a missing header (400) and a failed signature
/// check (401) reject.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    info!(provider = %provider, "received webhook");

    let provider = match ProviderName::from_str(&provider) {
        Ok(provider) => provider,
        Err(_) => {
            warn!(provider = %provider, "webhook for unknown provider");
            return error_response(StatusCode::BAD_REQUEST, "unknown provider");
        }
    };

    let signature = headers
        .get(provider.signature_header())
        .and_then(|v| v.to_str().ok());
    let Some(signature) = signature else {
        warn!(provider = %provider, header = provider.signature_header(), "missing webhook signature header");
        return error_response(StatusCode::BAD_REQUEST, "missing signature header");
    };

    match state
        .reconciler
        .handle_webhook(provider, &body, signature)
        .await
    {
        Ok(ack) => {
            info!(provider = %provider, ack = ?ack, "webhook acknowledged");
            (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
        }
        Err(ReconcileError::InvalidSignature) => {
            error_response(StatusCode::UNAUTHORIZED, "invalid signature")
        }
        Err(ReconcileError::Provider(e)) => {
            warn!(provider = %provider, error = %e, "webhook rejected before verification");
            let status = StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, "provider not available")
        }
        Err(e) => {
            // Only reachable when the initial ledger insert fails: nothing was
            // persisted, so letting the provider retry is the right call.
            warn!(provider = %provider, error = %e, "webhook could not be recorded");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "temporary failure")
        }
    }
}

/// GET /webhooks/{provider}
///
/// Challenge/verification handshake: the mobile-money gateway probes the
/// webhook URL with a `challenge` query parameter and expects it echoed back
/// verbatim before it enables deliveries.
pub async fn handle_challenge(
    Path(provider): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Ok(provider) = ProviderName::from_str(&provider) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !provider.supports_challenge() {
        return StatusCode::NOT_FOUND.into_response();
    }

    match params.get("challenge") {
        Some(challenge) => {
            info!(provider = %provider, "answered webhook challenge handshake");
            (StatusCode::OK, challenge.clone()).into_response()
        }
        None => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response(),
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({"status": "error", "message": message})),
    )
        .into_response()
}
