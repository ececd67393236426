use crate::api::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::error;

/// GET /health — readiness: the service is healthy when its database answers.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match crate::store::health_check(&state.db_pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "database": "up"})),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "unhealthy", "database": "down"})),
            )
                .into_response()
        }
    }
}

/// GET /health/live — liveness: the process is up.
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
