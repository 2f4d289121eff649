use crate::infra::{AppState, Services};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use institute_core::workflows::checkin::{checkin_router, CheckInRepository, SessionDirectory};
use institute_core::workflows::enrollment::{enrollment_router, BatchRepository, RegistrationLedger};
use serde_json::json;

pub(crate) fn with_service_routes<B, L, S, C>(services: &Services<B, L, S, C>) -> Router
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
    S: SessionDirectory + 'static,
    C: CheckInRepository + 'static,
{
    enrollment_router(services.allocator.clone())
        .merge(checkin_router(services.verifier.clone()))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
