use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{CheckInId, CheckInSubmission, CheckInView, ReviewRequest, ReviewerId};
use super::repository::{CheckInRepository, RepositoryError, SessionDirectory};
use super::service::{CheckInError, CheckInVerifier};
use crate::identity::Caller;

/// Router builder exposing check-in submission, lookup, and review endpoints.
pub fn checkin_router<S, R>(verifier: Arc<CheckInVerifier<S, R>>) -> Router
where
    S: SessionDirectory + 'static,
    R: CheckInRepository + 'static,
{
    Router::new()
        .route("/api/v1/check-ins", post(submit_handler::<S, R>))
        .route("/api/v1/check-ins/:check_in_id", get(status_handler::<S, R>))
        .route(
            "/api/v1/check-ins/:check_in_id/review",
            post(review_handler::<S, R>),
        )
        .route("/api/v1/review-queue", get(queue_handler::<S, R>))
        .with_state(verifier)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueueQuery {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

pub(crate) async fn submit_handler<S, R>(
    State(verifier): State<Arc<CheckInVerifier<S, R>>>,
    Json(submission): Json<CheckInSubmission>,
) -> Response
where
    S: SessionDirectory + 'static,
    R: CheckInRepository + 'static,
{
    match verifier.submit(submission).await {
        Ok(record) => (StatusCode::CREATED, Json(record.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, R>(
    State(verifier): State<Arc<CheckInVerifier<S, R>>>,
    Path(check_in_id): Path<u64>,
) -> Response
where
    S: SessionDirectory + 'static,
    R: CheckInRepository + 'static,
{
    match verifier.get(CheckInId(check_in_id)).await {
        Ok(record) => (StatusCode::OK, Json(record.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn review_handler<S, R>(
    State(verifier): State<Arc<CheckInVerifier<S, R>>>,
    caller: Caller,
    Path(check_in_id): Path<u64>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    S: SessionDirectory + 'static,
    R: CheckInRepository + 'static,
{
    if !caller.is_admin() {
        return caller.forbidden();
    }

    match verifier
        .review(CheckInId(check_in_id), ReviewerId(caller.id), request)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn queue_handler<S, R>(
    State(verifier): State<Arc<CheckInVerifier<S, R>>>,
    caller: Caller,
    Query(query): Query<QueueQuery>,
) -> Response
where
    S: SessionDirectory + 'static,
    R: CheckInRepository + 'static,
{
    if !caller.is_admin() {
        return caller.forbidden();
    }

    match verifier.pending(query.limit).await {
        Ok(records) => {
            let views: Vec<CheckInView> = records.iter().map(|record| record.view()).collect();
            let payload = json!({
                "pending": views.len(),
                "check_ins": views,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

/// Map verifier failures onto HTTP statuses with a JSON error body.
pub fn error_response(error: CheckInError) -> Response {
    let status = match &error {
        CheckInError::InvalidCoordinates(_) | CheckInError::InvalidSession { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckInError::DuplicateCheckIn { .. } | CheckInError::AlreadyResolved { .. } => {
            StatusCode::CONFLICT
        }
        CheckInError::NotFound(_) | CheckInError::Repository(RepositoryError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        CheckInError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, Json(payload)).into_response()
}
