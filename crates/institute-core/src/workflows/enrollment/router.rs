use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::domain::{BatchId, BatchRecord, BatchUpdate, LocationId, ProgramId, RegistrationId};
use super::repository::{BatchRepository, RegistrationLedger, RepositoryError};
use super::service::{AllocationError, BatchAllocator};
use crate::identity::Caller;

/// Router builder exposing batch previews, listings, administrator edits, and the payment
/// collaborator's callback.
pub fn enrollment_router<B, L>(allocator: Arc<BatchAllocator<B, L>>) -> Router
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
{
    Router::new()
        .route("/api/v1/batch-preview", get(preview_handler::<B, L>))
        .route("/api/v1/batches", get(list_handler::<B, L>))
        .route("/api/v1/batches/:batch_id", patch(update_handler::<B, L>))
        .route(
            "/api/v1/registrations/:registration_id/batch",
            get(assignment_handler::<B, L>),
        )
        .route(
            "/internal/payments/:registration_id/paid",
            post(payment_handler::<B, L>),
        )
        .with_state(allocator)
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchQuery {
    pub(crate) program_id: String,
    pub(crate) location_id: String,
}

/// Payment collaborator callback body.
#[derive(Debug, Deserialize)]
pub(crate) struct PaymentConfirmation {
    pub(crate) program_id: ProgramId,
    pub(crate) location_id: LocationId,
}

impl BatchQuery {
    fn ids(self) -> (ProgramId, LocationId) {
        (ProgramId(self.program_id), LocationId(self.location_id))
    }
}

/// Dashboard row rendered as "Batch N of M".
#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    pub batch_id: BatchId,
    pub batch_number: u32,
    pub of_total: u32,
    pub label: String,
    pub current_count: u32,
    pub capacity: u32,
    pub seats_remaining: u32,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<chrono::NaiveDate>,
}

impl BatchView {
    fn from_record(record: &BatchRecord, of_total: u32) -> Self {
        Self {
            batch_id: record.id,
            batch_number: record.number,
            of_total,
            label: format!("Batch {} of {}", record.number, of_total),
            current_count: record.current_count,
            capacity: record.capacity,
            seats_remaining: record.seats_remaining(),
            status: record.status.label(),
            start_date: record.start_date,
        }
    }
}

pub(crate) async fn preview_handler<B, L>(
    State(allocator): State<Arc<BatchAllocator<B, L>>>,
    Query(query): Query<BatchQuery>,
) -> Response
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
{
    let (program_id, location_id) = query.ids();
    match allocator.preview(&program_id, &location_id).await {
        Ok(preview) => (StatusCode::OK, Json(preview)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<B, L>(
    State(allocator): State<Arc<BatchAllocator<B, L>>>,
    Query(query): Query<BatchQuery>,
) -> Response
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
{
    let (program_id, location_id) = query.ids();
    match allocator.batches(&program_id, &location_id).await {
        Ok(batches) => {
            let total = u32::try_from(batches.len()).unwrap_or(u32::MAX);
            let views: Vec<BatchView> = batches
                .iter()
                .map(|record| BatchView::from_record(record, total))
                .collect();
            let payload = json!({
                "program_id": program_id,
                "location_id": location_id,
                "total_batches": total,
                "batches": views,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler<B, L>(
    State(allocator): State<Arc<BatchAllocator<B, L>>>,
    caller: Caller,
    Path(batch_id): Path<u64>,
    Json(update): Json<BatchUpdate>,
) -> Response
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
{
    if !caller.is_admin() {
        return caller.forbidden();
    }

    match allocator.update_batch(BatchId(batch_id), update).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn assignment_handler<B, L>(
    State(allocator): State<Arc<BatchAllocator<B, L>>>,
    Path(registration_id): Path<String>,
) -> Response
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
{
    let registration_id = RegistrationId(registration_id);
    match allocator.assignment(&registration_id).await {
        Ok(Some(assignment)) => (StatusCode::OK, Json(assignment)).into_response(),
        Ok(None) => {
            let payload = json!({
                "error": format!("registration {registration_id} has no batch yet"),
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

/// Marks the registration paid and seats it. Repeating the same payment returns the seat it
/// already holds.
pub(crate) async fn payment_handler<B, L>(
    State(allocator): State<Arc<BatchAllocator<B, L>>>,
    Path(registration_id): Path<String>,
    Json(payment): Json<PaymentConfirmation>,
) -> Response
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
{
    let registration_id = RegistrationId(registration_id);
    match allocator
        .confirm_payment(&payment.program_id, &payment.location_id, &registration_id)
        .await
    {
        Ok(assignment) => {
            info!(
                registration = %registration_id,
                batch = assignment.batch_number,
                "payment confirmed"
            );
            (StatusCode::OK, Json(assignment)).into_response()
        }
        Err(error) => error_response(error),
    }
}

/// Map allocator failures onto HTTP statuses with a JSON error body.
pub fn error_response(error: AllocationError) -> Response {
    let status = match &error {
        AllocationError::NotPaid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AllocationError::UnknownRegistration(_)
        | AllocationError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        AllocationError::KeyMismatch { .. }
        | AllocationError::Repository(RepositoryError::InvalidUpdate(_)) => StatusCode::CONFLICT,
        AllocationError::RetriesExhausted { .. }
        | AllocationError::Repository(
            RepositoryError::Conflict | RepositoryError::CapacityExceeded,
        ) => StatusCode::SERVICE_UNAVAILABLE,
        AllocationError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, Json(payload)).into_response()
}
