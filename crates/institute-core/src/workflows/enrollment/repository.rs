use async_trait::async_trait;

use super::domain::{
    BatchAssignment, BatchId, BatchKey, BatchRecord, BatchUpdate, BatchUpdateError, NewBatch,
    RegistrationId, RegistrationRecord, SeatClaim,
};

/// Batch storage. Implementations enforce the constraints below themselves; the allocator
/// never holds a lock across calls.
///
/// - `create_batch` fails with `Conflict` unless `number` is exactly one past the highest
///   existing number for the key.
/// - `claim_seat` is all-or-nothing: it fails with `AlreadyAllocated` when the registration
///   already has a link, `CapacityExceeded` when the batch is at capacity, and `Conflict`
///   when the batch is no longer open or its count moved away from `expected_count`.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Every batch for the key, ordered by batch number.
    async fn batches(&self, key: &BatchKey) -> Result<Vec<BatchRecord>, RepositoryError>;
    async fn batch(&self, id: BatchId) -> Result<Option<BatchRecord>, RepositoryError>;
    async fn create_batch(&self, batch: NewBatch) -> Result<BatchRecord, RepositoryError>;
    async fn claim_seat(&self, claim: SeatClaim) -> Result<BatchAssignment, RepositoryError>;
    async fn assignment(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<BatchAssignment>, RepositoryError>;
    async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<BatchRecord, RepositoryError>;
}

/// The registration collaborator's payment records.
///
/// `record` must leave a paid registration untouched when asked to move it to another
/// (program, location) or back to an unpaid status, and fail with `AlreadyPaid`.
#[async_trait]
pub trait RegistrationLedger: Send + Sync {
    async fn registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<RegistrationRecord>, RepositoryError>;
    async fn paid_count(&self, key: &BatchKey) -> Result<u32, RepositoryError>;
    async fn record(&self, registration: RegistrationRecord) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("concurrent write conflict")]
    Conflict,
    #[error("batch is at capacity")]
    CapacityExceeded,
    #[error("registration {} already holds a seat", .0.registration_id)]
    AlreadyAllocated(Box<BatchAssignment>),
    #[error("registration is already paid for {key}")]
    AlreadyPaid { key: BatchKey },
    #[error(transparent)]
    InvalidUpdate(#[from] BatchUpdateError),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
