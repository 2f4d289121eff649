use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::clock::FixedClock;
use crate::storage::{InMemoryBatchStore, InMemoryRegistrationLedger};
use crate::workflows::enrollment::domain::{
    BatchAssignment, BatchId, BatchKey, BatchRecord, BatchUpdate, LocationId, NewBatch,
    PaymentStatus, ProgramId, RegistrationId, RegistrationRecord, SeatClaim,
};
use crate::workflows::enrollment::repository::{
    BatchRepository, RegistrationLedger, RepositoryError,
};
use crate::workflows::enrollment::{AllocatorConfig, BatchAllocator};

pub(super) type MemoryAllocator = BatchAllocator<InMemoryBatchStore, InMemoryRegistrationLedger>;

pub(super) fn program() -> ProgramId {
    ProgramId("fullstack-web".to_string())
}

pub(super) fn location() -> LocationId {
    LocationId("blr-koramangala".to_string())
}

pub(super) fn key() -> BatchKey {
    BatchKey::new(program(), location())
}

pub(super) fn registration(n: u32) -> RegistrationId {
    RegistrationId(format!("reg-{n:03}"))
}

pub(super) fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap(),
    ))
}

pub(super) fn config(batch_capacity: u32) -> AllocatorConfig {
    AllocatorConfig {
        batch_capacity,
        max_attempts: 8,
    }
}

pub(super) async fn record(
    ledger: &InMemoryRegistrationLedger,
    n: u32,
    key: BatchKey,
    payment_status: PaymentStatus,
) {
    ledger
        .record(RegistrationRecord {
            registration_id: registration(n),
            key,
            payment_status,
        })
        .await
        .expect("ledger write");
}

pub(super) async fn paid_ledger(count: u32) -> Arc<InMemoryRegistrationLedger> {
    let ledger = Arc::new(InMemoryRegistrationLedger::default());
    for n in 1..=count {
        record(&ledger, n, key(), PaymentStatus::Paid).await;
    }
    ledger
}

pub(super) async fn build_allocator(
    batch_capacity: u32,
    paid: u32,
) -> (
    MemoryAllocator,
    Arc<InMemoryBatchStore>,
    Arc<InMemoryRegistrationLedger>,
) {
    let store = Arc::new(InMemoryBatchStore::default());
    let ledger = paid_ledger(paid).await;
    let allocator = BatchAllocator::new(
        store.clone(),
        ledger.clone(),
        clock(),
        config(batch_capacity),
    );
    (allocator, store, ledger)
}

pub(super) async fn allocate<B>(
    allocator: &BatchAllocator<B, InMemoryRegistrationLedger>,
    n: u32,
) -> BatchAssignment
where
    B: BatchRepository + 'static,
{
    allocator
        .allocate(&program(), &location(), &registration(n))
        .await
        .expect("allocation succeeds")
}

/// Store whose seat claims lose a race a fixed number of times before going through.
pub(super) struct ContendedBatchStore {
    pub(super) inner: InMemoryBatchStore,
    conflicts_left: AtomicU32,
    pub(super) claims: AtomicU32,
}

impl ContendedBatchStore {
    pub(super) fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemoryBatchStore::default(),
            conflicts_left: AtomicU32::new(conflicts),
            claims: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl BatchRepository for ContendedBatchStore {
    async fn batches(&self, key: &BatchKey) -> Result<Vec<BatchRecord>, RepositoryError> {
        self.inner.batches(key).await
    }

    async fn batch(&self, id: BatchId) -> Result<Option<BatchRecord>, RepositoryError> {
        self.inner.batch(id).await
    }

    async fn create_batch(&self, batch: NewBatch) -> Result<BatchRecord, RepositoryError> {
        self.inner.create_batch(batch).await
    }

    async fn claim_seat(&self, claim: SeatClaim) -> Result<BatchAssignment, RepositoryError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        let lost_race = self
            .conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if lost_race {
            return Err(RepositoryError::Conflict);
        }
        self.inner.claim_seat(claim).await
    }

    async fn assignment(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<BatchAssignment>, RepositoryError> {
        self.inner.assignment(registration_id).await
    }

    async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<BatchRecord, RepositoryError> {
        self.inner.update_batch(id, update).await
    }
}

pub(super) struct UnavailableBatchStore;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

#[async_trait]
impl BatchRepository for UnavailableBatchStore {
    async fn batches(&self, _key: &BatchKey) -> Result<Vec<BatchRecord>, RepositoryError> {
        Err(offline())
    }

    async fn batch(&self, _id: BatchId) -> Result<Option<BatchRecord>, RepositoryError> {
        Err(offline())
    }

    async fn create_batch(&self, _batch: NewBatch) -> Result<BatchRecord, RepositoryError> {
        Err(offline())
    }

    async fn claim_seat(&self, _claim: SeatClaim) -> Result<BatchAssignment, RepositoryError> {
        Err(offline())
    }

    async fn assignment(
        &self,
        _registration_id: &RegistrationId,
    ) -> Result<Option<BatchAssignment>, RepositoryError> {
        Err(offline())
    }

    async fn update_batch(
        &self,
        _id: BatchId,
        _update: &BatchUpdate,
    ) -> Result<BatchRecord, RepositoryError> {
        Err(offline())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
