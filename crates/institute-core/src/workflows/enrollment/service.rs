use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::AllocatorConfig;
use super::domain::{
    BatchAssignment, BatchId, BatchKey, BatchPreview, BatchRecord, BatchStatus, BatchUpdate,
    LocationId, NewBatch, PaymentStatus, ProgramId, RegistrationId, RegistrationRecord, SeatClaim,
};
use super::repository::{BatchRepository, RegistrationLedger, RepositoryError};
use crate::clock::Clock;

/// Service assigning paid registrations to batches and answering batch queries.
pub struct BatchAllocator<B, L> {
    batches: Arc<B>,
    registrations: Arc<L>,
    clock: Arc<dyn Clock>,
    config: AllocatorConfig,
}

impl<B, L> BatchAllocator<B, L>
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
{
    pub fn new(
        batches: Arc<B>,
        registrations: Arc<L>,
        clock: Arc<dyn Clock>,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            batches,
            registrations,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Record a confirmed payment for the registration and allocate it. A registration
    /// already paid for another (program, location) is left where it is.
    pub async fn confirm_payment(
        &self,
        program_id: &ProgramId,
        location_id: &LocationId,
        registration_id: &RegistrationId,
    ) -> Result<BatchAssignment, AllocationError> {
        let requested = BatchKey::new(program_id.clone(), location_id.clone());
        let record = RegistrationRecord {
            registration_id: registration_id.clone(),
            key: requested.clone(),
            payment_status: PaymentStatus::Paid,
        };
        match self.registrations.record(record).await {
            Ok(()) => {}
            Err(RepositoryError::AlreadyPaid { key }) => {
                return Err(AllocationError::KeyMismatch {
                    registration_id: registration_id.clone(),
                    registered: key,
                    requested,
                })
            }
            Err(other) => return Err(other.into()),
        }
        self.allocate(program_id, location_id, registration_id).await
    }

    /// Place a paid registration into the current open batch, opening the next batch when
    /// the current one is full. Calling it again for the same registration returns the
    /// original assignment.
    pub async fn allocate(
        &self,
        program_id: &ProgramId,
        location_id: &LocationId,
        registration_id: &RegistrationId,
    ) -> Result<BatchAssignment, AllocationError> {
        let key = BatchKey::new(program_id.clone(), location_id.clone());
        let registration = self
            .registrations
            .registration(registration_id)
            .await?
            .ok_or_else(|| AllocationError::UnknownRegistration(registration_id.clone()))?;
        if registration.payment_status != PaymentStatus::Paid {
            return Err(AllocationError::NotPaid {
                registration_id: registration_id.clone(),
                status: registration.payment_status,
            });
        }
        if registration.key != key {
            return Err(AllocationError::KeyMismatch {
                registration_id: registration_id.clone(),
                registered: registration.key,
                requested: key,
            });
        }

        if let Some(existing) = self.batches.assignment(registration_id).await? {
            return self.existing_assignment(existing, key);
        }

        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            match self.try_allocate(&key, registration_id).await {
                Ok(assignment) => {
                    info!(
                        registration = %registration_id,
                        program = %key.program_id,
                        location = %key.location_id,
                        batch = assignment.batch_number,
                        seat = assignment.seat_number,
                        attempt,
                        "registration allocated"
                    );
                    return Ok(assignment);
                }
                Err(RepositoryError::AlreadyAllocated(existing)) => {
                    return self.existing_assignment(*existing, key)
                }
                Err(RepositoryError::Conflict | RepositoryError::CapacityExceeded) => {
                    debug!(registration = %registration_id, attempt, "seat claim lost a race");
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(
            registration = %registration_id,
            program = %key.program_id,
            location = %key.location_id,
            attempts,
            "allocation retries exhausted"
        );
        Err(AllocationError::RetriesExhausted { attempts })
    }

    fn existing_assignment(
        &self,
        existing: BatchAssignment,
        requested: BatchKey,
    ) -> Result<BatchAssignment, AllocationError> {
        let held = BatchKey::new(existing.program_id.clone(), existing.location_id.clone());
        if held != requested {
            return Err(AllocationError::KeyMismatch {
                registration_id: existing.registration_id,
                registered: held,
                requested,
            });
        }
        debug!(
            registration = %existing.registration_id,
            batch = existing.batch_number,
            "registration already allocated"
        );
        Ok(existing)
    }

    async fn try_allocate(
        &self,
        key: &BatchKey,
        registration_id: &RegistrationId,
    ) -> Result<BatchAssignment, RepositoryError> {
        let series = self.batches.batches(key).await?;
        let current = series
            .iter()
            .rev()
            .find(|batch| batch.status == BatchStatus::Open);

        let target = match current {
            Some(batch) if batch.has_room() => batch.clone(),
            _ => {
                let number = series.last().map_or(1, |batch| batch.number + 1);
                let created = self
                    .batches
                    .create_batch(NewBatch {
                        key: key.clone(),
                        number,
                        capacity: self.config.capacity(),
                        created_at: self.clock.now(),
                    })
                    .await?;
                info!(
                    program = %key.program_id,
                    location = %key.location_id,
                    batch = created.number,
                    capacity = created.capacity,
                    "opened batch"
                );
                created
            }
        };

        self.batches
            .claim_seat(SeatClaim {
                batch_id: target.id,
                expected_count: target.current_count,
                registration_id: registration_id.clone(),
                claimed_at: self.clock.now(),
            })
            .await
    }

    /// Estimate the batch a prospective student would join. Nothing is reserved.
    pub async fn preview(
        &self,
        program_id: &ProgramId,
        location_id: &LocationId,
    ) -> Result<BatchPreview, AllocationError> {
        let key = BatchKey::new(program_id.clone(), location_id.clone());
        let paid_count = self.registrations.paid_count(&key).await?;
        Ok(BatchPreview::project(key, paid_count, self.config.capacity()))
    }

    pub async fn batches(
        &self,
        program_id: &ProgramId,
        location_id: &LocationId,
    ) -> Result<Vec<BatchRecord>, AllocationError> {
        let key = BatchKey::new(program_id.clone(), location_id.clone());
        Ok(self.batches.batches(&key).await?)
    }

    pub async fn assignment(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<BatchAssignment>, AllocationError> {
        Ok(self.batches.assignment(registration_id).await?)
    }

    /// Administrator edit of start date or teaching phase.
    pub async fn update_batch(
        &self,
        batch_id: BatchId,
        update: BatchUpdate,
    ) -> Result<BatchRecord, AllocationError> {
        let updated = self.batches.update_batch(batch_id, &update).await?;
        info!(
            batch_id = batch_id.0,
            status = updated.status.label(),
            start_date = ?updated.start_date,
            "batch updated"
        );
        Ok(updated)
    }
}

/// Error raised by the allocator.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("registration {registration_id} is {}, only paid registrations hold seats", .status.label())]
    NotPaid {
        registration_id: RegistrationId,
        status: PaymentStatus,
    },
    #[error("registration {0} is unknown")]
    UnknownRegistration(RegistrationId),
    #[error("registration {registration_id} belongs to {registered}, not {requested}")]
    KeyMismatch {
        registration_id: RegistrationId,
        registered: BatchKey,
        requested: BatchKey,
    },
    #[error("allocation did not settle after {attempts} attempts, retry later")]
    RetriesExhausted { attempts: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
