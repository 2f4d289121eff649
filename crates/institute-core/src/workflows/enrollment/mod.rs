//! Paid registrations are placed into capacity-bounded batches per program and location.
//!
//! Seats are claimed through a conditional store operation, so two payments landing at the
//! same time can never both take the last seat of a batch.

mod config;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use config::AllocatorConfig;
pub use domain::{
    BatchAssignment, BatchId, BatchKey, BatchPreview, BatchRecord, BatchStatus, BatchUpdate,
    BatchUpdateError, NewBatch, PaymentStatus, RegistrationId, RegistrationRecord, SeatClaim,
};
pub use repository::{BatchRepository, RegistrationLedger, RepositoryError};
pub use router::enrollment_router;
pub use service::{AllocationError, BatchAllocator};
