use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use crate::workflows::catalog::{LocationId, ProgramId};

/// Registration identifier issued by the registration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(pub String);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned batch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u64);

/// Batches are numbered and filled independently per program and location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchKey {
    pub program_id: ProgramId,
    pub location_id: LocationId,
}

impl BatchKey {
    pub fn new(program_id: ProgramId, location_id: LocationId) -> Self {
        Self {
            program_id,
            location_id,
        }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.program_id, self.location_id)
    }
}

/// Payment state reported by the registration collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Projected,
    Paid,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Projected => "projected",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(PaymentStatus::Pending),
            "projected" => Some(PaymentStatus::Projected),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

/// Registration as the payment collaborator knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub registration_id: RegistrationId,
    pub key: BatchKey,
    pub payment_status: PaymentStatus,
}

/// Batch lifecycle. `Open` and `Full` are driven by seat claims, the rest by administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Open,
    Full,
    InProgress,
    Completed,
}

impl BatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BatchStatus::Open => "open",
            BatchStatus::Full => "full",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Completed => "completed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "open" => Some(BatchStatus::Open),
            "full" => Some(BatchStatus::Full),
            "in_progress" => Some(BatchStatus::InProgress),
            "completed" => Some(BatchStatus::Completed),
            _ => None,
        }
    }

    /// Administrators may only push a batch forward into the teaching phases.
    pub fn admin_can_move_to(self, target: BatchStatus) -> bool {
        match target {
            BatchStatus::Open | BatchStatus::Full => self == target,
            BatchStatus::InProgress | BatchStatus::Completed => target >= self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: BatchId,
    pub program_id: ProgramId,
    pub location_id: LocationId,
    pub number: u32,
    pub capacity: u32,
    pub current_count: u32,
    pub status: BatchStatus,
    pub start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl BatchRecord {
    pub fn has_room(&self) -> bool {
        self.status == BatchStatus::Open && self.current_count < self.capacity
    }

    pub fn seats_remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.current_count)
    }

    /// Apply an administrator edit in place.
    pub fn apply_update(&mut self, update: &BatchUpdate) -> Result<(), BatchUpdateError> {
        if let Some(target) = update.status {
            if !self.status.admin_can_move_to(target) {
                return Err(BatchUpdateError::ForbiddenTransition {
                    from: self.status,
                    to: target,
                });
            }
        }

        if let Some(start_date) = update.start_date {
            self.start_date = Some(start_date);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        Ok(())
    }
}

/// Row inserted when a (program, location) needs its next batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub key: BatchKey,
    pub number: u32,
    pub capacity: u32,
    pub created_at: DateTime<Utc>,
}

/// Conditional seat claim: only applies if the batch still holds `expected_count` seats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatClaim {
    pub batch_id: BatchId,
    pub expected_count: u32,
    pub registration_id: RegistrationId,
    pub claimed_at: DateTime<Utc>,
}

/// The registration to batch link recorded by a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAssignment {
    pub registration_id: RegistrationId,
    pub batch_id: BatchId,
    pub program_id: ProgramId,
    pub location_id: LocationId,
    pub batch_number: u32,
    pub seat_number: u32,
    pub assigned_at: DateTime<Utc>,
}

/// Display-only estimate shown before payment completes. Reserves nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPreview {
    pub program_id: ProgramId,
    pub location_id: LocationId,
    pub batch_number: u32,
    pub current_count: u32,
    pub capacity: u32,
}

impl BatchPreview {
    pub fn project(key: BatchKey, paid_count: u32, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            program_id: key.program_id,
            location_id: key.location_id,
            batch_number: paid_count / capacity + 1,
            current_count: paid_count % capacity,
            capacity,
        }
    }
}

/// Administrator edit of a batch's schedule or phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdate {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<BatchStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchUpdateError {
    #[error("batch cannot move from {} to {}", .from.label(), .to.label())]
    ForbiddenTransition { from: BatchStatus, to: BatchStatus },
}
