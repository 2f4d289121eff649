use async_trait::async_trait;

use super::domain::{CheckInId, CheckInRecord, CheckInStatus, NewCheckIn, Resolution, SessionId};
use crate::workflows::catalog::Session;

/// The scheduling collaborator's sessions and their locations.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn session(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    /// Import or refresh a session together with its location.
    async fn upsert_session(&self, session: Session) -> Result<(), RepositoryError>;
}

/// Check-in storage.
///
/// `insert` must reject a second row for the same session and student while an earlier row
/// is anything but rejected. `resolve` must only touch rows that are still pending.
#[async_trait]
pub trait CheckInRepository: Send + Sync {
    async fn insert(&self, check_in: NewCheckIn) -> Result<CheckInRecord, RepositoryError>;
    async fn fetch(&self, id: CheckInId) -> Result<Option<CheckInRecord>, RepositoryError>;
    async fn resolve(
        &self,
        id: CheckInId,
        resolution: Resolution,
    ) -> Result<CheckInRecord, RepositoryError>;
    /// Pending check-ins, oldest submission first.
    async fn pending(&self, limit: usize) -> Result<Vec<CheckInRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("an active check-in already exists (id {existing})")]
    Conflict { existing: CheckInId },
    #[error("check-in already resolved as {}", .0.label())]
    AlreadyResolved(CheckInStatus),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
