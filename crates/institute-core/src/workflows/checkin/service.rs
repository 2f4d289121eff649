use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use super::config::ReviewConfig;
use super::domain::{
    CheckInId, CheckInRecord, CheckInStatus, CheckInSubmission, NewCheckIn, Resolution,
    ReviewRequest, ReviewerId, SessionId, StudentId,
};
use super::repository::{CheckInRepository, RepositoryError, SessionDirectory};
use crate::clock::Clock;
use crate::geo::{CoordinateError, Coordinates};
use crate::workflows::catalog::Session;

/// Service composing the session directory, check-in store, and geofence policy.
pub struct CheckInVerifier<S, R> {
    sessions: Arc<S>,
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    config: ReviewConfig,
}

impl<S, R> CheckInVerifier<S, R>
where
    S: SessionDirectory + 'static,
    R: CheckInRepository + 'static,
{
    pub fn new(
        sessions: Arc<S>,
        repository: Arc<R>,
        clock: Arc<dyn Clock>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            sessions,
            repository,
            clock,
            config,
        }
    }

    /// Record a GPS check-in. Readings inside the session's geofence are verified at once,
    /// everything else waits in the review queue.
    pub async fn submit(
        &self,
        submission: CheckInSubmission,
    ) -> Result<CheckInRecord, CheckInError> {
        let coordinates = Coordinates::new(submission.lat, submission.lng)?;
        let session = self.bookable_session(&submission.session_id).await?;

        let reading = session.location.geofence().evaluate(coordinates);
        let now = self.clock.now();
        let (status, verified_at) = if reading.within {
            (CheckInStatus::Verified, Some(now))
        } else {
            (CheckInStatus::Pending, None)
        };

        let new = NewCheckIn {
            session_id: session.id.clone(),
            student_id: submission.student_id.clone(),
            location_id: session.location.id.clone(),
            coordinates,
            distance_from_center_meters: reading.distance_meters,
            is_within_geofence: reading.within,
            status,
            verified_at,
            device_info: submission.device_info,
            submitted_at: now,
        };

        let stored = match self.repository.insert(new).await {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict { existing }) => {
                return Err(CheckInError::DuplicateCheckIn {
                    session_id: submission.session_id,
                    student_id: submission.student_id,
                    existing,
                })
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            check_in = stored.id.0,
            session = %stored.session_id,
            student = %stored.student_id,
            distance_m = stored.distance_from_center_meters,
            radius_m = session.location.geofence_radius_meters,
            status = stored.status.label(),
            "check-in recorded"
        );
        Ok(stored)
    }

    async fn bookable_session(&self, session_id: &SessionId) -> Result<Session, CheckInError> {
        let reject = |reason| CheckInError::InvalidSession {
            session_id: session_id.clone(),
            reason,
        };

        let session = self
            .sessions
            .session(session_id)
            .await?
            .ok_or_else(|| reject(SessionRejection::NotFound))?;

        if session.cancelled {
            return Err(reject(SessionRejection::Cancelled));
        }
        if !session.location.active {
            return Err(reject(SessionRejection::LocationInactive));
        }
        let today = self.clock.today();
        if session.scheduled_on != today {
            return Err(reject(SessionRejection::NotToday {
                scheduled_on: session.scheduled_on,
                today,
            }));
        }

        Ok(session)
    }

    /// Apply a reviewer's decision to a pending check-in. Decisions are final: reviewing a
    /// resolved check-in fails and leaves it untouched.
    pub async fn review(
        &self,
        check_in_id: CheckInId,
        reviewer_id: ReviewerId,
        request: ReviewRequest,
    ) -> Result<CheckInRecord, CheckInError> {
        let resolution = Resolution {
            decision: request.decision,
            reviewer_id,
            notes: request.notes,
            reviewed_at: self.clock.now(),
        };

        match self.repository.resolve(check_in_id, resolution).await {
            Ok(record) => {
                info!(
                    check_in = record.id.0,
                    status = record.status.label(),
                    "check-in reviewed"
                );
                Ok(record)
            }
            Err(RepositoryError::NotFound) => Err(CheckInError::NotFound(check_in_id)),
            Err(RepositoryError::AlreadyResolved(status)) => {
                warn!(
                    check_in = check_in_id.0,
                    status = status.label(),
                    "review refused, check-in already resolved"
                );
                Err(CheckInError::AlreadyResolved {
                    id: check_in_id,
                    status,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn get(&self, check_in_id: CheckInId) -> Result<CheckInRecord, CheckInError> {
        self.repository
            .fetch(check_in_id)
            .await?
            .ok_or(CheckInError::NotFound(check_in_id))
    }

    /// Manual review queue, oldest first. Falls back to the configured page size.
    pub async fn pending(&self, limit: Option<usize>) -> Result<Vec<CheckInRecord>, CheckInError> {
        let limit = limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.config.queue_limit);
        Ok(self.repository.pending(limit).await?)
    }
}

/// Why a session cannot accept check-ins right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRejection {
    NotFound,
    Cancelled,
    LocationInactive,
    NotToday {
        scheduled_on: NaiveDate,
        today: NaiveDate,
    },
}

impl fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRejection::NotFound => write!(f, "session does not exist"),
            SessionRejection::Cancelled => write!(f, "session was cancelled"),
            SessionRejection::LocationInactive => write!(f, "session location is inactive"),
            SessionRejection::NotToday {
                scheduled_on,
                today,
            } => write!(f, "session is scheduled for {scheduled_on}, not {today}"),
        }
    }
}

/// Error raised by the check-in verifier.
#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),
    #[error("invalid session {session_id}: {reason}")]
    InvalidSession {
        session_id: SessionId,
        reason: SessionRejection,
    },
    #[error("student {student_id} already checked in to session {session_id} (check-in {existing})")]
    DuplicateCheckIn {
        session_id: SessionId,
        student_id: StudentId,
        existing: CheckInId,
    },
    #[error("check-in {id} was already resolved as {}", .status.label())]
    AlreadyResolved { id: CheckInId, status: CheckInStatus },
    #[error("check-in {0} not found")]
    NotFound(CheckInId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
