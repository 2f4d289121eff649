//! Geofenced attendance check-ins: automatic verification inside the fence, a manual review
//! queue for everything else.

mod config;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use config::ReviewConfig;
pub use domain::{
    CheckInId, CheckInRecord, CheckInStatus, CheckInSubmission, CheckInView, NewCheckIn,
    Resolution, ReviewDecision, ReviewRequest, ReviewerId, StudentId,
};
pub use repository::{CheckInRepository, RepositoryError, SessionDirectory};
pub use router::checkin_router;
pub use service::{CheckInError, CheckInVerifier, SessionRejection};
