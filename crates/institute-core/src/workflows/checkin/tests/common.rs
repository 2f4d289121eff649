use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::clock::FixedClock;
use crate::geo::Coordinates;
use crate::storage::{InMemoryCheckInStore, InMemorySessionDirectory};
use crate::workflows::catalog::{Location, LocationId, ProgramId, Session};
use crate::workflows::checkin::domain::{
    CheckInId, CheckInRecord, CheckInSubmission, NewCheckIn, Resolution, SessionId, StudentId,
};
use crate::workflows::checkin::repository::{
    CheckInRepository, RepositoryError, SessionDirectory,
};
use crate::workflows::checkin::{CheckInVerifier, ReviewConfig};

pub(super) const RADIUS_METERS: f64 = 150.0;

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date")
}

pub(super) fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 55, 0).unwrap(),
    ))
}

pub(super) fn center() -> Coordinates {
    Coordinates::new(12.9352, 77.6245).expect("valid center")
}

pub(super) fn location() -> Location {
    Location {
        id: LocationId("blr-koramangala".to_string()),
        name: "Koramangala Campus".to_string(),
        code: "BLR1".to_string(),
        center: center(),
        geofence_radius_meters: RADIUS_METERS,
        active: true,
    }
}

pub(super) fn session(id: &str) -> Session {
    Session {
        id: SessionId(id.to_string()),
        location: location(),
        program_id: ProgramId("fullstack-web".to_string()),
        scheduled_on: today(),
        starts_at: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        ends_at: NaiveTime::from_hms_opt(12, 0, 0).expect("valid time"),
        cancelled: false,
        max_attendees: Some(30),
    }
}

/// Reading `meters` north of the campus center.
pub(super) fn submission(session_id: &str, student: &str, meters: f64) -> CheckInSubmission {
    let reading = center().offset_meters(meters, 0.0);
    CheckInSubmission {
        session_id: SessionId(session_id.to_string()),
        student_id: StudentId(student.to_string()),
        lat: reading.latitude,
        lng: reading.longitude,
        device_info: json!({ "platform": "android", "accuracy_m": 12.5 }),
    }
}

pub(super) async fn build_verifier() -> (
    CheckInVerifier<InMemorySessionDirectory, InMemoryCheckInStore>,
    Arc<InMemoryCheckInStore>,
    Arc<InMemorySessionDirectory>,
) {
    let sessions = Arc::new(InMemorySessionDirectory::default());
    sessions
        .upsert_session(session("sess-morning"))
        .await
        .expect("seed session");
    let store = Arc::new(InMemoryCheckInStore::default());
    let verifier = CheckInVerifier::new(
        sessions.clone(),
        store.clone(),
        clock(),
        ReviewConfig { queue_limit: 2 },
    );
    (verifier, store, sessions)
}

pub(super) struct UnavailableCheckInStore;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

#[async_trait]
impl CheckInRepository for UnavailableCheckInStore {
    async fn insert(&self, _check_in: NewCheckIn) -> Result<CheckInRecord, RepositoryError> {
        Err(offline())
    }

    async fn fetch(&self, _id: CheckInId) -> Result<Option<CheckInRecord>, RepositoryError> {
        Err(offline())
    }

    async fn resolve(
        &self,
        _id: CheckInId,
        _resolution: Resolution,
    ) -> Result<CheckInRecord, RepositoryError> {
        Err(offline())
    }

    async fn pending(&self, _limit: usize) -> Result<Vec<CheckInRecord>, RepositoryError> {
        Err(offline())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
