use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::geo::CoordinateError;
use crate::workflows::catalog::{Location, LocationId, ProgramId, Session, SessionId};
use crate::workflows::checkin::SessionDirectory;
use crate::workflows::enrollment::{
    BatchKey, PaymentStatus, RegistrationId, RegistrationLedger, RegistrationRecord,
};
use crate::workflows::{checkin, enrollment};

/// Catalog snapshot used to stand up the collaborators the core reads from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub sessions: Vec<SessionSeed>,
    #[serde(default)]
    pub registrations: Vec<RegistrationSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSeed {
    pub id: SessionId,
    pub location_code: String,
    pub program_id: ProgramId,
    /// Defaults to the day the seed is loaded.
    #[serde(default)]
    pub scheduled_on: Option<NaiveDate>,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub max_attendees: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationSeed {
    pub id: RegistrationId,
    pub program_id: ProgramId,
    pub location_id: LocationId,
    pub payment_status: PaymentStatus,
}

/// What a seed load produced. Paid registrations still need to go through the allocator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub locations: usize,
    pub sessions: usize,
    pub registrations: usize,
    pub paid: Vec<(RegistrationId, BatchKey)>,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("unable to read seed file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed seed data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("location {code} has invalid coordinates: {source}")]
    InvalidLocation {
        code: String,
        source: CoordinateError,
    },
    #[error("location {code} has a non-positive geofence radius")]
    InvalidRadius { code: String },
    #[error("location code {0} appears more than once")]
    DuplicateLocationCode(String),
    #[error("session {session_id} references unknown location {location_code}")]
    UnknownLocation {
        session_id: SessionId,
        location_code: String,
    },
    #[error(transparent)]
    Sessions(#[from] checkin::RepositoryError),
    #[error(transparent)]
    Registrations(#[from] enrollment::RepositoryError),
}

impl SeedData {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Validate the catalog and load it into the collaborator stores.
    pub async fn load_into<S, L>(
        self,
        today: NaiveDate,
        sessions: &S,
        registrations: &L,
    ) -> Result<SeedSummary, SeedError>
    where
        S: SessionDirectory + ?Sized,
        L: RegistrationLedger + ?Sized,
    {
        let mut by_code: HashMap<String, Location> = HashMap::new();
        for location in self.locations {
            location
                .center
                .validated()
                .map_err(|source| SeedError::InvalidLocation {
                    code: location.code.clone(),
                    source,
                })?;
            if !(location.geofence_radius_meters.is_finite()
                && location.geofence_radius_meters > 0.0)
            {
                return Err(SeedError::InvalidRadius {
                    code: location.code,
                });
            }
            if by_code.contains_key(&location.code) {
                return Err(SeedError::DuplicateLocationCode(location.code));
            }
            by_code.insert(location.code.clone(), location);
        }

        let mut summary = SeedSummary {
            locations: by_code.len(),
            ..SeedSummary::default()
        };

        for seed in self.sessions {
            let location = by_code.get(&seed.location_code).cloned().ok_or_else(|| {
                SeedError::UnknownLocation {
                    session_id: seed.id.clone(),
                    location_code: seed.location_code.clone(),
                }
            })?;
            sessions
                .upsert_session(Session {
                    id: seed.id,
                    location,
                    program_id: seed.program_id,
                    scheduled_on: seed.scheduled_on.unwrap_or(today),
                    starts_at: seed.starts_at,
                    ends_at: seed.ends_at,
                    cancelled: seed.cancelled,
                    max_attendees: seed.max_attendees,
                })
                .await?;
            summary.sessions += 1;
        }

        for seed in self.registrations {
            let key = BatchKey::new(seed.program_id, seed.location_id);
            registrations
                .record(RegistrationRecord {
                    registration_id: seed.id.clone(),
                    key: key.clone(),
                    payment_status: seed.payment_status,
                })
                .await?;
            if seed.payment_status == PaymentStatus::Paid {
                summary.paid.push((seed.id, key));
            }
            summary.registrations += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryRegistrationLedger, InMemorySessionDirectory};

    const SEED: &str = r#"{
        "locations": [
            {
                "id": "blr-1",
                "name": "Koramangala Campus",
                "code": "BLR1",
                "center": { "latitude": 12.9352, "longitude": 77.6245 },
                "geofence_radius_meters": 150.0,
                "active": true
            }
        ],
        "sessions": [
            {
                "id": "sess-1",
                "location_code": "BLR1",
                "program_id": "fullstack",
                "starts_at": "09:00:00",
                "ends_at": "12:00:00"
            }
        ],
        "registrations": [
            { "id": "reg-1", "program_id": "fullstack", "location_id": "blr-1", "payment_status": "paid" },
            { "id": "reg-2", "program_id": "fullstack", "location_id": "blr-1", "payment_status": "pending" }
        ]
    }"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date")
    }

    #[tokio::test]
    async fn loads_catalog_into_collaborators() {
        let sessions = InMemorySessionDirectory::default();
        let registrations = InMemoryRegistrationLedger::default();

        let summary = SeedData::from_json(SEED)
            .expect("seed parses")
            .load_into(today(), &sessions, &registrations)
            .await
            .expect("seed loads");

        assert_eq!(summary.locations, 1);
        assert_eq!(summary.sessions, 1);
        assert_eq!(summary.registrations, 2);
        assert_eq!(summary.paid.len(), 1);

        let session = sessions
            .session(&SessionId("sess-1".into()))
            .await
            .expect("lookup")
            .expect("session stored");
        assert_eq!(session.scheduled_on, today());
        assert_eq!(session.location.geofence_radius_meters, 150.0);

        let key = BatchKey::new(ProgramId("fullstack".into()), LocationId("blr-1".into()));
        assert_eq!(registrations.paid_count(&key).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn rejects_sessions_at_unknown_locations() {
        let mut seed = SeedData::from_json(SEED).expect("seed parses");
        seed.sessions[0].location_code = "PUNE".to_string();

        let result = seed
            .load_into(
                today(),
                &InMemorySessionDirectory::default(),
                &InMemoryRegistrationLedger::default(),
            )
            .await;
        assert!(matches!(result, Err(SeedError::UnknownLocation { .. })));
    }

    #[tokio::test]
    async fn rejects_out_of_range_centers() {
        let mut seed = SeedData::from_json(SEED).expect("seed parses");
        seed.locations[0].center.latitude = 123.0;

        let result = seed
            .load_into(
                today(),
                &InMemorySessionDirectory::default(),
                &InMemoryRegistrationLedger::default(),
            )
            .await;
        assert!(matches!(result, Err(SeedError::InvalidLocation { .. })));
    }
}
