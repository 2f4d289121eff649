//! Entities owned by the location and scheduling collaborators. The core only reads them.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::geo::{Coordinates, Geofence};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

macro_rules! display_as_inner {
    ($($id:ty),+) => {
        $(impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_as_inner!(ProgramId, LocationId, SessionId);

/// Physical training site with the geofence students must check in from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub code: String,
    pub center: Coordinates,
    pub geofence_radius_meters: f64,
    pub active: bool,
}

impl Location {
    pub fn geofence(&self) -> Geofence {
        Geofence::new(self.center, self.geofence_radius_meters)
    }
}

/// Scheduled class meeting. The geofence is inherited from the location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub location: Location,
    pub program_id: ProgramId,
    pub scheduled_on: NaiveDate,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub cancelled: bool,
    pub max_attendees: Option<u32>,
}
