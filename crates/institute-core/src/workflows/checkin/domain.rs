use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;
pub use crate::workflows::catalog::{LocationId, SessionId};

/// Student identifier issued by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewerId(pub String);

/// Store-assigned check-in identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckInId(pub u64);

impl fmt::Display for CheckInId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verification state. Only `Pending` accepts a review; every other state is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Pending,
    Verified,
    Rejected,
    ManualOverride,
}

impl CheckInStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CheckInStatus::Pending => "pending",
            CheckInStatus::Verified => "verified",
            CheckInStatus::Rejected => "rejected",
            CheckInStatus::ManualOverride => "manual_override",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(CheckInStatus::Pending),
            "verified" => Some(CheckInStatus::Verified),
            "rejected" => Some(CheckInStatus::Rejected),
            "manual_override" => Some(CheckInStatus::ManualOverride),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, CheckInStatus::Pending)
    }

    /// Whether this check-in blocks another submission for the same session and student.
    pub const fn holds_slot(self) -> bool {
        !matches!(self, CheckInStatus::Rejected)
    }
}

/// Reviewer verdict on a pending check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Verified,
    Rejected,
    ManualOverride,
}

impl From<ReviewDecision> for CheckInStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Verified => CheckInStatus::Verified,
            ReviewDecision::Rejected => CheckInStatus::Rejected,
            ReviewDecision::ManualOverride => CheckInStatus::ManualOverride,
        }
    }
}

/// Inbound reading from the student's device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInSubmission {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub device_info: serde_json::Value,
}

/// Review payload sent by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Row inserted at submission time, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckIn {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub location_id: LocationId,
    pub coordinates: Coordinates,
    pub distance_from_center_meters: f64,
    pub is_within_geofence: bool,
    pub status: CheckInStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub device_info: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

/// Compare-and-swap payload applied only while the check-in is still pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub decision: ReviewDecision,
    pub reviewer_id: ReviewerId,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub id: CheckInId,
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub location_id: LocationId,
    pub coordinates: Coordinates,
    pub distance_from_center_meters: f64,
    pub is_within_geofence: bool,
    pub status: CheckInStatus,
    pub reviewer_id: Option<ReviewerId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub device_info: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl CheckInRecord {
    pub fn from_new(id: CheckInId, new: NewCheckIn) -> Self {
        Self {
            id,
            session_id: new.session_id,
            student_id: new.student_id,
            location_id: new.location_id,
            coordinates: new.coordinates,
            distance_from_center_meters: new.distance_from_center_meters,
            is_within_geofence: new.is_within_geofence,
            status: new.status,
            reviewer_id: None,
            verified_at: new.verified_at,
            notes: String::new(),
            device_info: new.device_info,
            submitted_at: new.submitted_at,
        }
    }

    pub fn apply(&mut self, resolution: Resolution) {
        self.status = resolution.decision.into();
        self.reviewer_id = Some(resolution.reviewer_id);
        self.verified_at = Some(resolution.reviewed_at);
        if let Some(notes) = resolution.notes {
            self.notes = notes;
        }
    }

    pub fn view(&self) -> CheckInView {
        CheckInView {
            id: self.id,
            session_id: self.session_id.clone(),
            student_id: self.student_id.clone(),
            status: self.status.label(),
            distance_from_center_meters: self.distance_from_center_meters,
            is_within_geofence: self.is_within_geofence,
            reviewer_id: self.reviewer_id.clone(),
            verified_at: self.verified_at,
            notes: self.notes.clone(),
            submitted_at: self.submitted_at,
        }
    }
}

/// Public representation returned by the HTTP layer. Device metadata stays internal.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInView {
    pub id: CheckInId,
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub status: &'static str,
    pub distance_from_center_meters: f64,
    pub is_within_geofence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<ReviewerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    pub submitted_at: DateTime<Utc>,
}
