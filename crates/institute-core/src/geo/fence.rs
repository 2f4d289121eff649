use serde::{Deserialize, Serialize};

use super::distance::{haversine_meters, Coordinates};

/// Circular boundary around a training location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_meters: f64,
}

/// Outcome of measuring one reading against a fence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FenceReading {
    pub distance_meters: f64,
    pub within: bool,
}

impl Geofence {
    pub fn new(center: Coordinates, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
        }
    }

    /// The boundary is inclusive: a reading exactly on the radius counts as inside.
    pub fn classify(&self, distance_meters: f64) -> FenceReading {
        FenceReading {
            distance_meters,
            within: distance_meters <= self.radius_meters,
        }
    }

    pub fn evaluate(&self, reading: Coordinates) -> FenceReading {
        self.classify(haversine_meters(self.center, reading))
    }
}
