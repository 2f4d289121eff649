use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Rejection raised when a reading cannot describe a point on the globe.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("coordinates must be finite numbers")]
    NotFinite,
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Re-run range validation on a value that may have come straight from a deserializer.
    pub fn validated(self) -> Result<Self, CoordinateError> {
        Self::new(self.latitude, self.longitude)
    }

    /// Point displaced by the given meters north and east. Small-offset approximation, only
    /// meant for fixtures and demos near the equator or mid latitudes.
    pub fn offset_meters(self, north: f64, east: f64) -> Self {
        let dlat = (north / EARTH_RADIUS_METERS).to_degrees();
        let dlon =
            (east / (EARTH_RADIUS_METERS * self.latitude.to_radians().cos())).to_degrees();
        Self {
            latitude: self.latitude + dlat,
            longitude: self.longitude + dlon,
        }
    }
}

/// Great-circle distance in meters between two points.
pub fn haversine_meters(from: Coordinates, to: Coordinates) -> f64 {
    let from_lat = from.latitude.to_radians();
    let to_lat = to.latitude.to_radians();
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let half_chord = (dlat / 2.0).sin().powi(2)
        + from_lat.cos() * to_lat.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push the chord a hair past 1.0 for antipodal points
    let central_angle = 2.0 * half_chord.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * central_angle
}
