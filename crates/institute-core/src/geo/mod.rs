//! Great-circle distance and circular geofence classification.

mod distance;
mod fence;

pub use distance::{haversine_meters, CoordinateError, Coordinates, EARTH_RADIUS_METERS};
pub use fence::{FenceReading, Geofence};
