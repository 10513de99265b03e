//! Geofence math — great-circle distance against a fixed target.

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Haversine great-circle distance between two positions, in meters.
pub fn haversine_meters(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    EARTH_RADIUS_M * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// One evaluated location sample. Overwritten as new fixes arrive; no
/// history is kept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeofenceReading {
    pub distance_m: f64,
    pub in_range: bool,
}

/// Radius boundary around a fixed target coordinate.
#[derive(Debug, Clone, Copy)]
pub struct Geofence {
    pub target: Coordinates,
    pub radius_m: f64,
}

impl Geofence {
    pub fn new(target: Coordinates, radius_m: f64) -> Self {
        Self { target, radius_m }
    }

    /// Distance and in/out verdict for a position. The boundary itself is
    /// in-range (`distance <= radius`).
    pub fn evaluate(&self, position: Coordinates) -> GeofenceReading {
        let distance_m = haversine_meters(position, self.target);
        GeofenceReading {
            distance_m,
            in_range: distance_m <= self.radius_m,
        }
    }
}

/// Last-value-wins view of a continuous position subscription.
///
/// `None` means no usable fix: never delivered, permission denied, or the
/// location backend is gone. Consumers must treat `None` as out-of-range —
/// the gate fails closed.
pub trait PositionSource {
    fn latest(&self) -> Option<Coordinates>;
}
