//! Geodesy primitives: great-circle distance and the RTT distance bound.

use crate::constants::{EARTH_RADIUS_KM, MS_PER_SEC, RTT_FACTOR};

/// Great-circle distance between two points in degrees, km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
}

/// Maximum distance a signal can have covered given a round-trip time.
/// Undefined for non-positive RTTs.
pub fn max_distance_km(rtt_ms: f64, speed_km_s: f64) -> Option<f64> {
    if rtt_ms <= 0.0 {
        return None;
    }
    let speed_km_ms = speed_km_s / MS_PER_SEC;
    Some(speed_km_ms * (rtt_ms / RTT_FACTOR))
}

/// Kilometers per degree of latitude (and of longitude at the equator).
pub fn km_per_deg() -> f64 {
    2.0 * std::f64::consts::PI * EARTH_RADIUS_KM / 360.0
}
