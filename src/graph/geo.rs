//! Distances between cell positions.

use crate::config::DistanceMetric;
use crate::model::Position;

/// Mean Earth radius used by both metrics.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree of latitude on the reference sphere.
pub fn km_per_degree() -> f64 {
    EARTH_RADIUS_KM * std::f64::consts::PI / 180.0
}

/// Great-circle distance.
pub fn haversine_km(a: Position, b: Position) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Equirectangular approximation around the mean latitude.
pub fn planar_km(a: Position, b: Position) -> f64 {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let x = (b.lon - a.lon).to_radians() * mean_lat.cos();
    let y = (b.lat - a.lat).to_radians();
    EARTH_RADIUS_KM * x.hypot(y)
}

pub fn distance_km(metric: DistanceMetric, a: Position, b: Position) -> f64 {
    match metric {
        DistanceMetric::Haversine => haversine_km(a, b),
        DistanceMetric::Planar => planar_km(a, b),
    }
}
