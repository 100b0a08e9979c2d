//! Great-circle geometry primitives.
//!
//! Pure functions over [`GeoPoint`]: haversine distance, initial bearing,
//! minimum angular difference, compass sectors, cross/along-track distance to
//! a segment, and ray-cast point-in-polygon containment. No state, no I/O.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether the coordinate is within the valid WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Haversine great-circle distance in meters.
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from `from` toward `to`, degrees in `[0, 360)`.
pub fn initial_bearing_deg(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lng - from.lng).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Minimum angular difference between two bearings, degrees in `[0, 180]`.
///
/// Takes the smaller of the clockwise and counter-clockwise sweeps.
pub fn bearing_delta_deg(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Eight-way compass sector of a bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompassSector {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// Classify a bearing into its compass sector (45° wide, centered on the
/// cardinal/intercardinal directions).
pub fn compass_sector(bearing_deg: f64) -> CompassSector {
    let b = bearing_deg.rem_euclid(360.0);
    match ((b + 22.5) / 45.0) as u32 % 8 {
        0 => CompassSector::North,
        1 => CompassSector::NorthEast,
        2 => CompassSector::East,
        3 => CompassSector::SouthEast,
        4 => CompassSector::South,
        5 => CompassSector::SouthWest,
        6 => CompassSector::West,
        _ => CompassSector::NorthWest,
    }
}

/// Signed cross-track distance in meters from `point` to the great circle
/// through `start` → `end`. Negative values lie left of the track.
pub fn cross_track_distance_m(point: GeoPoint, start: GeoPoint, end: GeoPoint) -> f64 {
    let d13 = haversine_distance_m(start, point) / EARTH_RADIUS_M;
    let theta13 = initial_bearing_deg(start, point).to_radians();
    let theta12 = initial_bearing_deg(start, end).to_radians();
    (d13.sin() * (theta13 - theta12).sin()).asin() * EARTH_RADIUS_M
}

/// Along-track distance in meters: how far along `start` → `end` the
/// perpendicular foot of `point` lies.
pub fn along_track_distance_m(point: GeoPoint, start: GeoPoint, end: GeoPoint) -> f64 {
    let d13 = haversine_distance_m(start, point) / EARTH_RADIUS_M;
    let dxt = cross_track_distance_m(point, start, end) / EARTH_RADIUS_M;
    // Clamp: rounding can push the ratio a hair past 1 for on-track points.
    (d13.cos() / dxt.cos()).clamp(-1.0, 1.0).acos() * EARTH_RADIUS_M
}

/// Ray-cast containment test. The polygon is a closed ring of vertices
/// (implicitly closed; the last vertex connects back to the first). Suitable
/// for the small service-area polygons this engine works with, where
/// spherical effects over an edge are negligible.
pub fn point_in_polygon(point: GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        let crosses = (pi.lat > point.lat) != (pj.lat > point.lat);
        if crosses {
            let lng_at_lat =
                pj.lng + (point.lat - pj.lat) / (pi.lat - pj.lat) * (pi.lng - pj.lng);
            if point.lng < lng_at_lat {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
