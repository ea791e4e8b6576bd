use geo::{HaversineDistance, Point};

use crate::models::{BoundingBox, GeoPoint};

/// Meters per degree of latitude (and of longitude at the equator)
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Geodesic distance between two points in meters
#[inline]
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let from = Point::new(a.longitude, a.latitude);
    let to = Point::new(b.longitude, b.latitude);
    from.haversine_distance(&to)
}

/// Calculate a bounding box around a center point
///
/// This is much faster than Haversine for pre-filtering.
/// 1° latitude ≈ 111km, 1° longitude ≈ 111km * cos(latitude)
pub fn calculate_bounding_box(center: GeoPoint, radius_m: f64) -> BoundingBox {
    let lat_delta = radius_m / METERS_PER_DEGREE;

    // Near the poles cos() approaches zero; clamp so the box spans all longitudes
    let cos_lat = center.latitude.to_radians().cos().abs();
    let lon_delta = if cos_lat < 1e-6 {
        180.0
    } else {
        (radius_m / (METERS_PER_DEGREE * cos_lat)).min(180.0)
    };

    BoundingBox {
        min_lat: center.latitude - lat_delta,
        max_lat: center.latitude + lat_delta,
        min_lon: center.longitude - lon_delta,
        max_lon: center.longitude + lon_delta,
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(point: GeoPoint, bbox: &BoundingBox) -> bool {
    point.latitude >= bbox.min_lat
        && point.latitude <= bbox.max_lat
        && point.longitude >= bbox.min_lon
        && point.longitude <= bbox.max_lon
}

/// Whether `candidate` lies within `radius_m` meters of `center`
#[inline]
pub fn within_radius(center: GeoPoint, candidate: GeoPoint, radius_m: f64) -> bool {
    let bbox = calculate_bounding_box(center, radius_m);
    is_within_bounding_box(candidate, &bbox) && distance_meters(center, candidate) <= radius_m
}
