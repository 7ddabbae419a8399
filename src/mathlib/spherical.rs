//! Spherical geometry: great-circle distance and azimuth, geodetic to
//! geocentric latitude, and the angle/length conversion constants shared
//! by the solver and the statistics.

/// Mean Earth radius (km), the radius of the solver's reference sphere
pub const EARTH_RADIUS: f64 = 6371.0;

/// WGS-84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257223563;

/// Degrees of arc per kilometer on the reference sphere (10000 km = 90°)
pub const KM2DEG: f64 = 90.0 / 10000.0;

/// Kilometers per degree of arc on the reference sphere
pub const DEG2KM: f64 = 10000.0 / 90.0;

/// Geographic (geodetic) latitude to geocentric latitude on the WGS-84
/// ellipsoid (or vice versa if `forward` is `false`). Radians in, radians out.
#[must_use]
pub fn geocentric_latitude(latitude: f64, forward: bool) -> f64 {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    if forward {
        return ((1.0 - e2) * latitude.tan()).atan();
    }
    (latitude.tan() / (1.0 - e2)).atan()
}

/// Normalize arbitrary angles to [0, 360)
#[must_use]
pub fn normalize_positive_deg(angle: f64) -> f64 {
    let angle = angle % 360.0;
    if angle < 0. {
        return angle + 360.0;
    }
    angle
}

/// Normalize arbitrary angles to [-180, 180)
#[must_use]
pub fn normalize_symmetric_deg(angle: f64) -> f64 {
    let angle = (angle + 180.0) % 360.0;
    angle - 180.0 * angle.signum()
}

/// Great-circle distance and azimuth from (`lat_a`, `lon_a`) to
/// (`lat_b`, `lon_b`), all in degrees.
///
/// Returns `(distance, azimuth)`, the distance in degrees of arc and the
/// azimuth in degrees clockwise from north in [0, 360). For coincident
/// points the azimuth degenerates to 0.
#[must_use]
pub fn gc_distance_azimuth(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> (f64, f64) {
    let lat_a = lat_a.to_radians();
    let lon_a = lon_a.to_radians();
    let lat_b = lat_b.to_radians();
    let lon_b = lon_b.to_radians();

    let dist = (lat_a.sin() * lat_b.sin() + lat_a.cos() * lat_b.cos() * (lon_a - lon_b).cos())
        .clamp(-1.0, 1.0)
        .acos();

    // Coincident points: azimuth undefined, and sin(dist) would divide by zero
    if dist < f64::EPSILON {
        return (dist.to_degrees(), 0.0);
    }

    let cos_az = (lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * (lon_b - lon_a).cos())
        / dist.sin();
    let sin_az = lat_b.cos() * (lon_b - lon_a).sin() / dist.sin();
    let mut az = sin_az.atan2(cos_az).to_degrees();

    // Numerical breakdown on the same meridian
    if az.is_nan() && (lon_b - lon_a).abs() < 1e-6 {
        az = if lat_a > lat_b { 180.0 } else { 0.0 };
    }

    if az < 0.0 {
        az += 360.0;
    }

    (dist.to_degrees(), az)
}

// ----- T E S T S ---------------------------------------------------
