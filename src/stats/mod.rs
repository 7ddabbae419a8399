//! Expectation and covariance of samples drawn from a location PDF, in
//! rectangular model coordinates or global (longitude, latitude, depth)
//! coordinates, plus the grid-integrated moments of a PDF grid.

pub mod ellipsoid;
pub mod hypo;

use crate::grid::kind::GridKind;
use crate::grid::Grid3;
use crate::mathlib::spherical::{gc_distance_azimuth, DEG2KM};
use crate::mathlib::vector::{Mat3, Vec3};
use crate::Error;

/// One location sample: coordinates and a weight.
///
/// Rectangular samples are (x, y, z) in model km; global samples are
/// (longitude°, latitude°, depth km). Weights only matter to the
/// `*_weighted` variants, since samples drawn from the target PDF already
/// carry its density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Sample {
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Sample {
        Sample { x, y, z, w }
    }
}

/// Wrap a longitude into the branch containing `reference`
fn wrap_lon(lon: f64, reference: f64) -> f64 {
    if lon - reference > 180.0 {
        return lon - 360.0;
    }
    if lon - reference < -180.0 {
        return lon + 360.0;
    }
    lon
}

/// Component-wise mean of rectangular samples
#[must_use]
pub fn expectation(samples: &[Sample]) -> Vec3 {
    let mut expect = Vec3::origin();
    for s in samples {
        expect[0] += s.x;
        expect[1] += s.y;
        expect[2] += s.z;
    }
    expect * (1.0 / samples.len() as f64)
}

/// Weighted mean of rectangular samples
#[must_use]
pub fn expectation_weighted(samples: &[Sample]) -> Vec3 {
    let mut expect = Vec3::origin();
    let mut weight_sum = 0.0;
    for s in samples {
        expect[0] += s.x * s.w;
        expect[1] += s.y * s.w;
        expect[2] += s.z * s.w;
        weight_sum += s.w;
    }
    expect * (1.0 / weight_sum)
}

/// Mean of global samples, wrapping each longitude into the branch of
/// `x_reference` first, so clouds straddling ±180° do not collapse to a
/// bogus near-zero mean
#[must_use]
pub fn expectation_global(samples: &[Sample], x_reference: f64) -> Vec3 {
    let mut expect = Vec3::origin();
    for s in samples {
        expect[0] += wrap_lon(s.x, x_reference);
        expect[1] += s.y;
        expect[2] += s.z;
    }
    expect * (1.0 / samples.len() as f64)
}

/// Weighted variant of [`expectation_global`]
#[must_use]
pub fn expectation_global_weighted(samples: &[Sample], x_reference: f64) -> Vec3 {
    let mut expect = Vec3::origin();
    let mut weight_sum = 0.0;
    for s in samples {
        expect[0] += wrap_lon(s.x, x_reference) * s.w;
        expect[1] += s.y * s.w;
        expect[2] += s.z * s.w;
        weight_sum += s.w;
    }
    expect * (1.0 / weight_sum)
}

fn symmetrize(mut cov: Mat3) -> Mat3 {
    cov[1][0] = cov[0][1];
    cov[2][0] = cov[0][2];
    cov[2][1] = cov[1][2];
    cov
}

/// Covariance of rectangular samples about `expect`.
///
/// The expectation is subtracted from every sample before the cross
/// products accumulate; correcting after summation loses precision badly
/// when the cloud sits far from the coordinate origin.
#[must_use]
pub fn covariance_rect(samples: &[Sample], expect: &Vec3) -> Mat3 {
    let mut cov = Mat3::zero();
    for s in samples {
        let x = s.x - expect[0];
        let y = s.y - expect[1];
        let z = s.z - expect[2];
        cov[0][0] += x * x;
        cov[0][1] += x * y;
        cov[0][2] += x * z;
        cov[1][1] += y * y;
        cov[1][2] += y * z;
        cov[2][2] += z * z;
    }
    let n = samples.len() as f64;
    for r in 0..3 {
        for c in r..3 {
            cov[r][c] /= n;
        }
    }
    symmetrize(cov)
}

/// Covariance of global samples about the geographic expectation.
///
/// Each sample is projected onto the local tangent plane at the
/// expectation through its great-circle distance and azimuth, in km, which
/// stays well-behaved near the poles. Depth is used directly.
#[must_use]
pub fn covariance_global(samples: &[Sample], expect: &Vec3) -> Mat3 {
    let mut cov = Mat3::zero();
    let x_reference = expect[0];
    for s in samples {
        let lon = wrap_lon(s.x, x_reference);
        let (dist_deg, azimuth) = gc_distance_azimuth(expect[1], expect[0], s.y, lon);
        let dist = dist_deg * DEG2KM;

        // Azimuth is degrees CW from north
        let x = dist * azimuth.to_radians().sin();
        let y = dist * azimuth.to_radians().cos();
        let z = s.z - expect[2];

        cov[0][0] += x * x;
        cov[0][1] += x * y;
        cov[0][2] += x * z;
        cov[1][1] += y * y;
        cov[1][2] += y * z;
        cov[2][2] += z * z;
    }
    let n = samples.len() as f64;
    for r in 0..3 {
        for c in r..3 {
            cov[r][c] /= n;
        }
    }
    symmetrize(cov)
}

/// Weighted covariance of global samples, with the small-extent
/// `cos(latitude)` longitude scaling instead of the great-circle
/// projection
#[must_use]
pub fn covariance_global_weighted(samples: &[Sample], expect: &Vec3) -> Mat3 {
    let mut cov = Mat3::zero();
    let mut weight_sum = 0.0;
    let cos_lat = expect[1].to_radians().cos();
    let x_reference = expect[0];
    for s in samples {
        let x = (wrap_lon(s.x, x_reference) - expect[0]) * DEG2KM * cos_lat;
        let y = (s.y - expect[1]) * DEG2KM;
        let z = s.z - expect[2];

        cov[0][0] += x * x * s.w;
        cov[0][1] += x * y * s.w;
        cov[0][2] += x * z * s.w;
        cov[1][1] += y * y * s.w;
        cov[1][2] += y * z * s.w;
        cov[2][2] += z * z * s.w;
        weight_sum += s.w;
    }
    for r in 0..3 {
        for c in r..3 {
            cov[r][c] /= weight_sum;
        }
    }
    symmetrize(cov)
}

/// Expectation of a normalized PDF grid: the probability-weighted node
/// position, assuming the grid integrates to one over its volume.
/// Misfit grids carry no density and are refused.
pub fn grid_expectation(grid: &Grid3) -> Result<Vec3, Error> {
    if grid.hdr.kind == GridKind::Misfit {
        return Err(Error::Unsupported(
            "cannot compute an expectation over a MISFIT grid".to_string(),
        ));
    }

    let hdr = &grid.hdr;
    let mut expect = Vec3::origin();
    for ix in 0..hdr.nx {
        for iy in 0..hdr.ny {
            for iz in 0..hdr.nz {
                let val = grid.value_at(ix, iy, iz) as f64;
                expect[0] += val * ix as f64;
                expect[1] += val * iy as f64;
                expect[2] += val * iz as f64;
            }
        }
    }

    let volume = hdr.dx * hdr.dy * hdr.dz;
    Ok(Vec3::new(
        hdr.origx + expect[0] * hdr.dx * volume,
        hdr.origy + expect[1] * hdr.dy * volume,
        hdr.origz + expect[2] * hdr.dz * volume,
    ))
}

/// Covariance of a normalized PDF grid about `expect`, with the node
/// offsets centred before accumulation
pub fn grid_covariance(grid: &Grid3, expect: &Vec3) -> Result<Mat3, Error> {
    if grid.hdr.kind == GridKind::Misfit {
        return Err(Error::Unsupported(
            "cannot compute a covariance over a MISFIT grid".to_string(),
        ));
    }

    let hdr = &grid.hdr;
    let mut cov = Mat3::zero();
    for ix in 0..hdr.nx {
        let x = hdr.origx + ix as f64 * hdr.dx - expect[0];
        for iy in 0..hdr.ny {
            let y = hdr.origy + iy as f64 * hdr.dy - expect[1];
            for iz in 0..hdr.nz {
                let z = hdr.origz + iz as f64 * hdr.dz - expect[2];
                let val = grid.value_at(ix, iy, iz) as f64;
                if val < 0.0 {
                    log::error!(
                        "'{}': negative PDF value at node {ix} {iy} {iz}",
                        hdr.title
                    );
                    continue;
                }
                cov[0][0] += val * x * x;
                cov[0][1] += val * x * y;
                cov[0][2] += val * x * z;
                cov[1][1] += val * y * y;
                cov[1][2] += val * y * z;
                cov[2][2] += val * z * z;
            }
        }
    }

    let volume = hdr.dx * hdr.dy * hdr.dz;
    for r in 0..3 {
        for c in r..3 {
            cov[r][c] *= volume;
        }
    }
    Ok(symmetrize(cov))
}

// ----- T E S T S ------------------------------------------------------------------
