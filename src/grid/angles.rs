//! Take-off angles packed into one 32-bit grid slot.
//!
//! The high half word carries the azimuth as tenths of a degree, the low
//! half word carries `quality + ANGLES_OFFSET * round(10 * dip)`. A 2D
//! grid cannot know the real azimuth, so a reverse-sense marker in the
//! azimuth field tells the reader whether to take the station azimuth as
//! is or turned by 180°.

use super::{Grid3, NO_VALUE, is_no_value};
use super::interp::interp_cube_lagrange;

/// Multiplier separating quality from dip in the low half word
const ANGLES_OFFSET: u16 = 16;

/// Azimuth raw value marking the reverse sense of a 2D grid; decodes far
/// outside [0, 360]
const AZIMUTH_REVERSE_RAW: u16 = 9999;

/// Below this quality, cube interpolation degrades to nearest-corner
pub(crate) const ANGLE_QUALITY_CUTOFF: i32 = 5;

/// A take-off angle set packed into a 32-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeOffAngles(u32);

impl TakeOffAngles {
    /// Pack an azimuth/dip/quality triple. Angles in degrees, the azimuth
    /// in [0, 360], the dip in [0, 180], quality in [0, 10]. A negative
    /// azimuth encodes the reverse-sense marker used by 2D grids.
    #[must_use]
    pub fn pack(azimuth: f64, dip: f64, quality: i32) -> TakeOffAngles {
        let hi = if azimuth < 0.0 {
            AZIMUTH_REVERSE_RAW
        } else {
            (0.5 + 10.0 * azimuth) as u16
        };
        let lo = quality as u16 + ANGLES_OFFSET * ((0.5 + 10.0 * dip) as u16);
        TakeOffAngles(((hi as u32) << 16) | lo as u32)
    }

    /// Unpack into `(azimuth, dip, quality)`
    #[must_use]
    pub fn unpack(&self) -> (f64, f64, i32) {
        let hi = (self.0 >> 16) as u16;
        let lo = (self.0 & 0xffff) as u16;
        let azimuth = hi as f64 / 10.0;
        let dip = (lo / ANGLES_OFFSET) as f64 / 10.0;
        let quality = (lo % ANGLES_OFFSET) as i32;
        (azimuth, dip, quality)
    }

    /// The null angle set: out-of-range placeholders, quality zero
    #[must_use]
    pub fn null() -> TakeOffAngles {
        TakeOffAngles::pack(400.0, 200.0, 0)
    }

    /// Reverse-sense marker set (2D grids)?
    #[must_use]
    pub fn is_reverse(&self) -> bool {
        (self.0 >> 16) as u16 == AZIMUTH_REVERSE_RAW
    }

    /// On a 2D grid the stored azimuth is a placeholder; substitute the
    /// real station azimuth, turned 180° for the reverse sense.
    #[must_use]
    pub fn resolve_2d(&self, station_azimuth: f64) -> TakeOffAngles {
        let (azimuth, dip, quality) = self.unpack();
        let azimuth = if azimuth <= 360.0 {
            station_azimuth
        } else {
            let mut az = station_azimuth - 180.0;
            if az < 0.0 {
                az += 360.0;
            }
            az
        };
        TakeOffAngles::pack(azimuth, dip, quality)
    }

    /// Reinterpret a grid slot as packed angles
    #[must_use]
    pub fn from_float(f: f32) -> TakeOffAngles {
        TakeOffAngles(f.to_bits())
    }

    /// The packed word as a grid slot
    #[must_use]
    pub fn to_float(&self) -> f32 {
        f32::from_bits(self.0)
    }
}

/// Interpolate packed angles inside a unit cube.
///
/// Azimuths are corrected into the ±360° branch of the reference corner
/// first, so no two corners differ by more than the cube can represent
/// monotonically; if any corner quality falls below the cutoff the nearest
/// corner wins over interpolation.
#[allow(clippy::too_many_arguments)]
pub(crate) fn interp_cube_angles(
    xd: f64,
    yd: f64,
    zd: f64,
    v000: f32,
    v001: f32,
    v010: f32,
    v011: f32,
    v100: f32,
    v101: f32,
    v110: f32,
    v111: f32,
) -> f32 {
    let corners = [v000, v001, v010, v011, v100, v101, v110, v111];
    if corners.iter().any(|v| is_no_value(*v)) {
        return NO_VALUE;
    }

    let mut azim = [0.0; 8];
    let mut dip = [0.0; 8];
    let mut qual_low = i32::MAX;
    for (n, v) in corners.iter().enumerate() {
        let (a, d, q) = TakeOffAngles::from_float(*v).unpack();
        azim[n] = a;
        dip[n] = d;
        qual_low = qual_low.min(q);
    }

    // Correct azimuths to avoid the discontinuity at 0/360°
    let azim_ref = azim[0];
    for a in azim.iter_mut() {
        let test = *a - azim_ref;
        if test < -90.0 {
            *a += 360.0;
        } else if test > 90.0 {
            *a -= 360.0;
        }
    }

    if qual_low < ANGLE_QUALITY_CUTOFF {
        // Too poor to interpolate, use the nearest node
        return v000;
    }

    let mut azim_interp = interp_cube_lagrange(
        xd, yd, zd, azim[0], azim[1], azim[2], azim[3], azim[4], azim[5], azim[6], azim[7],
    );
    if azim_interp < 0.0 {
        azim_interp += 360.0;
    } else if azim_interp > 360.0 {
        azim_interp -= 360.0;
    }
    let dip_interp = interp_cube_lagrange(
        xd, yd, zd, dip[0], dip[1], dip[2], dip[3], dip[4], dip[5], dip[6], dip[7],
    );

    TakeOffAngles::pack(azim_interp, dip_interp, qual_low).to_float()
}

impl Grid3 {
    /// Interpolated take-off angles at the model point, `None` outside
    /// the grid
    #[must_use]
    pub fn interp_angles_at(&self, x: f64, y: f64, z: f64) -> Option<TakeOffAngles> {
        let v = self.interp_raw(x, y, z);
        if is_no_value(v) {
            return None;
        }
        Some(TakeOffAngles::from_float(v))
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrip() {
        let packed = TakeOffAngles::pack(288.007, 84.5079, 7);
        let (az, dip, qual) = packed.unpack();
        assert!((az - 288.007).abs() < 0.1);
        assert!((dip - 84.5079).abs() < 0.1);
        assert_eq!(qual, 7);
    }

    #[test]
    fn grid_slot_roundtrip() {
        let packed = TakeOffAngles::pack(123.4, 56.7, 9);
        let through_grid = TakeOffAngles::from_float(packed.to_float());
        assert_eq!(packed, through_grid);
    }

    #[test]
    fn null_is_out_of_range() {
        let (az, dip, qual) = TakeOffAngles::null().unpack();
        assert!(az > 360.0);
        assert!(dip > 180.0);
        assert_eq!(qual, 0);
    }

    #[test]
    fn reverse_sense() {
        let reverse = TakeOffAngles::pack(-1.0, 65.0, 8);
        assert!(reverse.is_reverse());
        let (az, _, _) = reverse.resolve_2d(30.0).unpack();
        assert!((az - 210.0).abs() < 0.1);

        let forward = TakeOffAngles::pack(0.0, 65.0, 8);
        assert!(!forward.is_reverse());
        let (az, dip, qual) = forward.resolve_2d(30.0).unpack();
        assert!((az - 30.0).abs() < 0.1);
        assert!((dip - 65.0).abs() < 0.1);
        assert_eq!(qual, 8);
    }

    #[test]
    fn cube_interpolation_handles_north_crossing() {
        // Azimuths straddling 0/360 must not average to ~180
        let lo = TakeOffAngles::pack(350.0, 45.0, 9).to_float();
        let hi = TakeOffAngles::pack(10.0, 45.0, 9).to_float();
        let v = interp_cube_angles(0.5, 0.5, 0.5, lo, hi, lo, hi, lo, hi, lo, hi);
        let (az, dip, qual) = TakeOffAngles::from_float(v).unpack();
        assert!(az < 20.0 || az > 340.0, "azimuth {az} leaked across north");
        assert!((dip - 45.0).abs() < 0.1);
        assert_eq!(qual, 9);
    }

    #[test]
    fn poor_quality_uses_nearest_corner() {
        let good = TakeOffAngles::pack(100.0, 10.0, 9).to_float();
        let poor = TakeOffAngles::pack(200.0, 80.0, 1).to_float();
        let v = interp_cube_angles(0.9, 0.9, 0.9, good, poor, poor, poor, poor, poor, poor, poor);
        // Nearest corner is v000 by convention
        assert_eq!(v.to_bits(), good.to_bits());
    }
}
