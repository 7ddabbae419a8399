//! Trilinear interpolation against in-memory grids, with the masked-node
//! and packed-angle special cases.

use super::{Grid3, NO_VALUE, is_no_value};

/// Just below the top of a unit cell; keeps a query on the last grid node
/// inside the cell below it
const INDEX_EPSILON: f64 = 1e-9;

/// A query this close to a node snaps to the node value
const NODE_SNAP: f64 = 1e-8;

/// Lagrange (trilinear) interpolation inside a unit cube.
///
/// The fractional position `(xd, yd, zd)` and all eight corner values are
/// given; corner `vKLM` sits at offset (K, L, M) from the lower corner.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub(crate) fn interp_cube_lagrange(
    xd: f64,
    yd: f64,
    zd: f64,
    v000: f64,
    v001: f64,
    v010: f64,
    v011: f64,
    v100: f64,
    v101: f64,
    v110: f64,
    v111: f64,
) -> f64 {
    let mx = 1.0 - xd;
    let my = 1.0 - yd;
    let mz = 1.0 - zd;

    mx * (my * (v000 * mz + v001 * zd) + yd * (v010 * mz + v011 * zd))
        + xd * (my * (v100 * mz + v101 * zd) + yd * (v110 * mz + v111 * zd))
}

/// Bilinear interpolation inside a unit square, for 2D (y, z) grids
#[must_use]
pub(crate) fn interp_square_lagrange(yd: f64, zd: f64, v00: f64, v01: f64, v10: f64, v11: f64) -> f64 {
    v00 * (1.0 - yd) * (1.0 - zd) + v01 * (1.0 - yd) * zd + v10 * yd * (1.0 - zd) + v11 * yd * zd
}

impl Grid3 {
    /// Trilinear interpolation at the model point `(x, y, z)`, as a raw
    /// sentinel-style read: the no-value marker outside the grid or when a
    /// corner is masked (negative on the non-negative-domain kinds).
    ///
    /// Angle grids interpolate through the packed representation (see
    /// [`interp_angles_at`](Self::interp_angles_at)).
    pub(crate) fn interp_raw(&self, x: f64, y: f64, z: f64) -> f32 {
        let xoff = (x - self.hdr.origx) / self.hdr.dx;
        let yoff = (y - self.hdr.origy) / self.hdr.dy;
        let zoff = (z - self.hdr.origz) / self.hdr.dz;

        if self.cascade().is_some() {
            return self.interp_cascading(xoff, yoff, zoff);
        }

        let ix0 = (xoff - INDEX_EPSILON).max(0.0) as usize;
        let iy0 = (yoff - INDEX_EPSILON).max(0.0) as usize;
        let iz0 = (zoff - INDEX_EPSILON).max(0.0) as usize;

        let ix1 = (ix0 + 1).min(self.hdr.nx - 1);
        let iy1 = (iy0 + 1).min(self.hdr.ny - 1);
        let iz1 = (iz0 + 1).min(self.hdr.nz - 1);

        let xd = xoff - ix0 as f64;
        let yd = yoff - iy0 as f64;
        let zd = zoff - iz0 as f64;
        if !(0.0..=1.0).contains(&xd) || !(0.0..=1.0).contains(&yd) || !(0.0..=1.0).contains(&zd) {
            return NO_VALUE;
        }

        // Right on a node: no interpolation
        if xd + yd + zd < NODE_SNAP {
            return self.value_at(ix0, iy0, iz0);
        }

        let v000 = self.value_at(ix0, iy0, iz0);
        let v001 = self.value_at(ix0, iy0, iz1);
        let v010 = self.value_at(ix0, iy1, iz0);
        let v011 = self.value_at(ix0, iy1, iz1);
        let v100 = self.value_at(ix1, iy0, iz0);
        let v101 = self.value_at(ix1, iy0, iz1);
        let v110 = self.value_at(ix1, iy1, iz0);
        let v111 = self.value_at(ix1, iy1, iz1);

        if self.hdr.kind.is_angle() {
            return super::angles::interp_cube_angles(
                xd, yd, zd, v000, v001, v010, v011, v100, v101, v110, v111,
            );
        }

        // Masked nodes poison the whole cell
        if [v000, v001, v010, v011, v100, v101, v110, v111]
            .iter()
            .any(|v| *v < 0.0)
        {
            return NO_VALUE;
        }

        interp_cube_lagrange(
            xd,
            yd,
            zd,
            v000 as f64,
            v001 as f64,
            v010 as f64,
            v011 as f64,
            v100 as f64,
            v101 as f64,
            v110 as f64,
            v111 as f64,
        ) as f32
    }

    /// Trilinear interpolation at the model point `(x, y, z)`.
    ///
    /// `None` outside the grid and for cells with masked corners, so the
    /// result composes cleanly with further arithmetic.
    #[must_use]
    pub fn interp_at(&self, x: f64, y: f64, z: f64) -> Option<f64> {
        let v = self.interp_raw(x, y, z);
        if is_no_value(v) {
            return None;
        }
        Some(v as f64)
    }

    /// Bilinear interpolation over (y, z) for degenerate 2D grids
    #[must_use]
    pub fn interp_at_2d(&self, y: f64, z: f64) -> Option<f64> {
        let yoff = (y - self.hdr.origy) / self.hdr.dy;
        let zoff = (z - self.hdr.origz) / self.hdr.dz;

        let iy0 = (yoff - INDEX_EPSILON).max(0.0) as usize;
        let iz0 = (zoff - INDEX_EPSILON).max(0.0) as usize;
        let iy1 = (iy0 + 1).min(self.hdr.ny - 1);
        let iz1 = (iz0 + 1).min(self.hdr.nz - 1);

        let yd = yoff - iy0 as f64;
        let zd = zoff - iz0 as f64;
        if !(0.0..=1.0).contains(&yd) || !(0.0..=1.0).contains(&zd) {
            return None;
        }

        let v00 = self.value_at(0, iy0, iz0);
        let v01 = self.value_at(0, iy0, iz1);
        let v10 = self.value_at(0, iy1, iz0);
        let v11 = self.value_at(0, iy1, iz1);
        if [v00, v01, v10, v11].iter().any(|v| is_no_value(*v)) {
            return None;
        }

        Some(interp_square_lagrange(
            yd, zd, v00 as f64, v01 as f64, v10 as f64, v11 as f64,
        ))
    }
}

// ----- T E S T S ------------------------------------------------------------------
