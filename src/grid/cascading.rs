//! The cascading grid layout: xy-resolution coarsening by factors of two
//! below configured merge depths, to keep deep, low-resolution regions
//! cheap in memory.
//!
//! One logical field stays addressable through the virtual regular index
//! `(ix, iy, iz)`; the index tables built here map every virtual node onto
//! a unique physical cell in a buffer of per-level xy-planes.

use super::{Grid3, GridHdr, NO_VALUE, is_no_value};
use super::interp::interp_cube_lagrange;

/// One physical xy-plane of the cascading buffer
#[derive(Debug, Clone)]
pub(crate) struct Plane {
    /// Element offset of the plane within the buffer
    pub offset: usize,
    /// Coarse node counts, `ceil(n_virtual / scale)` per axis
    pub nx: usize,
    pub ny: usize,
    /// The xy merge factor of the level this plane belongs to
    pub scale: usize,
    /// First virtual z index mapping onto this plane
    pub iz_base: usize,
}

/// Index tables mapping virtual node indices onto the physical buffer
#[derive(Debug, Clone)]
pub(crate) struct CascadeIndex {
    /// Virtual iz -> physical plane index
    zindex: Vec<usize>,
    /// Virtual iz -> xy merge factor at that depth
    scale: Vec<usize>,
    planes: Vec<Plane>,
    num_cells: usize,
}

fn coarse_count(n: usize, scale: usize) -> usize {
    (n + scale - 1) / scale
}

impl CascadeIndex {
    /// Walk the z axis from top to bottom, doubling the merge factor at
    /// every configured merge depth. A doubling is held back until the
    /// current cascade cell is complete, so every physical plane spans a
    /// whole number of virtual z steps (except possibly the deepest one).
    pub fn build(hdr: &GridHdr) -> CascadeIndex {
        let mut zindex = Vec::with_capacity(hdr.nz);
        let mut scale_per_z = Vec::with_capacity(hdr.nz);
        let mut planes: Vec<Plane> = Vec::new();
        let mut num_cells = 0;

        let mut level = 0;
        let mut scale = 1;
        // Virtual z steps taken within the current level
        let mut within = 0;

        for iz in 0..hdr.nz {
            let depth = hdr.origz + iz as f64 * hdr.dz;
            while level < hdr.merge_depths.len()
                && depth >= hdr.merge_depths[level]
                && within % scale == 0
            {
                level += 1;
                scale *= 2;
                within = 0;
            }
            if within % scale == 0 {
                planes.push(Plane {
                    offset: num_cells,
                    nx: coarse_count(hdr.nx, scale),
                    ny: coarse_count(hdr.ny, scale),
                    scale,
                    iz_base: iz,
                });
                num_cells += coarse_count(hdr.nx, scale) * coarse_count(hdr.ny, scale);
                within = 0;
            }
            zindex.push(planes.len() - 1);
            scale_per_z.push(scale);
            within += 1;
        }

        if let Some(last) = hdr.merge_depths.last() {
            if *last > hdr.endz() {
                log::warn!(
                    "'{}': z merge depth {} below grid bottom {}",
                    hdr.title,
                    last,
                    hdr.endz()
                );
            }
        }

        CascadeIndex {
            zindex,
            scale: scale_per_z,
            planes,
            num_cells,
        }
    }

    /// Total physical cell count; fixes the buffer size at allocation
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub(crate) fn plane(&self, p: usize) -> &Plane {
        &self.planes[p]
    }

    /// Physical plane index of a virtual z
    pub fn zindex(&self, iz: usize) -> usize {
        self.zindex[iz]
    }

    /// xy merge factor at a virtual z
    pub fn scale(&self, iz: usize) -> usize {
        self.scale[iz]
    }

    /// Buffer offset of the physical cell holding virtual node `(ix, iy, iz)`.
    /// Callers guarantee in-range virtual indices.
    pub fn offset(&self, ix: usize, iy: usize, iz: usize) -> usize {
        let plane = &self.planes[self.zindex[iz]];
        let ixp = ix / plane.scale;
        let iyp = iy / plane.scale;
        plane.offset + ixp * plane.ny + iyp
    }

    /// Buffer offset by physical (coarse) indices within plane `p`,
    /// `None` outside the plane
    fn coarse_offset(&self, ixp: usize, iyp: usize, p: usize) -> Option<usize> {
        let plane = &self.planes[p];
        if ixp >= plane.nx || iyp >= plane.ny {
            return None;
        }
        Some(plane.offset + ixp * plane.ny + iyp)
    }
}

/// The corner indices and rescaled fractional coordinate along one xy axis
/// of the interpolation cell. At a resolution transition the upper (finer)
/// corners are aligned on an even coarse index so the bilinear fan matches
/// the single coarser cell below; inside the truncated final cell of a
/// scale the fraction is measured against the shortened cell width.
struct AxisCell {
    i0_up: usize,
    i1_up: usize,
    i0_dn: usize,
    i1_dn: usize,
    frac: f64,
}

fn axis_cell(f: f64, n: usize, scale: usize, rescale: bool, up_max: usize, dn_max: usize) -> AxisCell {
    let i = f as usize;
    let i0 = i / scale;

    let (i0_up, i1_up, i0_dn, i1_dn, scale_use) = if rescale {
        let scale_use = 2 * scale;
        let i0_up = 2 * (i0 / 2);
        let i1_up = (i0_up + 2).min(up_max);
        let i0_dn = i0_up / 2;
        let i1_dn = (i0_dn + 1).min(dn_max);
        (i0_up, i1_up, i0_dn, i1_dn, scale_use)
    } else {
        let i1 = (i0 + 1).min(up_max);
        (i0, i1, i0, i1, scale)
    };

    // Virtual index of the end of the last complete cell at this width
    let last_aligned = ((n - 1) / scale_use) * scale_use;
    let frac = if i > last_aligned {
        (f - last_aligned as f64) / (n - 1 - last_aligned) as f64
    } else {
        (f % scale_use as f64) / scale_use as f64
    };

    AxisCell {
        i0_up,
        i1_up,
        i0_dn,
        i1_dn,
        frac,
    }
}

impl Grid3 {
    /// Trilinear interpolation on a cascading grid at the continuous
    /// virtual index `(fx, fy, fz)`. Returns the no-value marker outside
    /// the grid or when a corner is masked.
    pub(crate) fn interp_cascading(&self, fx: f64, fy: f64, fz: f64) -> f32 {
        let casc = match self.cascade() {
            Some(c) => c,
            None => return NO_VALUE,
        };
        let hdr = &self.hdr;
        let (ix, iy, iz) = (fx as usize, fy as usize, fz as usize);
        if fx < 0.0 || fy < 0.0 || fz < 0.0 || ix >= hdr.nx || iy >= hdr.ny || iz >= hdr.nz {
            return NO_VALUE;
        }

        let scale = casc.scale(iz);
        let z0 = casc.zindex(iz);

        // Does the next physical level below change the xy resolution?
        let rescale = z0 + 1 < casc.num_planes() && casc.plane(z0 + 1).scale > scale;

        let z1 = (z0 + 1).min(casc.num_planes() - 1);
        let up_max_x = casc.plane(z0).nx - 1;
        let up_max_y = casc.plane(z0).ny - 1;
        let dn_max_x = casc.plane(z1).nx - 1;
        let dn_max_y = casc.plane(z1).ny - 1;

        let cx = axis_cell(fx, hdr.nx, scale, rescale, up_max_x, dn_max_x);
        let cy = axis_cell(fy, hdr.ny, scale, rescale, up_max_y, dn_max_y);

        // Fraction of the current plane's z extent
        let zdiff = (fz - casc.plane(z0).iz_base as f64) / scale as f64;
        if !(0.0..=1.0).contains(&cx.frac)
            || !(0.0..=1.0).contains(&cy.frac)
            || !(0.0..=1.0).contains(&zdiff)
        {
            return NO_VALUE;
        }

        let read = |ixp, iyp, p| -> f32 {
            match casc.coarse_offset(ixp, iyp, p) {
                Some(o) => self.buf()[o],
                None => NO_VALUE,
            }
        };

        let v000 = read(cx.i0_up, cy.i0_up, z0);
        let v001 = read(cx.i0_dn, cy.i0_dn, z1);
        let v010 = read(cx.i0_up, cy.i1_up, z0);
        let v011 = read(cx.i0_dn, cy.i1_dn, z1);
        let v100 = read(cx.i1_up, cy.i0_up, z0);
        let v101 = read(cx.i1_dn, cy.i0_dn, z1);
        let v110 = read(cx.i1_up, cy.i1_up, z0);
        let v111 = read(cx.i1_dn, cy.i1_dn, z1);

        if [v000, v001, v010, v011, v100, v101, v110, v111]
            .iter()
            .any(|v| is_no_value(*v) || *v < 0.0)
        {
            return NO_VALUE;
        }

        interp_cube_lagrange(
            cx.frac,
            cy.frac,
            zdiff,
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
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::kind::GridKind;

    fn cascading_hdr(nx: usize, ny: usize, nz: usize, depths: &[f64]) -> GridHdr {
        let mut hdr = GridHdr::new(nx, ny, nz, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        hdr.merge_depths = depths.to_vec();
        hdr
    }

    #[test]
    fn allocation_sizes() {
        // 100x100x200 grid with merges at 50, 100, 150 km: four levels
        // with plane sizes 100^2, 50^2, 25^2 and 13^2
        let hdr = cascading_hdr(100, 100, 200, &[50., 100., 150.]);
        let casc = CascadeIndex::build(&hdr);

        let mut seen = [false; 4];
        for p in 0..casc.num_planes() {
            let plane = casc.plane(p);
            let (n, level) = match plane.scale {
                1 => (100, 0),
                2 => (50, 1),
                4 => (25, 2),
                8 => (13, 3),
                _ => panic!("unexpected scale {}", plane.scale),
            };
            assert_eq!(plane.nx, n);
            assert_eq!(plane.ny, n);
            seen[level] = true;
        }
        assert_eq!(seen, [true; 4]);

        // Scale 1 above the first merge depth, then doubling
        assert_eq!(casc.scale(0), 1);
        assert_eq!(casc.scale(49), 1);
        assert_eq!(casc.scale(50), 2);
        assert_eq!(casc.scale(100), 4);

        // 50 full planes + 25 + 13 (rounded up from 12.5) + the rest
        let full: usize = (0..casc.num_planes())
            .map(|p| casc.plane(p).nx * casc.plane(p).ny)
            .sum();
        assert_eq!(casc.num_cells(), full);
        // Far smaller than the virtual grid
        assert!(casc.num_cells() < 100 * 100 * 200 / 2);
    }

    #[test]
    fn virtual_to_physical_is_unique_per_cell() {
        let hdr = cascading_hdr(9, 9, 12, &[4., 8.]);
        let grid = Grid3::allocate(hdr).unwrap();
        let casc = grid.cascade().unwrap();

        // Every virtual index maps inside the buffer
        let mut hit = vec![false; casc.num_cells()];
        for ix in 0..9 {
            for iy in 0..9 {
                for iz in 0..12 {
                    let o = casc.offset(ix, iy, iz);
                    assert!(o < casc.num_cells());
                    hit[o] = true;
                }
            }
        }
        // ... and every physical cell is reachable
        assert!(hit.iter().all(|h| *h));
    }

    #[test]
    fn roundtrip_through_virtual_index() {
        let hdr = cascading_hdr(8, 8, 8, &[4.]);
        let mut grid = Grid3::allocate(hdr).unwrap();
        grid.set(7, 7, 7, 3.25);
        assert_eq!(grid.value_at(7, 7, 7), 3.25);
        // Virtual neighbors within the same coarse cell share storage
        assert_eq!(grid.value_at(6, 6, 6), 3.25);
        // A different coarse cell does not
        assert_eq!(grid.value_at(5, 5, 5), 0.0);
    }

    #[test]
    fn constant_field_interpolates_seamlessly() {
        // A constant field must interpolate to the constant everywhere,
        // in particular across the resolution transitions
        let hdr = cascading_hdr(11, 11, 20, &[5., 10.]);
        let mut grid = Grid3::allocate(hdr).unwrap();
        grid.init(7.5);

        let mut f = 0.0;
        while f < 19.0 {
            let v = grid.interp_cascading(f * 10.0 / 19.0, f / 2.0, f);
            assert!(
                (v - 7.5).abs() < 1e-6,
                "seam at fz = {f}: got {v} instead of 7.5"
            );
            f += 0.37;
        }
    }

    #[test]
    fn interp_matches_node_values_on_coarse_nodes() {
        let hdr = cascading_hdr(8, 8, 10, &[4.]);
        let mut grid = Grid3::allocate(hdr).unwrap();
        // A field linear in z, constant per plane
        for iz in 0..10 {
            for ix in 0..8 {
                for iy in 0..8 {
                    grid.set(ix, iy, iz, (10 * grid.cascade().unwrap().zindex(iz)) as f32);
                }
            }
        }
        // At a plane's base the interpolated value equals the plane value
        let casc_z = grid.cascade().unwrap().zindex(6);
        let base = grid.cascade().unwrap().plane(casc_z).iz_base as f64;
        let v = grid.interp_cascading(0.0, 0.0, base);
        assert_eq!(v, (10 * casc_z) as f32);
    }
}
