//! The grid substrate: a typed 3D scalar field with uniform and cascading
//! layouts, indexed access, interpolation and the two-file on-disk format.

pub mod angles;
pub mod cascading;
pub mod interp;
pub mod io;
pub mod kind;

use crate::Error;
use self::cascading::CascadeIndex;
use self::io::SwapMode;
use self::kind::{ElemKind, GridKind};

/// Marker for nodes outside the grid or masked out. Large and negative so
/// it survives min-style compositions without ever looking like a value.
pub(crate) const NO_VALUE: f32 = -1.0e30;

/// Anything at or below this is a no-value marker
pub(crate) const NO_VALUE_THRESHOLD: f32 = -1.0e10;

pub(crate) fn is_no_value(v: f32) -> bool {
    v <= NO_VALUE_THRESHOLD
}

/// At most this many cascading z-merge depths are honored; extra depths
/// are dropped with a warning, as the header field is fixed-width
pub const MAX_MERGE_DEPTHS: usize = 16;

/// The source record carried in time- and angle-grid headers
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Source {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Source {
    #[must_use]
    pub fn new(label: &str, x: f64, y: f64, z: f64) -> Source {
        Source {
            label: label.to_string(),
            x,
            y,
            z,
        }
    }
}

/// Descriptor of an ordered 3D scalar field
#[derive(Debug, Default, Clone)]
pub struct GridHdr {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub origx: f64,
    pub origy: f64,
    pub origz: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub kind: GridKind,
    pub elem: ElemKind,
    /// Byte-order policy applied by the i/o layer
    pub swap: SwapMode,
    /// Monotonically increasing z-merge depths; empty for a regular grid
    pub merge_depths: Vec<f64>,
    /// Source record, present for time/angle grids
    pub source: Option<Source>,
    /// Projection line carried opaquely between header read and write
    pub transform: Option<String>,
    /// Label used in diagnostics, typically the file root
    pub title: String,
}

impl GridHdr {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        origx: f64,
        origy: f64,
        origz: f64,
        dx: f64,
        dy: f64,
        dz: f64,
        kind: GridKind,
    ) -> GridHdr {
        GridHdr {
            nx,
            ny,
            nz,
            origx,
            origy,
            origz,
            dx,
            dy,
            dz,
            kind,
            ..Default::default()
        }
    }

    /// Number of virtual nodes, regardless of layout
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[must_use]
    pub fn is_cascading(&self) -> bool {
        !self.merge_depths.is_empty()
    }

    /// Model coordinates of the last node on each axis
    #[must_use]
    pub fn endx(&self) -> f64 {
        self.origx + (self.nx - 1) as f64 * self.dx
    }

    #[must_use]
    pub fn endy(&self) -> f64 {
        self.origy + (self.ny - 1) as f64 * self.dy
    }

    #[must_use]
    pub fn endz(&self) -> f64 {
        self.origz + (self.nz - 1) as f64 * self.dz
    }

    fn validate(&self) -> Result<(), Error> {
        if self.nx < 1 || self.ny < 1 || self.nz < 1 {
            return Err(Error::Config(format!(
                "'{}': grid dimensions must be positive: {} {} {}",
                self.title, self.nx, self.ny, self.nz
            )));
        }
        if self.dx <= 0.0 || self.dy <= 0.0 || self.dz <= 0.0 {
            return Err(Error::Config(format!(
                "'{}': grid steps must be strictly positive: {} {} {}",
                self.title, self.dx, self.dy, self.dz
            )));
        }
        if !self.merge_depths.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::Config(format!(
                "'{}': cascading merge depths must increase monotonically",
                self.title
            )));
        }
        Ok(())
    }
}

/// An allocated grid: descriptor plus owned value buffer.
///
/// The buffer is flat, `f32`, with the z index varying fastest
/// (`offset = (ix*ny + iy)*nz + iz`). Cascading grids map the virtual
/// `(ix, iy, iz)` through a [`CascadeIndex`] onto a shorter buffer of
/// per-level planes.
#[derive(Debug, Clone)]
pub struct Grid3 {
    pub hdr: GridHdr,
    buf: Vec<f32>,
    cascade: Option<CascadeIndex>,
}

impl Grid3 {
    /// Allocate a zero-initialized grid from a descriptor.
    ///
    /// The total storage size is fixed here once; no subsequent read or
    /// write goes beyond it.
    pub fn allocate(hdr: GridHdr) -> Result<Grid3, Error> {
        let mut hdr = hdr;
        if hdr.merge_depths.len() > MAX_MERGE_DEPTHS {
            log::warn!(
                "'{}': too many cascading grid Z merge depths, only using first {}",
                hdr.title,
                MAX_MERGE_DEPTHS
            );
            hdr.merge_depths.truncate(MAX_MERGE_DEPTHS);
        }
        hdr.validate()?;

        let (cascade, len) = if hdr.is_cascading() {
            let index = CascadeIndex::build(&hdr);
            let len = index.num_cells();
            (Some(index), len)
        } else {
            (None, hdr.num_nodes())
        };

        Ok(Grid3 {
            hdr,
            buf: vec![0.0; len],
            cascade,
        })
    }

    /// Number of stored cells (less than `num_nodes` for cascading grids)
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn buf(&self) -> &[f32] {
        &self.buf
    }

    pub(crate) fn buf_mut(&mut self) -> &mut [f32] {
        &mut self.buf
    }

    pub(crate) fn cascade(&self) -> Option<&CascadeIndex> {
        self.cascade.as_ref()
    }

    /// Flat buffer offset of a virtual node. `None` outside the grid.
    pub(crate) fn offset(&self, ix: usize, iy: usize, iz: usize) -> Option<usize> {
        if ix >= self.hdr.nx || iy >= self.hdr.ny || iz >= self.hdr.nz {
            return None;
        }
        match &self.cascade {
            None => Some((ix * self.hdr.ny + iy) * self.hdr.nz + iz),
            Some(casc) => Some(casc.offset(ix, iy, iz)),
        }
    }

    /// Value at a virtual node, or `None` outside the grid
    #[must_use]
    pub fn get(&self, ix: usize, iy: usize, iz: usize) -> Option<f32> {
        self.offset(ix, iy, iz).map(|o| self.buf[o])
    }

    /// Value at a virtual node; the no-value marker outside the grid.
    ///
    /// This is the sentinel-style access the interpolation and solver inner
    /// loops build on. It never reads outside the buffer.
    #[must_use]
    pub fn value_at(&self, ix: usize, iy: usize, iz: usize) -> f32 {
        self.get(ix, iy, iz).unwrap_or(NO_VALUE)
    }

    /// Store a value at a virtual node. For a cascading grid this writes
    /// the shared physical cell of all virtual nodes mapping there.
    /// Out-of-range indices are ignored and reported by the return value.
    pub fn set(&mut self, ix: usize, iy: usize, iz: usize, value: f32) -> bool {
        match self.offset(ix, iy, iz) {
            Some(o) => {
                self.buf[o] = value;
                true
            }
            None => false,
        }
    }

    /// Fill every cell with `value`
    pub fn init(&mut self, value: f32) {
        self.buf.fill(value);
    }

    /// A new grid with this grid's geometry and values, retyped as `kind`
    #[must_use]
    pub fn duplicate_as(&self, kind: GridKind) -> Grid3 {
        let mut new = self.clone();
        new.hdr.kind = kind;
        if !kind.has_source() {
            new.hdr.source = None;
        }
        new
    }

    /// Model coordinates of node `(ix, iy, iz)`
    #[must_use]
    pub fn node_coords(&self, ix: usize, iy: usize, iz: usize) -> (f64, f64, f64) {
        (
            self.hdr.origx + ix as f64 * self.hdr.dx,
            self.hdr.origy + iy as f64 * self.hdr.dy,
            self.hdr.origz + iz as f64 * self.hdr.dz,
        )
    }

    /// Is the model point inside the grid? The x axis is ignored for
    /// degenerate 2D grids.
    #[must_use]
    pub fn is_inside(&self, x: f64, y: f64, z: f64) -> bool {
        if self.hdr.nx > 1 && (x < self.hdr.origx || x > self.hdr.endx()) {
            return false;
        }
        if y < self.hdr.origy || y > self.hdr.endy() {
            return false;
        }
        if z < self.hdr.origz || z > self.hdr.endz() {
            return false;
        }
        true
    }

    /// Does the model point lie on (within tolerance of) a grid boundary?
    /// The top z face only counts when `check_top` is set.
    #[must_use]
    pub fn on_boundary(
        &self,
        x: f64,
        y: f64,
        z: f64,
        tolerance_xy: f64,
        tolerance_z: f64,
        check_top: bool,
    ) -> bool {
        if self.hdr.nx > 1
            && ((x - self.hdr.origx).abs() <= tolerance_xy
                || (x - self.hdr.endx()).abs() <= tolerance_xy)
        {
            return true;
        }
        if (y - self.hdr.origy).abs() <= tolerance_xy || (y - self.hdr.endy()).abs() <= tolerance_xy
        {
            return true;
        }
        if check_top && (z - self.hdr.origz).abs() <= tolerance_z {
            return true;
        }
        (z - self.hdr.endz()).abs() <= tolerance_z
    }

    /// Same node layout, origin and steps?
    #[must_use]
    pub fn identical_geometry(&self, other: &Grid3) -> bool {
        self.hdr.nx == other.hdr.nx
            && self.hdr.ny == other.hdr.ny
            && self.hdr.nz == other.hdr.nz
            && self.hdr.origx == other.hdr.origx
            && self.hdr.origy == other.hdr.origy
            && self.hdr.origz == other.hdr.origz
            && self.hdr.dx == other.hdr.dx
            && self.hdr.dy == other.hdr.dy
            && self.hdr.dz == other.hdr.dz
    }

    /// Add `factor * other` node by node. Identical geometries add the raw
    /// buffers; otherwise `other` is resampled by interpolation at this
    /// grid's node positions, skipping nodes `other` has no value for.
    pub fn sum_into(&mut self, other: &Grid3, factor: f64) {
        if self.identical_geometry(other) && self.cascade.is_none() && other.cascade.is_none() {
            for (v, o) in self.buf.iter_mut().zip(other.buf.iter()) {
                if !is_no_value(*o) {
                    *v += (factor * *o as f64) as f32;
                }
            }
            return;
        }
        self.resample(other, |old, new| old + factor * new);
    }

    /// Replace the contents with `factor * other`, resampling as needed
    pub fn mul_const(&mut self, other: &Grid3, factor: f64) {
        if self.identical_geometry(other) && self.cascade.is_none() && other.cascade.is_none() {
            for (v, o) in self.buf.iter_mut().zip(other.buf.iter()) {
                if !is_no_value(*o) {
                    *v = (factor * *o as f64) as f32;
                }
            }
            return;
        }
        self.resample(other, |_, new| factor * new);
    }

    fn resample(&mut self, other: &Grid3, combine: impl Fn(f64, f64) -> f64) {
        for ix in 0..self.hdr.nx {
            for iy in 0..self.hdr.ny {
                for iz in 0..self.hdr.nz {
                    let (x, y, z) = self.node_coords(ix, iy, iz);
                    if let Some(new) = other.interp_at(x, y, z) {
                        let old = self.value_at(ix, iy, iz) as f64;
                        self.set(ix, iy, iz, combine(old, new) as f32);
                    }
                }
            }
        }
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn small_grid() -> Grid3 {
        let hdr = GridHdr::new(4, 3, 5, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        Grid3::allocate(hdr).unwrap()
    }

    #[test]
    fn addressing_roundtrip() {
        let mut g = small_grid();
        // Write a distinct value everywhere through the indexed view ...
        for ix in 0..4 {
            for iy in 0..3 {
                for iz in 0..5 {
                    let v = (100 * ix + 10 * iy + iz) as f32;
                    assert!(g.set(ix, iy, iz, v));
                }
            }
        }
        // ... and read the same bits back through both views
        for ix in 0..4 {
            for iy in 0..3 {
                for iz in 0..5 {
                    let v = (100 * ix + 10 * iy + iz) as f32;
                    assert_eq!(g.value_at(ix, iy, iz).to_bits(), v.to_bits());
                    let flat = (ix * 3 + iy) * 5 + iz;
                    assert_eq!(g.buf()[flat].to_bits(), v.to_bits());
                }
            }
        }
    }

    #[test]
    fn out_of_range_is_no_value() {
        let g = small_grid();
        assert!(is_no_value(g.value_at(4, 0, 0)));
        assert!(is_no_value(g.value_at(0, 3, 0)));
        assert!(is_no_value(g.value_at(0, 0, 5)));
        assert_eq!(g.get(17, 0, 0), None);
        assert_eq!(g.get(0, 0, 0), Some(0.0));
    }

    #[test]
    fn validation() {
        let mut hdr = GridHdr::new(0, 3, 5, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        assert!(Grid3::allocate(hdr.clone()).is_err());
        hdr.nx = 4;
        hdr.dz = 0.0;
        assert!(Grid3::allocate(hdr.clone()).is_err());
        hdr.dz = 1.0;
        hdr.merge_depths = vec![2.0, 2.0];
        assert!(Grid3::allocate(hdr.clone()).is_err());
        hdr.merge_depths = vec![2.0, 3.0];
        assert!(Grid3::allocate(hdr).is_ok());
    }

    #[test]
    fn inside_and_boundary() {
        let g = small_grid();
        assert!(g.is_inside(0.0, 0.0, 0.0));
        assert!(g.is_inside(3.0, 2.0, 4.0));
        assert!(!g.is_inside(3.1, 0.0, 0.0));
        assert!(!g.is_inside(0.0, -0.1, 0.0));

        assert!(g.on_boundary(0.0, 1.0, 2.0, 0.01, 0.01, false));
        assert!(g.on_boundary(1.0, 1.0, 4.0, 0.01, 0.01, false));
        // Top face only with check_top
        assert!(!g.on_boundary(1.0, 1.0, 0.0, 0.01, 0.01, false));
        assert!(g.on_boundary(1.0, 1.0, 0.0, 0.01, 0.01, true));
        assert!(!g.on_boundary(1.0, 1.0, 2.0, 0.01, 0.01, true));
    }

    #[test]
    fn sum_and_mul() {
        let mut a = small_grid();
        let mut b = small_grid();
        a.init(1.0);
        b.init(2.0);
        a.sum_into(&b, 3.0);
        assert_eq!(a.value_at(1, 1, 1), 7.0);

        a.mul_const(&b, 0.5);
        assert_eq!(a.value_at(2, 2, 2), 1.0);

        // Resampling path: same extent, half the resolution
        let hdr = GridHdr::new(2, 2, 3, 0., 0., 0., 3., 2., 2., GridKind::Velocity);
        let mut coarse = Grid3::allocate(hdr).unwrap();
        coarse.init(0.0);
        coarse.sum_into(&b, 1.0);
        assert_eq!(coarse.value_at(1, 1, 1), 2.0);
    }

    #[test]
    fn duplicate_keeps_values() {
        let mut g = small_grid();
        g.set(1, 2, 3, 42.0);
        g.hdr.source = Some(Source::new("SRC", 1., 2., 3.));
        let d = g.duplicate_as(GridKind::ProbDensity);
        assert_eq!(d.hdr.kind, GridKind::ProbDensity);
        assert_eq!(d.value_at(1, 2, 3), 42.0);
        // Non-time kinds do not carry a source record
        assert!(d.hdr.source.is_none());
    }
}
