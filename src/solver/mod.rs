//! First-arrival travel times on a spherical shell, by expanding-box
//! finite differences.
//!
//! The internal frame is x = longitude (radians), y = geocentric
//! colatitude (radians, increasing southward) and z = distance below the
//! grid-origin shell, with the radius decreasing inward:
//! `r(iz) = z0r - iz*h`. A box around the source grows one cell per side
//! and iteration; every new face cell takes the minimum causal time over
//! the applicable stencils, visited in ascending order of the upwind
//! neighbour's time. A 2D planar candidate clearly beating the 3D ones
//! marks a head wave along that face; faces with head waves trigger
//! reverse sweeps from the boundary, within a configured restart budget.

mod stencil;

use crate::grid::kind::GridKind;
use crate::grid::{Grid3, Source};
use crate::mathlib::spherical::{geocentric_latitude, EARTH_RADIUS};
use crate::mathlib::vector::Vec3;
use crate::Error;
use std::f64::consts::FRAC_PI_2;
use self::stencil::{fdsph1d, fdsph2d, fdsph3d, fdsphne, fdsphnf, upwind_axes, T_REJECT, T_UNSET};

/// One of the six sides of the expanding box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    XLow,
    XHigh,
    YLow,
    YHigh,
    ZLow,
    ZHigh,
}

impl Face {
    pub(crate) const ALL: [Face; 6] = [
        Face::XLow,
        Face::XHigh,
        Face::YLow,
        Face::YHigh,
        Face::ZLow,
        Face::ZHigh,
    ];

    pub(crate) fn index(&self) -> usize {
        match self {
            Face::XLow => 0,
            Face::XHigh => 1,
            Face::YLow => 2,
            Face::YHigh => 3,
            Face::ZLow => 4,
            Face::ZHigh => 5,
        }
    }

    fn axis(&self) -> usize {
        self.index() / 2
    }

    /// +1 for the high side, -1 for the low side
    fn dir(&self) -> i64 {
        if self.index() % 2 == 1 {
            1
        } else {
            -1
        }
    }

    fn opposite(&self) -> Face {
        Face::ALL[self.index() ^ 1]
    }
}

/// A seismic source in geographic coordinates
#[derive(Debug, Clone)]
pub struct SrcLoc {
    pub label: String,
    /// Geodetic latitude, degrees
    pub lat: f64,
    /// Longitude, degrees
    pub lon: f64,
    /// Depth below the grid-top shell, km
    pub depth: f64,
}

impl SrcLoc {
    #[must_use]
    pub fn new(label: &str, lat: f64, lon: f64, depth: f64) -> SrcLoc {
        SrcLoc {
            label: label.to_string(),
            lat,
            lon,
            depth,
        }
    }
}

/// Tuning knobs of the solver, passed explicitly; the solver keeps no
/// state between calls
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Half-width of the constant-slowness init cube around the source
    pub ncube: usize,
    /// Fraction of `s*d` by which a planar candidate must beat the 3D
    /// candidates to count as a head wave
    pub headtest: f64,
    /// Budget of reverse-propagation restarts
    pub max_restarts: usize,
    /// Optional cap on the expansion radius, in cells, for
    /// offset-limited computation
    pub max_radius: Option<usize>,
    /// Face preferred for the first reverse sweep, when triggered
    pub restart_face: Option<Face>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            ncube: 2,
            headtest: 1.0e-3,
            max_restarts: 10,
            max_radius: None,
            restart_face: None,
        }
    }
}

/// What the solver did, beyond the time field itself
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Head-wave triggers per face in the final sweep
    pub head_waves: [usize; 6],
    /// Reverse sweeps performed
    pub restarts: usize,
    /// False when the restart budget ran out with triggers remaining;
    /// the field is still usable, the caller decides
    pub converged: bool,
}

/// The geographic embedding of a solver grid
#[derive(Debug, Clone)]
pub struct SphericalFrame {
    /// Longitude of the x origin, radians
    pub lon0: f64,
    /// Geocentric colatitude of the y origin, radians; y runs south
    pub colat0: f64,
    /// Radius of the iz = 0 shell, km
    pub z0r: f64,
    /// Depth of the iz = 0 shell, km
    pub top_depth: f64,
    /// Radial step, km
    pub h: f64,
    /// Colatitude step, radians
    pub dq: f64,
    /// Longitude step, radians
    pub df: f64,
}

impl SphericalFrame {
    /// A frame anchored at geographic `(lat0, lon0)` degrees with the grid
    /// top at `top_depth` km and a nominal cubic cell of `h` km.
    ///
    /// The angular steps default to `dq = h/R` and `df = h/(R sin q0)`, so
    /// cells near the origin are h-cubes.
    #[must_use]
    pub fn new(lat0: f64, lon0: f64, top_depth: f64, h: f64) -> SphericalFrame {
        let colat0 = FRAC_PI_2 - geocentric_latitude(lat0.to_radians(), true);
        SphericalFrame {
            lon0: lon0.to_radians(),
            colat0,
            z0r: EARTH_RADIUS - top_depth,
            top_depth,
            h,
            dq: h / EARTH_RADIUS,
            df: h / (EARTH_RADIUS * colat0.sin()),
        }
    }

    /// Continuous grid index of a geographic position
    #[must_use]
    pub fn grid_coords(&self, lat: f64, lon: f64, depth: f64) -> (f64, f64, f64) {
        let colat = FRAC_PI_2 - geocentric_latitude(lat.to_radians(), true);
        (
            (lon.to_radians() - self.lon0) / self.df,
            (colat - self.colat0) / self.dq,
            (depth - self.top_depth) / self.h,
        )
    }

    /// Cartesian position of a continuous grid index, km from Earth centre.
    /// Used for source seeding, where spherical increments would break down
    /// right at the singularity.
    #[must_use]
    pub fn node_cart(&self, fx: f64, fy: f64, fz: f64) -> Vec3 {
        let lon = self.lon0 + fx * self.df;
        let q = self.colat0 + fy * self.dq;
        let r = self.z0r - fz * self.h;
        Vec3::new(r * q.sin() * lon.cos(), r * q.sin() * lon.sin(), r * q.cos())
    }

    /// Metric length of one grid step along `axis`, at the continuous
    /// grid position `(fy, fz)`
    fn step_km(&self, axis: usize, fy: f64, fz: f64) -> f64 {
        let r = self.z0r - fz * self.h;
        match axis {
            0 => r * (self.colat0 + fy * self.dq).sin() * self.df,
            1 => r * self.dq,
            _ => self.h,
        }
    }
}

struct Bounds {
    lo: [i64; 3],
    hi: [i64; 3],
}

struct Engine<'a> {
    n: [i64; 3],
    t: Vec<f64>,
    s: Vec<f64>,
    frame: &'a SphericalFrame,
    cfg: &'a SolverConfig,
    head: [usize; 6],
}

impl<'a> Engine<'a> {
    fn idx(&self, p: [i64; 3]) -> usize {
        ((p[0] * self.n[1] + p[1]) * self.n[2] + p[2]) as usize
    }

    fn in_range(&self, p: [i64; 3]) -> bool {
        (0..3).all(|k| p[k] >= 0 && p[k] < self.n[k])
    }

    /// Time at a node; the unset placeholder outside the grid, so
    /// out-of-range neighbours never feed a stencil
    fn time(&self, p: [i64; 3]) -> f64 {
        if !self.in_range(p) {
            return T_UNSET;
        }
        self.t[self.idx(p)]
    }

    fn slow(&self, p: [i64; 3]) -> f64 {
        let q = [
            p[0].clamp(0, self.n[0] - 1),
            p[1].clamp(0, self.n[1] - 1),
            p[2].clamp(0, self.n[2] - 1),
        ];
        self.s[self.idx(q)]
    }

    /// Mean slowness over the corners of the cell spanned by `p` and the
    /// offsets in `span`
    fn cell_slowness(&self, p: [i64; 3], span: [i64; 3]) -> f64 {
        let mut sum = 0.0;
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    let q = [p[0] + i * span[0], p[1] + j * span[1], p[2] + k * span[2]];
                    sum += self.slow(q);
                }
            }
        }
        sum / 8.0
    }

    /// Step lengths of the cell spanned by `p` and `span`, per global axis
    fn cell_steps(&self, p: [i64; 3], span: [i64; 3]) -> [f64; 3] {
        let fy = p[1] as f64 + span[1] as f64 * 0.5;
        let fz = p[2] as f64 + span[2] as f64 * 0.5;
        [
            self.frame.step_km(0, fy, fz),
            self.frame.step_km(1, fy, fz),
            self.frame.step_km(2, fy, fz),
        ]
    }

    fn valid(u: f64) -> bool {
        u < T_UNSET
    }

    /// Candidate times for the new cell `p` on a face with normal `axis`,
    /// growing in direction `dir`. Returns the best value and bumps the
    /// head-wave counter of `face` when the planar candidate wins clearly.
    fn update_cell(&mut self, p: [i64; 3], face: Face) {
        let axis = face.axis();
        let dir = face.dir();
        let (aa, bb) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };

        let mut behind = p;
        behind[axis] -= dir;

        let mut best3d = T_REJECT;
        let mut best2d = T_REJECT;
        let mut best1d = T_REJECT;

        let quadrants = [(-1_i64, -1_i64), (-1, 1), (1, -1), (1, 1)];

        // 3D transmission on the four corner cells behind the face
        for (sa, sb) in quadrants {
            let mut span = [0; 3];
            span[axis] = -dir;
            span[aa] = sa;
            span[bb] = sb;

            let mut tc = [0.0; 7];
            for i in 0..2_i64 {
                for j in 0..2_i64 {
                    for k in 0..2_i64 {
                        if i == 1 && j == 1 && k == 1 {
                            continue;
                        }
                        let mut c = p;
                        if i == 0 {
                            c[axis] -= dir;
                        }
                        if j == 0 {
                            c[aa] += sa;
                        }
                        if k == 0 {
                            c[bb] += sb;
                        }
                        tc[(i * 4 + j * 2 + k) as usize] = self.time(c);
                    }
                }
            }

            let steps = self.cell_steps(p, span);
            let sbar = self.cell_slowness(p, span);
            let u = fdsph3d(&tc, sbar, steps[axis], steps[aa], steps[bb]);
            best3d = best3d.min(u);
        }

        // New-edge fallback when no corner cell was complete
        if !Self::valid(best3d) {
            for (sa, sb) in quadrants {
                let mut span = [0; 3];
                span[axis] = -dir;
                span[aa] = sa;
                span[bb] = sb;

                let mut pj = p;
                pj[aa] += sa;
                let mut pk = p;
                pk[bb] += sb;
                let mut bj = behind;
                bj[aa] += sa;
                let mut bk = behind;
                bk[bb] += sb;

                let steps = self.cell_steps(p, span);
                let sbar = self.cell_slowness(p, span);
                let u = fdsphne(
                    self.time(behind),
                    self.time(pj),
                    self.time(bj),
                    self.time(pk),
                    self.time(bk),
                    sbar,
                    steps[axis],
                    steps[aa],
                    steps[bb],
                );
                best3d = best3d.min(u);
            }
        }

        // New-face fallback: only the back plane is known
        if !Self::valid(best3d) {
            let mut span = [0; 3];
            span[axis] = -dir;
            let steps = self.cell_steps(p, span);
            let sbar = self.cell_slowness(p, span);
            let neighbour = |ax: usize, d: i64| {
                let mut c = behind;
                c[ax] += d;
                self.time(c)
            };
            let u = fdsphnf(
                self.time(behind),
                neighbour(aa, -1),
                neighbour(aa, 1),
                neighbour(bb, -1),
                neighbour(bb, 1),
                sbar,
                steps[axis],
                steps[aa],
                steps[bb],
            );
            best3d = best3d.min(u);
        }

        // Planar candidates within the growing face: the head-wave probe
        for (sa, sb) in quadrants {
            let mut span = [0; 3];
            span[aa] = sa;
            span[bb] = sb;

            let mut diag = p;
            diag[aa] += sa;
            diag[bb] += sb;
            let mut pa = p;
            pa[aa] += sa;
            let mut pb = p;
            pb[bb] += sb;

            let steps = self.cell_steps(p, span);
            let sbar =
                (self.slow(p) + self.slow(pa) + self.slow(pb) + self.slow(diag)) / 4.0;
            let u = fdsph2d(
                self.time(diag),
                self.time(pa),
                self.time(pb),
                sbar,
                steps[aa],
                steps[bb],
            );
            best2d = best2d.min(u);
        }

        // Direct 1D transmission along the five incoming edges
        let edges = [(axis, -dir), (aa, 1), (aa, -1), (bb, 1), (bb, -1)];
        for (ax, d) in edges {
            let mut c = p;
            c[ax] += d;
            if !self.in_range(c) {
                continue;
            }
            let sbar = 0.5 * (self.slow(p) + self.slow(c));
            let mut span = [0; 3];
            span[ax] = d;
            let steps = self.cell_steps(p, span);
            best1d = best1d.min(fdsph1d(self.time(c), sbar, steps[ax]));
        }

        // Upwind-axis transmission: monotone, so the repeated face passes
        // settle on a causal field even where the richer stencils have to
        // reject their corner sets
        let mut mins = [T_UNSET; 3];
        for (ax, m) in mins.iter_mut().enumerate() {
            let mut lo = p;
            lo[ax] -= 1;
            let mut hi = p;
            hi[ax] += 1;
            *m = self.time(lo).min(self.time(hi));
        }
        let steps = self.cell_steps(p, [0; 3]);
        let t_up = upwind_axes(
            mins[0],
            mins[1],
            mins[2],
            steps[0],
            steps[1],
            steps[2],
            self.slow(p),
        );

        let t_new = best3d.min(best2d).min(best1d).min(t_up);
        let o = self.idx(p);
        if Self::valid(t_new) && t_new < self.t[o] {
            // A planar arrival clearly ahead of the 3D ones is a head wave
            // running along this face. Only a real improvement counts, so
            // settled fields stop producing triggers.
            if Self::valid(best2d) && Self::valid(best3d) {
                let steps = self.cell_steps(p, [0; 3]);
                let dbar = 0.5 * (steps[aa] + steps[bb]);
                if best2d < best3d - self.cfg.headtest * self.slow(p) * dbar {
                    self.head[face.index()] += 1;
                }
            }
            self.t[o] = t_new;
        }
    }

    /// Sweep the freshly grown plane of `face` at `plane_coord`, visiting
    /// cells in ascending order of the upwind neighbour's time. The order
    /// is load-bearing: cells later in the sweep reuse results computed
    /// earlier in the same sweep.
    fn sweep_face(&mut self, face: Face, plane_coord: i64, bounds: &Bounds) {
        let axis = face.axis();
        let dir = face.dir();
        let (aa, bb) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };

        let mut cells: Vec<(f64, [i64; 3])> = Vec::with_capacity(
            ((bounds.hi[aa] - bounds.lo[aa] + 1) * (bounds.hi[bb] - bounds.lo[bb] + 1)) as usize,
        );
        for a in bounds.lo[aa]..=bounds.hi[aa] {
            for b in bounds.lo[bb]..=bounds.hi[bb] {
                let mut p = [0; 3];
                p[axis] = plane_coord;
                p[aa] = a;
                p[bb] = b;
                let mut upwind = p;
                upwind[axis] -= dir;
                cells.push((self.time(upwind), p));
            }
        }
        cells.sort_by(|x, y| x.0.total_cmp(&y.0));

        // Repeat the pass until the plane settles: in-plane arrivals feed
        // each other, and a single pass leaves staircase artefacts along
        // directions oblique to the face
        const MAX_PASSES: usize = 16;
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for (_, p) in &cells {
                let o = self.idx(*p);
                let before = self.t[o];
                self.update_cell(*p, face);
                if self.t[o] < before - 1e-9 {
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Grow the box around the source until every side has reached the
    /// grid boundary (or the radius cap)
    fn expand(&mut self, bounds: &mut Bounds) {
        let mut grow = [true; 6];
        for face in Face::ALL {
            let axis = face.axis();
            let at_edge = if face.dir() > 0 {
                bounds.hi[axis] >= self.n[axis] - 1
            } else {
                bounds.lo[axis] <= 0
            };
            if at_edge {
                grow[face.index()] = false;
            }
        }

        let mut radius = 0;
        loop {
            let mut grew = false;
            for face in Face::ALL {
                if !grow[face.index()] {
                    continue;
                }
                let axis = face.axis();
                let newc = if face.dir() > 0 {
                    bounds.hi[axis] + 1
                } else {
                    bounds.lo[axis] - 1
                };
                if newc < 0 || newc >= self.n[axis] {
                    grow[face.index()] = false;
                    continue;
                }
                if face.dir() > 0 {
                    bounds.hi[axis] = newc;
                } else {
                    bounds.lo[axis] = newc;
                }
                self.sweep_face(face, newc, bounds);
                if newc == 0 || newc == self.n[axis] - 1 {
                    grow[face.index()] = false;
                }
                grew = true;
            }
            if !grew {
                break;
            }
            radius += 1;
            if let Some(max_radius) = self.cfg.max_radius {
                if radius >= max_radius {
                    log::info!("expansion stopped at radius cap {max_radius}");
                    break;
                }
            }
        }
    }

    /// Re-sweep the whole grid from the boundary plane of `from_face`
    /// inward, keeping earlier arrivals. This is how head waves detected
    /// on a face get to propagate back across the volume.
    fn reverse_sweep(&mut self, from_face: Face) {
        let axis = from_face.axis();
        let start = if from_face.dir() > 0 {
            self.n[axis] - 1
        } else {
            0
        };

        let mut bounds = Bounds {
            lo: [0; 3],
            hi: [self.n[0] - 1, self.n[1] - 1, self.n[2] - 1],
        };
        bounds.lo[axis] = start;
        bounds.hi[axis] = start;

        let inward = from_face.opposite();
        let mut c = start;
        loop {
            let newc = c - from_face.dir();
            if newc < 0 || newc >= self.n[axis] {
                break;
            }
            bounds.lo[axis] = bounds.lo[axis].min(newc);
            bounds.hi[axis] = bounds.hi[axis].max(newc);
            self.sweep_face(inward, newc, &bounds);
            c = newc;
        }
    }
}

/// Compute the first-arrival travel-time field for `source` over the
/// slowness model `model` (any velocity-family kind), embedded by `frame`.
///
/// Returns a TIME grid with the model's geometry, the source recorded in
/// its header in geographic coordinates.
pub fn travel_time(
    model: &Grid3,
    frame: &SphericalFrame,
    source: &SrcLoc,
    cfg: &SolverConfig,
) -> Result<Grid3, Error> {
    travel_time_with_stats(model, frame, source, cfg).map(|(grid, _)| grid)
}

/// Like [`travel_time`], also returning the solver's head-wave and
/// restart statistics
pub fn travel_time_with_stats(
    model: &Grid3,
    frame: &SphericalFrame,
    source: &SrcLoc,
    cfg: &SolverConfig,
) -> Result<(Grid3, SolverStats), Error> {
    let hdr = &model.hdr;
    if !hdr.kind.is_velocity_family() {
        return Err(Error::Config(format!(
            "'{}': cannot take slowness from a {} grid",
            hdr.title,
            hdr.kind.tag()
        )));
    }
    if hdr.nx < 2 || hdr.ny < 2 || hdr.nz < 2 {
        return Err(Error::Config(format!(
            "'{}': the solver needs at least 2 nodes per axis",
            hdr.title
        )));
    }

    // Slowness per node, in s/km
    let mut s = Vec::with_capacity(hdr.num_nodes());
    for ix in 0..hdr.nx {
        for iy in 0..hdr.ny {
            for iz in 0..hdr.nz {
                let vel = hdr.kind.velocity_from(model.value_at(ix, iy, iz) as f64, hdr.dx)?;
                if !vel.is_finite() || vel <= 0.0 {
                    return Err(Error::Config(format!(
                        "'{}': non-positive velocity at node {ix} {iy} {iz}",
                        hdr.title
                    )));
                }
                s.push(1.0 / vel);
            }
        }
    }

    let (fxs, fys, fzs) = frame.grid_coords(source.lat, source.lon, source.depth);
    let n = [hdr.nx as i64, hdr.ny as i64, hdr.nz as i64];
    let inside = fxs >= 0.0
        && fxs <= (n[0] - 1) as f64
        && fys >= 0.0
        && fys <= (n[1] - 1) as f64
        && fzs >= 0.0
        && fzs <= (n[2] - 1) as f64;
    if !inside {
        return Err(Error::Config(format!(
            "source '{}' outside grid '{}': index ({fxs:.2}, {fys:.2}, {fzs:.2})",
            source.label, hdr.title
        )));
    }
    let near_edge = [fxs, fys, fzs]
        .iter()
        .zip(n.iter())
        .any(|(f, nn)| *f < 2.0 || *f > (*nn - 1) as f64 - 2.0);
    if near_edge {
        log::warn!(
            "source '{}' within 2 cells of a grid boundary, expect parallel-ray errors",
            source.label
        );
    }

    let mut engine = Engine {
        n,
        t: vec![T_UNSET; hdr.num_nodes()],
        s,
        frame,
        cfg,
        head: [0; 6],
    };

    // Seed a constant-slowness cube around the source with Euclidean
    // times from the exact continuous source position
    let is = [
        (fxs.round() as i64).clamp(0, n[0] - 1),
        (fys.round() as i64).clamp(0, n[1] - 1),
        (fzs.round() as i64).clamp(0, n[2] - 1),
    ];
    let s_src = engine.slow(is);
    let src_cart = frame.node_cart(fxs, fys, fzs);
    let ncube = cfg.ncube as i64;
    let mut bounds = Bounds {
        lo: [
            (is[0] - ncube).max(0),
            (is[1] - ncube).max(0),
            (is[2] - ncube).max(0),
        ],
        hi: [
            (is[0] + ncube).min(n[0] - 1),
            (is[1] + ncube).min(n[1] - 1),
            (is[2] + ncube).min(n[2] - 1),
        ],
    };
    for ix in bounds.lo[0]..=bounds.hi[0] {
        for iy in bounds.lo[1]..=bounds.hi[1] {
            for iz in bounds.lo[2]..=bounds.hi[2] {
                let cart = frame.node_cart(ix as f64, iy as f64, iz as f64);
                let o = engine.idx([ix, iy, iz]);
                engine.t[o] = s_src * cart.dist(src_cart);
            }
        }
    }

    engine.expand(&mut bounds);

    // Head waves call for reverse propagation from the most affected face
    let mut stats = SolverStats {
        converged: true,
        ..Default::default()
    };
    for restart in 0..cfg.max_restarts {
        let total: usize = engine.head.iter().sum();
        if total == 0 {
            break;
        }
        let face = match cfg.restart_face {
            Some(face) if restart == 0 => face,
            _ => {
                let best = (0..6).max_by_key(|i| engine.head[*i]).unwrap_or(0);
                Face::ALL[best]
            }
        };
        log::info!(
            "head waves per face {:?}, reverse sweep from {:?}",
            engine.head,
            face
        );
        engine.head = [0; 6];
        engine.reverse_sweep(face);
        stats.restarts += 1;
    }
    stats.head_waves = engine.head;
    if engine.head.iter().sum::<usize>() > 0 {
        stats.converged = false;
        log::warn!(
            "restart budget {} exhausted with head waves remaining {:?}; keeping current field",
            cfg.max_restarts,
            engine.head
        );
    }

    // The time field is always written at full resolution, even when the
    // model grid cascades
    let mut time_hdr = hdr.clone();
    time_hdr.kind = GridKind::Time;
    time_hdr.merge_depths.clear();
    time_hdr.source = Some(Source::new(
        &source.label,
        source.lon,
        source.lat,
        source.depth,
    ));
    let mut times = Grid3::allocate(time_hdr)?;
    for ix in 0..hdr.nx {
        for iy in 0..hdr.ny {
            for iz in 0..hdr.nz {
                let o = engine.idx([ix as i64, iy as i64, iz as i64]);
                times.set(ix, iy, iz, engine.t[o] as f32);
            }
        }
    }

    Ok((times, stats))
}

// ----- T E S T S ------------------------------------------------------------------
