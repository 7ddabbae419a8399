//! Building 3D volumes from oriented 2D sections.
//!
//! Each section is a vertical slice along a line segment in the model
//! frame, carrying a (distance-along-section, depth) value grid. The
//! composer walks every 3D node, intersects the circle through the node
//! about a pole point with every section line, and interpolates the
//! sampled values around the circumference.

use crate::grid::Grid3;
use crate::Error;

/// How values around the circumference combine at a node's azimuth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AzimuthInterp {
    /// Linear between the bracketing sections
    #[default]
    Linear,
    /// Cosine²-tapered weights over every section within 90°
    CosineWeighted,
}

/// A vertical 2D section along a model-frame line segment.
///
/// The value grid is degenerate in x (`nx == 1`); its y axis is distance
/// along the section from `(x0, y0)` and its z axis is depth.
#[derive(Debug, Clone)]
pub struct Section2D {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    /// Wave-type tag; sections tagged differently than the composer asks
    /// for are skipped
    pub wave: Option<String>,
    pub grid: Grid3,
    line: LineParam,
    length: f64,
}

/// Line parameters of a section trace. A section running exactly
/// north-south has no finite slope and gets its own representation.
#[derive(Debug, Clone, Copy)]
enum LineParam {
    Sloped { m: f64, b: f64 },
    ConstX { x: f64 },
}

impl Section2D {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, grid: Grid3) -> Result<Section2D, Error> {
        if grid.hdr.nx != 1 {
            return Err(Error::Config(format!(
                "'{}': a section grid must be degenerate in x",
                grid.hdr.title
            )));
        }
        let length = (x1 - x0).hypot(y1 - y0);
        if length <= 0.0 {
            return Err(Error::Config(
                "section endpoints must be distinct".to_string(),
            ));
        }
        let line = if (x1 - x0).abs() < 1e-12 {
            LineParam::ConstX { x: x0 }
        } else {
            let m = (y1 - y0) / (x1 - x0);
            LineParam::Sloped { m, b: y0 - m * x0 }
        };
        Ok(Section2D {
            x0,
            y0,
            x1,
            y1,
            wave: None,
            grid,
            line,
            length,
        })
    }

    /// Intersections of the section trace with the circle of `radius`
    /// about `(xc, yc)`: zero, one or two points
    fn circle_intersections(&self, xc: f64, yc: f64, radius: f64) -> Vec<(f64, f64)> {
        match self.line {
            LineParam::Sloped { m, b } => {
                // (x-xc)^2 + (m x + b - yc)^2 = r^2
                let qa = 1.0 + m * m;
                let qb = 2.0 * (m * (b - yc) - xc);
                let qc = xc * xc + (b - yc) * (b - yc) - radius * radius;
                roots(qa, qb, qc)
                    .into_iter()
                    .map(|x| (x, m * x + b))
                    .collect()
            }
            LineParam::ConstX { x } => {
                let dx = x - xc;
                let radicand = radius * radius - dx * dx;
                if radicand < 0.0 {
                    return Vec::new();
                }
                let dy = radicand.sqrt();
                if dy == 0.0 {
                    return vec![(x, yc)];
                }
                vec![(x, yc - dy), (x, yc + dy)]
            }
        }
    }

    /// Section value at the model point `(x, y)` and depth, `None` when
    /// the point misses the populated part of the section
    fn value_at(&self, x: f64, y: f64, depth: f64, extrapolate_ends: bool) -> Option<f64> {
        // Signed distance along the trace, projected onto the segment
        let along = ((x - self.x0) * (self.x1 - self.x0) + (y - self.y0) * (self.y1 - self.y0))
            / self.length;
        let along = if extrapolate_ends {
            along.clamp(0.0, self.length)
        } else if !(0.0..=self.length).contains(&along) {
            return None;
        } else {
            along
        };
        self.grid.interp_at_2d(along, depth)
    }
}

/// Real roots of `a x^2 + b x + c`
fn roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    if disc == 0.0 {
        return vec![-b / (2.0 * a)];
    }
    let root = disc.sqrt();
    vec![(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)]
}

/// Composer configuration; all lengths in model km, angles in degrees
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Pole of the polar interpolation
    pub pole: (f64, f64),
    /// Inside this radius the result blends toward the circumferential
    /// mean, which keeps the pole itself well-defined
    pub rad_min: f64,
    /// A node further than this from every section sample (arc length)
    /// gets no value
    pub interp_d_max: f64,
    /// Clamp section lookups beyond the segment ends to the end columns
    pub extrapolate_ends: bool,
    pub interp: AzimuthInterp,
    /// Replace negative interpolation results with `default_value`
    pub no_negative: bool,
    pub default_value: f64,
    pub cutoff_min: f64,
    pub cutoff_max: f64,
    /// Only sections with this wave tag take part; untagged sections
    /// always do
    pub wave_type: Option<String>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        ComposeConfig {
            pole: (0.0, 0.0),
            rad_min: 10.0,
            interp_d_max: f64::MAX,
            extrapolate_ends: true,
            interp: AzimuthInterp::Linear,
            no_negative: true,
            default_value: -1.0,
            cutoff_min: f64::MIN,
            cutoff_max: f64::MAX,
            wave_type: None,
        }
    }
}

/// What got replaced or clipped during a composition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeCounters {
    pub defaults: usize,
    pub clipped_min: usize,
    pub clipped_max: usize,
    pub too_far: usize,
}

/// Fill `grid` from `sections` by polar interpolation about the
/// configured pole.
///
/// Node sampling is staggered half a step into each cell, and stored
/// values go through the grid kind's velocity encoding, so the same
/// sections can fill VELOCITY, SLOW_LEN or SLOW2_METERS volumes alike.
pub fn compose_polar(
    grid: &mut Grid3,
    sections: &[Section2D],
    cfg: &ComposeConfig,
) -> Result<ComposeCounters, Error> {
    if !grid.hdr.kind.is_velocity_family() {
        return Err(Error::Unsupported(format!(
            "cannot compose a {} grid from velocity sections",
            grid.hdr.kind.tag()
        )));
    }

    let active: Vec<&Section2D> = sections
        .iter()
        .filter(|sec| match (&cfg.wave_type, &sec.wave) {
            (Some(want), Some(have)) if want != have => {
                log::warn!("skipping section with wave type '{have}'");
                false
            }
            _ => true,
        })
        .collect();
    if active.is_empty() {
        return Err(Error::Config("no sections to compose from".to_string()));
    }

    let hdr = grid.hdr.clone();
    let mut counters = ComposeCounters::default();

    for ix in 0..hdr.nx {
        let xval = hdr.origx + hdr.dx / 2.0 + ix as f64 * hdr.dx;
        for iy in 0..hdr.ny {
            let yval = hdr.origy + hdr.dy / 2.0 + iy as f64 * hdr.dy;
            for iz in 0..hdr.nz {
                let zdepth = hdr.origz + hdr.dz / 2.0 + iz as f64 * hdr.dz;

                let mut vel = section_value(&active, xval, yval, zdepth, cfg, &mut counters);

                if let Some(v) = vel {
                    if cfg.no_negative && v < 0.0 {
                        vel = None;
                    }
                }
                let vel = match vel {
                    None => {
                        counters.defaults += 1;
                        cfg.default_value
                    }
                    Some(v) if v < cfg.cutoff_min => {
                        counters.clipped_min += 1;
                        cfg.cutoff_min
                    }
                    Some(v) if v > cfg.cutoff_max => {
                        counters.clipped_max += 1;
                        cfg.cutoff_max
                    }
                    Some(v) => v,
                };

                let stored = hdr.kind.store_velocity(vel, hdr.dx)?;
                grid.set(ix, iy, iz, stored as f32);
            }
        }
    }

    Ok(counters)
}

/// The azimuthally interpolated section value at one model point
fn section_value(
    sections: &[&Section2D],
    xval: f64,
    yval: f64,
    zdepth: f64,
    cfg: &ComposeConfig,
    counters: &mut ComposeCounters,
) -> Option<f64> {
    let (xc, yc) = cfg.pole;
    let radius = (xval - xc).hypot(yval - yc);

    // Values where the circumference through this node crosses a section
    let mut values: Vec<(f64, f64)> = Vec::new();
    for sec in sections {
        for (px, py) in sec.circle_intersections(xc, yc, radius) {
            let mut azimuth = (px - xc).atan2(py - yc).to_degrees();
            if azimuth < 0.0 {
                azimuth += 360.0;
            }
            if let Some(v) = sec.value_at(px, py, zdepth, cfg.extrapolate_ends) {
                values.push((azimuth, v));
            }
        }
    }
    if values.is_empty() {
        return None;
    }

    let mut azimuth = (xval - xc).atan2(yval - yc).to_degrees();
    if azimuth < 0.0 {
        azimuth += 360.0;
    }

    // The nearest sample must be within the configured arc length
    let angle_max = (cfg.interp_d_max / radius).to_degrees();
    if angle_max < 180.0 {
        let close_enough = values.iter().any(|(az, _)| {
            let mut diff = (azimuth - az).abs() % 360.0;
            if diff > 180.0 {
                diff = 360.0 - diff;
            }
            diff <= angle_max
        });
        if !close_enough {
            counters.too_far += 1;
            return None;
        }
    }

    let mean = values.iter().map(|(_, v)| v).sum::<f64>() / values.len() as f64;
    if values.len() == 1 {
        return Some(mean);
    }

    values.sort_by(|a, b| a.0.total_cmp(&b.0));

    let interpolated = match cfg.interp {
        AzimuthInterp::Linear => {
            // Bracketing samples, wrapping across north
            let next = values.iter().position(|(az, _)| *az >= azimuth);
            let (az0, v0, az1, v1) = match next {
                Some(0) | None => {
                    let last = values[values.len() - 1];
                    let first = values[0];
                    if next.is_some() {
                        (last.0 - 360.0, last.1, first.0, first.1)
                    } else {
                        (last.0, last.1, first.0 + 360.0, first.1)
                    }
                }
                Some(n) => (values[n - 1].0, values[n - 1].1, values[n].0, values[n].1),
            };
            let weight = ((azimuth - az0) / (az1 - az0)).abs();
            (1.0 - weight) * v0 + weight * v1
        }
        AzimuthInterp::CosineWeighted => {
            let mut value = 0.0;
            let mut weight_sum = 0.0;
            for (az, v) in &values {
                let mut ang_dist = (az - azimuth).abs();
                if ang_dist > 180.0 {
                    ang_dist = 360.0 - ang_dist;
                }
                let weight = (90.0 - ang_dist) / 90.0;
                if weight > 0.0 {
                    let weight = (weight * weight * std::f64::consts::FRAC_PI_2).sin();
                    value += weight * v;
                    weight_sum += weight;
                }
            }
            if weight_sum <= 0.0 {
                counters.too_far += 1;
                return None;
            }
            value / weight_sum
        }
    };

    // Close to the pole every azimuth collapses: fade to the mean
    if radius < cfg.rad_min {
        return Some(
            mean * (cfg.rad_min - radius) / cfg.rad_min + interpolated * radius / cfg.rad_min,
        );
    }

    Some(interpolated)
}

/// A piecewise-linear remap of velocities, applied over a composed grid
#[derive(Debug, Clone, Default)]
pub struct VelocityMapping {
    /// (old, new) velocity pairs, ascending in the old value
    pairs: Vec<(f64, f64)>,
}

impl VelocityMapping {
    pub fn new(pairs: Vec<(f64, f64)>) -> Result<VelocityMapping, Error> {
        if pairs.len() < 2 {
            return Err(Error::Config(
                "a velocity mapping needs at least two pairs".to_string(),
            ));
        }
        if !pairs.windows(2).all(|w| w[0].0 < w[1].0) {
            return Err(Error::Config(
                "velocity mapping old values must increase".to_string(),
            ));
        }
        Ok(VelocityMapping { pairs })
    }

    /// Remap one velocity; values outside the table clamp to its ends
    #[must_use]
    pub fn map(&self, vel: f64) -> f64 {
        let first = self.pairs[0];
        let last = self.pairs[self.pairs.len() - 1];
        if vel <= first.0 {
            return first.1;
        }
        for pair in self.pairs.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if vel < hi.0 {
                return lo.1 + (vel - lo.0) * (hi.1 - lo.1) / (hi.0 - lo.0);
            }
        }
        last.1
    }

    /// Apply the mapping to every node of a velocity-family grid
    pub fn apply(&self, grid: &mut Grid3) -> Result<(), Error> {
        let hdr = grid.hdr.clone();
        for ix in 0..hdr.nx {
            for iy in 0..hdr.ny {
                for iz in 0..hdr.nz {
                    let stored = grid.value_at(ix, iy, iz) as f64;
                    let vel = hdr.kind.velocity_from(stored, hdr.dx)?;
                    let mapped = hdr.kind.store_velocity(self.map(vel), hdr.dx)?;
                    grid.set(ix, iy, iz, mapped as f32);
                }
            }
        }
        Ok(())
    }
}

/// Replacement of everything below a velocity isoline with a gradient
/// profile, column by column
#[derive(Debug, Clone)]
pub struct IsolineCutoff {
    /// The isoline level: the shallowest downward crossing of this
    /// velocity marks the cut
    pub v_cut: f64,
    /// Alternatively cut at the first velocity maximum above
    /// `v_min_cut_at_max`
    pub cut_at_first_max: bool,
    pub v_min_cut_at_max: f64,
    /// Replacement profile `v_replace + (z - ref_level) * grad`, capped
    /// at `v_max`
    pub v_replace: f64,
    pub ref_level: f64,
    pub grad: f64,
    pub v_max: f64,
    /// Replacement is forced from this depth down even without a cut
    pub depth_force_replace: f64,
    /// The background fill of unpopulated nodes; the first-maximum scan
    /// only arms once a column departs from it
    pub background: f64,
}

#[derive(Clone, Copy)]
enum CutKind {
    Threshold,
    Peak,
}

impl IsolineCutoff {
    fn replacement(&self, zdepth: f64) -> f64 {
        (self.v_replace + (zdepth - self.ref_level) * self.grad).min(self.v_max)
    }

    /// Apply the cutoff to `grid`; returns the companion DEPTH grid
    /// recording the cut depth per column
    pub fn apply(&self, grid: &mut Grid3) -> Result<Grid3, Error> {
        let hdr = grid.hdr.clone();

        let mut depth_hdr = hdr.clone();
        depth_hdr.nz = 1;
        depth_hdr.origz = 0.0;
        depth_hdr.kind = crate::grid::kind::GridKind::Depth;
        depth_hdr.merge_depths.clear();
        let mut depth_grid = Grid3::allocate(depth_hdr)?;

        let bottom = hdr.origz + hdr.dz / 2.0 + (hdr.nz - 1) as f64 * hdr.dz;
        let mut last_cut = hdr.origz;

        for ix in 0..hdr.nx {
            if hdr.ny > 1 {
                last_cut = hdr.origz;
            }
            for iy in 0..hdr.ny {
                depth_grid.set(ix, iy, 0, bottom as f32);

                // Scan the column bottom-up collecting candidate cuts
                let mut candidates: Vec<(CutKind, usize, f64)> = Vec::new();
                let mut vel_last = f64::MIN;
                let mut increasing = false;
                let mut armed = false;
                let mut zdepth = bottom;
                for iz in (0..hdr.nz).rev() {
                    let vel = hdr
                        .kind
                        .velocity_from(grid.value_at(ix, iy, iz) as f64, hdr.dx)?;

                    if vel <= self.v_cut && vel_last > self.v_cut {
                        candidates.push((CutKind::Threshold, iz, zdepth));
                    } else if self.cut_at_first_max
                        && increasing
                        && vel >= self.v_min_cut_at_max
                        && vel < vel_last
                    {
                        candidates.push((CutKind::Peak, iz, zdepth));
                    }

                    increasing = armed && vel >= vel_last;
                    // No cutoff while the column is still background fill
                    if (vel - self.background).abs() > 1.0e-6 {
                        armed = true;
                    }

                    vel_last = vel;
                    zdepth -= hdr.dz;
                }

                // A threshold crossing wins outright (the scan recorded
                // the shallowest last); otherwise the peak closest to the
                // neighbouring column's cut
                let mut chosen: Option<(usize, f64)> = None;
                let mut closest = f64::MAX;
                for (kind, iz, z) in candidates.iter().rev() {
                    if matches!(kind, CutKind::Threshold) {
                        chosen = Some((*iz, *z));
                        break;
                    }
                    let diff = (z - last_cut).abs();
                    if diff < closest {
                        chosen = Some((*iz, *z));
                        closest = diff;
                    }
                }

                // Forced replacement depth overrides a deeper (or absent)
                // cut
                let (iz_cut, z_cut) = match chosen {
                    Some((iz, z)) if z <= self.depth_force_replace => (iz as i64, z),
                    _ => {
                        let iz =
                            ((self.depth_force_replace - hdr.origz - hdr.dz / 2.0) / hdr.dz) as i64;
                        (iz, self.depth_force_replace)
                    }
                };
                last_cut = z_cut;

                if iz_cut < 0 {
                    continue;
                }

                let mut zdepth = hdr.origz + hdr.dz / 2.0 + iz_cut as f64 * hdr.dz;
                depth_grid.set(ix, iy, 0, zdepth as f32);
                for iz in iz_cut as usize..hdr.nz {
                    let vel = self.replacement(zdepth);
                    let stored = hdr.kind.store_velocity(vel, hdr.dx)?;
                    grid.set(ix, iy, iz, stored as f32);
                    zdepth += hdr.dz;
                }
            }
        }

        Ok(depth_grid)
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::kind::GridKind;
    use crate::grid::GridHdr;
    use float_eq::assert_float_eq;

    /// A section grid holding a constant value
    fn const_section(x0: f64, y0: f64, x1: f64, y1: f64, value: f32) -> Section2D {
        let length = (x1 - x0).hypot(y1 - y0);
        let ny = (length as usize).max(2);
        let hdr = GridHdr::new(
            1,
            ny,
            20,
            0.,
            0.,
            0.,
            1.,
            length / (ny - 1) as f64,
            1.,
            GridKind::Velocity,
        );
        let mut grid = Grid3::allocate(hdr).unwrap();
        grid.init(value);
        Section2D::new(x0, y0, x1, y1, grid).unwrap()
    }

    fn target_grid() -> Grid3 {
        let hdr = GridHdr::new(10, 10, 10, -50., -50., 0., 10., 10., 1., GridKind::Velocity);
        Grid3::allocate(hdr).unwrap()
    }

    #[test]
    fn two_crossing_sections_interpolate_between() {
        // An east-west section at 4 km/s and a (nearly) north-south one
        // at 6 km/s, crossing at the pole
        let ew = const_section(-100., 0., 100., 0., 4.0);
        let ns = const_section(0.1, -100., 0.2, 100., 6.0);
        let mut grid = target_grid();
        let cfg = ComposeConfig {
            rad_min: 1.0,
            ..Default::default()
        };

        let counters = compose_polar(&mut grid, &[ew, ns], &cfg).unwrap();
        assert_eq!(counters.defaults, 0);

        // On the x axis, far from the north-south section: close to 4
        let east = grid.interp_at(45.0, 5.0, 5.0).unwrap();
        assert!((east - 4.0).abs() < 0.4, "east value {east}");

        // Betwixt the two sections: between the two velocities
        let mid = grid.interp_at(30.0, 30.0, 5.0).unwrap();
        assert!(mid > 4.0 && mid < 6.0, "diagonal value {mid}");
    }

    #[test]
    fn lone_section_fills_with_its_value() {
        let ew = const_section(-100., 0., 100., 0., 5.5);
        let mut grid = target_grid();
        let counters = compose_polar(&mut grid, &[ew], &ComposeConfig::default()).unwrap();
        assert_eq!(counters.defaults, 0);
        let v = grid.interp_at(20.0, -20.0, 5.0).unwrap();
        assert_float_eq!(v, 5.5, abs <= 1e-5);
    }

    #[test]
    fn slow_len_encoding_goes_through_the_kind() {
        let ew = const_section(-100., 0., 100., 0., 5.0);
        let hdr = GridHdr::new(6, 6, 6, -30., -30., 0., 10., 10., 1., GridKind::SlowLen);
        let mut grid = Grid3::allocate(hdr).unwrap();
        compose_polar(&mut grid, &[ew], &ComposeConfig::default()).unwrap();
        // Stored value is dx / v
        assert_float_eq!(grid.value_at(2, 2, 2), (10.0 / 5.0) as f32, abs <= 1e-4);
    }

    #[test]
    fn wave_type_mismatches_are_skipped() {
        let mut s_wave = const_section(-100., 0., 100., 0., 3.2);
        s_wave.wave = Some("S".to_string());
        let mut grid = target_grid();
        let cfg = ComposeConfig {
            wave_type: Some("P".to_string()),
            ..Default::default()
        };
        assert!(compose_polar(&mut grid, &[s_wave], &cfg).is_err());
    }

    #[test]
    fn interp_d_max_limits_reach() {
        // A short section north of the pole; nodes south of the pole are
        // half a circumference away
        let short = const_section(-5., 40., 5., 40., 5.0);
        let mut grid = target_grid();
        let cfg = ComposeConfig {
            interp_d_max: 30.0,
            extrapolate_ends: true,
            default_value: -1.0,
            ..Default::default()
        };
        let counters = compose_polar(&mut grid, &[short], &cfg).unwrap();
        assert!(counters.too_far > 0);
        // Southern nodes carry the default
        assert_eq!(grid.value_at(4, 0, 5), -1.0);
    }

    #[test]
    fn velocity_mapping_remaps_piecewise() {
        let map = VelocityMapping::new(vec![(2.0, 2.5), (4.0, 5.0), (6.0, 6.0)]).unwrap();
        assert_float_eq!(map.map(1.0), 2.5, abs <= 1e-12);
        assert_float_eq!(map.map(2.0), 2.5, abs <= 1e-12);
        assert_float_eq!(map.map(3.0), 3.75, abs <= 1e-12);
        assert_float_eq!(map.map(7.0), 6.0, abs <= 1e-12);

        assert!(VelocityMapping::new(vec![(2.0, 2.5)]).is_err());
        assert!(VelocityMapping::new(vec![(4.0, 5.0), (2.0, 2.5)]).is_err());

        let hdr = GridHdr::new(2, 2, 2, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        let mut grid = Grid3::allocate(hdr).unwrap();
        grid.init(3.0);
        map.apply(&mut grid).unwrap();
        assert_float_eq!(grid.value_at(0, 0, 0), 3.75, abs <= 1e-6);
    }

    #[test]
    fn isoline_cutoff_replaces_below_threshold() {
        // Velocity increasing with depth through the cut level at 4.0:
        // everything below the crossing gets the replacement profile
        let hdr = GridHdr::new(3, 3, 10, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        let mut grid = Grid3::allocate(hdr).unwrap();
        for iz in 0..10 {
            let vel = 2.0 + 0.5 * iz as f32;
            for ix in 0..3 {
                for iy in 0..3 {
                    grid.set(ix, iy, iz, vel);
                }
            }
        }

        let cut = IsolineCutoff {
            v_cut: 4.0,
            cut_at_first_max: false,
            v_min_cut_at_max: 0.0,
            v_replace: 8.0,
            ref_level: 0.0,
            grad: 0.0,
            v_max: 8.2,
            depth_force_replace: 100.0,
            background: -1.0,
        };
        let depth_grid = cut.apply(&mut grid).unwrap();

        // 2.0 + 0.5*iz last dips to 4.0 at iz = 4; above stays untouched
        assert_eq!(grid.value_at(1, 1, 3), 3.5);
        assert_eq!(grid.value_at(1, 1, 4), 8.0);
        assert_eq!(grid.value_at(1, 1, 9), 8.0);

        // The depth grid records the staggered cut depth
        assert_float_eq!(depth_grid.value_at(1, 1, 0), 4.5, abs <= 1e-6);
    }
}
