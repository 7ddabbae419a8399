//! Finite-difference stencils for the spherical eikonal sweep.
//!
//! Every stencil discretizes `|∇t|² = s̄²` on one cell by averaged
//! one-sided gradients, which turns the unknown corner time into the
//! admissible root of a quadratic `a·t² + b·t + c = 0`. The cell edge
//! lengths carry the spherical metric: `h` radially, `r·dq` along
//! colatitude and `r·sin(q)·df` along longitude.

/// Placeholder for cells not yet reached by the expansion
pub(crate) const T_UNSET: f64 = 1.0e10;

/// Marker for a rejected stencil result: negative discriminant or an
/// acausal root. Larger than any admissible travel time, so it flows
/// through min-comparisons safely.
pub(crate) const T_REJECT: f64 = 1.0e11;

/// Anything below this is a computed travel time
const T_KNOWN: f64 = 1.0e9;

pub(crate) fn is_known(t: f64) -> bool {
    t < T_KNOWN
}

/// Admissible root of `a·t² + b·t + c = 0`: the larger root, rejected if
/// the discriminant is negative or the root precedes any input time.
fn causal_root(a: f64, b: f64, c: f64, t_floor: f64) -> f64 {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return T_REJECT;
    }
    let t = (-b + disc.sqrt()) / (2.0 * a);
    if t < t_floor {
        return T_REJECT;
    }
    t
}

/// 3D transmission through a corner cell: seven known corner times, the
/// diagonally opposite corner unknown.
///
/// `t` holds the known corners indexed by local offset bits `i*4 + j*2 + k`
/// relative to the cell; the unknown sits at `(1,1,1)`. Each gradient
/// component averages the four parallel edge differences, which makes the
/// scheme exact for plane waves in any direction.
pub(crate) fn fdsph3d(t: &[f64; 7], sbar: f64, d1: f64, d2: f64, d3: f64) -> f64 {
    if t.iter().any(|v| !is_known(*v)) {
        return T_REJECT;
    }

    let s1 = t[4] + t[5] + t[6] - (t[0] + t[1] + t[2] + t[3]);
    let s2 = t[2] + t[3] + t[6] - (t[0] + t[1] + t[4] + t[5]);
    let s3 = t[1] + t[3] + t[5] - (t[0] + t[2] + t[4] + t[6]);

    let w1 = 1.0 / (16.0 * d1 * d1);
    let w2 = 1.0 / (16.0 * d2 * d2);
    let w3 = 1.0 / (16.0 * d3 * d3);

    let a = w1 + w2 + w3;
    let b = 2.0 * (s1 * w1 + s2 * w2 + s3 * w3);
    let c = s1 * s1 * w1 + s2 * s2 * w2 + s3 * s3 * w3 - sbar * sbar;

    let t_floor = t.iter().cloned().fold(f64::MIN, f64::max);
    causal_root(a, b, c, t_floor)
}

/// 3D new-edge stencil: five known corners, first-order accurate on a
/// freshly created box edge where the full corner set is not available.
///
/// `tb` is directly behind the unknown along the face normal; `tj`/`tk`
/// are the in-face neighbours along the two transverse axes and
/// `tbj`/`tbk` sit behind them.
pub(crate) fn fdsphne(
    tb: f64,
    tj: f64,
    tbj: f64,
    tk: f64,
    tbk: f64,
    sbar: f64,
    dn: f64,
    dj: f64,
    dk: f64,
) -> f64 {
    if [tb, tj, tbj, tk, tbk].iter().any(|v| !is_known(*v)) {
        return T_REJECT;
    }

    let bj = tb - tj - tbj;
    let bk = tb - tk - tbk;

    let wn = 1.0 / (dn * dn);
    let wj = 1.0 / (4.0 * dj * dj);
    let wk = 1.0 / (4.0 * dk * dk);

    let a = wn + wj + wk;
    let b = -2.0 * tb * wn + 2.0 * bj * wj + 2.0 * bk * wk;
    let c = tb * tb * wn + bj * bj * wj + bk * bk * wk - sbar * sbar;

    let t_floor = [tb, tj, tbj, tk, tbk].iter().cloned().fold(f64::MIN, f64::max);
    causal_root(a, b, c, t_floor)
}

/// 3D new-face stencil: propagates across a face using only face-local
/// gradients on the known back plane.
///
/// `tb` is directly behind the unknown; `tj0`/`tj1` and `tk0`/`tk1` are
/// its back-plane neighbours along the transverse axes.
pub(crate) fn fdsphnf(
    tb: f64,
    tj0: f64,
    tj1: f64,
    tk0: f64,
    tk1: f64,
    sbar: f64,
    dn: f64,
    dj: f64,
    dk: f64,
) -> f64 {
    if [tb, tj0, tj1, tk0, tk1].iter().any(|v| !is_known(*v)) {
        return T_REJECT;
    }

    let gj = (tj1 - tj0) / (2.0 * dj);
    let gk = (tk1 - tk0) / (2.0 * dk);
    let radicand = sbar * sbar - gj * gj - gk * gk;
    if radicand < 0.0 {
        return T_REJECT;
    }

    let u = tb + dn * radicand.sqrt();
    let t_floor = [tb, tj0, tj1, tk0, tk1].iter().cloned().fold(f64::MIN, f64::max);
    if u < t_floor {
        return T_REJECT;
    }
    u
}

/// Transmission through the upwind axis neighbours: the Godunov update on
/// the per-axis minima.
///
/// Axes whose neighbours are still unset drop out; the m-axis quadratic
/// is accepted only when its root does not precede the largest neighbour
/// used, otherwise the next-lower-dimensional update tries. Monotone in
/// its inputs, which makes the iterated sweeps converge downward without
/// ever undershooting.
pub(crate) fn upwind_axes(
    a1: f64,
    a2: f64,
    a3: f64,
    d1: f64,
    d2: f64,
    d3: f64,
    sbar: f64,
) -> f64 {
    let mut use_axes: [(f64, f64); 3] = [(a1, d1), (a2, d2), (a3, d3)];
    use_axes.sort_by(|x, y| x.0.total_cmp(&y.0));
    let known = use_axes.iter().filter(|(a, _)| is_known(*a)).count();
    if known == 0 {
        return T_REJECT;
    }

    for m in (1..=known).rev() {
        let used = &use_axes[..m];
        let mut qa = 0.0;
        let mut qb = 0.0;
        let mut qc = -sbar * sbar;
        for (a, d) in used {
            let w = 1.0 / (d * d);
            qa += w;
            qb -= 2.0 * a * w;
            qc += a * a * w;
        }
        let disc = qb * qb - 4.0 * qa * qc;
        if disc < 0.0 {
            continue;
        }
        let t = (-qb + disc.sqrt()) / (2.0 * qa);
        if t >= used[m - 1].0 {
            return t;
        }
    }
    T_REJECT
}

/// 2D transmission through a planar cell: the classic Vidale square with
/// three known corners. Doubles as the head-wave probe along a growing
/// face.
pub(crate) fn fdsph2d(t00: f64, ta: f64, tbv: f64, sbar: f64, da: f64, db: f64) -> f64 {
    if [t00, ta, tbv].iter().any(|v| !is_known(*v)) {
        return T_REJECT;
    }

    let ba = tbv - ta - t00;
    let bb = ta - tbv - t00;

    let wa = 1.0 / (4.0 * da * da);
    let wb = 1.0 / (4.0 * db * db);

    let a = wa + wb;
    let b = 2.0 * (ba * wa + bb * wb);
    let c = ba * ba * wa + bb * bb * wb - sbar * sbar;

    let t_floor = [t00, ta, tbv].iter().cloned().fold(f64::MIN, f64::max);
    causal_root(a, b, c, t_floor)
}

/// Direct 1D transmission along one cell edge with mean edge slowness
pub(crate) fn fdsph1d(t0: f64, sbar: f64, d: f64) -> f64 {
    if !is_known(t0) {
        return T_REJECT;
    }
    t0 + sbar * d
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    const S: f64 = 1.0 / 6.0;
    const D: f64 = 10.0;

    #[test]
    fn transmission_exact_for_axis_plane_wave() {
        // Plane wave along the cell's first axis: the back face is at 0,
        // the front face at s*d
        let sd = S * D;
        let t = [0., 0., 0., 0., sd, sd, sd];
        let u = fdsph3d(&t, S, D, D, D);
        assert_float_eq!(u, sd, abs <= 1e-12);
    }

    #[test]
    fn transmission_exact_for_diagonal_plane_wave() {
        // Plane wave along the cube diagonal: t = s*d*(i+j+k)/sqrt(3)
        let e = S * D / 3_f64.sqrt();
        let t = [0., e, e, 2. * e, e, 2. * e, 2. * e];
        let u = fdsph3d(&t, S, D, D, D);
        assert_float_eq!(u, 3. * e, abs <= 1e-12);
    }

    #[test]
    fn transmission_handles_anisotropic_cells() {
        // Smaller transverse steps must not change an axis plane wave
        let sd = S * D;
        let t = [0., 0., 0., 0., sd, sd, sd];
        let u = fdsph3d(&t, S, D, 0.5 * D, 0.25 * D);
        assert_float_eq!(u, sd, abs <= 1e-12);
    }

    #[test]
    fn transmission_rejects_acausal_roots() {
        // All inputs equal: the root must not precede them
        let t = [5.0; 7];
        let u = fdsph3d(&t, S, D, D, D);
        assert!(u > 5.0 && u < T_REJECT);

        // An unset corner disables the stencil outright
        let mut t = [0.0; 7];
        t[3] = T_UNSET;
        assert_eq!(fdsph3d(&t, S, D, D, D), T_REJECT);
    }

    #[test]
    fn new_edge_exact_for_normal_plane_wave() {
        let sd = S * D;
        // t = s*n: behind at 0, the in-face neighbours at sd, their
        // behinds at 0
        let u = fdsphne(0., sd, 0., sd, 0., S, D, D, D);
        assert_float_eq!(u, sd, abs <= 1e-12);
    }

    #[test]
    fn new_face_matches_oblique_incidence() {
        // A wave at 45° in the (n, j) plane: transverse gradient s/sqrt(2),
        // normal slowness s/sqrt(2)
        let g = S / 2_f64.sqrt();
        let tb = 1.0;
        let u = fdsphnf(tb, tb - g * D, tb + g * D, tb, tb, S, D, D, D);
        assert_float_eq!(u, tb + D * g, abs <= 1e-12);

        // Transverse gradient beyond the slowness: evanescent, rejected
        let u = fdsphnf(tb, tb - 2. * S * D, tb + 2. * S * D, tb, tb, S, D, D, D);
        assert_eq!(u, T_REJECT);
    }

    #[test]
    fn planar_exact_for_plane_wave() {
        let sd = S * D;
        // Along axis a: diagonal 0, the a-neighbour at 0, b-neighbour at sd
        let u = fdsph2d(0., 0., sd, S, D, D);
        assert_float_eq!(u, sd, abs <= 1e-12);
    }

    #[test]
    fn one_d_edge() {
        assert_float_eq!(fdsph1d(2.0, S, D), 2.0 + S * D, abs <= 1e-15);
        assert_eq!(fdsph1d(T_UNSET, S, D), T_REJECT);
    }

    #[test]
    fn upwind_update_degrades_gracefully() {
        // All three axes at zero: the 3-axis root is s*d/sqrt(3) out
        let u = upwind_axes(0., 0., 0., D, D, D, S);
        assert_float_eq!(u, S * D / 3_f64.sqrt(), abs <= 1e-12);

        // One axis far larger than causally possible: drops to two axes
        let u2 = upwind_axes(0., 0., 100.0, D, D, D, S);
        assert_float_eq!(u2, S * D / 2_f64.sqrt(), abs <= 1e-12);

        // Unset axes drop out entirely
        let u1 = upwind_axes(1.0, T_UNSET, T_UNSET, D, D, D, S);
        assert_float_eq!(u1, 1.0 + S * D, abs <= 1e-12);
        assert_eq!(upwind_axes(T_UNSET, T_UNSET, T_UNSET, D, D, D, S), T_REJECT);

        // Never precedes any neighbour it used
        let u = upwind_axes(2.0, 2.1, 2.2, D, D, D, S);
        assert!(u >= 2.0);
    }
}
