//! Thin singular value decomposition for the small symmetric matrices
//! used by confidence ellipsoid extraction.
//!
//! For a symmetric positive semi-definite matrix the SVD coincides with the
//! eigendecomposition, so a cyclic Jacobi sweep is all that is needed: it is
//! unconditionally convergent for symmetric input and accurate to machine
//! precision for the 2×2 and 3×3 cases handled here.

/// Max number of full Jacobi sweeps. 3×3 input converges in 3-4.
const MAX_SWEEPS: usize = 32;

/// Eigendecomposition of a symmetric `N`×`N` matrix by cyclic Jacobi
/// rotations.
///
/// Returns `(w, v)` where `w` holds the eigenvalues (singular values, for
/// PSD input) in no particular order, and the columns of `v` hold the
/// corresponding unit eigenvectors. The input is consumed as a full matrix
/// but only the upper triangle is referenced.
pub fn symmetric<const N: usize>(a: [[f64; N]; N]) -> ([f64; N], [[f64; N]; N]) {
    let mut a = a;
    let mut v = [[0.0; N]; N];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _ in 0..MAX_SWEEPS {
        // Sum of squared off-diagonal elements decides convergence
        let mut off = 0.0;
        for p in 0..N {
            for q in (p + 1)..N {
                off += a[p][q] * a[p][q];
            }
        }
        if off < 1e-30 {
            break;
        }

        for p in 0..N {
            for q in (p + 1)..N {
                if a[p][q].abs() < 1e-300 {
                    continue;
                }
                // Classic Jacobi rotation annihilating a[p][q]
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                let app = a[p][p];
                let aqq = a[q][q];
                let apq = a[p][q];
                a[p][p] = app - t * apq;
                a[q][q] = aqq + t * apq;
                a[p][q] = 0.0;
                a[q][p] = 0.0;
                for i in 0..N {
                    if i != p && i != q {
                        let aip = a[i][p];
                        let aiq = a[i][q];
                        a[i][p] = c * aip - s * aiq;
                        a[p][i] = a[i][p];
                        a[i][q] = s * aip + c * aiq;
                        a[q][i] = a[i][q];
                    }
                }
                for row in v.iter_mut() {
                    let vip = row[p];
                    let viq = row[q];
                    row[p] = c * vip - s * viq;
                    row[q] = s * vip + c * viq;
                }
            }
        }
    }

    let mut w = [0.0; N];
    for (i, wi) in w.iter_mut().enumerate() {
        *wi = a[i][i];
    }
    (w, v)
}

// ----- T E S T S ---------------------------------------------------
