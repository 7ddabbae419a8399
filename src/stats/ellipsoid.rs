//! Confidence ellipse and ellipsoid extraction from covariance matrices,
//! and the conversions between the axis/dip representation and the
//! QuakeML Tait-Bryan one.
//!
//! The axes come from the SVD of the covariance matrix (Num Rec, 2nd ed,
//! secs 2.6 & 15.6). Because it is the covariance and not its inverse
//! being decomposed, the `w` of fig 15.6.5 appears as `1/sqrt(w)`, so the
//! axis half-length at the chosen confidence is `sqrt(del_chi_2 * w)`.

use crate::mathlib::spherical::normalize_positive_deg;
use crate::mathlib::svd;
use crate::mathlib::vector::{Mat3, Vec3};
use crate::Error;

/// Delta chi-square at 68% confidence, 3 degrees of freedom
pub const DELTA_CHI_SQR_68_3: f64 = 3.53;

/// Delta chi-square at 68% confidence, 2 degrees of freedom
pub const DELTA_CHI_SQR_68_2: f64 = 2.30;

/// Singular values below this leave the ellipsoid undefined
const SMALL_SINGULAR_VALUE: f64 = 1.0e-20;

/// Horizontal confidence ellipse: azimuth of the minor axis and the two
/// half-lengths, minor first
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ellipse2D {
    /// Azimuth of the minor axis, degrees CW from north, in [0, 180)
    pub az1: f64,
    pub len1: f64,
    pub len2: f64,
}

/// Confidence ellipsoid in the NonLinLoc/Hypoellipse representation:
/// minor and intermediate axes as (azimuth, dip, half-length), the major
/// half-length, and the derived major-axis orientation carried for the
/// Tait-Bryan conversion
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ellipsoid3D {
    pub az1: f64,
    pub dip1: f64,
    pub len1: f64,
    pub az2: f64,
    pub dip2: f64,
    pub len2: f64,
    pub len3: f64,
    pub az3: f64,
    pub dip3: f64,
}

/// The QuakeML ConfidenceEllipsoid: three half-lengths plus the
/// z-y'-x'' intrinsic rotation carrying the orientation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QmlEllipsoid {
    pub semi_major_axis_length: f64,
    pub semi_minor_axis_length: f64,
    pub semi_intermediate_axis_length: f64,
    pub major_axis_azimuth: f64,
    pub major_axis_plunge: f64,
    pub major_axis_rotation: f64,
}

/// The major and intermediate axes as (plunge, azimuth) pairs, the
/// ordering used by the pseudo-XML confidence ellipsoid output
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct XmlEllipsoid {
    pub semi_major_axis_length: f64,
    pub major_axis_plunge: f64,
    pub major_axis_azimuth: f64,
    pub semi_intermediate_axis_length: f64,
    pub intermediate_axis_plunge: f64,
    pub intermediate_axis_azimuth: f64,
    pub semi_minor_axis_length: f64,
}

/// Sort singular values ascending, carrying the matching columns of `v`
fn sort_ascending<const N: usize>(w: &mut [f64; N], v: &mut [[f64; N]; N]) {
    // Bubble sort: N is 2 or 3
    let mut switched = true;
    while switched {
        switched = false;
        for n in 0..N - 1 {
            if w[n] > w[n + 1] {
                w.swap(n, n + 1);
                for row in v.iter_mut() {
                    row.swap(n, n + 1);
                }
                switched = true;
            }
        }
    }
}

/// Horizontal error ellipse from the (xx, xy; xy, yy) sub-matrix of a
/// covariance matrix
pub fn horizontal_ellipse(cov: &Mat3, del_chi_2: f64) -> Result<Ellipse2D, Error> {
    let a = [[cov[0][0], cov[0][1]], [cov[0][1], cov[1][1]]];
    let (mut w, mut v) = svd::symmetric(a);
    if w[0] < SMALL_SINGULAR_VALUE || w[1] < SMALL_SINGULAR_VALUE {
        return Err(Error::DegenerateCovariance);
    }
    sort_ascending(&mut w, &mut v);

    let mut az1 = v[0][0].atan2(v[1][0]).to_degrees();
    az1 = normalize_positive_deg(az1);
    if az1 >= 180.0 {
        az1 -= 180.0;
    }

    Ok(Ellipse2D {
        az1,
        len1: (del_chi_2 * w[0]).sqrt(),
        len2: (del_chi_2 * w[1]).sqrt(),
    })
}

/// Confidence ellipsoid of a 3×3 covariance matrix at the given delta
/// chi-square
pub fn error_ellipsoid(cov: &Mat3, del_chi_2: f64) -> Result<Ellipsoid3D, Error> {
    let a = [
        [cov[0][0], cov[0][1], cov[0][2]],
        [cov[0][1], cov[1][1], cov[1][2]],
        [cov[0][2], cov[1][2], cov[2][2]],
    ];
    let (mut w, mut v) = svd::symmetric(a);
    if w.iter().any(|wi| *wi < SMALL_SINGULAR_VALUE) {
        return Err(Error::DegenerateCovariance);
    }
    sort_ascending(&mut w, &mut v);

    let axis = |col: usize| -> (f64, f64) {
        let az = normalize_positive_deg(v[0][col].atan2(v[1][col]).to_degrees());
        let dip = v[2][col].clamp(-1.0, 1.0).asin().to_degrees();
        (az, dip)
    };
    let (az1, dip1) = axis(0);
    let (az2, dip2) = axis(1);
    let (az3, dip3) = axis(2);

    Ok(Ellipsoid3D {
        az1,
        dip1,
        len1: (del_chi_2 * w[0]).sqrt(),
        az2,
        dip2,
        len2: (del_chi_2 * w[1]).sqrt(),
        len3: (del_chi_2 * w[2]).sqrt(),
        az3,
        dip3,
    })
}

/// Unit direction of an (azimuth, dip) axis, in the x = east, y = north,
/// z = up frame the ellipse azimuths are defined against
fn axis_direction(az: f64, dip: f64) -> Vec3 {
    // Azimuth CW from north converted to CCW from east, dips downward
    // converted to upward
    let strike = (90.0 - az).to_radians();
    let rise = (-dip).to_radians();
    Vec3::new(
        strike.cos() * rise.cos(),
        strike.sin() * rise.cos(),
        -rise.sin(),
    )
}

fn plunge_azimuth(axis: Vec3) -> (f64, f64) {
    let hypot = axis[0].hypot(axis[1]);
    let mut plunge = if axis[2] >= 0.0 { 90.0 } else { -90.0 };
    if hypot > f64::MIN_POSITIVE {
        plunge = (axis[2] / hypot).atan().to_degrees();
    }
    let mut azimuth = axis[0].atan2(axis[1]).to_degrees();
    if azimuth < 0.0 {
        azimuth += 360.0;
    }
    if plunge < 0.0 {
        plunge = -plunge;
        azimuth -= 180.0;
        if azimuth < 0.0 {
            azimuth += 360.0;
        }
    }
    (plunge, azimuth)
}

impl Ellipsoid3D {
    /// The three scaled axis vectors; the third is the cross product of
    /// the first two, so the triple is right-handed
    #[must_use]
    pub fn to_axes(&self) -> (Vec3, Vec3, Vec3) {
        let a1 = axis_direction(self.az1, self.dip1);
        let a2 = axis_direction(self.az2, self.dip2);
        let a3 = a1.cross(a2);
        (a1 * self.len1, a2 * self.len2, a3 * self.len3)
    }

    /// Reorder into the major/intermediate/minor presentation with
    /// (plunge, azimuth) orientations
    #[must_use]
    pub fn to_xml_confidence(&self) -> XmlEllipsoid {
        let (_, axis2, axis3) = self.to_axes();
        let (major_plunge, major_azimuth) = plunge_azimuth(axis3);
        let (intermediate_plunge, intermediate_azimuth) = plunge_azimuth(axis2);
        XmlEllipsoid {
            semi_major_axis_length: self.len3,
            major_axis_plunge: major_plunge,
            major_axis_azimuth: major_azimuth,
            semi_intermediate_axis_length: self.len2,
            intermediate_axis_plunge: intermediate_plunge,
            intermediate_axis_azimuth: intermediate_azimuth,
            semi_minor_axis_length: self.len1,
        }
    }

    /// Convert to the QuakeML Tait-Bryan representation.
    ///
    /// The axis matrix `T` (rows: major, minor, intermediate, as unit
    /// vectors) is stripped of the heading rotation `R_psi` about z and
    /// the elevation rotation `R_phi` about the rotated y axis; what
    /// remains is the bank rotation, whose angle is read off the residual
    /// matrix.
    pub fn to_qml_tait_bryan(&self) -> Result<QmlEllipsoid, Error> {
        let psi = normalize_positive_deg(self.az3);
        let phi = self.dip3;

        let (psi_sin, psi_cos) = psi.to_radians().sin_cos();
        let (phi_sin, phi_cos) = phi.to_radians().sin_cos();

        let r_psi = Mat3([
            [psi_cos, psi_sin, 0.0],
            [-psi_sin, psi_cos, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let r_phi = Mat3([
            [phi_cos, 0.0, phi_sin],
            [0.0, 1.0, 0.0],
            [-phi_sin, 0.0, phi_cos],
        ]);

        let row = |az: f64, dip: f64| -> Vec3 {
            let (az_sin, az_cos) = az.to_radians().sin_cos();
            let (dip_sin, dip_cos) = dip.to_radians().sin_cos();
            Vec3::new(az_cos * dip_cos, az_sin * dip_cos, dip_sin)
        };
        let t = Mat3::from_rows(
            row(self.az3, self.dip3),
            row(self.az1, self.dip1),
            row(self.az2, self.dip2),
        );

        let residual = t * r_psi.inverse()? * r_phi.inverse()?;
        let theta = normalize_positive_deg(residual[1][2].atan2(residual[1][1]).to_degrees());

        Ok(QmlEllipsoid {
            semi_major_axis_length: self.len3,
            semi_minor_axis_length: self.len1,
            semi_intermediate_axis_length: self.len2,
            major_axis_azimuth: psi,
            major_axis_plunge: phi,
            major_axis_rotation: theta,
        })
    }

    /// Rebuild the axis representation from Tait-Bryan angles; the inverse
    /// of [`to_qml_tait_bryan`](Self::to_qml_tait_bryan)
    #[must_use]
    pub fn from_qml_tait_bryan(qml: &QmlEllipsoid) -> Ellipsoid3D {
        let (psi_sin, psi_cos) = qml.major_axis_azimuth.to_radians().sin_cos();
        let (phi_sin, phi_cos) = qml.major_axis_plunge.to_radians().sin_cos();
        let (theta_sin, theta_cos) = qml.major_axis_rotation.to_radians().sin_cos();

        let r_psi = Mat3([
            [psi_cos, psi_sin, 0.0],
            [-psi_sin, psi_cos, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let r_phi = Mat3([
            [phi_cos, 0.0, phi_sin],
            [0.0, 1.0, 0.0],
            [-phi_sin, 0.0, phi_cos],
        ]);
        let r_theta = Mat3([
            [1.0, 0.0, 0.0],
            [0.0, theta_cos, theta_sin],
            [0.0, -theta_sin, theta_cos],
        ]);

        let t = r_theta * r_phi * r_psi;
        let angles = |r: usize| -> (f64, f64) {
            let az = normalize_positive_deg(t[r][1].atan2(t[r][0]).to_degrees());
            let dip = t[r][2].clamp(-1.0, 1.0).asin().to_degrees();
            (az, dip)
        };
        let (az3, dip3) = angles(0);
        let (az1, dip1) = angles(1);
        let (az2, dip2) = angles(2);

        Ellipsoid3D {
            az1,
            dip1,
            len1: qml.semi_minor_axis_length,
            az2,
            dip2,
            len2: qml.semi_intermediate_axis_length,
            len3: qml.semi_major_axis_length,
            az3,
            dip3,
        }
    }
}

// ----- T E S T S ------------------------------------------------------------------
