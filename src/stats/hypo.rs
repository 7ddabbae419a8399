//! The hypocenter summary record: one text block per event, carrying the
//! origin, its quality measures and the full uncertainty description.

use super::ellipsoid::Ellipsoid3D;
use crate::mathlib::vector::{Mat3, Vec3};
use crate::Error;
use std::io::Write;

/// One located event, ready for the summary writer.
///
/// The origin time is broken into calendar fields the way phase files
/// carry it; coordinates are geographic (degrees, km depth).
#[derive(Debug, Clone, Default)]
pub struct Hypocenter {
    pub fileroot: String,
    pub status: String,
    pub status_comment: String,

    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: f64,

    pub lat: f64,
    pub lon: f64,
    pub depth: f64,

    pub prob_max: f64,
    pub misfit_min: f64,
    pub misfit_max: f64,
    pub rms: f64,
    pub nphs: i32,
    pub gap: f64,
    pub dist: f64,

    pub expect: Vec3,
    pub cov: Mat3,
    pub ellipsoid: Ellipsoid3D,
}

impl Hypocenter {
    /// Write the event as one NLLOC summary block, terminated by
    /// `END_NLLOC` and a blank line
    pub fn write(&self, w: &mut impl Write) -> Result<(), Error> {
        writeln!(
            w,
            "NLLOC \"{}\" \"{}\" \"{}\"",
            self.fileroot, self.status, self.status_comment
        )?;
        writeln!(
            w,
            "GEOGRAPHIC  OT {:04} {:02} {:02}  {:02} {:02} {:.6}  Lat {:.6} Long {:.6} Depth {:.6}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.lat,
            self.lon,
            self.depth
        )?;
        writeln!(
            w,
            "QUALITY  Pmax {:.6e} MFmin {:.6} MFmax {:.6} RMS {:.6} Nphs {} Gap {:.6} Dist {:.6}",
            self.prob_max,
            self.misfit_min,
            self.misfit_max,
            self.rms,
            self.nphs,
            self.gap,
            self.dist
        )?;
        writeln!(
            w,
            "STATISTICS  ExpectX {:.6} Y {:.6} Z {:.6}  CovXX {:.6} XY {:.6} XZ {:.6} YY {:.6} YZ {:.6} ZZ {:.6}  \
             EllAz1  {:.6} Dip1  {:.6} Len1  {:.6} Az2  {:.6} Dip2  {:.6} Len2  {:.6} Len3  {:.6e}",
            self.expect[0],
            self.expect[1],
            self.expect[2],
            self.cov[0][0],
            self.cov[0][1],
            self.cov[0][2],
            self.cov[1][1],
            self.cov[1][2],
            self.cov[2][2],
            self.ellipsoid.az1,
            self.ellipsoid.dip1,
            self.ellipsoid.len1,
            self.ellipsoid.az2,
            self.ellipsoid.dip2,
            self.ellipsoid.len2,
            self.ellipsoid.len3
        )?;

        let qml = self.ellipsoid.to_qml_tait_bryan()?;
        writeln!(
            w,
            "QML_ConfidenceEllipsoid  semiMajorAxisLength {:.6}  semiMinorAxisLength {:.6}  \
             semiIntermediateAxisLength {:.6}  majorAxisPlunge {:.6}  majorAxisAzimuth {:.6}  \
             majorAxisRotation {:.6}",
            qml.semi_major_axis_length,
            qml.semi_minor_axis_length,
            qml.semi_intermediate_axis_length,
            qml.major_axis_plunge,
            qml.major_axis_azimuth,
            qml.major_axis_rotation
        )?;
        writeln!(w, "END_NLLOC")?;
        writeln!(w)?;
        Ok(())
    }

    /// The summary block as a string
    pub fn to_record(&self) -> Result<String, Error> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        // The writer only emits ascii
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Hypocenter {
        Hypocenter {
            fileroot: "loc/event.19951205".to_string(),
            status: "LOCATED".to_string(),
            status_comment: "Location completed.".to_string(),
            year: 1995,
            month: 12,
            day: 5,
            hour: 22,
            minute: 1,
            second: 42.986,
            lat: 42.633,
            lon: 74.5,
            depth: 15.81,
            prob_max: 2.1e-5,
            misfit_min: 0.31,
            misfit_max: 4.2,
            rms: 0.24,
            nphs: 21,
            gap: 74.0,
            dist: 12.3,
            expect: Vec3::new(74.51, 42.64, 15.9),
            cov: Mat3([[4.1, 0.3, 0.1], [0.3, 6.2, -0.2], [0.1, -0.2, 9.4]]),
            ellipsoid: Ellipsoid3D {
                az1: 310.0,
                dip1: 83.0,
                len1: 6.1,
                az2: 49.0,
                dip2: 1.0,
                len2: 10.9,
                len3: 16.0,
                az3: 139.0,
                dip3: 6.0,
            },
        }
    }

    #[test]
    fn record_structure() {
        let record = event().to_record().unwrap();
        let lines: Vec<&str> = record.lines().collect();

        assert_eq!(
            lines[0],
            "NLLOC \"loc/event.19951205\" \"LOCATED\" \"Location completed.\""
        );
        assert!(lines[1].starts_with("GEOGRAPHIC  OT 1995 12 05  22 01 42.986000"));
        assert!(lines[1].contains("Lat 42.633000 Long 74.500000 Depth 15.810000"));
        assert!(lines[2].starts_with("QUALITY  Pmax"));
        assert!(lines[2].contains("Nphs 21"));
        assert!(lines[3].starts_with("STATISTICS  ExpectX"));
        assert!(lines[3].contains("CovXX 4.100000"));
        assert!(lines[3].contains("EllAz1  310.000000"));
        assert!(lines[4].starts_with("QML_ConfidenceEllipsoid  semiMajorAxisLength 16.000000"));
        assert!(lines[4].contains("majorAxisAzimuth 139.000000"));
        assert_eq!(lines[5], "END_NLLOC");
        // The record terminates with a blank line
        assert!(record.ends_with("END_NLLOC\n\n"));
    }

    #[test]
    fn rotation_field_matches_conversion() {
        let record = event().to_record().unwrap();
        assert!(record.contains("majorAxisRotation 88.907"));
    }
}
