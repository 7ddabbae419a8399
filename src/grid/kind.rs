//! Grid kind and element-type tags, and the physical decoding of the
//! velocity-family representations.

use crate::Error;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// What the scalar field of a grid means, following the NonLinLoc tag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridKind {
    #[default]
    Velocity,
    VelocityMeters,
    Slowness,
    SlowLen,
    Vel2,
    Slow2,
    Slow2Meters,
    Time,
    Time2d,
    Angle,
    Angle2d,
    Inclination,
    Inclination2d,
    ProbDensity,
    Misfit,
    Likelihood,
    Depth,
    Length,
    Coulomb,
    SsstTimeCorr,
}

#[rustfmt::skip]
const KIND_TAGS: [(&str, GridKind); 20] = [
    ("VELOCITY",        GridKind::Velocity),
    ("VELOCITY_METERS", GridKind::VelocityMeters),
    ("SLOWNESS",        GridKind::Slowness),
    ("SLOW_LEN",        GridKind::SlowLen),
    ("VEL2",            GridKind::Vel2),
    ("SLOW2",           GridKind::Slow2),
    ("SLOW2_METERS",    GridKind::Slow2Meters),
    ("TIME",            GridKind::Time),
    ("TIME2D",          GridKind::Time2d),
    ("ANGLE",           GridKind::Angle),
    ("ANGLE2D",         GridKind::Angle2d),
    ("INCLINATION",     GridKind::Inclination),
    ("INCLINATION2D",   GridKind::Inclination2d),
    ("PROB_DENSITY",    GridKind::ProbDensity),
    ("MISFIT",          GridKind::Misfit),
    ("LIKELIHOOD",      GridKind::Likelihood),
    ("DEPTH",           GridKind::Depth),
    ("LENGTH",          GridKind::Length),
    ("COULOMB",         GridKind::Coulomb),
    ("SSST_TIMECORR",   GridKind::SsstTimeCorr),
];

static TAG_TABLE: Lazy<BTreeMap<&'static str, GridKind>> =
    Lazy::new(|| KIND_TAGS.iter().copied().collect());

impl GridKind {
    /// The header tag of the kind
    #[must_use]
    pub fn tag(&self) -> &'static str {
        // The tag list is tiny, a linear scan is fine here
        KIND_TAGS
            .iter()
            .find(|(_, k)| k == self)
            .map(|(tag, _)| *tag)
            .unwrap_or("UNDEF")
    }

    /// The kind corresponding to a header tag
    pub fn from_tag(tag: &str) -> Result<GridKind, Error> {
        TAG_TABLE
            .get(tag)
            .copied()
            .ok_or_else(|| Error::Invalid(format!("unrecognized grid type '{tag}'")))
    }

    /// Take-off angle grids get the packed-angle treatment in interpolation
    #[must_use]
    pub fn is_angle(&self) -> bool {
        matches!(self, GridKind::Angle | GridKind::Angle2d)
    }

    /// Time-like and angle-like grids carry a source record in their header
    #[must_use]
    pub fn has_source(&self) -> bool {
        matches!(
            self,
            GridKind::Time
                | GridKind::Time2d
                | GridKind::Angle
                | GridKind::Angle2d
                | GridKind::Inclination
                | GridKind::Inclination2d
        )
    }

    /// The 2D variants describe degenerate (nx = 1) grids over (y, z)
    #[must_use]
    pub fn is_2d(&self) -> bool {
        matches!(
            self,
            GridKind::Time2d | GridKind::Angle2d | GridKind::Inclination2d
        )
    }

    /// True for the velocity-family kinds that [`velocity_from`](Self::velocity_from)
    /// and [`store_velocity`](Self::store_velocity) can decode and encode
    #[must_use]
    pub fn is_velocity_family(&self) -> bool {
        matches!(
            self,
            GridKind::Velocity
                | GridKind::VelocityMeters
                | GridKind::Slowness
                | GridKind::SlowLen
                | GridKind::Vel2
                | GridKind::Slow2
                | GridKind::Slow2Meters
        )
    }

    /// Decode a stored node value into a velocity in km/s.
    ///
    /// `len` is the grid step used by the slowness*length representation.
    pub fn velocity_from(&self, stored: f64, len: f64) -> Result<f64, Error> {
        Ok(match self {
            GridKind::Velocity => stored,
            GridKind::VelocityMeters => stored / 1000.0,
            GridKind::Slowness => 1.0 / stored,
            GridKind::SlowLen => len / stored,
            GridKind::Vel2 => stored.sqrt(),
            GridKind::Slow2 => 1.0 / stored.sqrt(),
            GridKind::Slow2Meters => 1.0e-3 / stored.sqrt(),
            _ => {
                return Err(Error::Unsupported(format!(
                    "cannot decode a velocity from a {} grid",
                    self.tag()
                )))
            }
        })
    }

    /// Encode a velocity in km/s into this kind's stored representation
    pub fn store_velocity(&self, vel: f64, len: f64) -> Result<f64, Error> {
        Ok(match self {
            GridKind::Velocity => vel,
            GridKind::VelocityMeters => 1000.0 * vel,
            GridKind::Slowness => 1.0 / vel,
            GridKind::SlowLen => len / vel,
            GridKind::Vel2 => vel * vel,
            GridKind::Slow2 => 1.0 / (vel * vel),
            GridKind::Slow2Meters => (1.0e-3 / vel) * (1.0e-3 / vel),
            _ => {
                return Err(Error::Unsupported(format!(
                    "cannot store a velocity into a {} grid",
                    self.tag()
                )))
            }
        })
    }
}

/// On-disk scalar element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElemKind {
    #[default]
    Float,
    Double,
}

impl ElemKind {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            ElemKind::Float => "FLOAT",
            ElemKind::Double => "DOUBLE",
        }
    }

    pub fn from_tag(tag: &str) -> Result<ElemKind, Error> {
        match tag {
            "FLOAT" => Ok(ElemKind::Float),
            "DOUBLE" => Ok(ElemKind::Double),
            _ => Err(Error::Invalid(format!("unrecognized element type '{tag}'"))),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            ElemKind::Float => 4,
            ElemKind::Double => 8,
        }
    }
}

// ----- T E S T S ---------------------------------------------------
