#![doc = include_str!("../README.md")]

/// The bread-and-butter, shrink-wrapped and ready to use
pub mod prelude {
    pub use crate::Error;
    pub use crate::grd::*;
    pub use crate::slv::*;
    pub use crate::sts::*;
}

/// Extended prelude for model construction and custom front-ends
pub mod authoring {
    pub use crate::cmp::*;
    pub use crate::math::*;
    pub use crate::prelude::*;

    // External material
    pub use log::debug;
    pub use log::error;
    pub use log::info;
    pub use log::trace;
    pub use log::warn;
}

/// Grid substrate: storage, addressing, interpolation, file format
pub mod grd {
    pub use crate::grid::Grid3;
    pub use crate::grid::GridHdr;
    pub use crate::grid::Source;
    pub use crate::grid::angles::TakeOffAngles;
    pub use crate::grid::io::SwapMode;
    pub use crate::grid::kind::ElemKind;
    pub use crate::grid::kind::GridKind;
}

/// The spherical finite-difference travel-time solver
pub mod slv {
    pub use crate::solver::travel_time;
    pub use crate::solver::travel_time_with_stats;
    pub use crate::solver::Face;
    pub use crate::solver::SolverConfig;
    pub use crate::solver::SolverStats;
    pub use crate::solver::SphericalFrame;
    pub use crate::solver::SrcLoc;
}

/// Location statistics: expectation, covariance, confidence ellipsoids
pub mod sts {
    pub use crate::stats::covariance_global;
    pub use crate::stats::covariance_global_weighted;
    pub use crate::stats::covariance_rect;
    pub use crate::stats::ellipsoid::error_ellipsoid;
    pub use crate::stats::ellipsoid::horizontal_ellipse;
    pub use crate::stats::ellipsoid::Ellipse2D;
    pub use crate::stats::ellipsoid::Ellipsoid3D;
    pub use crate::stats::ellipsoid::QmlEllipsoid;
    pub use crate::stats::ellipsoid::XmlEllipsoid;
    pub use crate::stats::ellipsoid::DELTA_CHI_SQR_68_2;
    pub use crate::stats::ellipsoid::DELTA_CHI_SQR_68_3;
    pub use crate::stats::expectation;
    pub use crate::stats::expectation_global;
    pub use crate::stats::expectation_global_weighted;
    pub use crate::stats::expectation_weighted;
    pub use crate::stats::grid_covariance;
    pub use crate::stats::grid_expectation;
    pub use crate::stats::hypo::Hypocenter;
    pub use crate::stats::Sample;
}

/// Elements for composing 3D volumes from 2D sections
pub mod cmp {
    pub use crate::compose::compose_polar;
    pub use crate::compose::AzimuthInterp;
    pub use crate::compose::ComposeConfig;
    pub use crate::compose::ComposeCounters;
    pub use crate::compose::IsolineCutoff;
    pub use crate::compose::Section2D;
    pub use crate::compose::VelocityMapping;
}

/// Vector/matrix algebra and spherical geometry
pub mod math {
    pub use crate::mathlib::spherical;
    pub use crate::mathlib::svd;
    pub use crate::mathlib::vector::Mat3;
    pub use crate::mathlib::vector::Vec3;
}

use thiserror::Error;
/// The *Hypogrid* error messaging enumeration
#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("General error: '{0}'")]
    General(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid grid header in '{file}': {details}")]
    Header { file: String, details: String },

    #[error("Covariance matrix is degenerate (singular value below threshold)")]
    DegenerateCovariance,

    #[error("Singular matrix in '{0}'")]
    SingularMatrix(&'static str),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid: {0}")]
    Invalid(String),
}

mod compose;
mod grid;
mod mathlib;
mod solver;
mod stats;
