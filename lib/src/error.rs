use thiserror::Error;

use crate::{bodies::BodyId, kepler::orbits::OrbitKind, simulation::ProbeId};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum OrbitError {
    #[error("eccentricity {0} is outside the elliptical domain [0, 1)")]
    Eccentricity(f64),
    #[error("mass must be positive, got {0} kg")]
    NonPositiveMass(f64),
    #[error("semi-major axis must be positive, got {0} m")]
    NonPositiveSemiMajorAxis(f64),
    #[error("{what} must be positive, got {value}")]
    NonPositive { what: &'static str, value: f64 },
    #[error("{0} is not finite")]
    NonFinite(&'static str),
    #[error("Kepler solver did not converge after {iterations} iterations (residual {residual:e})")]
    NotConverged { iterations: u32, residual: f64 },
    #[error("{0:?} orbits are not supported")]
    UnsupportedOrbit(OrbitKind),
    #[error("unknown body {0}")]
    UnknownBody(BodyId),
    #[error("unknown probe {0}")]
    UnknownProbe(ProbeId),
    #[error("body {0} is a root body and has no parent orbit")]
    RootBody(BodyId),
    #[error("making {parent} the parent of {body} would create a cycle")]
    ParentCycle { body: BodyId, parent: BodyId },
    #[error("state of body {0} is not current, advance the simulation first")]
    StaleState(BodyId),
    #[error("time {0} s is out of the representable range")]
    TimeOverflow(f64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = OrbitError> = std::result::Result<T, E>;

/// Rejects non-finite or non-positive values.
pub(crate) fn ensure_positive(what: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        Err(OrbitError::NonFinite(what))
    } else if value <= 0.0 {
        Err(OrbitError::NonPositive { what, value })
    } else {
        Ok(value)
    }
}

pub(crate) fn ensure_mass(mass: f64) -> Result<f64> {
    if !mass.is_finite() {
        Err(OrbitError::NonFinite("mass"))
    } else if mass <= 0.0 {
        Err(OrbitError::NonPositiveMass(mass))
    } else {
        Ok(mass)
    }
}
