//! Keplerian orbits.

use std::f64::consts;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    consts::mu,
    error::{ensure_mass, OrbitError, Result},
    kepler::anomaly::{self, KeplerSolution},
    time::UT,
};

/// Floor applied to the orbital radius before it is used as a divisor.
pub const MIN_RADIUS: f64 = 1e-6;

/// Eccentricities this close to 1 are treated as parabolic.
const PARABOLIC_TOL: f64 = 1e-9;

/// Below this, eccentricity or the node vector are considered zero when
/// recovering elements from a state vector.
const DEGENERATE_TOL: f64 = 1e-11;

/// Conic section family of an orbit. Only elliptical orbits are propagated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbitKind {
    Elliptical,
    Parabolic,
    Hyperbolic,
}

impl OrbitKind {
    pub fn classify(eccentricity: f64) -> Self {
        if (eccentricity - 1.0).abs() < PARABOLIC_TOL {
            OrbitKind::Parabolic
        } else if eccentricity > 1.0 {
            OrbitKind::Hyperbolic
        } else {
            OrbitKind::Elliptical
        }
    }
}

/// A Keplerian orbit relative to its parent body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElements {
    /// Semi-major axis (m).
    pub semi_major_axis: f64,
    /// Eccentricity (dimensionless).
    pub eccentricity: f64,
    /// Inclination (radians).
    pub inclination: f64,
    /// Longitude of ascending node (radians).
    pub longitude_of_ascending_node: f64,
    /// Argument of periapsis (radians).
    pub argument_of_periapsis: f64,
    /// Mean anomaly at `epoch` (radians).
    pub mean_anomaly_at_epoch: f64,
    pub epoch: UT,
}

impl OrbitalElements {
    /// A circular, equatorial orbit with the body at periapsis at the
    /// simulation origin.
    pub fn circular(semi_major_axis: f64) -> Self {
        Self {
            semi_major_axis,
            eccentricity: 0.0,
            inclination: 0.0,
            longitude_of_ascending_node: 0.0,
            argument_of_periapsis: 0.0,
            mean_anomaly_at_epoch: 0.0,
            epoch: UT::ZERO,
        }
    }

    pub fn kind(&self) -> OrbitKind {
        OrbitKind::classify(self.eccentricity)
    }

    /// Reject anything the elliptical propagator cannot handle.
    pub fn validate(&self) -> Result<()> {
        let angles = [
            (self.inclination, "inclination"),
            (self.longitude_of_ascending_node, "longitude of ascending node"),
            (self.argument_of_periapsis, "argument of periapsis"),
            (self.mean_anomaly_at_epoch, "mean anomaly at epoch"),
        ];
        if let Some((_, name)) = angles.iter().find(|(v, _)| !v.is_finite()) {
            return Err(OrbitError::NonFinite(*name));
        }
        if !self.semi_major_axis.is_finite() {
            return Err(OrbitError::NonFinite("semi-major axis"));
        }
        if self.semi_major_axis <= 0.0 {
            return Err(OrbitError::NonPositiveSemiMajorAxis(self.semi_major_axis));
        }
        if !self.eccentricity.is_finite() {
            return Err(OrbitError::NonFinite("eccentricity"));
        }
        if self.eccentricity < 0.0 {
            return Err(OrbitError::Eccentricity(self.eccentricity));
        }
        match self.kind() {
            OrbitKind::Elliptical => Ok(()),
            kind => Err(OrbitError::UnsupportedOrbit(kind)),
        }
    }

    pub fn semi_latus_rectum(&self) -> f64 {
        self.semi_major_axis * (1.0 - self.eccentricity.powi(2))
    }

    pub fn periapsis_radius(&self) -> f64 {
        self.semi_major_axis * (1.0 - self.eccentricity)
    }

    pub fn apoapsis_radius(&self) -> f64 {
        self.semi_major_axis * (1.0 + self.eccentricity)
    }

    /// Mean motion (`rad/s`) around a parent with gravitational parameter
    /// `mu`.
    pub fn mean_motion(&self, mu: f64) -> f64 {
        libm::sqrt(mu / self.semi_major_axis.powi(3))
    }

    pub fn period(&self, mu: f64) -> f64 {
        consts::TAU / self.mean_motion(mu)
    }

    /// Mean anomaly at simulated time `t`, wrapped into `[0, 2pi)`.
    pub fn mean_anomaly_at(&self, t: UT, mu: f64) -> f64 {
        let dt = t.seconds_since(self.epoch);
        anomaly::wrap_angle(self.mean_anomaly_at_epoch + self.mean_motion(mu) * dt)
    }

    /// Rotation from the perifocal frame PQW into the parent frame: the
    /// 3-1-3 sequence `Rz(lan) * Rx(i) * Rz(argpe)`.
    pub fn pqw_to_parent(&self) -> Matrix3<f64> {
        pqw_to_parent(
            self.longitude_of_ascending_node,
            self.inclination,
            self.argument_of_periapsis,
        )
    }
}

fn pqw_to_parent(lan: f64, i: f64, argpe: f64) -> Matrix3<f64> {
    let (sl, cl) = (libm::sin(lan), libm::cos(lan));
    let (si, ci) = (libm::sin(i), libm::cos(i));
    let (sw, cw) = (libm::sin(argpe), libm::cos(argpe));

    let m11 = cl * cw - sl * sw * ci;
    let m12 = -cl * sw - sl * cw * ci;
    let m13 = sl * si;
    let m21 = sl * cw + cl * sw * ci;
    let m22 = -sl * sw + cl * cw * ci;
    let m23 = -cl * si;
    let m31 = sw * si;
    let m32 = cw * si;
    let m33 = ci;

    Matrix3::new(m11, m12, m13, m21, m22, m23, m31, m32, m33)
}

/// Position and velocity relative to a parent body (m, m/s).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl StateVector {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self { position, velocity }
    }

    pub fn specific_energy(&self, mu: f64) -> f64 {
        self.velocity.norm_squared() / 2.0 - mu / self.position.norm().max(MIN_RADIUS)
    }

    pub fn angular_momentum(&self) -> Vector3<f64> {
        self.position.cross(&self.velocity)
    }

    /// Recover orbital elements from this state, with `epoch` as the time
    /// the state refers to.
    ///
    /// Circular orbits get an argument of periapsis of zero and equatorial
    /// orbits a longitude of ascending node of zero; the anomaly absorbs the
    /// difference. Unbound or radial states are rejected.
    pub fn into_elements(self, parent_mass: f64, epoch: UT) -> Result<OrbitalElements> {
        let mu = mu(ensure_mass(parent_mass)?);
        let rv = self.position;
        let vv = self.velocity;
        if !(rv.iter().chain(vv.iter()).all(|x| x.is_finite())) {
            return Err(OrbitError::NonFinite("state vector"));
        }
        let r = rv.norm();
        if r < MIN_RADIUS {
            return Err(OrbitError::NonPositive {
                what: "orbital radius",
                value: r,
            });
        }

        let hv = rv.cross(&vv);
        let h = hv.norm();
        let ev = ((vv.norm_squared() - mu / r) * rv - rv.dot(&vv) * vv) / mu;
        let e = ev.norm();
        if h <= f64::EPSILON * r * vv.norm() {
            // radial trajectories have no orbital plane
            return Err(OrbitError::UnsupportedOrbit(if e >= 1.0 {
                OrbitKind::classify(e)
            } else {
                OrbitKind::Parabolic
            }));
        }

        let energy = self.specific_energy(mu);
        let kind = OrbitKind::classify(e);
        if kind != OrbitKind::Elliptical || energy >= 0.0 {
            return Err(OrbitError::UnsupportedOrbit(
                if kind == OrbitKind::Elliptical {
                    OrbitKind::Parabolic
                } else {
                    kind
                },
            ));
        }
        let a = -mu / (2.0 * energy);

        let i = libm::acos((hv[2] / h).clamp(-1.0, 1.0));
        let nv = Vector3::z().cross(&hv);
        let equatorial = nv.norm() < DEGENERATE_TOL * h;
        let circular = e < DEGENERATE_TOL;

        let lan = if equatorial {
            0.0
        } else {
            anomaly::wrap_angle(libm::atan2(nv[1], nv[0]))
        };

        // Express e and r in the frame whose x axis is the ascending node.
        let to_node = pqw_to_parent(lan, i, 0.0).transpose();
        let argpe = if circular {
            0.0
        } else {
            let en = to_node * ev;
            anomaly::wrap_angle(libm::atan2(en[1], en[0]))
        };
        let rn = to_node * rv;
        let arglat = libm::atan2(rn[1], rn[0]);
        let ta = anomaly::wrap_angle(arglat - argpe);
        let ea = anomaly::eccentric_from_true(ta, e);

        Ok(OrbitalElements {
            semi_major_axis: a,
            eccentricity: e,
            inclination: i,
            longitude_of_ascending_node: lan,
            argument_of_periapsis: argpe,
            mean_anomaly_at_epoch: anomaly::mean_from_eccentric(ea, e),
            epoch,
        })
    }
}

/// Position and velocity in the parent frame for a body at eccentric
/// anomaly `ea`.
///
/// The radius comes from the conic equation on the true anomaly, speed
/// from vis-viva and the direction of motion from the angular momentum
/// `h = sqrt(mu p)` split into radial `mu e sin(nu) / h` and transverse
/// `h / r` parts.
pub fn state_from_elements(
    elements: &OrbitalElements,
    ea: f64,
    parent_mass: f64,
) -> Result<StateVector> {
    elements.validate()?;
    let mu = mu(ensure_mass(parent_mass)?);
    if !ea.is_finite() {
        return Err(OrbitError::NonFinite("eccentric anomaly"));
    }

    let a = elements.semi_major_axis;
    let e = elements.eccentricity;
    let p = elements.semi_latus_rectum();
    let ta = anomaly::true_from_eccentric(ea, e);
    let (sin_ta, cos_ta) = (libm::sin(ta), libm::cos(ta));

    let r = (p / (1.0 + e * cos_ta)).max(MIN_RADIUS);
    let radial = Vector3::new(cos_ta, sin_ta, 0.0);
    let transverse = Vector3::new(-sin_ta, cos_ta, 0.0);

    let h = libm::sqrt(mu * p);
    let direction = (mu * e * sin_ta / h) * radial + (h / r) * transverse;
    let speed = libm::sqrt((mu * (2.0 / r - 1.0 / a)).max(0.0));

    let mat = elements.pqw_to_parent();
    Ok(StateVector {
        position: mat * (r * radial),
        velocity: mat * (speed * direction.normalize()),
    })
}

/// Propagate `elements` to simulated time `t` around a parent of the given
/// mass. The Kepler solution is returned with the state so callers can see
/// whether it was degraded.
pub fn state_at(
    elements: &OrbitalElements,
    t: UT,
    parent_mass: f64,
) -> Result<(StateVector, KeplerSolution)> {
    elements.validate()?;
    let mu = mu(ensure_mass(parent_mass)?);
    let ma = elements.mean_anomaly_at(t, mu);
    let solution = anomaly::solve_eccentric_anomaly(ma, elements.eccentricity)?;
    let sv = state_from_elements(elements, solution.eccentric_anomaly, parent_mass)?;
    Ok((sv, solution))
}
