//! Impulsive maneuver planning.

use std::f64::consts;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    consts::mu,
    error::{ensure_mass, ensure_positive, Result},
    kepler::orbits::{OrbitalElements, StateVector},
    time::UT,
};

/// A two-impulse Hohmann transfer between coplanar circular orbits.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HohmannTransfer {
    pub parent_mass: f64,
    /// Radius of the departure orbit (m).
    pub r1: f64,
    /// Radius of the arrival orbit (m).
    pub r2: f64,
    /// Speed change at departure (m/s). Always non-negative; the burn is
    /// prograde when raising and retrograde when lowering.
    pub delta_v1: f64,
    /// Speed change at arrival (m/s).
    pub delta_v2: f64,
    /// Half the transfer ellipse's period (s).
    pub transfer_time: f64,
    pub transfer_semi_major_axis: f64,
}

/// Plan a Hohmann transfer from a circular orbit of radius `r1` to one of
/// radius `r2` around a parent of `parent_mass`.
///
/// ```
/// # use orrery::maneuver::plan_hohmann;
/// # use orrery::consts::EARTH_MASS;
/// let leo_to_geo = plan_hohmann(EARTH_MASS, 7.0e6, 4.2e7).unwrap();
/// assert!(leo_to_geo.total_delta_v() > 3700.0);
/// ```
pub fn plan_hohmann(parent_mass: f64, r1: f64, r2: f64) -> Result<HohmannTransfer> {
    let mu = mu(ensure_mass(parent_mass)?);
    let r1 = ensure_positive("departure radius", r1)?;
    let r2 = ensure_positive("arrival radius", r2)?;

    let at = (r1 + r2) / 2.0;
    let v1 = libm::sqrt(mu / r1);
    let v2 = libm::sqrt(mu / r2);
    // vis-viva on the transfer ellipse at both apsides
    let vt1 = libm::sqrt(mu * (2.0 / r1 - 1.0 / at));
    let vt2 = libm::sqrt(mu * (2.0 / r2 - 1.0 / at));

    Ok(HohmannTransfer {
        parent_mass,
        r1,
        r2,
        delta_v1: (vt1 - v1).abs(),
        delta_v2: (v2 - vt2).abs(),
        transfer_time: consts::PI * libm::sqrt(at * at * at / mu),
        transfer_semi_major_axis: at,
    })
}

impl HohmannTransfer {
    pub fn total_delta_v(&self) -> f64 {
        self.delta_v1 + self.delta_v2
    }

    pub fn is_raising(&self) -> bool {
        self.r2 >= self.r1
    }

    /// The transfer ellipse for a departure at `departure`, with the
    /// departure point at longitude `departure_longitude` in the equatorial
    /// plane of the parent.
    pub fn transfer_orbit(&self, departure: UT, departure_longitude: f64) -> OrbitalElements {
        let (rp, ra) = if self.is_raising() {
            (self.r1, self.r2)
        } else {
            (self.r2, self.r1)
        };
        // lowering transfers depart from apoapsis
        let (argpe, ma) = if self.is_raising() {
            (departure_longitude, 0.0)
        } else {
            (departure_longitude + consts::PI, consts::PI)
        };
        OrbitalElements {
            semi_major_axis: self.transfer_semi_major_axis,
            eccentricity: (ra - rp) / (ra + rp),
            inclination: 0.0,
            longitude_of_ascending_node: 0.0,
            argument_of_periapsis: crate::kepler::anomaly::wrap_angle(argpe),
            mean_anomaly_at_epoch: ma,
            epoch: departure,
        }
    }

    /// Angle (rad) the target must lead the departing body by at the first
    /// burn for the two to meet at arrival. Negative when the target must
    /// trail.
    pub fn phase_angle(&self) -> f64 {
        let ratio = (self.r1 + self.r2) / (2.0 * self.r2);
        consts::PI * (1.0 - libm::pow(ratio, 1.5))
    }

    /// Departure burn as a vector for a body in the circular departure orbit
    /// with state `sv`.
    pub fn departure_burn(&self, sv: &StateVector) -> Vector3<f64> {
        let sign = if self.is_raising() { 1.0 } else { -1.0 };
        frenet(sv) * Vector3::new(sign * self.delta_v1, 0.0, 0.0)
    }
}

/// Frenet frame to parent frame conversion matrix for the given state
/// vector. Columns are prograde, orbit normal and their cross product.
pub fn frenet(sv: &StateVector) -> Matrix3<f64> {
    let t = sv.velocity.normalize();
    let n = sv.position.cross(&sv.velocity).normalize();
    let b = t.cross(&n);
    Matrix3::from_columns(&[t, n, b])
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;
    use crate::{
        consts::{EARTH_MASS, G},
        error::OrbitError,
        kepler::orbits::state_from_elements,
    };

    // mu = 3.986004418e14
    const EARTH_MU_MASS: f64 = 3.986_004_418e14 / G;

    #[test]
    fn leo_to_geo() {
        let hohmann = plan_hohmann(EARTH_MU_MASS, 7.0e6, 4.2e7).unwrap();
        assert_relative_eq!(hohmann.delta_v1, 2334.0, max_relative = 0.01);
        assert_relative_eq!(hohmann.delta_v2, 1434.0, max_relative = 0.01);
        assert_relative_eq!(hohmann.total_delta_v(), 3768.0, max_relative = 0.01);
        assert_relative_eq!(hohmann.transfer_time, 19_082.0, max_relative = 0.01);
        assert_relative_eq!(hohmann.transfer_semi_major_axis, 2.45e7);
    }

    #[test]
    fn lowering_mirrors_raising() {
        let up = plan_hohmann(EARTH_MASS, 7.0e6, 4.2e7).unwrap();
        let down = plan_hohmann(EARTH_MASS, 4.2e7, 7.0e6).unwrap();
        assert_relative_eq!(up.delta_v1, down.delta_v2, max_relative = 1e-12);
        assert_relative_eq!(up.delta_v2, down.delta_v1, max_relative = 1e-12);
        assert_relative_eq!(up.transfer_time, down.transfer_time);
        assert!(down.phase_angle() < 0.0);
        assert!(up.phase_angle() > 0.0);
    }

    #[test]
    fn same_orbit_is_free() {
        let h = plan_hohmann(EARTH_MASS, 1.0e7, 1.0e7).unwrap();
        assert_abs_diff_eq!(h.total_delta_v(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(h.phase_angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            plan_hohmann(0.0, 1.0, 2.0),
            Err(OrbitError::NonPositiveMass(0.0))
        );
        assert!(plan_hohmann(EARTH_MASS, -1.0, 2.0).is_err());
        assert!(plan_hohmann(EARTH_MASS, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn transfer_orbit_touches_both_circles() {
        let h = plan_hohmann(EARTH_MASS, 7.0e6, 4.2e7).unwrap();
        let orbit = h.transfer_orbit(UT::ZERO, 0.3);
        assert_relative_eq!(orbit.periapsis_radius(), 7.0e6, max_relative = 1e-12);
        assert_relative_eq!(orbit.apoapsis_radius(), 4.2e7, max_relative = 1e-12);
        assert_relative_eq!(
            orbit.period(mu(EARTH_MASS)) / 2.0,
            h.transfer_time,
            max_relative = 1e-12
        );

        // departure state on the ellipse equals circular speed plus dv1
        let sv = state_from_elements(&orbit, 0.0, EARTH_MASS).unwrap();
        let circular = libm::sqrt(mu(EARTH_MASS) / 7.0e6);
        assert_relative_eq!(sv.velocity.norm(), circular + h.delta_v1, max_relative = 1e-9);
    }

    #[test]
    fn departure_burn_is_prograde() {
        let h = plan_hohmann(EARTH_MASS, 7.0e6, 4.2e7).unwrap();
        let sv = state_from_elements(&OrbitalElements::circular(7.0e6), 0.0, EARTH_MASS).unwrap();
        let burn = h.departure_burn(&sv);
        assert_relative_eq!(burn.norm(), h.delta_v1, max_relative = 1e-12);
        assert!(burn.dot(&sv.velocity) > 0.0);
    }
}
