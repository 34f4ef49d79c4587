//! Newtonian gravity and spheres of influence.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    consts::G,
    error::{ensure_mass, ensure_positive, OrbitError, Result},
};

/// Default separation floor (m).
pub const DEFAULT_MIN_DISTANCE: f64 = 1.0e3;

/// A massive body reduced to what gravity needs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointMass {
    pub position: Vector3<f64>,
    pub mass: f64,
}

impl PointMass {
    pub fn new(position: Vector3<f64>, mass: f64) -> Self {
        Self { position, mass }
    }
}

/// Inverse-square field evaluation with a minimum-separation clamp.
///
/// Separations below `min_distance` are evaluated as if they were
/// `min_distance`, so a point sitting on a body's centre never produces an
/// infinite or NaN result. A source at exactly zero separation contributes
/// nothing since the direction is undefined.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GravityField {
    pub min_distance: f64,
}

impl Default for GravityField {
    fn default() -> Self {
        Self {
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }
}

impl GravityField {
    pub fn new(min_distance: f64) -> Result<Self> {
        Ok(Self {
            min_distance: ensure_positive("minimum distance", min_distance)?,
        })
    }

    /// Unit direction from `from` to `to` and the clamped separation, or
    /// `None` when the two coincide.
    fn separation(&self, from: Vector3<f64>, to: Vector3<f64>) -> Option<(Vector3<f64>, f64)> {
        let d = to - from;
        let r = d.norm();
        if r == 0.0 {
            None
        } else {
            Some((d / r, r.max(self.min_distance)))
        }
    }

    /// Gravitational acceleration (`m/s^2`) at `point` due to `sources`,
    /// i.e. the field strength `sum G m / r^2` towards each source.
    pub fn acceleration_at(
        &self,
        point: Vector3<f64>,
        sources: impl IntoIterator<Item = PointMass>,
    ) -> Result<Vector3<f64>> {
        sources
            .into_iter()
            .try_fold(Vector3::zeros(), |acc, src| {
                let mass = ensure_mass(src.mass)?;
                Ok(match self.separation(point, src.position) {
                    Some((dir, r)) => acc + dir * (G * mass / (r * r)),
                    None => acc,
                })
            })
    }

    /// Acceleration of a body with `receiver_mass` at `point`: the summed
    /// Newtonian force divided by the receiver's mass.
    pub fn acceleration_of(
        &self,
        receiver_mass: f64,
        point: Vector3<f64>,
        sources: impl IntoIterator<Item = PointMass>,
    ) -> Result<Vector3<f64>> {
        let receiver = PointMass::new(point, ensure_mass(receiver_mass)?);
        let force = sources
            .into_iter()
            .try_fold(Vector3::zeros(), |acc, src| {
                Ok::<_, OrbitError>(acc + self.force_between(receiver, src)?)
            })?;
        Ok(force / receiver_mass)
    }

    /// Force (N) exerted on `a` by `b`: `G m1 m2 / r^2` along the line from
    /// `a` to `b`.
    pub fn force_between(&self, a: PointMass, b: PointMass) -> Result<Vector3<f64>> {
        let (m1, m2) = (ensure_mass(a.mass)?, ensure_mass(b.mass)?);
        Ok(match self.separation(a.position, b.position) {
            Some((dir, r)) => dir * (G * m1 * m2 / (r * r)),
            None => Vector3::zeros(),
        })
    }

    /// Gravitational potential (`J/kg`) at `point`.
    pub fn potential_at(
        &self,
        point: Vector3<f64>,
        sources: impl IntoIterator<Item = PointMass>,
    ) -> Result<f64> {
        sources.into_iter().try_fold(0.0, |acc, src| {
            let mass = ensure_mass(src.mass)?;
            let r = (src.position - point).norm().max(self.min_distance);
            Ok(acc - G * mass / r)
        })
    }
}

/// Sphere of influence `d (m / M)^(2/5)` of a body of mass `mass` at
/// distance `distance` from a parent of mass `parent_mass`.
///
/// This is the Laplace sphere used for patched conics, an approximation of
/// the region where the body's gravity dominates; it is not the Hill sphere
/// (see [`hill_radius`]) and the two differ by a mass-dependent factor.
pub fn sphere_of_influence(mass: f64, parent_mass: f64, distance: f64) -> Result<f64> {
    let m = ensure_mass(mass)?;
    let big_m = ensure_mass(parent_mass)?;
    let d = ensure_positive("distance to parent", distance)?;
    Ok(d * libm::pow(m / big_m, 0.4))
}

/// Hill sphere radius `a (1 - e) (m / 3M)^(1/3)` at periapsis.
pub fn hill_radius(
    mass: f64,
    parent_mass: f64,
    semi_major_axis: f64,
    eccentricity: f64,
) -> Result<f64> {
    let m = ensure_mass(mass)?;
    let big_m = ensure_mass(parent_mass)?;
    let a = ensure_positive("semi-major axis", semi_major_axis)?;
    if !(0.0..1.0).contains(&eccentricity) {
        return Err(OrbitError::Eccentricity(eccentricity));
    }
    Ok(a * (1.0 - eccentricity) * libm::cbrt(m / (3.0 * big_m)))
}

/// Mutual Hill radius of two neighbouring orbits around the same parent.
pub fn mutual_hill_radius(m1: f64, a1: f64, m2: f64, a2: f64, parent_mass: f64) -> Result<f64> {
    let big_m = ensure_mass(parent_mass)?;
    let sum = ensure_mass(m1)? + ensure_mass(m2)?;
    let a1 = ensure_positive("semi-major axis", a1)?;
    let a2 = ensure_positive("semi-major axis", a2)?;
    let mean_a = (a1 + a2) / 2.0;
    Ok(mean_a * libm::cbrt(sum / (3.0 * big_m)))
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;
    use crate::consts::{AU, EARTH_MASS, SOLAR_MASS};

    #[test]
    fn inverse_square() {
        let field = GravityField::default();
        let src = [PointMass::new(Vector3::zeros(), EARTH_MASS)];
        for r in [7.0e6, 4.2e7, 3.8e8, 1.0e11] {
            let near = field.acceleration_at(Vector3::new(r, 0.0, 0.0), src).unwrap();
            let far = field.acceleration_at(Vector3::new(2.0 * r, 0.0, 0.0), src).unwrap();
            assert_relative_eq!(near.norm() / far.norm(), 4.0, max_relative = 1e-12);
            // pulled back towards the source
            assert!(near.x < 0.0);
        }
        let surface = field
            .acceleration_at(Vector3::new(6.371e6, 0.0, 0.0), src)
            .unwrap();
        assert_relative_eq!(surface.norm(), 9.82, max_relative = 1e-2);
    }

    #[test]
    fn singularity_is_clamped() {
        let field = GravityField::new(10.0).unwrap();
        let src = [PointMass::new(Vector3::zeros(), EARTH_MASS)];
        let at_centre = field.acceleration_at(Vector3::zeros(), src).unwrap();
        assert_eq!(at_centre, Vector3::zeros());
        let tiny = field
            .acceleration_at(Vector3::new(1e-30, 0.0, 0.0), src)
            .unwrap();
        assert!(tiny.iter().all(|x| x.is_finite()));
        assert_relative_eq!(tiny.norm(), G * EARTH_MASS / 100.0, max_relative = 1e-12);
        assert!(field.potential_at(Vector3::zeros(), src).unwrap().is_finite());
    }

    #[test]
    fn force_is_symmetric() {
        let field = GravityField::default();
        let a = PointMass::new(Vector3::new(1.0e7, 2.0e6, 0.0), 1.0e3);
        let b = PointMass::new(Vector3::new(-3.0e6, 0.0, 5.0e5), EARTH_MASS);
        let fab = field.force_between(a, b).unwrap();
        let fba = field.force_between(b, a).unwrap();
        assert_relative_eq!(fab, -fba, max_relative = 1e-12);
        let acc = field.acceleration_of(a.mass, a.position, [b]).unwrap();
        let fieldv = field.acceleration_at(a.position, [b]).unwrap();
        assert_relative_eq!(acc, fieldv, max_relative = 1e-12);
    }

    #[test]
    fn rejects_bad_masses() {
        let field = GravityField::default();
        let bad = [PointMass::new(Vector3::x(), -1.0)];
        assert_eq!(
            field.acceleration_at(Vector3::zeros(), bad),
            Err(OrbitError::NonPositiveMass(-1.0))
        );
        assert_eq!(
            field.acceleration_of(0.0, Vector3::zeros(), Vec::new()),
            Err(OrbitError::NonPositiveMass(0.0))
        );
        assert_eq!(
            sphere_of_influence(EARTH_MASS, 0.0, AU),
            Err(OrbitError::NonPositiveMass(0.0))
        );
        assert!(GravityField::new(0.0).is_err());
    }

    #[test]
    fn earth_sphere_of_influence_scale() {
        let soi = sphere_of_influence(EARTH_MASS, SOLAR_MASS, AU).unwrap();
        // ~925,000 km, real Hill sphere ~1.5 million km
        let hill = 1.5e9;
        assert!(soi > hill / 10.0 && soi < hill * 10.0, "soi = {soi}");
        assert_relative_eq!(soi, 9.25e8, max_relative = 1e-2);
        let exact_hill = hill_radius(EARTH_MASS, SOLAR_MASS, AU, 0.0).unwrap();
        assert_relative_eq!(exact_hill, 1.497e9, max_relative = 1e-2);
    }

    #[test]
    fn potential_matches_point_mass() {
        let field = GravityField::default();
        let src = [PointMass::new(Vector3::new(1.0, 2.0, 3.0), SOLAR_MASS)];
        let phi = field
            .potential_at(Vector3::new(1.0 + AU, 2.0, 3.0), src)
            .unwrap();
        assert_abs_diff_eq!(phi, -G * SOLAR_MASS / AU, epsilon = 1e-3);
    }
}
