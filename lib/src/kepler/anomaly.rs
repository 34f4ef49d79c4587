//! Conversions between mean, eccentric and true anomaly for elliptical
//! orbits.

use std::f64::consts;

use tracing::trace;

use crate::error::{OrbitError, Result};

/// Convergence threshold on the Newton step, in radians.
pub const TOLERANCE: f64 = 1e-6;

/// Iteration cap for [`solve_eccentric_anomaly`].
pub const MAX_ITERATIONS: u32 = 10;

/// Result of solving Kepler's equation.
///
/// A solution with `converged == false` is the solver's last estimate after
/// hitting the iteration cap. It is usable but degraded; call
/// [`KeplerSolution::converged`] to treat it as an error instead.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeplerSolution {
    pub eccentric_anomaly: f64,
    /// Newton updates performed. Zero when the initial guess already
    /// satisfied the tolerance.
    pub iterations: u32,
    /// `|M - (E - e sin E)|` at the returned estimate.
    pub residual: f64,
    pub converged: bool,
}

impl KeplerSolution {
    pub fn converged(self) -> Result<f64> {
        if self.converged {
            Ok(self.eccentric_anomaly)
        } else {
            Err(OrbitError::NotConverged {
                iterations: self.iterations,
                residual: self.residual,
            })
        }
    }
}

/// Wrap an angle into `[0, 2pi)`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(consts::TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= consts::TAU {
        0.0
    } else {
        wrapped
    }
}

fn check_eccentricity(e: f64) -> Result<()> {
    if !e.is_finite() {
        Err(OrbitError::NonFinite("eccentricity"))
    } else if !(0.0..1.0).contains(&e) {
        Err(OrbitError::Eccentricity(e))
    } else {
        Ok(())
    }
}

/// Solve Kepler's equation `M = E - e sin E` for the eccentric anomaly with
/// Newton-Raphson, starting from `E = M`.
///
/// Stops when the Newton step drops below [`TOLERANCE`] or after
/// [`MAX_ITERATIONS`]. Parabolic and hyperbolic eccentricities are rejected.
pub fn solve_eccentric_anomaly(mean_anomaly: f64, eccentricity: f64) -> Result<KeplerSolution> {
    solve_with(mean_anomaly, eccentricity, TOLERANCE, MAX_ITERATIONS)
}

/// [`solve_eccentric_anomaly`] with an explicit tolerance and iteration cap.
pub fn solve_with(ma: f64, e: f64, tol: f64, maxiter: u32) -> Result<KeplerSolution> {
    check_eccentricity(e)?;
    if !ma.is_finite() {
        return Err(OrbitError::NonFinite("mean anomaly"));
    }

    let residual = |ea: f64| (ma - (ea - e * libm::sin(ea))).abs();

    let mut ea = ma;
    if residual(ea) < tol {
        return Ok(KeplerSolution {
            eccentric_anomaly: ea,
            iterations: 0,
            residual: residual(ea),
            converged: true,
        });
    }

    let mut iter = 0;
    while iter < maxiter {
        let step = (ma - (ea - e * libm::sin(ea))) / (1.0 - e * libm::cos(ea));
        ea += step;
        iter += 1;
        trace!(iter, ea, step, "kepler newton step");

        if step.abs() < tol {
            return Ok(KeplerSolution {
                eccentric_anomaly: ea,
                iterations: iter,
                residual: residual(ea),
                converged: true,
            });
        }
    }

    Ok(KeplerSolution {
        eccentric_anomaly: ea,
        iterations: iter,
        residual: residual(ea),
        converged: false,
    })
}

/// True anomaly from eccentric anomaly by the half-angle identity
/// `tan(nu/2) = sqrt((1+e)/(1-e)) tan(E/2)`, evaluated with `atan2` so the
/// quadrant is right over the whole revolution. Returns `[0, 2pi)`.
pub fn true_from_eccentric(ea: f64, e: f64) -> f64 {
    let half = ea / 2.0;
    wrap_angle(
        2.0 * libm::atan2(
            libm::sqrt(1.0 + e) * libm::sin(half),
            libm::sqrt(1.0 - e) * libm::cos(half),
        ),
    )
}

/// Inverse of [`true_from_eccentric`]. Returns `[0, 2pi)`.
pub fn eccentric_from_true(ta: f64, e: f64) -> f64 {
    let half = ta / 2.0;
    wrap_angle(
        2.0 * libm::atan2(
            libm::sqrt(1.0 - e) * libm::sin(half),
            libm::sqrt(1.0 + e) * libm::cos(half),
        ),
    )
}

pub fn mean_from_eccentric(ea: f64, e: f64) -> f64 {
    wrap_angle(ea - e * libm::sin(ea))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn earth_like_orbit() {
        let sol = solve_eccentric_anomaly(45f64.to_radians(), 0.0167).unwrap();
        assert!(sol.converged);
        assert!(sol.iterations <= 3, "took {} iterations", sol.iterations);
        assert_abs_diff_eq!(sol.eccentric_anomaly.to_degrees(), 45.68, epsilon = 0.01);
        assert!(sol.residual < 1e-6);
    }

    #[test]
    fn circular_orbit_is_identity() {
        for ma in [0.0, 0.3, 1.0, consts::PI, 4.0, 6.2] {
            let sol = solve_eccentric_anomaly(ma, 0.0).unwrap();
            assert_eq!(sol.eccentric_anomaly, ma);
            assert_eq!(sol.iterations, 0);
            assert!(sol.converged);
        }
    }

    #[test]
    fn rejects_non_elliptical() {
        assert_eq!(
            solve_eccentric_anomaly(1.0, 1.0),
            Err(OrbitError::Eccentricity(1.0))
        );
        assert_eq!(
            solve_eccentric_anomaly(1.0, 1.2),
            Err(OrbitError::Eccentricity(1.2))
        );
        assert_eq!(
            solve_eccentric_anomaly(1.0, -0.1),
            Err(OrbitError::Eccentricity(-0.1))
        );
        assert_eq!(
            solve_eccentric_anomaly(f64::NAN, 0.1),
            Err(OrbitError::NonFinite("mean anomaly"))
        );
    }

    #[test]
    fn reports_non_convergence() {
        let sol = solve_with(0.5, 0.95, 1e-15, 2).unwrap();
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 2);
        assert!(matches!(
            sol.converged(),
            Err(OrbitError::NotConverged { iterations: 2, .. })
        ));
    }

    #[test]
    fn moderate_eccentricity_converges_quickly() {
        for i in 0..36 {
            let ma = i as f64 * 10f64.to_radians();
            for e in [0.3, 0.45, 0.6] {
                let sol = solve_eccentric_anomaly(ma, e).unwrap();
                assert!(sol.converged);
                assert!(sol.iterations <= 6, "e={e} M={ma}: {}", sol.iterations);
            }
        }
    }

    #[test]
    fn anomaly_conversions_agree() {
        for i in 0..72 {
            let ea = i as f64 * 5f64.to_radians();
            for e in [0.0, 0.1, 0.5, 0.9] {
                let ta = true_from_eccentric(ea, e);
                assert!((0.0..consts::TAU).contains(&ta));
                let back = eccentric_from_true(ta, e);
                let diff = (back - wrap_angle(ea)).abs();
                assert!(diff < 1e-9 || (consts::TAU - diff) < 1e-9, "e={e} E={ea}");
            }
        }
    }

    #[test]
    fn true_anomaly_quadrants() {
        // past apoapsis the body is on the returning half of the ellipse
        let ta = true_from_eccentric(1.5 * consts::PI, 0.5);
        assert!(ta > consts::PI && ta < consts::TAU);
        assert_abs_diff_eq!(true_from_eccentric(consts::PI, 0.7), consts::PI, epsilon = 1e-12);
        assert_eq!(true_from_eccentric(0.0, 0.7), 0.0);
    }

    #[test]
    fn wrap() {
        assert_abs_diff_eq!(wrap_angle(-consts::FRAC_PI_2), 1.5 * consts::PI);
        assert_abs_diff_eq!(wrap_angle(5.0 * consts::PI), consts::PI, epsilon = 1e-12);
        assert_eq!(wrap_angle(-1e-300), 0.0);
    }
}
