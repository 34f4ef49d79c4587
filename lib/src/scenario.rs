//! Self-test scenarios with known answers.
//!
//! Each scenario solves Kepler's equation for one mean anomaly and checks
//! the solver and the state calculator against the closed-form ellipse in
//! terms of the eccentric anomaly,
//! `x = a (cos E - e)`, `y = a sqrt(1 - e^2) sin E`.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    consts::{mu, AU, EARTH_MASS, SOLAR_MASS},
    error::{ensure_mass, Result},
    kepler::{
        anomaly::solve_eccentric_anomaly,
        orbits::{state_from_elements, OrbitalElements, StateVector},
        KeplerSolution,
    },
};

/// Allowed error of the eccentric anomaly (rad).
pub const ANOMALY_TOLERANCE: f64 = 1e-6;
/// Allowed relative error of position and velocity.
pub const STATE_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub elements: OrbitalElements,
    pub parent_mass: f64,
    pub mean_anomaly: f64,
    pub expected_eccentric_anomaly: f64,
    /// Upper bound on Newton iterations.
    pub max_iterations: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub solution: KeplerSolution,
    pub anomaly_error: f64,
    pub position_error: f64,
    pub velocity_error: f64,
    /// Human readable descriptions of failed checks.
    pub failures: Vec<String>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

fn scenario(
    name: &str,
    elements: OrbitalElements,
    parent_mass: f64,
    mean_anomaly: f64,
    expected_eccentric_anomaly: f64,
    max_iterations: u32,
) -> Scenario {
    Scenario {
        name: name.to_owned(),
        elements,
        parent_mass,
        mean_anomaly,
        expected_eccentric_anomaly,
        max_iterations,
    }
}

pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        scenario(
            "earth-like",
            OrbitalElements {
                eccentricity: 0.0167,
                argument_of_periapsis: 1.796_767,
                ..OrbitalElements::circular(AU)
            },
            SOLAR_MASS,
            45f64.to_radians(),
            0.797_347_101_516_108_4,
            3,
        ),
        scenario(
            "circular",
            OrbitalElements::circular(7.0e6),
            EARTH_MASS,
            1.2,
            1.2,
            0,
        ),
        scenario(
            "moderate eccentricity",
            OrbitalElements {
                eccentricity: 0.3,
                ..OrbitalElements::circular(2.5 * AU)
            },
            SOLAR_MASS,
            2.0,
            2.236_031_495_172_436_5,
            6,
        ),
        scenario(
            "high eccentricity",
            OrbitalElements {
                eccentricity: 0.9,
                ..OrbitalElements::circular(17.8 * AU)
            },
            SOLAR_MASS,
            0.5,
            1.384_412_720_202_162_6,
            10,
        ),
        scenario(
            "inclined molniya",
            OrbitalElements {
                semi_major_axis: 2.66e7,
                eccentricity: 0.74,
                inclination: 63.4f64.to_radians(),
                longitude_of_ascending_node: 0.7,
                argument_of_periapsis: 270f64.to_radians(),
                ..OrbitalElements::circular(2.66e7)
            },
            EARTH_MASS,
            5.0,
            4.317_072_653_244_739,
            10,
        ),
    ]
}

/// Closed-form state at eccentric anomaly `ea`, rotated into the parent
/// frame.
fn closed_form(elements: &OrbitalElements, ea: f64, mu: f64) -> StateVector {
    let a = elements.semi_major_axis;
    let e = elements.eccentricity;
    let b = a * libm::sqrt(1.0 - e * e);
    let n = elements.mean_motion(mu);
    let (sin_e, cos_e) = (libm::sin(ea), libm::cos(ea));
    let denom = 1.0 - e * cos_e;

    let mat = elements.pqw_to_parent();
    StateVector {
        position: mat * Vector3::new(a * (cos_e - e), b * sin_e, 0.0),
        velocity: mat * Vector3::new(-n * a * sin_e / denom, n * b * cos_e / denom, 0.0),
    }
}

pub fn run(scenario: &Scenario) -> Result<ScenarioOutcome> {
    let mu = mu(ensure_mass(scenario.parent_mass)?);
    let e = scenario.elements.eccentricity;
    let solution = solve_eccentric_anomaly(scenario.mean_anomaly, e)?;
    let ea = solution.eccentric_anomaly;

    let computed = state_from_elements(&scenario.elements, ea, scenario.parent_mass)?;
    let reference = closed_form(&scenario.elements, ea, mu);
    let position_error = (computed.position - reference.position).norm() / reference.position.norm();
    let velocity_error = (computed.velocity - reference.velocity).norm() / reference.velocity.norm();
    let anomaly_error = (ea - scenario.expected_eccentric_anomaly).abs();

    let mut failures = Vec::new();
    if !solution.converged {
        failures.push(format!(
            "solver did not converge (residual {:e})",
            solution.residual
        ));
    }
    if solution.iterations > scenario.max_iterations {
        failures.push(format!(
            "took {} iterations, expected at most {}",
            solution.iterations, scenario.max_iterations
        ));
    }
    if anomaly_error > ANOMALY_TOLERANCE {
        failures.push(format!("eccentric anomaly off by {anomaly_error:e} rad"));
    }
    if position_error > STATE_TOLERANCE {
        failures.push(format!("position off by {position_error:e} (relative)"));
    }
    if velocity_error > STATE_TOLERANCE {
        failures.push(format!("velocity off by {velocity_error:e} (relative)"));
    }

    if failures.is_empty() {
        debug!(
            scenario = %scenario.name,
            iterations = solution.iterations,
            anomaly_error,
            "scenario passed"
        );
    } else {
        warn!(scenario = %scenario.name, ?failures, "scenario failed");
    }

    Ok(ScenarioOutcome {
        name: scenario.name.clone(),
        solution,
        anomaly_error,
        position_error,
        velocity_error,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_pass() {
        for scenario in builtin_scenarios() {
            let outcome = run(&scenario).unwrap();
            assert!(outcome.passed(), "{}: {:?}", outcome.name, outcome.failures);
        }
    }

    #[test]
    fn wrong_expectation_fails() {
        let mut scenario = builtin_scenarios().remove(0);
        scenario.expected_eccentric_anomaly += 1e-3;
        scenario.max_iterations = 0;
        let outcome = run(&scenario).unwrap();
        assert!(!outcome.passed());
        assert_eq!(outcome.failures.len(), 2);
    }

    #[test]
    fn rejects_invalid_scenarios() {
        let mut scenario = builtin_scenarios().remove(1);
        scenario.elements.eccentricity = 1.0;
        assert!(run(&scenario).is_err());
        scenario.elements.eccentricity = 0.0;
        scenario.parent_mass = -1.0;
        assert!(run(&scenario).is_err());
    }
}
