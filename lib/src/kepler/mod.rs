//! Two-body orbital mechanics.

pub mod anomaly;
pub mod orbits;

pub use anomaly::{solve_eccentric_anomaly, KeplerSolution};
pub use orbits::{state_at, state_from_elements, OrbitKind, OrbitalElements, StateVector};
