#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::doc_markdown
)]
//! Orbital mechanics for simulated star systems: Kepler propagation,
//! Newtonian gravity, Hohmann transfers, procedural generation and a spatial
//! index over the resulting bodies.

pub mod arena;
pub mod bodies;
pub mod consts;
pub mod error;
pub mod generator;
pub mod gravity;
pub mod kepler;
pub mod maneuver;
pub mod scenario;
pub mod simulation;
pub mod spatial;
pub mod time;
pub mod units;

pub use error::{OrbitError, Result};
