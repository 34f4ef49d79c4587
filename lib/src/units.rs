//! Conversion between SI and the units a consumer works in.
//!
//! Everything inside the library is SI. A [`UnitScale`] is applied only at
//! the boundary, e.g. to print kilometres or hand an engine its own units.

use itertools::Itertools;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    bodies::StarSystem,
    consts::{AU, DAY, G, SOLAR_MASS},
    error::{ensure_positive, Result},
};

/// One scaled unit of distance, mass and time expressed in SI.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitScale {
    pub dist_sf: f64,
    pub mass_sf: f64,
    pub time_sf: f64,
}

impl Default for UnitScale {
    fn default() -> Self {
        Self::SI
    }
}

impl UnitScale {
    pub const SI: Self = Self {
        dist_sf: 1.0,
        mass_sf: 1.0,
        time_sf: 1.0,
    };

    /// Kilometres, kilograms and seconds.
    pub const KILOMETRES: Self = Self {
        dist_sf: 1.0e3,
        mass_sf: 1.0,
        time_sf: 1.0,
    };

    /// AU, solar masses and days.
    pub const ASTRONOMICAL: Self = Self {
        dist_sf: AU,
        mass_sf: SOLAR_MASS,
        time_sf: DAY,
    };

    pub fn new(dist_sf: f64, mass_sf: f64, time_sf: f64) -> Result<Self> {
        Ok(Self {
            dist_sf: ensure_positive("distance scale", dist_sf)?,
            mass_sf: ensure_positive("mass scale", mass_sf)?,
            time_sf: ensure_positive("time scale", time_sf)?,
        })
    }

    /// Units in which `G = 1` for the given system: the mean root mass,
    /// the mean separation of root bodies (or the outermost orbit when
    /// there is a single root) and the matching dynamical time.
    pub fn natural(system: &StarSystem) -> Result<Self> {
        let roots = system.roots().collect_vec();
        let mass_sf =
            roots.iter().map(|b| b.mass()).sum::<f64>() / (roots.len().max(1) as f64);

        let seps = roots
            .iter()
            .combinations(2)
            .map(|p| (p[0].anchor() - p[1].anchor()).norm())
            .collect_vec();
        let dist_sf = if seps.is_empty() {
            system
                .bodies()
                .filter_map(|b| b.elements())
                .map(|el| el.apoapsis_radius())
                .fold(0.0, f64::max)
        } else {
            seps.iter().sum::<f64>() / seps.len() as f64
        };

        let dist_sf = ensure_positive("distance scale", dist_sf)?;
        let mass_sf = ensure_positive("mass scale", mass_sf)?;
        let time_sf = libm::sqrt(dist_sf.powi(3) / (G * mass_sf));
        Ok(Self {
            dist_sf,
            mass_sf,
            time_sf,
        })
    }

    pub fn distance(&self, metres: f64) -> f64 {
        metres / self.dist_sf
    }

    pub fn position(&self, metres: Vector3<f64>) -> Vector3<f64> {
        metres / self.dist_sf
    }

    pub fn velocity(&self, metres_per_second: Vector3<f64>) -> Vector3<f64> {
        metres_per_second * self.time_sf / self.dist_sf
    }

    pub fn speed(&self, metres_per_second: f64) -> f64 {
        metres_per_second * self.time_sf / self.dist_sf
    }

    pub fn mass(&self, kg: f64) -> f64 {
        kg / self.mass_sf
    }

    pub fn time(&self, seconds: f64) -> f64 {
        seconds / self.time_sf
    }
}
