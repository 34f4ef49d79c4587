//! Physical constants, SI units.

/// Newtonian constant of gravitation (`m^3 kg^-1 s^-2`).
pub const G: f64 = 6.674_30e-11;

/// Astronomical unit (`m`).
pub const AU: f64 = 1.495_978_707e11;

pub const SOLAR_MASS: f64 = 1.988_47e30;
pub const SOLAR_RADIUS: f64 = 6.957e8;
/// Nominal solar luminosity (`W`).
pub const SOLAR_LUMINOSITY: f64 = 3.828e26;

pub const EARTH_MASS: f64 = 5.972_2e24;
pub const EARTH_RADIUS: f64 = 6.371e6;

pub const JUPITER_MASS: f64 = 1.898_13e27;

pub const DAY: f64 = 86_400.0;

/// Standard gravitational parameter for a body of the given mass.
#[inline]
pub fn mu(mass: f64) -> f64 {
    G * mass
}
