//! Procedural star-system generation.
//!
//! Generation is a pure function of the seed and the configuration: one
//! ChaCha8 stream drawn in a fixed order, with all transcendental functions
//! going through `libm`, so a seed produces the same system bit for bit on
//! every platform.

use std::f64::consts;

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    bodies::{BodyId, BodyKind, StarSystem},
    consts::{AU, EARTH_MASS, EARTH_RADIUS, SOLAR_MASS, SOLAR_RADIUS},
    error::{OrbitError, Result},
    gravity::mutual_hill_radius,
    kepler::orbits::OrbitalElements,
    time::UT,
};

const MAX_PLANETS: u32 = 24;
const MAX_MOONS: u32 = 20;
const ROMAN: [&str; MAX_MOONS as usize] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII", "XIII", "XIV", "XV",
    "XVI", "XVII", "XVIII", "XIX", "XX",
];

/// Tunables for [`generate`]. Masses of stars are in solar masses, masses
/// of planets in Earth masses, distances of orbits in AU scaled by the root
/// of the stellar luminosity where noted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Inclusive range for the number of root stars.
    pub star_count: (u32, u32),
    pub star_mass: (f64, f64),
    /// Distance between neighbouring stars along x (m).
    pub star_separation: f64,
    /// Inclusive range for the number of planets per star.
    pub planet_count: (u32, u32),
    /// First orbit at `inner_orbit_factor * sqrt(L)` AU.
    pub inner_orbit_factor: f64,
    /// Relative jitter applied to the first orbit.
    pub orbit_jitter: f64,
    /// Ratio between neighbouring semi-major axes.
    pub spacing_ratio: (f64, f64),
    /// Minimum gap between neighbours in mutual Hill radii.
    pub hill_spacing: f64,
    /// Gas giants form up to this multiple of the habitable zone's outer edge.
    pub giant_zone_factor: f64,
    pub rocky_mass: (f64, f64),
    pub terran_mass: (f64, f64),
    pub gas_giant_mass: (f64, f64),
    pub ice_giant_mass: (f64, f64),
    pub max_eccentricity: f64,
    /// Radians.
    pub max_inclination: f64,
    /// Giants get up to this many moons.
    pub max_moons: u32,
    /// Innermost moon orbit in planet radii.
    pub moon_min_radii: f64,
    /// Outermost moon orbit as a fraction of the planet's sphere of
    /// influence.
    pub moon_soi_fraction: f64,
    /// Moon mass as a fraction of its planet's.
    pub moon_mass_fraction: (f64, f64),
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            star_count: (1, 1),
            star_mass: (0.6, 1.4),
            star_separation: 2000.0 * AU,
            planet_count: (3, 9),
            inner_orbit_factor: 0.35,
            orbit_jitter: 0.2,
            spacing_ratio: (1.4, 2.0),
            hill_spacing: 8.0,
            giant_zone_factor: 5.0,
            rocky_mass: (0.05, 3.0),
            terran_mass: (0.5, 2.5),
            gas_giant_mass: (30.0, 1000.0),
            ice_giant_mass: (8.0, 25.0),
            max_eccentricity: 0.1,
            max_inclination: 0.05,
            max_moons: 4,
            moon_min_radii: 3.0,
            moon_soi_fraction: 0.5,
            moon_mass_fraction: (1e-6, 1e-4),
        }
    }
}

fn invalid(msg: impl Into<String>) -> OrbitError {
    OrbitError::InvalidConfig(msg.into())
}

fn check_range(name: &str, (lo, hi): (f64, f64)) -> Result<()> {
    if !(lo.is_finite() && hi.is_finite()) || lo <= 0.0 || lo > hi {
        Err(invalid(format!(
            "{name} must be a positive range with min <= max, got ({lo}, {hi})"
        )))
    } else {
        Ok(())
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        let (s_lo, s_hi) = self.star_count;
        if s_lo == 0 || s_lo > s_hi {
            return Err(invalid(format!(
                "star_count must be at least 1 with min <= max, got ({s_lo}, {s_hi})"
            )));
        }
        let (p_lo, p_hi) = self.planet_count;
        if p_lo > p_hi || p_hi > MAX_PLANETS {
            return Err(invalid(format!(
                "planet_count must have min <= max <= {MAX_PLANETS}, got ({p_lo}, {p_hi})"
            )));
        }
        if self.max_moons > MAX_MOONS {
            return Err(invalid(format!(
                "max_moons must be at most {MAX_MOONS}, got {}",
                self.max_moons
            )));
        }
        check_range("star_mass", self.star_mass)?;
        check_range("spacing_ratio", self.spacing_ratio)?;
        if self.spacing_ratio.0 <= 1.0 {
            return Err(invalid("spacing_ratio must be greater than 1"));
        }
        check_range("rocky_mass", self.rocky_mass)?;
        check_range("terran_mass", self.terran_mass)?;
        check_range("gas_giant_mass", self.gas_giant_mass)?;
        check_range("ice_giant_mass", self.ice_giant_mass)?;
        check_range("moon_mass_fraction", self.moon_mass_fraction)?;
        check_positive("star_separation", self.star_separation)?;
        check_positive("inner_orbit_factor", self.inner_orbit_factor)?;
        check_positive("hill_spacing", self.hill_spacing)?;
        check_positive("moon_min_radii", self.moon_min_radii)?;
        check_positive("moon_soi_fraction", self.moon_soi_fraction)?;
        if self.giant_zone_factor < 1.0 || !self.giant_zone_factor.is_finite() {
            return Err(invalid("giant_zone_factor must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.orbit_jitter) {
            return Err(invalid("orbit_jitter must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.max_eccentricity) {
            return Err(invalid("max_eccentricity must be in [0, 1)"));
        }
        if !(0.0..=consts::PI).contains(&self.max_inclination) {
            return Err(invalid("max_inclination must be in [0, pi]"));
        }
        if self.moon_soi_fraction > 1.0 || self.moon_mass_fraction.1 >= 1.0 {
            return Err(invalid("moons must stay within their planet's influence"));
        }
        Ok(())
    }
}

/// Circumstellar habitable zone in AU.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HabitableZone {
    pub inner_edge: f64,
    pub outer_edge: f64,
}

impl HabitableZone {
    /// Inverse-square flux limits around a star of `luminosity` solar
    /// luminosities.
    pub fn from_luminosity(luminosity: f64) -> Self {
        Self {
            inner_edge: libm::sqrt(luminosity / 1.1),
            outer_edge: libm::sqrt(luminosity / 0.53),
        }
    }

    pub fn contains(&self, distance_au: f64) -> bool {
        (self.inner_edge..=self.outer_edge).contains(&distance_au)
    }
}

/// Planet class for an orbit at `distance_au`.
pub fn classify(distance_au: f64, zone: &HabitableZone, giant_zone_factor: f64) -> BodyKind {
    if distance_au < zone.inner_edge {
        BodyKind::Rocky
    } else if distance_au <= zone.outer_edge {
        BodyKind::Terran
    } else if distance_au <= giant_zone_factor * zone.outer_edge {
        BodyKind::GasGiant
    } else {
        BodyKind::IceGiant
    }
}

/// Mean radius (m) from a power-law mass-radius relation per class.
fn radius_for(kind: BodyKind, mass: f64) -> f64 {
    let m = mass / EARTH_MASS;
    let exponent = match kind {
        BodyKind::GasGiant => 0.42,
        BodyKind::IceGiant => 0.48,
        _ => 0.27,
    };
    EARTH_RADIUS * libm::pow(m, exponent)
}

struct Draw<'a>(&'a mut ChaCha8Rng);

impl Draw<'_> {
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.0.gen::<f64>()
    }

    fn log_uniform(&mut self, (lo, hi): (f64, f64)) -> f64 {
        libm::exp(self.uniform(libm::log(lo), libm::log(hi)))
    }

    fn count(&mut self, (lo, hi): (u32, u32)) -> u32 {
        self.0.gen_range(lo..=hi)
    }

    fn angle(&mut self) -> f64 {
        self.uniform(0.0, consts::TAU)
    }

    fn orbit(&mut self, semi_major_axis: f64, config: &GeneratorConfig) -> OrbitalElements {
        OrbitalElements {
            semi_major_axis,
            eccentricity: self.uniform(0.0, config.max_eccentricity),
            inclination: self.uniform(0.0, config.max_inclination),
            longitude_of_ascending_node: self.angle(),
            argument_of_periapsis: self.angle(),
            mean_anomaly_at_epoch: self.angle(),
            epoch: UT::ZERO,
        }
    }
}

/// Generate a star system from `seed`.
pub fn generate(seed: u64, config: &GeneratorConfig) -> Result<StarSystem> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut draw = Draw(&mut rng);
    let mut system = StarSystem::with_seed(seed);

    let star_count = draw.count(config.star_count);
    for s in 0..star_count {
        let mass = draw.log_uniform(config.star_mass);
        let luminosity = libm::pow(mass, 3.5);
        let radius = libm::pow(mass, 0.8);
        let anchor = Vector3::new(f64::from(s) * config.star_separation, 0.0, 0.0);
        let star = system.add_root(
            format!("S{s}"),
            BodyKind::Star,
            mass * SOLAR_MASS,
            radius * SOLAR_RADIUS,
            anchor,
        )?;
        generate_planets(&mut draw, &mut system, config, star, luminosity)?;
    }

    debug!(
        seed,
        stars = star_count,
        bodies = system.len(),
        "generated star system"
    );
    Ok(system)
}

/// [`generate`] with the default configuration.
pub fn generate_default(seed: u64) -> Result<StarSystem> {
    generate(seed, &GeneratorConfig::default())
}

fn planet_mass(draw: &mut Draw, config: &GeneratorConfig, kind: BodyKind) -> f64 {
    let range = match kind {
        BodyKind::Rocky => config.rocky_mass,
        BodyKind::Terran => config.terran_mass,
        BodyKind::GasGiant => config.gas_giant_mass,
        _ => config.ice_giant_mass,
    };
    draw.log_uniform(range) * EARTH_MASS
}

/// Smallest semi-major axis beyond `inner` that keeps `hill_spacing`
/// mutual Hill radii between the two orbits.
fn spaced_axis(
    inner: (f64, f64),
    a: f64,
    mass: f64,
    star_mass: f64,
    hill_spacing: f64,
) -> Result<f64> {
    let (inner_a, inner_mass) = inner;
    let gap = hill_spacing * mutual_hill_radius(inner_mass, inner_a, mass, a, star_mass)?;
    if a - inner_a >= gap {
        return Ok(a);
    }
    // a - a0 = k c (a + a0) / 2, with c the cube-root mass factor
    let kc = gap / ((a + inner_a) / 2.0);
    if kc >= 2.0 {
        return Err(invalid(format!(
            "hill_spacing {hill_spacing} cannot be met for planets this massive"
        )));
    }
    Ok(inner_a * (1.0 + kc / 2.0) / (1.0 - kc / 2.0))
}

fn generate_planets(
    draw: &mut Draw,
    system: &mut StarSystem,
    config: &GeneratorConfig,
    star: BodyId,
    luminosity: f64,
) -> Result<()> {
    let star_body = system.get(star)?;
    let star_mass = star_body.mass();
    let star_name = star_body.name.clone();
    let zone = HabitableZone::from_luminosity(luminosity);

    let count = draw.count(config.planet_count);
    let jitter = draw.uniform(-config.orbit_jitter, config.orbit_jitter);
    let mut a = config.inner_orbit_factor * libm::sqrt(luminosity) * (1.0 + jitter) * AU;
    let mut inner: Option<(f64, f64)> = None;

    for p in 0..count {
        if p > 0 {
            a *= draw.uniform(config.spacing_ratio.0, config.spacing_ratio.1);
        }

        // classes only move outward as the orbit is pushed, so this settles
        // in at most one pass per class
        let mut kind = classify(a / AU, &zone, config.giant_zone_factor);
        let mut mass = planet_mass(draw, config, kind);
        if let Some(inner) = inner {
            loop {
                a = spaced_axis(inner, a, mass, star_mass, config.hill_spacing)?;
                let pushed = classify(a / AU, &zone, config.giant_zone_factor);
                if pushed == kind {
                    break;
                }
                kind = pushed;
                mass = planet_mass(draw, config, kind);
            }
        }

        let elements = draw.orbit(a, config);
        let letter = char::from(b'b' + p as u8);
        let name = format!("{star_name} {letter}");
        let radius = radius_for(kind, mass);
        let planet = system.add_orbiting(name, kind, mass, radius, star, elements)?;
        if matches!(kind, BodyKind::GasGiant | BodyKind::IceGiant) {
            generate_moons(draw, system, config, planet)?;
        }
        inner = Some((a, mass));
    }
    Ok(())
}

fn generate_moons(
    draw: &mut Draw,
    system: &mut StarSystem,
    config: &GeneratorConfig,
    planet: BodyId,
) -> Result<()> {
    let body = system.get(planet)?;
    let (planet_mass, planet_name) = (body.mass(), body.name.clone());
    let inner_limit = config.moon_min_radii * body.radius();
    let outer_limit = config.moon_soi_fraction * system.sphere_of_influence(planet)?;

    let count = draw.count((0, config.max_moons));
    if count == 0 || outer_limit <= inner_limit {
        return Ok(());
    }

    let mut a = inner_limit * draw.uniform(1.0, 1.5);
    for (m, numeral) in ROMAN.iter().enumerate().take(count as usize) {
        if m > 0 {
            a *= draw.uniform(config.spacing_ratio.0, config.spacing_ratio.1);
        }
        if a > outer_limit {
            break;
        }
        let mass = planet_mass * draw.log_uniform(config.moon_mass_fraction);
        let elements = draw.orbit(a, config);
        system.add_orbiting(
            format!("{planet_name} {numeral}"),
            BodyKind::Moon,
            mass,
            radius_for(BodyKind::Moon, mass),
            planet,
            elements,
        )?;
    }
    Ok(())
}
