//! Drives a [`StarSystem`] through simulated time.
//!
//! An update computes every body's local two-body state for one time `t`
//! in parallel, composes absolute states down the parent tree serially, and
//! then refreshes the spatial index as a separate phase. Probes are test
//! masses integrated with Velocity-Verlet in the bodies' gravity field.

use std::fmt;

use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    arena::{Arena, IdLike},
    bodies::{BodyId, BodyState, StarSystem},
    error::{ensure_positive, OrbitError, Result},
    gravity::{GravityField, PointMass, DEFAULT_MIN_DISTANCE},
    kepler::{
        orbits::{state_at, StateVector},
        KeplerSolution,
    },
    spatial::{Octree, DEFAULT_LEAF_CAPACITY, DEFAULT_MAX_DEPTH},
    time::UT,
};

/// When the spatial index is brought up to date with body positions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshPolicy {
    /// After every update.
    EveryStep,
    /// After every n-th update.
    Every(u32),
    /// Only through [`Simulation::refresh_index`].
    Manual,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub refresh: RefreshPolicy,
    pub leaf_capacity: usize,
    pub max_depth: u32,
    /// Separation floor for gravity evaluation (m).
    pub min_distance: f64,
    /// Bodies further than this from a point are left out of its
    /// acceleration (m). Root bodies are always included.
    pub gravity_cutoff: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshPolicy::EveryStep,
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            min_distance: DEFAULT_MIN_DISTANCE,
            gravity_cutoff: 1.0e11,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.refresh == RefreshPolicy::Every(0) {
            return Err(OrbitError::InvalidConfig(
                "refresh interval must be at least 1".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(OrbitError::InvalidConfig(
                "max_depth must be at least 1".into(),
            ));
        }
        if self.leaf_capacity == 0 {
            return Err(OrbitError::InvalidConfig(
                "leaf_capacity must be at least 1".into(),
            ));
        }
        ensure_positive("minimum distance", self.min_distance)
            .map_err(|e| OrbitError::InvalidConfig(e.to_string()))?;
        if self.gravity_cutoff.is_nan() || self.gravity_cutoff <= 0.0 {
            return Err(OrbitError::InvalidConfig(format!(
                "gravity_cutoff must be positive, got {}",
                self.gravity_cutoff
            )));
        }
        Ok(())
    }
}

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct ProbeId(u32);

impl IdLike for ProbeId {
    fn from_raw(index: usize) -> Self {
        Self(index as u32)
    }

    fn into_raw(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probe {}", self.0)
    }
}

/// A massless test particle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Acceleration at `position` for the current time, carried between
    /// Verlet steps.
    #[serde(skip)]
    acceleration: Vector3<f64>,
}

impl Probe {
    pub fn acceleration(&self) -> Vector3<f64> {
        self.acceleration
    }
}

/// A body whose Kepler solution hit the iteration cap during an update.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DegradedState {
    pub body: BodyId,
    pub solution: KeplerSolution,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub time: UT,
    /// Bodies whose state for this update is a non-converged estimate.
    pub degraded: Vec<DegradedState>,
    pub index_refreshed: bool,
}

/// The persisted form of a simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedSimulation {
    pub system: StarSystem,
    pub time: UT,
    #[serde(default)]
    pub probes: Vec<Probe>,
}

#[derive(Clone, Debug)]
pub struct Simulation {
    system: StarSystem,
    time: UT,
    config: SimulationConfig,
    field: GravityField,
    index: Octree<BodyId>,
    probes: Arena<ProbeId, Probe>,
    updates_since_refresh: u32,
    /// Largest distance any body has moved since the index was refreshed.
    staleness: f64,
    /// Largest finite sphere of influence in the system.
    max_soi: f64,
}

impl Simulation {
    pub fn new(system: StarSystem, config: SimulationConfig) -> Result<Self> {
        Self::start(system, UT::ZERO, Vec::new(), config)
    }

    pub fn from_saved(saved: SavedSimulation, config: SimulationConfig) -> Result<Self> {
        Self::start(saved.system, saved.time, saved.probes, config)
    }

    fn start(
        mut system: StarSystem,
        time: UT,
        probes: Vec<Probe>,
        config: SimulationConfig,
    ) -> Result<Self> {
        config.validate()?;
        system.validate()?;
        let mut sim = Self {
            system,
            time,
            field: GravityField::new(config.min_distance)?,
            index: Octree::with_params(config.leaf_capacity, config.max_depth),
            config,
            probes: Arena::new(),
            updates_since_refresh: 0,
            staleness: 0.0,
            max_soi: 0.0,
        };
        sim.update_max_soi()?;
        sim.advance_to(time)?;
        sim.refresh_index()?;
        for probe in probes {
            sim.add_probe(probe.position, probe.velocity)?;
        }
        Ok(sim)
    }

    pub fn system(&self) -> &StarSystem {
        &self.system
    }

    pub fn time(&self) -> UT {
        self.time
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Absolute position and velocity of a body at the current time.
    pub fn state_of(&self, id: BodyId) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let body = self.system.get(id)?;
        Ok((body.position(), body.velocity()))
    }

    /// Move every body to its state at `t`. Probes are not integrated; use
    /// [`Simulation::step`] for that.
    pub fn advance_to(&mut self, t: UT) -> Result<StepReport> {
        let system = &self.system;
        let locals: Vec<Option<(StateVector, KeplerSolution)>> = system
            .as_slice()
            .par_iter()
            .map(|body| match body.orbit() {
                Some(orbit) => {
                    let parent_mass = system.get(orbit.parent)?.mass();
                    state_at(&orbit.elements, t, parent_mass).map(Some)
                }
                None => Ok(None),
            })
            .collect::<Result<_>>()?;

        let mut degraded = Vec::new();
        let mut staleness: f64 = 0.0;
        let order = self.system.update_order().to_vec();
        for id in order {
            let body = self.system.get(id)?;
            let state = match (body.parent(), locals[id.into_raw()]) {
                (Some(parent), Some((local, solution))) => {
                    if !solution.converged {
                        degraded.push(DegradedState { body: id, solution });
                    }
                    let parent = self.system.get(parent)?.state();
                    BodyState {
                        local,
                        position: parent.position + local.position,
                        velocity: parent.velocity + local.velocity,
                        time: t,
                    }
                }
                _ => BodyState {
                    local: StateVector::default(),
                    position: body.anchor(),
                    velocity: Vector3::zeros(),
                    time: t,
                },
            };
            if let Some(indexed) = self.index.position_of(id) {
                staleness = staleness.max((state.position - indexed).norm());
            }
            self.system.get_mut(id)?.set_state(state);
        }
        self.time = t;

        if !degraded.is_empty() {
            warn!(
                time = %t,
                count = degraded.len(),
                first = %degraded[0].body,
                "Kepler solver did not converge for some bodies"
            );
        }

        self.updates_since_refresh += 1;
        let refresh = match self.config.refresh {
            RefreshPolicy::EveryStep => true,
            RefreshPolicy::Every(n) => self.updates_since_refresh >= n,
            RefreshPolicy::Manual => false,
        };
        if refresh {
            self.refresh_index()?;
        } else {
            self.staleness = staleness;
        }

        Ok(StepReport {
            time: t,
            degraded,
            index_refreshed: refresh,
        })
    }

    /// Advance by `dt` seconds, integrating probes with Velocity-Verlet.
    pub fn step(&mut self, dt: f64) -> Result<StepReport> {
        let dt = ensure_positive("time step", dt)?;
        let t = self.time.checked_add_seconds(dt)?;
        for (_, probe) in self.probes.iter_mut() {
            probe.position += probe.velocity * dt + probe.acceleration * (0.5 * dt * dt);
        }

        let report = self.advance_to(t)?;

        let accelerations = self
            .probes
            .as_slice()
            .par_iter()
            .map(|probe| self.acceleration_at(&probe.position))
            .collect::<Result<Vec<_>>>()?;
        for ((_, probe), new) in self.probes.iter_mut().zip(accelerations) {
            probe.velocity += (probe.acceleration + new) * (0.5 * dt);
            probe.acceleration = new;
        }
        Ok(report)
    }

    /// Bring the spatial index up to date with every body's position.
    pub fn refresh_index(&mut self) -> Result<()> {
        for body in self.system.bodies() {
            self.index.insert(body.id(), body.position())?;
        }
        debug!(
            time = %self.time,
            bodies = self.index.len(),
            nodes = self.index.node_count(),
            stale_by = self.staleness,
            "refreshed spatial index"
        );
        self.staleness = 0.0;
        self.updates_since_refresh = 0;
        Ok(())
    }

    /// How far (m) any body may be from its indexed position.
    pub fn index_staleness(&self) -> f64 {
        self.staleness
    }

    /// Bodies whose current position lies within `radius` of `point`,
    /// sorted by id.
    pub fn bodies_within(&self, point: &Vector3<f64>, radius: f64) -> Vec<BodyId> {
        let mut found = self.index.query_range(point, radius + self.staleness);
        if self.staleness > 0.0 {
            found.retain(|id| {
                self.system
                    .get(*id)
                    .is_ok_and(|b| (b.position() - point).norm() <= radius)
            });
        }
        found
    }

    /// The `k` bodies nearest to `point` by current position, nearest
    /// first.
    pub fn nearest_bodies(&self, point: &Vector3<f64>, k: usize) -> Vec<BodyId> {
        let indexed = self.index.query_nearest(point, k);
        if self.staleness == 0.0 {
            return indexed;
        }
        let Some(kth) = indexed.last().and_then(|id| self.index.position_of(*id)) else {
            return indexed;
        };
        // the true k nearest all lie within the k-th indexed distance plus
        // twice the staleness of their indexed positions
        let reach = (kth - point).norm() + 2.0 * self.staleness;
        let mut candidates: Vec<(f64, BodyId)> = self
            .index
            .query_range(point, reach)
            .into_iter()
            .filter_map(|id| {
                let body = self.system.get(id).ok()?;
                Some(((body.position() - point).norm(), id))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.into_iter().take(k).map(|(_, id)| id).collect()
    }

    fn gravity_sources(&self, point: &Vector3<f64>) -> Vec<PointMass> {
        let mut ids = self.bodies_within(point, self.config.gravity_cutoff);
        ids.extend(self.system.roots().map(|b| b.id()));
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .filter_map(|id| self.system.get(id).ok())
            .map(|b| b.point_mass())
            .collect()
    }

    /// Gravitational acceleration at `point` from nearby bodies and every
    /// root.
    pub fn acceleration_at(&self, point: &Vector3<f64>) -> Result<Vector3<f64>> {
        self.field.acceleration_at(*point, self.gravity_sources(point))
    }

    pub fn sphere_of_influence(&self, id: BodyId) -> Result<f64> {
        self.system.sphere_of_influence(id)
    }

    /// The deepest body whose sphere of influence contains `point`. Among
    /// roots, the nearest wins.
    pub fn dominant_body(&self, point: &Vector3<f64>) -> Result<Option<BodyId>> {
        let mut best: Option<(usize, f64, BodyId)> = None;
        let mut consider = |depth: usize, distance: f64, id: BodyId| {
            let better = match best {
                None => true,
                Some((d, dist, _)) => depth > d || (depth == d && distance < dist),
            };
            if better {
                best = Some((depth, distance, id));
            }
        };

        for id in self.bodies_within(point, self.max_soi) {
            let body = self.system.get(id)?;
            if body.is_root() {
                continue;
            }
            let distance = (body.position() - point).norm();
            if distance <= self.system.sphere_of_influence(id)? {
                consider(self.system.depth(id), distance, id);
            }
        }
        for root in self.system.roots() {
            consider(0, (root.position() - point).norm(), root.id());
        }
        Ok(best.map(|(_, _, id)| id))
    }

    /// Move `id` into orbit around `new_parent` from its current state.
    pub fn reparent(&mut self, id: BodyId, new_parent: BodyId) -> Result<()> {
        self.system.reparent(id, new_parent)?;
        self.update_max_soi()
    }

    fn update_max_soi(&mut self) -> Result<()> {
        let mut max_soi: f64 = 0.0;
        for body in self.system.bodies().filter(|b| !b.is_root()) {
            max_soi = max_soi.max(self.system.sphere_of_influence(body.id())?);
        }
        self.max_soi = max_soi;
        Ok(())
    }

    pub fn add_probe(&mut self, position: Vector3<f64>, velocity: Vector3<f64>) -> Result<ProbeId> {
        if !position.iter().chain(velocity.iter()).all(|x| x.is_finite()) {
            return Err(OrbitError::NonFinite("probe state"));
        }
        let acceleration = self.acceleration_at(&position)?;
        Ok(self.probes.push(Probe {
            position,
            velocity,
            acceleration,
        }))
    }

    pub fn probe(&self, id: ProbeId) -> Result<&Probe> {
        self.probes.get(id).ok_or(OrbitError::UnknownProbe(id))
    }

    pub fn probes(&self) -> impl Iterator<Item = (ProbeId, &Probe)> {
        self.probes.iter()
    }

    /// Instantaneous velocity change of a probe.
    pub fn apply_impulse(&mut self, id: ProbeId, delta_v: Vector3<f64>) -> Result<()> {
        if !delta_v.iter().all(|x| x.is_finite()) {
            return Err(OrbitError::NonFinite("impulse"));
        }
        let probe = self.probes.get_mut(id).ok_or(OrbitError::UnknownProbe(id))?;
        probe.velocity += delta_v;
        Ok(())
    }

    pub fn save(&self) -> SavedSimulation {
        SavedSimulation {
            system: self.system.clone(),
            time: self.time,
            probes: self.probes.as_slice().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        bodies::BodyKind,
        consts::{mu, AU, DAY, EARTH_MASS, EARTH_RADIUS, SOLAR_MASS, SOLAR_RADIUS},
        gravity,
        kepler::orbits::OrbitalElements,
    };

    struct Fixture {
        system: StarSystem,
        sun: BodyId,
        earth: BodyId,
        moon: BodyId,
    }

    fn fixture() -> Fixture {
        let mut system = StarSystem::new();
        let sun = system
            .add_root("Sun", BodyKind::Star, SOLAR_MASS, SOLAR_RADIUS, Vector3::zeros())
            .unwrap();
        let earth = system
            .add_orbiting(
                "Earth",
                BodyKind::Terran,
                EARTH_MASS,
                EARTH_RADIUS,
                sun,
                OrbitalElements {
                    eccentricity: 0.0167,
                    inclination: 0.1,
                    ..OrbitalElements::circular(AU)
                },
            )
            .unwrap();
        let moon = system
            .add_orbiting(
                "Moon",
                BodyKind::Moon,
                7.342e22,
                1.7374e6,
                earth,
                OrbitalElements {
                    eccentricity: 0.0549,
                    mean_anomaly_at_epoch: 1.0,
                    ..OrbitalElements::circular(3.844e8)
                },
            )
            .unwrap();
        Fixture {
            system,
            sun,
            earth,
            moon,
        }
    }

    #[test]
    fn composes_states_down_the_tree() {
        let f = fixture();
        let mut sim = Simulation::new(f.system, SimulationConfig::default()).unwrap();
        let t = UT::from_seconds(40.0 * DAY).unwrap();
        let report = sim.advance_to(t).unwrap();
        assert!(report.degraded.is_empty());
        assert!(report.index_refreshed);

        let earth = sim.system().get(f.earth).unwrap();
        let (local, _) = state_at(earth.elements().unwrap(), t, SOLAR_MASS).unwrap();
        assert_eq!(earth.position(), local.position);

        let moon = sim.system().get(f.moon).unwrap();
        let (moon_local, _) = state_at(moon.elements().unwrap(), t, EARTH_MASS).unwrap();
        assert_eq!(moon.position(), earth.position() + moon_local.position);
        assert_eq!(moon.velocity(), earth.velocity() + moon_local.velocity);
        assert_eq!(moon.state().time, t);
        assert_eq!(sim.state_of(f.sun).unwrap().0, Vector3::zeros());
    }

    #[test]
    fn stale_index_never_misses_bodies() {
        let f = fixture();
        let config = SimulationConfig {
            refresh: RefreshPolicy::Manual,
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::new(f.system, config).unwrap();
        let report = sim.advance_to(UT::from_seconds(30.0 * DAY).unwrap()).unwrap();
        assert!(!report.index_refreshed);
        // earth moved about a twelfth of its orbit
        assert!(sim.index_staleness() > 1.0e10);

        let (earth_now, _) = sim.state_of(f.earth).unwrap();
        assert_eq!(sim.bodies_within(&earth_now, 1.0e9), vec![f.earth, f.moon]);
        assert_eq!(sim.nearest_bodies(&earth_now, 1), vec![f.earth]);
        let (moon_now, _) = sim.state_of(f.moon).unwrap();
        assert_eq!(sim.nearest_bodies(&moon_now, 2), vec![f.moon, f.earth]);

        sim.refresh_index().unwrap();
        assert_eq!(sim.index_staleness(), 0.0);
        assert_eq!(sim.nearest_bodies(&earth_now, 1), vec![f.earth]);
    }

    #[test]
    fn periodic_refresh() {
        let f = fixture();
        let config = SimulationConfig {
            refresh: RefreshPolicy::Every(3),
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::new(f.system, config).unwrap();
        let refreshed: Vec<bool> = (1..=6)
            .map(|day| {
                sim.advance_to(UT::from_seconds(f64::from(day) * DAY).unwrap())
                    .unwrap()
                    .index_refreshed
            })
            .collect();
        assert_eq!(refreshed, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn reports_degraded_solutions() {
        let mut f = fixture();
        let comet = f
            .system
            .add_orbiting(
                "comet",
                BodyKind::Rocky,
                1.0e13,
                5.0e3,
                f.sun,
                OrbitalElements {
                    eccentricity: 0.999,
                    mean_anomaly_at_epoch: 0.01,
                    ..OrbitalElements::circular(20.0 * AU)
                },
            )
            .unwrap();
        let mut sim = Simulation::new(f.system, SimulationConfig::default()).unwrap();
        let report = sim.advance_to(UT::ZERO).unwrap();
        assert_eq!(report.degraded.len(), 1);
        assert_eq!(report.degraded[0].body, comet);
        assert!(!report.degraded[0].solution.converged);
        let (position, _) = sim.state_of(comet).unwrap();
        assert!(position.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn gravity_always_includes_roots() {
        let f = fixture();
        let config = SimulationConfig {
            gravity_cutoff: 1.0,
            ..SimulationConfig::default()
        };
        let sim = Simulation::new(f.system, config).unwrap();
        let point = Vector3::new(0.0, 0.0, 3.0 * AU);
        let acc = sim.acceleration_at(&point).unwrap();
        assert_relative_eq!(acc.norm(), mu(SOLAR_MASS) / (9.0 * AU * AU), max_relative = 1e-12);
        assert!(acc.z < 0.0);
    }

    #[test]
    fn dominant_body_is_deepest_soi() {
        let f = fixture();
        let sim = Simulation::new(f.system, SimulationConfig::default()).unwrap();
        let (earth, _) = sim.state_of(f.earth).unwrap();
        let (moon, _) = sim.state_of(f.moon).unwrap();
        let towards_moon = (moon - earth).normalize();

        assert_eq!(sim.dominant_body(&(moon + towards_moon * 1.0e6)).unwrap(), Some(f.moon));
        assert_eq!(
            sim.dominant_body(&(earth - towards_moon * 1.0e8)).unwrap(),
            Some(f.earth)
        );
        assert_eq!(
            sim.dominant_body(&Vector3::new(0.0, 0.0, 2.0 * AU)).unwrap(),
            Some(f.sun)
        );
        assert!(sim.sphere_of_influence(f.moon).unwrap() < sim.sphere_of_influence(f.earth).unwrap());
    }

    #[test]
    fn verlet_probe_conserves_energy() {
        let mut system = StarSystem::new();
        system
            .add_root("Sun", BodyKind::Star, SOLAR_MASS, SOLAR_RADIUS, Vector3::zeros())
            .unwrap();
        let mut sim = Simulation::new(system, SimulationConfig::default()).unwrap();
        let v = libm::sqrt(mu(SOLAR_MASS) / AU);
        let probe = sim
            .add_probe(Vector3::new(AU, 0.0, 0.0), Vector3::new(0.0, v, 0.0))
            .unwrap();
        let energy = |p: &Probe| p.velocity.norm_squared() / 2.0 - mu(SOLAR_MASS) / p.position.norm();
        let e0 = energy(sim.probe(probe).unwrap());

        for _ in 0..730 {
            sim.step(DAY).unwrap();
        }
        let p = sim.probe(probe).unwrap();
        assert_relative_eq!(energy(p), e0, max_relative = 1e-3);
        assert_relative_eq!(p.position.norm(), AU, max_relative = 1e-3);
        assert_relative_eq!(sim.time().as_seconds_f64(), 730.0 * DAY, max_relative = 1e-12);
    }

    #[test]
    fn impulses_and_unknown_probes() {
        let f = fixture();
        let mut sim = Simulation::new(f.system, SimulationConfig::default()).unwrap();
        let id = sim
            .add_probe(Vector3::new(2.0 * AU, 0.0, 0.0), Vector3::zeros())
            .unwrap();
        sim.apply_impulse(id, Vector3::new(0.0, 10.0, 0.0)).unwrap();
        assert_eq!(sim.probe(id).unwrap().velocity, Vector3::new(0.0, 10.0, 0.0));
        let ghost = ProbeId::from_raw(9);
        assert_eq!(
            sim.apply_impulse(ghost, Vector3::zeros()),
            Err(OrbitError::UnknownProbe(ghost))
        );
        assert!(sim.add_probe(Vector3::new(f64::NAN, 0.0, 0.0), Vector3::zeros()).is_err());
        assert!(sim.step(0.0).is_err());
    }

    #[test]
    fn reparent_through_simulation() {
        let f = fixture();
        let mut sim = Simulation::new(f.system, SimulationConfig::default()).unwrap();
        let (moon_before, _) = sim.state_of(f.moon).unwrap();
        // the moon is bound to the sun as well, at roughly earth's orbit
        let earth_pos = sim.state_of(f.earth).unwrap().0;
        // outside the moon's sphere around the earth, inside the one it
        // gets around the sun
        let beyond = moon_before + (moon_before - earth_pos).normalize() * 1.0e8;
        let old_soi = sim.sphere_of_influence(f.moon).unwrap();
        assert!(old_soi < 1.0e8);
        assert_eq!(sim.dominant_body(&beyond).unwrap(), Some(f.earth));

        sim.reparent(f.moon, f.sun).unwrap();
        let moon = sim.system().get(f.moon).unwrap();
        assert_eq!(moon.parent(), Some(f.sun));
        let new_a = moon.elements().unwrap().semi_major_axis;
        assert_relative_eq!(new_a, AU, max_relative = 0.15);
        assert_eq!(sim.system().update_order().len(), 3);
        assert_eq!(sim.system().depth(f.moon), 1);

        let expected = gravity::sphere_of_influence(moon.mass(), SOLAR_MASS, new_a).unwrap();
        assert_relative_eq!(sim.sphere_of_influence(f.moon).unwrap(), expected, max_relative = 1e-12);
        assert!(expected > 1.0e8);
        let max_soi = sim
            .system()
            .bodies()
            .filter(|b| !b.is_root())
            .map(|b| sim.sphere_of_influence(b.id()).unwrap())
            .fold(0.0, f64::max);
        assert_eq!(sim.max_soi, max_soi);
        assert_eq!(sim.dominant_body(&beyond).unwrap(), Some(f.moon));

        // same time, same place
        sim.advance_to(sim.time()).unwrap();
        let (moon_after, _) = sim.state_of(f.moon).unwrap();
        assert_relative_eq!(moon_after, moon_before, epsilon = 1.0e3, max_relative = 1e-6);

        assert!(matches!(
            sim.reparent(f.earth, f.moon),
            Err(OrbitError::ParentCycle { .. })
        ));
    }

    #[test]
    fn save_and_restore() {
        let f = fixture();
        let mut sim = Simulation::new(f.system, SimulationConfig::default()).unwrap();
        sim.add_probe(Vector3::new(2.0 * AU, 0.0, 0.0), Vector3::zeros())
            .unwrap();
        sim.step(DAY).unwrap();

        let text = ron::ser::to_string(&sim.save()).unwrap();
        let saved: SavedSimulation = ron::from_str(&text).unwrap();
        let restored = Simulation::from_saved(saved, SimulationConfig::default()).unwrap();
        assert_eq!(restored.time(), sim.time());
        assert_eq!(
            restored.state_of(f.moon).unwrap(),
            sim.state_of(f.moon).unwrap()
        );
        assert_eq!(restored.probes().count(), 1);

        let bad = SimulationConfig {
            refresh: RefreshPolicy::Every(0),
            ..SimulationConfig::default()
        };
        assert!(matches!(
            Simulation::new(StarSystem::new(), bad),
            Err(OrbitError::InvalidConfig(_))
        ));
        let flat = SimulationConfig {
            max_depth: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(flat.validate(), Err(OrbitError::InvalidConfig(_))));
    }

    #[test]
    fn oversized_steps_are_errors() {
        let f = fixture();
        let mut sim = Simulation::new(f.system, SimulationConfig::default()).unwrap();
        let id = sim
            .add_probe(Vector3::new(2.0 * AU, 0.0, 0.0), Vector3::zeros())
            .unwrap();
        let before = *sim.probe(id).unwrap();

        assert_eq!(sim.step(1.0e20), Err(OrbitError::TimeOverflow(1.0e20)));
        assert!(sim.step(f64::INFINITY).is_err());
        assert!(sim.step(0.0).is_err());
        // nothing moved
        assert_eq!(sim.time(), UT::ZERO);
        assert_eq!(*sim.probe(id).unwrap(), before);
        assert!(sim.step(DAY).is_ok());
    }
}
