//! Definitions of celestial bodies and the star systems they form.

use std::{collections::VecDeque, fmt};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    arena::{Arena, IdLike},
    error::{ensure_mass, ensure_positive, OrbitError, Result},
    gravity::{self, PointMass},
    kepler::orbits::{OrbitalElements, StateVector},
    time::UT,
};

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct BodyId(u64);

impl IdLike for BodyId {
    fn from_raw(index: usize) -> Self {
        Self(index as u64)
    }

    fn into_raw(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyKind {
    Star,
    /// Rocky planet outside the habitable zone.
    Rocky,
    /// Rocky planet inside the habitable zone.
    Terran,
    GasGiant,
    IceGiant,
    Moon,
}

/// The orbit of a body around its parent.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParentOrbit {
    pub parent: BodyId,
    pub elements: OrbitalElements,
}

/// Derived kinematic state, written by the simulation once per update.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BodyState {
    /// Position and velocity relative to the parent.
    pub local: StateVector,
    /// Position in the system frame (m).
    pub position: Vector3<f64>,
    /// Velocity in the system frame (m/s).
    pub velocity: Vector3<f64>,
    /// The simulated time this state corresponds to.
    pub time: UT,
}

/// A celestial body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CelestialBody {
    id: BodyId,
    pub name: String,
    pub kind: BodyKind,
    /// Mass (`kg`)
    mass: f64,
    /// Mean radius (`m`)
    radius: f64,
    /// `None` for root bodies.
    orbit: Option<ParentOrbit>,
    /// Fixed position of a root body in the system frame. Unused for
    /// orbiting bodies.
    anchor: Vector3<f64>,
    #[serde(skip)]
    state: BodyState,
    /// Whether `state` has been computed at least once.
    #[serde(skip)]
    evaluated: bool,
    #[serde(skip)]
    soi: Option<f64>,
}

impl CelestialBody {
    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn is_root(&self) -> bool {
        self.orbit.is_none()
    }

    pub fn orbit(&self) -> Option<&ParentOrbit> {
        self.orbit.as_ref()
    }

    pub fn parent(&self) -> Option<BodyId> {
        self.orbit.map(|o| o.parent)
    }

    pub fn elements(&self) -> Option<&OrbitalElements> {
        self.orbit.as_ref().map(|o| &o.elements)
    }

    pub fn anchor(&self) -> Vector3<f64> {
        self.anchor
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn position(&self) -> Vector3<f64> {
        self.state.position
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.state.velocity
    }

    pub fn point_mass(&self) -> PointMass {
        PointMass::new(self.state.position, self.mass)
    }

    pub(crate) fn set_state(&mut self, state: BodyState) {
        self.state = state;
        self.evaluated = true;
    }
}

/// An ordered collection of bodies forming a forest rooted at stars.
///
/// Bodies reference their parents by [`BodyId`]. Every parent exists and
/// the parent graph has no cycles; [`StarSystem::update_order`] lists
/// parents before their children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StarSystem {
    seed: Option<u64>,
    bodies: Arena<BodyId, CelestialBody>,
    #[serde(skip)]
    order: Vec<BodyId>,
}

impl StarSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Seed the system was generated from, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn add_root(
        &mut self,
        name: impl Into<String>,
        kind: BodyKind,
        mass: f64,
        radius: f64,
        anchor: Vector3<f64>,
    ) -> Result<BodyId> {
        ensure_mass(mass)?;
        ensure_positive("radius", radius)?;
        if !anchor.iter().all(|x| x.is_finite()) {
            return Err(OrbitError::NonFinite("anchor"));
        }
        let id = self.bodies.next_id();
        self.bodies.push(CelestialBody {
            id,
            name: name.into(),
            kind,
            mass,
            radius,
            orbit: None,
            anchor,
            state: BodyState {
                position: anchor,
                ..BodyState::default()
            },
            evaluated: true,
            soi: Some(f64::INFINITY),
        });
        self.order.push(id);
        Ok(id)
    }

    pub fn add_orbiting(
        &mut self,
        name: impl Into<String>,
        kind: BodyKind,
        mass: f64,
        radius: f64,
        parent: BodyId,
        elements: OrbitalElements,
    ) -> Result<BodyId> {
        ensure_mass(mass)?;
        ensure_positive("radius", radius)?;
        elements.validate()?;
        let parent_mass = self.get(parent)?.mass;
        let soi = gravity::sphere_of_influence(mass, parent_mass, elements.semi_major_axis)?;
        let id = self.bodies.next_id();
        self.bodies.push(CelestialBody {
            id,
            name: name.into(),
            kind,
            mass,
            radius,
            orbit: Some(ParentOrbit { parent, elements }),
            anchor: Vector3::zeros(),
            state: BodyState::default(),
            evaluated: false,
            soi: Some(soi),
        });
        // a new body's parent already precedes it
        self.order.push(id);
        Ok(id)
    }

    pub fn get(&self, id: BodyId) -> Result<&CelestialBody> {
        self.bodies.get(id).ok_or(OrbitError::UnknownBody(id))
    }

    pub(crate) fn get_mut(&mut self, id: BodyId) -> Result<&mut CelestialBody> {
        self.bodies.get_mut(id).ok_or(OrbitError::UnknownBody(id))
    }

    /// All bodies in creation order.
    pub fn bodies(&self) -> impl Iterator<Item = &CelestialBody> {
        self.bodies.as_slice().iter()
    }

    pub(crate) fn as_slice(&self) -> &[CelestialBody] {
        self.bodies.as_slice()
    }

    pub fn ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.ids()
    }

    pub fn roots(&self) -> impl Iterator<Item = &CelestialBody> {
        self.bodies().filter(|b| b.is_root())
    }

    pub fn children(&self, id: BodyId) -> impl Iterator<Item = &CelestialBody> {
        self.bodies().filter(move |b| b.parent() == Some(id))
    }

    /// Parents of `id`, nearest first.
    pub fn ancestors(&self, id: BodyId) -> Ancestors<'_> {
        Ancestors {
            system: self,
            next: self.bodies.get(id).and_then(CelestialBody::parent),
            remaining: self.bodies.len(),
        }
    }

    /// Number of parents between `id` and its root.
    pub fn depth(&self, id: BodyId) -> usize {
        self.ancestors(id).count()
    }

    /// Bodies ordered so that every parent precedes its children.
    pub fn update_order(&self) -> &[BodyId] {
        &self.order
    }

    pub fn parent_mass(&self, id: BodyId) -> Result<f64> {
        let body = self.get(id)?;
        let parent = body.parent().ok_or(OrbitError::RootBody(id))?;
        Ok(self.get(parent)?.mass)
    }

    /// Sphere of influence of `id` relative to its immediate parent, see
    /// [`gravity::sphere_of_influence`]. Root bodies have an unbounded
    /// sphere of influence.
    pub fn sphere_of_influence(&self, id: BodyId) -> Result<f64> {
        let body = self.get(id)?;
        match (body.soi, body.orbit) {
            (Some(soi), _) => Ok(soi),
            (None, None) => Ok(f64::INFINITY),
            (None, Some(orbit)) => self.compute_soi(body.mass, orbit),
        }
    }

    fn compute_soi(&self, mass: f64, orbit: ParentOrbit) -> Result<f64> {
        let parent_mass = self.get(orbit.parent)?.mass;
        gravity::sphere_of_influence(mass, parent_mass, orbit.elements.semi_major_axis)
    }

    fn refresh_soi(&mut self, id: BodyId) -> Result<()> {
        let body = self.get(id)?;
        let soi = match body.orbit {
            Some(orbit) => self.compute_soi(body.mass, orbit)?,
            None => f64::INFINITY,
        };
        self.get_mut(id)?.soi = Some(soi);
        Ok(())
    }

    /// Change a body's mass. The body's own sphere of influence and those of
    /// its children are recomputed.
    pub fn set_mass(&mut self, id: BodyId, mass: f64) -> Result<()> {
        ensure_mass(mass)?;
        self.get_mut(id)?.mass = mass;
        self.refresh_soi(id)?;
        let children: Vec<BodyId> = self.children(id).map(CelestialBody::id).collect();
        for child in children {
            self.refresh_soi(child)?;
        }
        Ok(())
    }

    /// Move `id` into orbit around `new_parent`, keeping its current
    /// absolute state. The new elements take the body's current state time
    /// as their epoch.
    ///
    /// The states of both bodies must be current for the same time, i.e.
    /// written by a simulation update after the last structural change.
    ///
    /// Fails for root bodies, for parents that are the body itself or one
    /// of its descendants, for stale states, and when the relative state is
    /// not a bound elliptical orbit. On failure the system is unchanged.
    pub fn reparent(&mut self, id: BodyId, new_parent: BodyId) -> Result<()> {
        let body = self.get(id)?;
        if body.is_root() {
            return Err(OrbitError::RootBody(id));
        }
        let parent = self.get(new_parent)?;
        if new_parent == id || self.ancestors(new_parent).any(|a| a == id) {
            return Err(OrbitError::ParentCycle {
                body: id,
                parent: new_parent,
            });
        }
        if !body.evaluated {
            return Err(OrbitError::StaleState(id));
        }
        if !parent.evaluated || parent.state.time != body.state.time {
            return Err(OrbitError::StaleState(new_parent));
        }

        let local = StateVector::new(
            body.state.position - parent.state.position,
            body.state.velocity - parent.state.velocity,
        );
        let elements = local.into_elements(parent.mass, body.state.time)?;
        let soi = gravity::sphere_of_influence(body.mass, parent.mass, elements.semi_major_axis)?;
        debug!(
            body = %id,
            parent = %new_parent,
            a = elements.semi_major_axis,
            e = elements.eccentricity,
            "reparented body"
        );

        let body = self.get_mut(id)?;
        body.orbit = Some(ParentOrbit {
            parent: new_parent,
            elements,
        });
        body.state.local = local;
        body.soi = Some(soi);
        self.order = self.compute_order()?;
        Ok(())
    }

    fn compute_order(&self) -> Result<Vec<BodyId>> {
        let mut children: Vec<Vec<BodyId>> = vec![Vec::new(); self.bodies.len()];
        let mut queue = VecDeque::new();
        for body in self.bodies() {
            match body.parent() {
                Some(parent) => children
                    .get_mut(parent.into_raw())
                    .ok_or(OrbitError::UnknownBody(parent))?
                    .push(body.id),
                None => queue.push_back(body.id),
            }
        }

        let mut order = Vec::with_capacity(self.bodies.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(children[id.into_raw()].iter().copied());
        }

        if order.len() != self.bodies.len() {
            // whatever was not reached from a root sits on a cycle
            let orphan = self
                .ids()
                .find(|id| !order.contains(id))
                .unwrap_or_default();
            let parent = self.bodies[orphan].parent().unwrap_or_default();
            return Err(OrbitError::ParentCycle {
                body: orphan,
                parent,
            });
        }
        Ok(order)
    }

    /// Check every invariant and rebuild the caches that are not persisted.
    /// Needed after deserializing a system.
    pub fn validate(&mut self) -> Result<()> {
        for (id, body) in self.bodies.iter() {
            if body.id != id {
                return Err(OrbitError::UnknownBody(body.id));
            }
            ensure_mass(body.mass)?;
            ensure_positive("radius", body.radius)?;
            match body.orbit {
                Some(orbit) => {
                    orbit.elements.validate()?;
                    if !self.bodies.contains(orbit.parent) {
                        return Err(OrbitError::UnknownBody(orbit.parent));
                    }
                    if orbit.parent == id {
                        return Err(OrbitError::ParentCycle {
                            body: id,
                            parent: id,
                        });
                    }
                }
                None => {
                    if !body.anchor.iter().all(|x| x.is_finite()) {
                        return Err(OrbitError::NonFinite("anchor"));
                    }
                }
            }
        }
        self.order = self.compute_order()?;
        let ids: Vec<BodyId> = self.ids().collect();
        for id in ids {
            self.refresh_soi(id)?;
            let body = self.get_mut(id)?;
            if body.is_root() {
                body.state.position = body.anchor;
                body.evaluated = true;
            }
        }
        Ok(())
    }
}

pub struct Ancestors<'a> {
    system: &'a StarSystem,
    next: Option<BodyId>,
    // guards against looping forever on a malformed, cyclic system
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = BodyId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let id = self.next?;
        self.next = self.system.bodies.get(id).and_then(CelestialBody::parent);
        Some(id)
    }
}
