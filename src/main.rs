#![warn(clippy::unwrap_used, clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines
)]
use std::path::PathBuf;

use color_eyre::eyre::{self, OptionExt};
use config::RunConfig;
use itertools::Itertools;
use orrery::{
    bodies::{BodyKind, StarSystem},
    consts::{mu, DAY},
    generator::generate,
    kepler::orbits::StateVector,
    maneuver::plan_hohmann,
    scenario::{builtin_scenarios, run},
    simulation::{ProbeId, Simulation},
    units::UnitScale,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = RunConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;

    self_test()?;

    let system = generate(config.seed, &config.generator)?;
    let natural = describe(&system)?;

    let mut sim = Simulation::new(system, config.simulation.clone())?;
    let probe = if config.probe {
        launch_probe(&mut sim)?
    } else {
        None
    };

    let mut degraded = 0;
    for _ in 0..config.steps {
        let report = sim.step(config.step_seconds)?;
        degraded += report.degraded.len();
    }
    if degraded > 0 {
        warn!(degraded, "some body states were non-converged estimates");
    }
    info!(time = %sim.time(), steps = config.steps, "simulation finished");

    if let Some(id) = probe {
        report_probe(&sim, id, &natural)?;
    }

    if let Some(path) = &config.save_path {
        std::fs::write(
            path,
            ron::ser::to_string_pretty(
                &sim.save(),
                ron::ser::PrettyConfig::default()
                    .struct_names(true)
                    .enumerate_arrays(true),
            )?,
        )?;
        info!(path = %path.display(), "saved simulation");
    }
    Ok(())
}

fn self_test() -> eyre::Result<()> {
    let scenarios = builtin_scenarios();
    let mut failed = Vec::new();
    for scenario in &scenarios {
        let outcome = run(scenario)?;
        if !outcome.passed() {
            failed.push(outcome.name);
        }
    }
    if failed.is_empty() {
        info!(count = scenarios.len(), "self-test scenarios passed");
        Ok(())
    } else {
        eyre::bail!("self-test scenarios failed: {}", failed.iter().join(", "))
    }
}

fn describe(system: &StarSystem) -> eyre::Result<UnitScale> {
    let au = UnitScale::ASTRONOMICAL;
    let km = UnitScale::KILOMETRES;
    let natural = UnitScale::natural(system)?;
    info!(
        seed = ?system.seed(),
        bodies = system.len(),
        stars = %system.roots().map(|b| b.name.as_str()).join(", "),
        length_au = au.distance(natural.dist_sf),
        time_days = natural.time_sf / DAY,
        "generated system"
    );
    for body in system.bodies().filter(|b| b.kind != BodyKind::Moon) {
        let Some(elements) = body.elements() else {
            continue;
        };
        let period = elements.period(mu(system.parent_mass(body.id())?));
        info!(
            name = %body.name,
            kind = ?body.kind,
            a_au = au.distance(elements.semi_major_axis),
            e = elements.eccentricity,
            period = natural.time(period),
            mass = natural.mass(body.mass()),
            radius_km = km.distance(body.radius()),
            soi_km = km.distance(system.sphere_of_influence(body.id())?),
            moons = system.children(body.id()).count(),
            "body"
        );
    }
    Ok(natural)
}

/// Puts a probe on the innermost planet's orbit, opposite the planet, and
/// burns for the outermost planet's orbit.
fn launch_probe(sim: &mut Simulation) -> eyre::Result<Option<ProbeId>> {
    let system = sim.system();
    let star = system.roots().next().ok_or_eyre("system has no star")?;
    let planets: Vec<_> = system
        .children(star.id())
        .filter_map(|b| b.elements().map(|el| (b, el.semi_major_axis)))
        .sorted_by(|a, b| a.1.total_cmp(&b.1))
        .collect();
    let (Some((inner, _)), Some((outer, r2))) = (planets.first(), planets.last()) else {
        return Ok(None);
    };
    if inner.id() == outer.id() {
        return Ok(None);
    }

    // the planet's state relative to the star, mirrored through the star
    let opposite = StateVector::new(
        -(inner.position() - star.position()),
        -(inner.velocity() - star.velocity()),
    );
    let transfer = plan_hohmann(star.mass(), opposite.position.norm(), *r2)?;
    let burn = transfer.departure_burn(&opposite);
    let au = UnitScale::ASTRONOMICAL;
    info!(
        from = %inner.name,
        to = %outer.name,
        delta_v = transfer.total_delta_v(),
        transfer_days = transfer.transfer_time / DAY,
        phase_angle_deg = transfer.phase_angle().to_degrees(),
        target_au = au.distance(*r2),
        "planned hohmann transfer"
    );

    let position = star.position() + opposite.position;
    let velocity = star.velocity() + opposite.velocity;
    let id = sim.add_probe(position, velocity)?;
    sim.apply_impulse(id, burn)?;
    Ok(Some(id))
}

fn report_probe(sim: &Simulation, id: ProbeId, natural: &UnitScale) -> eyre::Result<()> {
    let probe = sim.probe(id)?;
    let au = UnitScale::ASTRONOMICAL;
    let km = UnitScale::KILOMETRES;
    let dominant = sim
        .dominant_body(&probe.position)?
        .map(|body| sim.system().get(body).map(|b| b.name.clone()))
        .transpose()?;
    let nearest = sim
        .nearest_bodies(&probe.position, 1)
        .into_iter()
        .next()
        .map(|body| sim.system().get(body).map(|b| b.name.clone()))
        .transpose()?;
    info!(
        probe = %id,
        x_au = au.distance(probe.position.x),
        y_au = au.distance(probe.position.y),
        speed_km_s = km.speed(probe.velocity.norm()),
        position = ?natural.position(probe.position),
        velocity = ?natural.velocity(probe.velocity),
        ?dominant,
        ?nearest,
        "probe state"
    );
    Ok(())
}
