use std::path::{Path, PathBuf};

use color_eyre::eyre::{self, bail, WrapErr};
use orrery::{consts::DAY, generator::GeneratorConfig, simulation::SimulationConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "orrery.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub seed: u64,
    pub steps: u32,
    /// Length of one simulation step in seconds.
    pub step_seconds: f64,
    /// Send a probe on a Hohmann transfer between the innermost and
    /// outermost planets of the first star.
    pub probe: bool,
    pub save_path: Option<PathBuf>,
    pub generator: GeneratorConfig,
    pub simulation: SimulationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            steps: 365,
            step_seconds: DAY,
            probe: true,
            save_path: None,
            generator: GeneratorConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Loads the configuration named on the command line, or
    /// `orrery.toml` if present, or the defaults.
    pub fn load(arg: Option<PathBuf>) -> eyre::Result<Self> {
        let config = match arg {
            Some(path) => Self::read(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::read(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if !(self.step_seconds.is_finite() && self.step_seconds > 0.0) {
            bail!("step_seconds must be positive, got {}", self.step_seconds);
        }
        self.generator.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use orrery::simulation::RefreshPolicy;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            seed = 7
            steps = 10

            [generator]
            planet_count = [2, 4]

            [simulation]
            refresh = { Every = 5 }
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.steps, 10);
        assert_eq!(config.step_seconds, DAY);
        assert_eq!(config.generator.planet_count, (2, 4));
        assert_eq!(config.generator.max_moons, GeneratorConfig::default().max_moons);
        assert_eq!(config.simulation.refresh, RefreshPolicy::Every(5));
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_step() {
        let config = RunConfig {
            step_seconds: 0.0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sample_config_parses() {
        let text = include_str!("../orrery.toml");
        let config: RunConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
    }
}
