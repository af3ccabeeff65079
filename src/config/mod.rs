//! The configuration file: one TOML document with a table per concern.
//!
//! ```toml
//! [stream]
//! servicePort = 1337
//! timeMultiplier = 0.001
//!
//! [generator.weights]
//! andSplit = 0.3
//!
//! [simulation]
//! numberOfTraces = 500
//! ```
//!
//! Every key is optional and falls back to its default.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::generator::{EvolutionConfig, GeneratorConfig};
use crate::simulation::SimulationConfig;
use crate::stream::StreamConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub stream: StreamConfig,
    pub generator: GeneratorConfig,
    pub evolution: EvolutionConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    /// Read and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let config: Config = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.stream.validate()?;
        self.generator.validate()?;
        self.evolution.validate()?;
        self.simulation.validate()
    }
}
