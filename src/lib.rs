pub mod error;
pub mod value;
pub mod process;
pub mod generator;
pub mod simulation;
pub mod engine;
pub mod stream;
pub mod petri_net;
pub mod bpmn;
pub mod config;

pub use error::*;
pub use crate::bpmn::BpmnImporter;
pub use crate::config::Config;
pub use crate::engine::{LogProgress, NoProgress, ProgressCounter, ProgressSink, SimulationEngine};
pub use crate::generator::{evolve, generate, EvolutionConfig, GeneratorConfig};
pub use crate::petri_net::{PetriNet, Pnml, PnmlExporter};
pub use crate::process::{Exporter, Importer, NodeId, NodeKind, Process};
pub use crate::simulation::{Log, LogGenerator, SimulationConfig, Trace, TraceSimulator};
pub use crate::stream::{StreamConfig, StreamState, Streamer};
