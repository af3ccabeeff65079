//! Generation of whole logs: many traces of one process, simulated in parallel.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use super::{SimulationConfig, Trace, TraceSimulator};
use crate::engine::{ProgressSink, SimulationEngine, Task};
use crate::error::{Error, SimulationError};
use crate::process::Process;

/// The traces of one process, ordered by case index
#[derive(Debug, Clone, Serialize)]
pub struct Log {
    pub process: String,
    pub traces: Vec<Trace>,
}

pub struct LogGenerator<'p> {
    simulator: TraceSimulator<'p>,
    engine: SimulationEngine,
    seed: u64,
    start_time: i64,
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl<'p> LogGenerator<'p> {
    /// Validates both the configuration and the process
    pub fn new(process: &'p Process, config: &'p SimulationConfig) -> Result<Self, Error> {
        config.validate()?;
        let simulator = TraceSimulator::new(process, config)?;
        Ok(LogGenerator {
            simulator,
            engine: SimulationEngine::new(config.workers),
            seed: config.seed.unwrap_or_else(rand::random),
            start_time: config.start_time.unwrap_or_else(now_millis),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Simulate the configured number of traces
    pub fn generate(&self, progress: &dyn ProgressSink) -> Result<Log, Error> {
        let config = self.simulator.config();
        let traces = self.generate_range(0, config.number_of_traces, progress)?;
        info!(process = self.simulator.process().name(), traces = traces.len(), seed = self.seed, "log generated");
        Ok(Log { process: self.simulator.process().name().to_string(), traces })
    }

    /// Simulate the cases `first..first + count`. The trace of a case only depends on
    /// the seed and the case index, never on scheduling.
    pub fn generate_range(&self, first: usize, count: usize, progress: &dyn ProgressSink) -> Result<Vec<Trace>, Error> {
        self.generate_range_at(first, count, self.start_time, progress)
    }

    pub(crate) fn generate_range_at(
        &self,
        first: usize,
        count: usize,
        start_time: i64,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Trace>, Error> {
        let slots = Mutex::new((0..count).map(|_| None).collect::<Vec<Option<Trace>>>());
        let tasks = (0..count)
            .map(|offset| {
                let slots = &slots;
                let simulator = &self.simulator;
                let seed = self.seed;
                Box::new(move || -> Result<(), SimulationError> {
                    let index = first + offset;
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    rng.set_stream(index as u64);
                    let case_id = simulator.config().case_id(index);
                    let trace = simulator.simulate(&case_id, start_time, &mut rng)?;
                    slots.lock()[offset] = Some(trace);
                    Ok(())
                }) as Task<'_, SimulationError>
            })
            .collect();
        self.engine.run(tasks, progress)?;
        Ok(slots.into_inner().into_iter().flatten().collect())
    }
}
