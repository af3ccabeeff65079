use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::engine::NoProgress;
use crate::error::{Error, StructuralError};
use crate::process::Process;
use crate::simulation::{now_millis, LogGenerator, SimulationConfig, Trace};

/// Supplies the streamer with new traces
pub trait TraceSource: Send {
    fn next_traces(&mut self, count: usize) -> Result<Vec<Trace>, Error>;
}

impl<F> TraceSource for F
where
    F: FnMut(usize) -> Result<Vec<Trace>, Error> + Send,
{
    fn next_traces(&mut self, count: usize) -> Result<Vec<Trace>, Error> {
        self(count)
    }
}

/// The process a [`ProcessSource`] simulates. Cloned handles share the process, so it
/// can be replaced while streaming.
#[derive(Debug, Clone)]
pub struct ProcessHandle(Arc<RwLock<Arc<Process>>>);

impl ProcessHandle {
    pub fn new(process: Process) -> Self {
        ProcessHandle(Arc::new(RwLock::new(Arc::new(process))))
    }

    pub fn current(&self) -> Arc<Process> {
        Arc::clone(&self.0.read())
    }

    /// Swap in a new process, which is checked first. Traces already generated are
    /// streamed to the end.
    pub fn replace(&self, process: Process) -> Result<(), StructuralError> {
        process.check()?;
        info!(process = process.name(), "streamed process replaced");
        *self.0.write() = Arc::new(process);
        Ok(())
    }
}

/// Simulates the traces of the process behind a [`ProcessHandle`], numbering cases
/// across calls.
#[derive(Debug)]
pub struct ProcessSource {
    handle: ProcessHandle,
    config: SimulationConfig,
    next_case: usize,
}

impl ProcessSource {
    pub fn new(process: Process, mut config: SimulationConfig) -> Result<Self, Error> {
        config.validate()?;
        process.check()?;
        config.seed.get_or_insert_with(rand::random);
        config.start_time.get_or_insert_with(now_millis);
        Ok(ProcessSource { handle: ProcessHandle::new(process), config, next_case: 0 })
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    /// Index of the next case to be simulated
    pub fn next_case(&self) -> usize {
        self.next_case
    }
}

impl TraceSource for ProcessSource {
    fn next_traces(&mut self, count: usize) -> Result<Vec<Trace>, Error> {
        let process = self.handle.current();
        let traces = LogGenerator::new(&process, &self.config)?.generate_range(self.next_case, count, &NoProgress)?;
        self.next_case += count;
        Ok(traces)
    }
}
