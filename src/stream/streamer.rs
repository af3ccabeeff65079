use std::fmt::{self, Display};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use super::{scaled_delay, BroadcastService, ProcessHandle, ProcessSource, StreamBuffer, StreamConfig, TraceSource};
use crate::error::Error;
use crate::process::Process;
use crate::simulation::SimulationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,    // never started
    Running,
    Paused,
    Stopped, // terminal
}

impl Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Idle => write!(f, "idle"),
            StreamState::Running => write!(f, "running"),
            StreamState::Paused => write!(f, "paused"),
            StreamState::Stopped => write!(f, "stopped"),
        }
    }
}

/// State shared with the refill and emit threads
struct Shared {
    state: Mutex<StreamState>,
    changed: Condvar,
    buffer: Mutex<StreamBuffer>,
    emitted: AtomicUsize,
}

impl Shared {
    /// Block while paused. Returns false once stopped.
    fn wait_running(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            match *state {
                StreamState::Running => return true,
                StreamState::Stopped => return false,
                StreamState::Idle | StreamState::Paused => self.changed.wait(&mut state),
            }
        }
    }

    /// Sleep unless the state changes first. Returns true if the whole duration
    /// passed while running.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        while *state == StreamState::Running {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return *state == StreamState::Running;
            }
        }
        false
    }
}

/// Replays simulated traces in (scaled) real time to every connected client.
///
/// A refill thread keeps up to `maximumParallelInstances` traces in the buffer, an emit
/// thread pops events in timestamp order and broadcasts them.
pub struct Streamer {
    config: StreamConfig,
    shared: Arc<Shared>,
    source: Mutex<Option<Box<dyn TraceSource>>>,
    process: Option<ProcessHandle>,
    broadcaster: Mutex<Option<Arc<BroadcastService>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Streamer {
    pub fn new(config: StreamConfig, source: impl TraceSource + 'static) -> Result<Self, Error> {
        config.validate()?;
        let buffer = StreamBuffer::new(config.time_fraction_before_new_trace, config.mark_trace_beginning_end);
        let source: Box<dyn TraceSource> = Box::new(source);
        Ok(Streamer {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(StreamState::Idle),
                changed: Condvar::new(),
                buffer: Mutex::new(buffer),
                emitted: AtomicUsize::new(0),
            }),
            source: Mutex::new(Some(source)),
            process: None,
            broadcaster: Mutex::new(None),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Stream the traces of a process, see [`Self::process_handle`] to change it later
    pub fn for_process(config: StreamConfig, process: Process, simulation: SimulationConfig) -> Result<Self, Error> {
        let source = ProcessSource::new(process, simulation)?;
        let handle = source.handle();
        let mut streamer = Streamer::new(config, source)?;
        streamer.process = Some(handle);
        Ok(streamer)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> StreamState {
        *self.shared.state.lock()
    }

    /// Present when streaming a process
    pub fn process_handle(&self) -> Option<ProcessHandle> {
        self.process.clone()
    }

    /// Address of the broadcast service, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.broadcaster.lock().as_ref().map(|b| b.local_addr())
    }

    pub fn client_count(&self) -> usize {
        self.broadcaster.lock().as_ref().map_or(0, |b| b.client_count())
    }

    /// Number of events handed to the broadcast service so far
    pub fn emitted(&self) -> usize {
        self.shared.emitted.load(Ordering::Acquire)
    }

    /// Start streaming, or resume after [`Self::pause`]. The first start opens the
    /// broadcast service. A stopped streamer cannot be started again.
    pub fn start(&self) -> Result<(), Error> {
        let mut state = self.shared.state.lock();
        match *state {
            StreamState::Running => return Ok(()),
            StreamState::Stopped => return Err(Error::StreamStopped),
            StreamState::Paused => {
                *state = StreamState::Running;
                self.shared.changed.notify_all();
                info!("streaming resumed");
                return Ok(());
            }
            StreamState::Idle => {}
        }

        let broadcaster = Arc::new(BroadcastService::open(
            self.config.service_port,
            Duration::from_millis(self.config.accept_poll_ms),
        )?);
        let source = self.source.lock().take().ok_or(Error::StreamStopped)?;
        let local_addr = broadcaster.local_addr();
        *self.broadcaster.lock() = Some(Arc::clone(&broadcaster));

        let spawned = self.spawn_refill(source).and_then(|refill| {
            self.threads.lock().push(refill);
            self.spawn_emit(broadcaster)
        });
        match spawned {
            Ok(emit) => {
                self.threads.lock().push(emit);
                *state = StreamState::Running;
                self.shared.changed.notify_all();
                info!(%local_addr, "streaming started");
                Ok(())
            }
            Err(error) => {
                drop(state);
                self.stop();
                Err(error)
            }
        }
    }

    /// Hold the emission of events. Has no effect unless running.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if *state == StreamState::Running {
            *state = StreamState::Paused;
            self.shared.changed.notify_all();
            info!("streaming paused");
        }
    }

    /// Stop both threads and close the broadcast service. Calling it again does nothing.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == StreamState::Stopped {
                return;
            }
            *state = StreamState::Stopped;
            self.shared.changed.notify_all();
        }
        for handle in self.threads.lock().drain(..) {
            let name = handle.thread().name().unwrap_or("stream").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "stream thread panicked");
            }
        }
        if let Some(broadcaster) = self.broadcaster.lock().as_ref() {
            broadcaster.close();
        }
        info!(emitted = self.emitted(), "streaming stopped");
    }

    fn spawn_refill(&self, mut source: Box<dyn TraceSource>) -> Result<JoinHandle<()>, Error> {
        let shared = Arc::clone(&self.shared);
        let maximum = self.config.maximum_parallel_instances;
        let interval = Duration::from_millis(self.config.refill_interval_ms);
        let handle = thread::Builder::new().name("plg-stream-refill".into()).spawn(move || {
            while shared.wait_running() {
                let missing = maximum.saturating_sub(shared.buffer.lock().in_flight());
                if missing > 0 {
                    match source.next_traces(missing) {
                        Ok(traces) => {
                            let mut buffer = shared.buffer.lock();
                            for trace in traces {
                                buffer.enqueue(trace);
                            }
                            debug!(in_flight = buffer.in_flight(), events = buffer.len(), "stream buffer refilled");
                        }
                        Err(error) => error!(%error, "cannot generate traces to stream"),
                    }
                }
                shared.sleep(interval);
            }
            debug!("refill thread exiting");
        })?;
        Ok(handle)
    }

    fn spawn_emit(&self, broadcaster: Arc<BroadcastService>) -> Result<JoinHandle<()>, Error> {
        let shared = Arc::clone(&self.shared);
        let multiplier = self.config.time_multiplier;
        let idle = Duration::from_millis(self.config.idle_poll_ms);
        let handle = thread::Builder::new().name("plg-stream-emit".into()).spawn(move || {
            // Wall time of the last emission, the gap to the head is measured from it
            let mut emitted_at: Option<Instant> = None;
            let mut interrupted = false;
            while shared.wait_running() {
                if interrupted {
                    // Resumed after a pause, the pending gap starts over
                    emitted_at = emitted_at.map(|_| Instant::now());
                    interrupted = false;
                }
                let (next, clock) = {
                    let buffer = shared.buffer.lock();
                    (buffer.peek_timestamp(), buffer.clock())
                };
                let Some(next) = next else {
                    shared.sleep(idle);
                    continue;
                };
                let gap = scaled_delay(clock.map_or(0, |clock| next.saturating_sub(clock)), multiplier);
                if let Some(due) = emitted_at.map(|at| at + gap) {
                    let now = Instant::now();
                    if due > now {
                        // Wait in slices so an earlier event enqueued meanwhile gets its own gap
                        interrupted = !shared.sleep((due - now).min(idle));
                        continue;
                    }
                }

                let Some(event) = shared.buffer.lock().pop() else {
                    continue;
                };
                emitted_at = Some(Instant::now());
                match event.to_line() {
                    Ok(line) => {
                        let clients = broadcaster.send(&line);
                        shared.emitted.fetch_add(1, Ordering::AcqRel);
                        trace!(case_id = %event.case_id, activity = %event.activity, clients, "event streamed");
                    }
                    Err(error) => warn!(%error, case_id = %event.case_id, "cannot serialize event"),
                }
            }
            debug!("emit thread exiting");
        })?;
        Ok(handle)
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Streamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streamer")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("emitted", &self.emitted())
            .finish()
    }
}
