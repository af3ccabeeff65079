//! This module simulates process instances into traces.
//!
//! One simulation plays a token game over a borrowed, validated [`Process`]. All state
//! of a running instance (token queue, join arrivals, traversal counters) lives in a
//! local structure, so any number of instances of the same process can be simulated
//! concurrently.

mod log;
pub mod noise;

pub use log::{Log, LogGenerator};
pub(crate) use log::now_millis;
pub use noise::NoiseConfig;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, SimulationError, StructuralError, ValueError};
use crate::process::{Direction, Node, NodeId, NodeKind, Owner, Process, SequenceId};
use crate::value::{SharedGenerator, Value};
use noise::Noise;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub number_of_traces: usize,
    /// `{}` is replaced by the index of the case
    pub case_id_pattern: String,
    /// Times a sequence leaving an XOR split can be taken in one instance before the
    /// other branches are preferred
    pub maximum_loop_cycles: usize,
    /// Hard limit on token moves per instance
    pub maximum_steps: usize,
    /// Duration of tasks without a duration generator, in seconds
    pub default_duration: i64,
    /// Waiting time after tasks without a time-after generator, in seconds
    pub default_time_after: i64,
    /// Milliseconds since the Unix epoch; the current time when unset
    pub start_time: Option<i64>,
    pub seed: Option<u64>,
    pub workers: usize,
    pub noise: NoiseConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            number_of_traces: 100,
            case_id_pattern: "case_{}".to_string(),
            maximum_loop_cycles: 3,
            maximum_steps: 100_000,
            default_duration: 0,
            default_time_after: 3600,
            start_time: None,
            seed: None,
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            noise: NoiseConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.workers == 0 {
            return Err(Error::Config("at least one simulation worker is required".into()));
        }
        if self.maximum_steps == 0 {
            return Err(Error::Config("maximumSteps must be positive".into()));
        }
        if self.default_duration < 0 || self.default_time_after < 0 {
            return Err(Error::Config("default task timings cannot be negative".into()));
        }
        self.noise.validate()
    }

    pub fn case_id(&self, index: usize) -> String {
        if self.case_id_pattern.contains("{}") {
            self.case_id_pattern.replacen("{}", &index.to_string(), 1)
        } else {
            format!("{}{}", self.case_id_pattern, index)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Task,
    End,
}

impl EventKind {
    /// Start events sort before and end events after everything at the same instant
    fn rank(self) -> u8 {
        match self {
            EventKind::Start => 0,
            EventKind::Task => 1,
            EventKind::End => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Start,
    Complete,
}

/// A single recorded step of a trace. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(skip)]
    pub node: Option<NodeId>,
    pub label: String,
    pub kind: EventKind,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub case_id: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    pub events: Vec<Event>,
}

impl Trace {
    pub fn start_time(&self) -> Option<i64> {
        self.events.first().map(|e| e.timestamp)
    }

    pub fn end_time(&self) -> Option<i64> {
        self.events.last().map(|e| e.timestamp)
    }

    pub fn duration(&self) -> i64 {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        }
    }

    /// Move every event by the given number of milliseconds
    pub fn shift(&mut self, offset: i64) {
        for event in &mut self.events {
            event.timestamp += offset;
        }
    }
}

/// Simulates instances of one validated process
#[derive(Debug)]
pub struct TraceSimulator<'p> {
    process: &'p Process,
    config: &'p SimulationConfig,
    starts: Vec<NodeId>,
}

impl<'p> TraceSimulator<'p> {
    /// The process is validated once here, never during simulation
    pub fn new(process: &'p Process, config: &'p SimulationConfig) -> Result<Self, StructuralError> {
        process.check()?;
        let starts = process.start_events().map(|n| n.id()).collect();
        Ok(TraceSimulator { process, config, starts })
    }

    pub fn process(&self) -> &'p Process {
        self.process
    }

    pub fn config(&self) -> &'p SimulationConfig {
        self.config
    }

    /// Simulate one instance starting at `start_time` (milliseconds)
    pub fn simulate<R: Rng + ?Sized>(&self, case_id: &str, start_time: i64, rng: &mut R) -> Result<Trace, SimulationError> {
        let mut instance = Instance {
            simulator: self,
            case_id,
            rng,
            noise: Noise::new(&self.config.noise),
            queue: BinaryHeap::new(),
            next_order: 0,
            traversals: HashMap::default(),
            joins: HashMap::default(),
            events: Vec::new(),
        };
        instance.run(start_time)?;
        instance.seal()
    }
}

/// A token waiting to be processed
#[derive(Debug)]
struct Token {
    node: NodeId,
    via: Option<SequenceId>,
    clock: i64,
    data: BTreeMap<String, Value>,
}

/// Tokens leave the queue in (clock, creation order) order
#[derive(Debug)]
struct Queued {
    order: u64,
    token: Token,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, so compare the other way round
        (other.token.clock, other.order).cmp(&(self.token.clock, self.order))
    }
}

/// A token absorbed by an AND join, waiting for the other branches
#[derive(Debug)]
struct Arrival {
    clock: i64,
    data: BTreeMap<String, Value>,
}

type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// The state of one running instance
struct Instance<'s, 'p, R: Rng + ?Sized> {
    simulator: &'s TraceSimulator<'p>,
    case_id: &'s str,
    rng: &'s mut R,
    noise: Noise<'p>,
    queue: BinaryHeap<Queued>,
    next_order: u64,
    traversals: FastMap<SequenceId, usize>,
    joins: FastMap<NodeId, FastMap<SequenceId, VecDeque<Arrival>>>,
    events: Vec<Event>,
}

impl<'s, 'p, R: Rng + ?Sized> Instance<'s, 'p, R> {
    fn run(&mut self, start_time: i64) -> Result<(), SimulationError> {
        let starts = &self.simulator.starts;
        let start = starts[self.rng.gen_range(0..starts.len())];
        self.push(Token { node: start, via: None, clock: start_time, data: BTreeMap::new() });

        let limit = self.simulator.config.maximum_steps;
        let mut steps = 0;
        while let Some(Queued { token, .. }) = self.queue.pop() {
            steps += 1;
            if steps > limit {
                return Err(SimulationError::StepLimitExceeded { case_id: self.case_id.to_string(), limit });
            }
            self.fire(token)?;
        }

        if !self.events.iter().any(|e| e.kind == EventKind::End) {
            let waiting = self.joins.values().flat_map(|j| j.values()).map(VecDeque::len).sum::<usize>();
            return Err(SimulationError::Stuck {
                case_id: self.case_id.to_string(),
                reason: format!("no end event was reached, {} tokens are waiting at AND joins", waiting),
            });
        }
        Ok(())
    }

    fn push(&mut self, token: Token) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Queued { order, token });
    }

    fn fire(&mut self, token: Token) -> Result<(), SimulationError> {
        let process = self.simulator.process;
        let Some(node) = process.node(token.node) else {
            return Err(SimulationError::Stuck {
                case_id: self.case_id.to_string(),
                reason: format!("token reached missing node {}", token.node),
            });
        };
        trace!(case_id = self.case_id, node = %node.id(), clock = token.clock, "token fired");
        match node.kind() {
            NodeKind::StartEvent => {
                self.record(node, node.name().to_string(), EventKind::Start, token.clock, None, BTreeMap::new());
                self.move_along(node.outgoing()[0], token.clock, BTreeMap::new())
            }
            NodeKind::EndEvent => {
                self.record(node, node.name().to_string(), EventKind::End, token.clock, None, token.data);
                Ok(())
            }
            NodeKind::Task => self.task(node, token),
            NodeKind::AndGateway => self.and(node, token),
            NodeKind::XorGateway => self.xor(node, token),
        }
    }

    fn record(
        &mut self,
        node: &Node,
        label: String,
        kind: EventKind,
        timestamp: i64,
        lifecycle: Option<Lifecycle>,
        data: BTreeMap<String, Value>,
    ) {
        self.events.push(Event { node: Some(node.id()), label, kind, timestamp, lifecycle, data });
    }

    fn evaluate(&self, generator: &SharedGenerator) -> Result<Option<Value>, SimulationError> {
        generator.evaluate(self.case_id).map_err(|source| self.value_error(source))
    }

    fn value_error(&self, source: ValueError) -> SimulationError {
        SimulationError::ValueGenerator { case_id: self.case_id.to_string(), source }
    }

    /// A task timing in milliseconds
    fn millis(&self, generator: Option<&SharedGenerator>, default: i64) -> Result<i64, SimulationError> {
        let seconds = match generator.map(|g| self.evaluate(g)).transpose()?.flatten() {
            None => default,
            Some(Value::Integer(i)) => i,
            Some(Value::String(s)) => s.trim()
                .parse::<i64>()
                .map_err(|_| self.value_error(ValueError::Unparsable(s.clone())))?,
        };
        Ok(seconds.max(0).saturating_mul(1000))
    }

    /// Evaluate data objects into `data`, applying data noise
    fn collect_data(&mut self, owner: Owner, direction: Direction, data: &mut BTreeMap<String, Value>) -> Result<(), SimulationError> {
        let process = self.simulator.process;
        for object in process.data_objects_of(owner, direction) {
            let value = object.value().evaluate(self.case_id).map_err(|source| self.value_error(source))?;
            if let Some(value) = value {
                data.insert(object.name().to_string(), self.noise.value(value, &mut *self.rng));
            }
        }
        Ok(())
    }

    fn move_along(&mut self, sequence: SequenceId, clock: i64, mut data: BTreeMap<String, Value>) -> Result<(), SimulationError> {
        let process = self.simulator.process;
        let Some(sink) = process.sequence(sequence).map(|s| s.sink()) else {
            return Err(SimulationError::Stuck {
                case_id: self.case_id.to_string(),
                reason: format!("sequence {} does not exist", sequence),
            });
        };
        *self.traversals.entry(sequence).or_default() += 1;
        self.collect_data(Owner::Sequence(sequence), Direction::Generated, &mut data)?;
        self.collect_data(Owner::Sequence(sequence), Direction::Required, &mut data)?;
        self.push(Token { node: sink, via: Some(sequence), clock, data });
        Ok(())
    }

    fn task(&mut self, node: &Node, token: Token) -> Result<(), SimulationError> {
        let label = self.noise.activity_name(node.name(), &mut *self.rng);

        let mut required = BTreeMap::new();
        self.collect_data(Owner::Node(node.id()), Direction::Required, &mut required)?;
        let mut data = token.data;
        match self.events.last_mut() {
            // Inputs of a task are recorded on the event that precedes it
            Some(previous) => previous.data.extend(required),
            None => data.extend(required),
        }
        self.collect_data(Owner::Node(node.id()), Direction::Generated, &mut data)?;

        let defaults = self.simulator.config;
        let timing = node.timing();
        let duration = self.millis(timing.duration.as_ref(), defaults.default_duration)?;
        let time_after = self.millis(timing.time_after.as_ref(), defaults.default_time_after)?;

        if duration > 0 {
            self.record(node, label.clone(), EventKind::Task, token.clock, Some(Lifecycle::Start), data.clone());
            self.record(node, label, EventKind::Task, token.clock.saturating_add(duration), Some(Lifecycle::Complete), data);
        } else {
            self.record(node, label, EventKind::Task, token.clock, None, data);
        }
        self.move_along(node.outgoing()[0], token.clock.saturating_add(duration).saturating_add(time_after), BTreeMap::new())
    }

    fn and(&mut self, node: &Node, token: Token) -> Result<(), SimulationError> {
        let (clock, data) = if node.incoming().len() > 1 {
            let Some(via) = token.via else {
                return Ok(());
            };
            let pending = self.joins.entry(node.id()).or_default();
            pending.entry(via).or_default().push_back(Arrival { clock: token.clock, data: token.data });
            let ready = node.incoming().iter().all(|s| pending.get(s).is_some_and(|q| !q.is_empty()));
            if !ready {
                return Ok(());
            }
            let mut clock = i64::MIN;
            let mut data = BTreeMap::new();
            for arrival in node.incoming().iter().filter_map(|s| pending.get_mut(s)?.pop_front()) {
                clock = clock.max(arrival.clock);
                data.extend(arrival.data);
            }
            (clock, data)
        } else {
            (token.clock, token.data)
        };

        let mut outgoing = node.outgoing().to_vec();
        outgoing.shuffle(&mut *self.rng);
        for sequence in outgoing {
            self.move_along(sequence, clock, data.clone())?;
        }
        Ok(())
    }

    fn xor(&mut self, node: &Node, token: Token) -> Result<(), SimulationError> {
        let process = self.simulator.process;
        let outgoing = node.outgoing();
        let chosen = if outgoing.len() == 1 {
            outgoing[0]
        } else {
            let cap = self.simulator.config.maximum_loop_cycles;
            let fresh = outgoing
                .iter()
                .copied()
                .filter(|s| self.traversals.get(s).copied().unwrap_or(0) < cap)
                .collect::<Vec<_>>();
            let candidates = if fresh.is_empty() { outgoing.to_vec() } else { fresh };
            let weights = candidates
                .iter()
                .map(|s| process.sequence(*s).and_then(|s| s.weight()).unwrap_or(1.0))
                .collect::<Vec<_>>();
            match WeightedIndex::new(&weights) {
                Ok(index) => candidates[index.sample(&mut *self.rng)],
                Err(_) => candidates[self.rng.gen_range(0..candidates.len())],
            }
        };
        self.move_along(chosen, token.clock, token.data)
    }

    fn seal(mut self) -> Result<Trace, SimulationError> {
        self.events.sort_by_key(|e| (e.timestamp, e.kind.rank()));

        let mut attributes = BTreeMap::new();
        for object in self.simulator.process.process_data_objects() {
            let value = object.value().evaluate(self.case_id).map_err(|source| self.value_error(source))?;
            if let Some(value) = value {
                attributes.insert(object.name().to_string(), self.noise.value(value, &mut *self.rng));
            }
        }

        let mut trace = Trace { case_id: self.case_id.to_string(), attributes, events: self.events };
        self.noise.trace(&mut trace, &mut *self.rng);
        Ok(trace)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::process::DataValue;
    use crate::value::{literal, FnGenerator};

    fn config() -> SimulationConfig {
        SimulationConfig { default_time_after: 60, ..Default::default() }
    }

    /// start -> A -> AND split -> {B, C} -> AND join -> D -> end
    fn parallel() -> Process {
        let mut process = Process::new("parallel");
        let start = process.add_start_event();
        let a = process.add_task("A");
        let split = process.add_and_gateway();
        let b = process.add_task("B");
        let c = process.add_task("C");
        let join = process.add_and_gateway();
        let d = process.add_task("D");
        let end = process.add_end_event();
        for (source, sink) in [(start, a), (a, split), (split, b), (split, c), (b, join), (c, join), (join, d), (d, end)] {
            process.link(source, sink);
        }
        process
    }

    /// start -> XOR split -> {B, C} -> XOR join -> end, weighted 0.5 / 0.5
    fn choice() -> Process {
        let mut process = Process::new("choice");
        let start = process.add_start_event();
        let split = process.add_xor_gateway();
        let b = process.add_task("B");
        let c = process.add_task("C");
        let join = process.add_xor_gateway();
        let end = process.add_end_event();
        process.link(start, split);
        let to_b = process.link(split, b);
        let to_c = process.link(split, c);
        process.set_sequence_weight(to_b, 0.5);
        process.set_sequence_weight(to_c, 0.5);
        for (source, sink) in [(b, join), (c, join), (join, end)] {
            process.link(source, sink);
        }
        process
    }

    fn labels(trace: &Trace) -> Vec<&str> {
        trace.events.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn test_rejects_invalid_process() {
        let process = Process::new("empty");
        let config = config();
        assert_eq!(TraceSimulator::new(&process, &config).unwrap_err(), StructuralError::NoStartEvent);
    }

    #[test]
    fn test_and_split_join() -> Result<(), Box<dyn Error>> {
        let process = parallel();
        let config = config();
        let simulator = TraceSimulator::new(&process, &config)?;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut orders = std::collections::HashSet::new();
        for i in 0..200 {
            let trace = simulator.simulate(&format!("case_{}", i), 0, &mut rng)?;
            let labels = labels(&trace);
            assert_eq!(labels.first(), Some(&"Start"));
            assert_eq!(labels.last(), Some(&"End"));
            assert_eq!(labels.iter().filter(|l| **l == "B").count(), 1);
            assert_eq!(labels.iter().filter(|l| **l == "C").count(), 1);
            let d = labels.iter().position(|l| *l == "D").unwrap();
            let b = labels.iter().position(|l| *l == "B").unwrap();
            let c = labels.iter().position(|l| *l == "C").unwrap();
            assert!(b < d && c < d);
            orders.insert(b < c);
        }
        // Both relative orders of the parallel branches occur
        assert_eq!(orders.len(), 2);
        Ok(())
    }

    #[test]
    fn test_join_waits_for_latest_branch() -> Result<(), Box<dyn Error>> {
        let mut process = parallel();
        let b = process.tasks().find(|t| t.name() == "B").map(|t| t.id()).unwrap();
        process.set_task_duration(b, literal(100));
        let config = SimulationConfig { default_time_after: 0, ..Default::default() };
        let simulator = TraceSimulator::new(&process, &config)?;
        let trace = simulator.simulate("case_1", 1_000, &mut ChaCha8Rng::seed_from_u64(0))?;
        let d = trace.events.iter().find(|e| e.label == "D").unwrap();
        assert_eq!(d.timestamp, 1_000 + 100_000);
        Ok(())
    }

    #[test]
    fn test_xor_frequency() -> Result<(), Box<dyn Error>> {
        let process = choice();
        let config = config();
        let simulator = TraceSimulator::new(&process, &config)?;
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let runs = 10_000;
        let mut b = 0;
        for i in 0..runs {
            let trace = simulator.simulate(&format!("case_{}", i), 0, &mut rng)?;
            let labels = labels(&trace);
            assert_eq!(labels.len(), 3);
            if labels.contains(&"B") {
                b += 1;
            }
        }
        let frequency = b as f64 / runs as f64;
        assert!((frequency - 0.5).abs() < 0.03, "frequency {}", frequency);
        Ok(())
    }

    #[test]
    fn test_weighted_xor() -> Result<(), Box<dyn Error>> {
        let mut process = choice();
        let split = process.gateways().next().map(|g| g.id()).unwrap();
        let to_b = process.node(split).unwrap().outgoing()[0];
        process.set_sequence_weight(to_b, 0.0);
        let config = config();
        let simulator = TraceSimulator::new(&process, &config)?;
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for i in 0..200 {
            let trace = simulator.simulate(&format!("case_{}", i), 0, &mut rng)?;
            assert_eq!(labels(&trace), vec!["Start", "C", "End"]);
        }
        Ok(())
    }

    #[test]
    fn test_loop_is_bounded() -> Result<(), Box<dyn Error>> {
        // start -> A -> XOR entry -> B -> XOR decision -> end, decision -> entry always preferred
        let mut process = Process::new("loop");
        let start = process.add_start_event();
        let a = process.add_task("A");
        let entry = process.add_xor_gateway();
        let b = process.add_task("B");
        let decision = process.add_xor_gateway();
        let end = process.add_end_event();
        process.link(start, a);
        process.link(a, entry);
        process.link(entry, b);
        process.link(b, decision);
        let back = process.link(decision, entry);
        let exit = process.link(decision, end);
        process.set_sequence_weight(back, 1.0);
        process.set_sequence_weight(exit, 0.0);

        let config = SimulationConfig { maximum_loop_cycles: 3, ..config() };
        let simulator = TraceSimulator::new(&process, &config)?;
        let trace = simulator.simulate("case_1", 0, &mut ChaCha8Rng::seed_from_u64(5))?;
        assert_eq!(labels(&trace).iter().filter(|l| **l == "B").count(), 4);
        assert_eq!(labels(&trace).last(), Some(&"End"));
        Ok(())
    }

    #[test]
    fn test_step_limit() -> Result<(), Box<dyn Error>> {
        let process = parallel();
        let config = SimulationConfig { maximum_steps: 3, ..config() };
        let simulator = TraceSimulator::new(&process, &config)?;
        let error = simulator.simulate("case_1", 0, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(error, SimulationError::StepLimitExceeded { limit: 3, .. }));
        Ok(())
    }

    #[test]
    fn test_durations_produce_lifecycle_events() -> Result<(), Box<dyn Error>> {
        let mut process = Process::new("timed");
        let start = process.add_start_event();
        let a = process.add_task("A");
        let b = process.add_task("B");
        let end = process.add_end_event();
        process.link(start, a);
        process.link(a, b);
        process.link(b, end);
        process.set_task_duration(a, literal(10));
        process.set_task_time_after(a, literal(5));
        let config = SimulationConfig { default_time_after: 0, ..Default::default() };
        let simulator = TraceSimulator::new(&process, &config)?;
        let trace = simulator.simulate("case_1", 0, &mut ChaCha8Rng::seed_from_u64(0))?;

        let summary = trace.events.iter().map(|e| (e.label.as_str(), e.timestamp, e.lifecycle)).collect::<Vec<_>>();
        assert_eq!(summary, vec![
            ("Start", 0, None),
            ("A", 0, Some(Lifecycle::Start)),
            ("A", 10_000, Some(Lifecycle::Complete)),
            ("B", 15_000, None),
            ("End", 15_000, None),
        ]);
        assert_eq!(trace.duration(), 15_000);
        Ok(())
    }

    #[test]
    fn test_huge_durations_saturate() -> Result<(), Box<dyn Error>> {
        let mut process = Process::new("huge");
        let start = process.add_start_event();
        let a = process.add_task("A");
        let end = process.add_end_event();
        process.link(start, a);
        process.link(a, end);
        process.set_task_duration(a, literal(i64::MAX));
        process.set_task_time_after(a, literal(i64::MAX));
        let config = config();
        let simulator = TraceSimulator::new(&process, &config)?;
        let trace = simulator.simulate("case_1", 1_000, &mut ChaCha8Rng::seed_from_u64(0))?;
        assert_eq!(trace.end_time(), Some(i64::MAX));
        assert_eq!(labels(&trace), vec!["Start", "A", "A", "End"]);
        Ok(())
    }

    #[test]
    fn test_data_objects() -> Result<(), Box<dyn Error>> {
        let mut process = Process::new("data");
        let start = process.add_start_event();
        let a = process.add_task("A");
        let end = process.add_end_event();
        process.link(start, a);
        let s = process.link(a, end);
        process.add_data_object("amount", DataValue::Literal(Value::Integer(7)), Some(Owner::Node(a)), Direction::Generated);
        process.add_data_object("input", DataValue::Literal(Value::from("in")), Some(Owner::Node(a)), Direction::Required);
        process.add_data_object("route", DataValue::Literal(Value::from("fast")), Some(Owner::Sequence(s)), Direction::Generated);
        process.add_data_object("customer", DataValue::Generated(literal("ACME")), None, Direction::Generated);

        let config = config();
        let simulator = TraceSimulator::new(&process, &config)?;
        let trace = simulator.simulate("case_1", 0, &mut ChaCha8Rng::seed_from_u64(0))?;
        assert_eq!(trace.attributes.get("customer"), Some(&Value::from("ACME")));
        assert_eq!(trace.events[0].data.get("input"), Some(&Value::from("in")));
        assert_eq!(trace.events[1].data.get("amount"), Some(&Value::Integer(7)));
        assert_eq!(trace.events[2].data.get("route"), Some(&Value::from("fast")));
        Ok(())
    }

    #[test]
    fn test_value_error_is_preserved() -> Result<(), Box<dyn Error>> {
        let mut process = parallel();
        let a = process.tasks().find(|t| t.name() == "A").map(|t| t.id()).unwrap();
        process.set_task_duration(a, Arc::new(FnGenerator::new("broken", |_: &str| {
            Err(ValueError::Message("division by zero".into()))
        })));
        let config = config();
        let simulator = TraceSimulator::new(&process, &config)?;
        match simulator.simulate("case_7", 0, &mut ChaCha8Rng::seed_from_u64(0)) {
            Err(SimulationError::ValueGenerator { case_id, source }) => {
                assert_eq!(case_id, "case_7");
                assert_eq!(source, ValueError::Message("division by zero".into()));
            }
            other => panic!("unexpected result {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_case_id_pattern() {
        let config = SimulationConfig { case_id_pattern: "order-{}-x".into(), ..Default::default() };
        assert_eq!(config.case_id(12), "order-12-x");
        let config = SimulationConfig { case_id_pattern: "trace_".into(), ..Default::default() };
        assert_eq!(config.case_id(3), "trace_3");
    }
}
