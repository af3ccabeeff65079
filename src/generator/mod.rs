//! This module generates random, well-formed process graphs.
//!
//! Generation is recursive: every call produces a block with exactly one entry node and
//! one exit node (or nothing at all, when the block is skipped), so blocks compose into
//! a valid graph without any repair step.

mod evolution;

pub use evolution::{evolve, EvolutionConfig};

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::process::{DataValue, Direction, NodeId, Owner, Process, SequenceId};
use crate::value::{SharedGenerator, UniformInteger, Value};

use std::sync::Arc;

/// Relative weights of the patterns the generator can produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PatternWeights {
    pub single_activity: f64,
    pub sequence: f64,
    pub and_split: f64,
    pub xor_split: f64,
    #[serde(rename = "loop")]
    pub r#loop: f64,
    pub skip: f64,
}

impl Default for PatternWeights {
    fn default() -> Self {
        PatternWeights {
            single_activity: 0.2,
            sequence: 0.7,
            and_split: 0.3,
            xor_split: 0.3,
            r#loop: 0.1,
            skip: 0.1,
        }
    }
}

/// An inclusive range of integer values, in seconds when used for timings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratorConfig {
    pub weights: PatternWeights,
    pub min_branches: usize,
    pub max_branches: usize,
    pub maximum_depth: usize,
    pub data_object_probability: f64,
    /// Weight of the back edge of generated loops; the exit edge gets the complement
    pub loop_continuation_probability: f64,
    pub task_duration: Option<IntegerRange>,
    pub task_time_after: Option<IntegerRange>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            weights: PatternWeights::default(),
            min_branches: 2,
            max_branches: 5,
            maximum_depth: 3,
            data_object_probability: 0.1,
            loop_continuation_probability: 0.5,
            task_duration: None,
            task_time_after: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let w = &self.weights;
        let weights = [w.single_activity, w.sequence, w.and_split, w.xor_split, w.r#loop, w.skip];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config("pattern weights must be finite and not negative".into()));
        }
        if self.min_branches < 2 || self.max_branches < self.min_branches {
            return Err(Error::Config(format!(
                "branch range {}..={} is invalid, at least 2 branches are required",
                self.min_branches, self.max_branches
            )));
        }
        for (name, p) in [
            ("dataObjectProbability", self.data_object_probability),
            ("loopContinuationProbability", self.loop_continuation_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("{} must be between 0 and 1, got {}", name, p)));
            }
        }
        for range in [self.task_duration, self.task_time_after].into_iter().flatten() {
            if range.min < 0 || range.max < range.min {
                return Err(Error::Config(format!("invalid time range {}..={}", range.min, range.max)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    SingleActivity,
    Sequence,
    AndSplit,
    XorSplit,
    Loop,
    Skip,
}

/// The boundary nodes of a generated block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    pub entry: NodeId,
    pub exit: NodeId,
}

/// Builds random blocks into an existing process
pub(crate) struct ProcessGenerator<'a, R: Rng + ?Sized> {
    process: &'a mut Process,
    config: &'a GeneratorConfig,
    rng: &'a mut R,
    generated_activities: usize,
    generated_data_objects: usize,
}

impl<'a, R: Rng + ?Sized> ProcessGenerator<'a, R> {
    pub fn new(process: &'a mut Process, config: &'a GeneratorConfig, rng: &'a mut R) -> Self {
        ProcessGenerator { process, config, rng, generated_activities: 0, generated_data_objects: 0 }
    }

    /// Continue activity naming after the given number of activities
    pub fn with_activity_offset(mut self, offset: usize) -> Self {
        self.generated_activities = offset;
        self.generated_data_objects = self.process.data_objects().count();
        self
    }

    fn random_pattern(&mut self, can_loop: bool, can_skip: bool) -> Pattern {
        let config = self.config;
        let w = &config.weights;
        let mut candidates = vec![
            (Pattern::SingleActivity, w.single_activity),
            (Pattern::Sequence, w.sequence),
            (Pattern::AndSplit, w.and_split),
            (Pattern::XorSplit, w.xor_split),
        ];
        if can_loop {
            candidates.push((Pattern::Loop, w.r#loop));
        }
        if can_skip {
            candidates.push((Pattern::Skip, w.skip));
        }
        self.pick(&candidates)
    }

    fn pick(&mut self, candidates: &[(Pattern, f64)]) -> Pattern {
        // All weights zero falls back to a single activity
        match WeightedIndex::new(candidates.iter().map(|(_, w)| *w)) {
            Ok(index) => candidates[index.sample(&mut *self.rng)].0,
            Err(_) => Pattern::SingleActivity,
        }
    }

    /// Generate a block at the given depth. `None` means the block was skipped.
    pub fn new_pattern(&mut self, depth: usize, can_loop: bool, can_skip: bool) -> Option<Frame> {
        if depth > self.config.maximum_depth {
            let forced = if can_skip {
                let config = self.config;
                let w = &config.weights;
                self.pick(&[(Pattern::Skip, w.skip), (Pattern::SingleActivity, w.single_activity)])
            } else {
                Pattern::SingleActivity
            };
            return match forced {
                Pattern::Skip => None,
                _ => Some(self.new_activity()),
            };
        }
        match self.random_pattern(can_loop, can_skip) {
            Pattern::SingleActivity => Some(self.new_activity()),
            Pattern::Sequence => self.new_sequence(depth + 1, can_loop, can_skip),
            Pattern::AndSplit => Some(self.new_and_branches(depth + 1, can_loop)),
            Pattern::XorSplit => Some(self.new_xor_branches(depth + 1, can_loop, can_skip)),
            Pattern::Loop => Some(self.new_loop(depth + 1)),
            Pattern::Skip => None,
        }
    }

    fn new_activity(&mut self) -> Frame {
        self.generated_activities += 1;
        let name = format!("Activity {}", alpha(self.generated_activities));
        let task = self.process.add_task(name);
        if let Some(range) = self.config.task_duration {
            let salt = self.generated_activities as u64;
            self.process.set_task_duration(task, Arc::new(UniformInteger::new(range.min, range.max).with_salt(salt)));
        }
        if let Some(range) = self.config.task_time_after {
            let salt = (self.generated_activities as u64) << 32;
            self.process.set_task_time_after(task, Arc::new(UniformInteger::new(range.min, range.max).with_salt(salt)));
        }
        if self.rng.gen_bool(self.config.data_object_probability) {
            let direction = if self.rng.gen_bool(0.5) { Direction::Generated } else { Direction::Required };
            self.new_data_object(Owner::Node(task), direction);
        }
        Frame { entry: task, exit: task }
    }

    fn new_data_object(&mut self, owner: Owner, direction: Direction) {
        self.generated_data_objects += 1;
        let name = format!("variable_{}", alpha(self.generated_data_objects).to_lowercase());
        let value = if self.rng.gen_bool(0.5) {
            let generator: SharedGenerator =
                Arc::new(UniformInteger::new(0, 100).with_salt(self.generated_data_objects as u64));
            DataValue::Generated(generator)
        } else {
            DataValue::Literal(Value::String(format!("value_{}", self.rng.gen_range(0..1000))))
        };
        self.process.add_data_object(name, value, Some(owner), direction);
    }

    fn new_sequence(&mut self, depth: usize, can_loop: bool, can_skip: bool) -> Option<Frame> {
        let first = self.new_pattern(depth, can_loop, can_skip);
        let second = self.new_pattern(depth, can_loop, can_skip);
        match (first, second) {
            (Some(first), Some(second)) => {
                self.process.link(first.exit, second.entry);
                Some(Frame { entry: first.entry, exit: second.exit })
            }
            (frame, None) | (None, frame) => frame,
        }
    }

    fn branches(&mut self) -> usize {
        self.rng.gen_range(self.config.min_branches..=self.config.max_branches.max(self.config.min_branches))
    }

    fn new_and_branches(&mut self, depth: usize, can_loop: bool) -> Frame {
        let before = self.new_activity();
        let split = self.process.add_and_gateway();
        let join = self.process.add_and_gateway();
        for _ in 0..self.branches() {
            let branch = self.new_pattern(depth, can_loop, false);
            self.connect(split, branch, join);
        }
        let after = self.new_activity();
        self.process.link(before.exit, split);
        self.process.link(join, after.entry);
        Frame { entry: before.entry, exit: after.exit }
    }

    fn new_xor_branches(&mut self, depth: usize, can_loop: bool, can_skip: bool) -> Frame {
        let before = self.new_activity();
        let split = self.process.add_xor_gateway();
        let join = self.process.add_xor_gateway();
        for _ in 0..self.branches() {
            let branch = self.new_pattern(depth, can_loop, can_skip);
            let sequence = self.connect(split, branch, join);
            if self.rng.gen_bool(self.config.data_object_probability) {
                self.new_data_object(Owner::Sequence(sequence), Direction::Generated);
            }
        }
        let after = self.new_activity();
        self.process.link(before.exit, split);
        self.process.link(join, after.entry);
        Frame { entry: before.entry, exit: after.exit }
    }

    /// before -> entry XOR -> body -> decision XOR -> after, with decision -> rollback -> entry
    fn new_loop(&mut self, depth: usize) -> Frame {
        let before = self.new_activity();
        let entry = self.process.add_xor_gateway();
        let decision = self.process.add_xor_gateway();
        let body = self.new_pattern(depth, false, false);
        let rollback = self.new_pattern(depth, false, true);
        let after = self.new_activity();

        self.connect(entry, body, decision);
        let back = self.connect(decision, rollback, entry);
        self.process.link(before.exit, entry);
        let exit = self.process.link(decision, after.entry);

        let p = self.config.loop_continuation_probability;
        self.process.set_sequence_weight(back, p);
        self.process.set_sequence_weight(exit, 1.0 - p);
        Frame { entry: before.entry, exit: after.exit }
    }

    /// Connect `source` to `sink` through the block, or directly if it was skipped.
    /// Returns the sequence leaving `source`.
    pub fn connect(&mut self, source: NodeId, frame: Option<Frame>, sink: NodeId) -> SequenceId {
        match frame {
            Some(frame) => {
                let first = self.process.link(source, frame.entry);
                self.process.link(frame.exit, sink);
                first
            }
            None => self.process.link(source, sink),
        }
    }
}

/// Generate a random process
pub fn generate<R: Rng + ?Sized>(
    name: impl Into<String>,
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<Process, Error> {
    config.validate()?;
    let mut process = Process::new(name);
    let start = process.add_start_event();
    let end = process.add_end_event();
    let mut generator = ProcessGenerator::new(&mut process, config, rng);
    let frame = generator.new_pattern(1, true, false);
    generator.connect(start, frame, end);

    process.check()?;
    debug!(process = %process, "generated process");
    Ok(process)
}

/// 1 -> A, 26 -> Z, 27 -> AA, ...
pub(crate) fn alpha(mut number: usize) -> String {
    let mut letters = Vec::new();
    while number > 0 {
        number -= 1;
        letters.push(b'A' + (number % 26) as u8);
        number /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Inverse of [`alpha`] for activity names produced by the generator
pub(crate) fn alpha_index(name: &str) -> Option<usize> {
    let letters = name.strip_prefix("Activity ")?;
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    Some(letters.bytes().fold(0, |acc, b| acc * 26 + (b - b'A') as usize + 1))
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::error::Error;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::process::NodeKind;

    #[test]
    fn test_alpha() {
        assert_eq!(alpha(1), "A");
        assert_eq!(alpha(26), "Z");
        assert_eq!(alpha(27), "AA");
        assert_eq!(alpha(52), "AZ");
        assert_eq!(alpha(703), "AAA");
        for n in 1..2000 {
            assert_eq!(alpha_index(&format!("Activity {}", alpha(n))), Some(n));
        }
        assert_eq!(alpha_index("Check order"), None);
    }

    #[test]
    fn test_generated_processes_are_valid() -> Result<(), Box<dyn Error>> {
        let config = GeneratorConfig::default();
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let process = generate("random", &config, &mut rng)?;
            assert_eq!(process.start_events().count(), 1);
            assert_eq!(process.end_events().count(), 1);
            assert!(process.tasks().count() >= 1);
        }
        Ok(())
    }

    #[test]
    fn test_activity_names_are_unique_and_sequential() -> Result<(), Box<dyn Error>> {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let process = generate("random", &GeneratorConfig::default(), &mut rng)?;
        let mut indexes = process.tasks().filter_map(|t| alpha_index(t.name())).collect::<Vec<_>>();
        indexes.sort_unstable();
        assert_eq!(indexes, (1..=process.tasks().count()).collect::<Vec<_>>());
        let names = process.tasks().map(|t| t.name().to_string()).collect::<HashSet<_>>();
        assert_eq!(names.len(), process.tasks().count());
        Ok(())
    }

    #[test]
    fn test_only_single_activity() -> Result<(), Box<dyn Error>> {
        let config = GeneratorConfig {
            weights: PatternWeights {
                single_activity: 1.0,
                sequence: 0.0,
                and_split: 0.0,
                xor_split: 0.0,
                r#loop: 0.0,
                skip: 0.0,
            },
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let process = generate("single", &config, &mut rng)?;
        assert_eq!(process.tasks().count(), 1);
        assert_eq!(process.sequences().count(), 2);
        assert_eq!(process.tasks().next().map(|t| t.name()), Some("Activity A"));
        Ok(())
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_activity() -> Result<(), Box<dyn Error>> {
        let config = GeneratorConfig {
            weights: PatternWeights {
                single_activity: 0.0,
                sequence: 0.0,
                and_split: 0.0,
                xor_split: 0.0,
                r#loop: 0.0,
                skip: 0.0,
            },
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let process = generate("zero", &config, &mut rng)?;
        assert_eq!(process.tasks().count(), 1);
        Ok(())
    }

    #[test]
    fn test_loops_have_weighted_exits() -> Result<(), Box<dyn Error>> {
        let config = GeneratorConfig {
            weights: PatternWeights {
                single_activity: 1.0,
                sequence: 0.0,
                and_split: 0.0,
                xor_split: 0.0,
                r#loop: 1.0,
                skip: 0.0,
            },
            maximum_depth: 1,
            loop_continuation_probability: 0.25,
            ..Default::default()
        };
        let mut found = false;
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let process = generate("loop", &config, &mut rng)?;
            for gateway in process.gateways().filter(|g| g.kind() == NodeKind::XorGateway) {
                if gateway.outgoing().len() == 2 {
                    found = true;
                    let weights = gateway.outgoing()
                        .iter()
                        .filter_map(|s| process.sequence(*s)?.weight())
                        .collect::<Vec<_>>();
                    assert_eq!(weights, vec![0.25, 0.75]);
                }
            }
        }
        assert!(found);
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(GeneratorConfig::default().validate().is_ok());
        let config = GeneratorConfig { min_branches: 1, ..Default::default() };
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
        let config = GeneratorConfig { data_object_probability: 1.5, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
