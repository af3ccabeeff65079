//! Evolution derives a mutated variant of an existing process, used to produce
//! drifting processes for streaming.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{alpha_index, GeneratorConfig, ProcessGenerator};
use crate::error::Error;
use crate::process::{DataObject, NodeId, Owner, Process, Sequence, SequenceId};

/// Upper bound on evolution rounds that leave the process unchanged
const MAX_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvolutionConfig {
    /// Probability that each task gets replaced by a freshly generated block
    pub activity_evolution_probability: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig { activity_evolution_probability: 0.1 }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let p = self.activity_evolution_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Config(format!("activityEvolutionProbability must be between 0 and 1, got {}", p)));
        }
        Ok(())
    }
}

/// Produce an evolved copy of `original`. Every task is independently replaced,
/// with the configured probability, by a block built with the same grammar as the
/// generator; a skipped block removes the task and bridges its neighbours.
///
/// Rounds that leave the number of tasks, gateways, sequences and data objects
/// unchanged are retried a bounded number of times.
pub fn evolve<R: Rng + ?Sized>(
    original: &Process,
    generator: &GeneratorConfig,
    config: &EvolutionConfig,
    rng: &mut R,
) -> Result<Process, Error> {
    generator.validate()?;
    config.validate()?;

    let name = format!("Evolution of {}", original.name());
    if config.activity_evolution_probability == 0.0 || original.tasks().next().is_none() {
        let mut process = original.clone();
        process.set_name(name);
        return Ok(process);
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut process = evolve_once(original, generator, config.activity_evolution_probability, rng);
        process.set_name(name.clone());
        process.check()?;
        if process.size() != original.size() {
            debug!(attempt, process = %process, "evolved process");
            return Ok(process);
        }
        if attempt >= MAX_ATTEMPTS {
            warn!(attempts = attempt, "evolution produced no structural change");
            return Ok(process);
        }
    }
}

fn evolve_once<R: Rng + ?Sized>(original: &Process, config: &GeneratorConfig, probability: f64, rng: &mut R) -> Process {
    let mut process = original.clone();
    let tasks = process.tasks().map(|t| t.id()).collect::<Vec<_>>();
    let mut activities = process
        .tasks()
        .filter_map(|t| alpha_index(t.name()))
        .max()
        .unwrap_or(0)
        .max(tasks.len());
    let mut data_objects = process.data_objects().count();

    for task in tasks {
        if !rng.gen_bool(probability) {
            continue;
        }
        let frame = {
            let mut generator = ProcessGenerator::new(&mut process, config, rng);
            generator.generated_activities = activities;
            generator.generated_data_objects = data_objects;
            let frame = generator.new_pattern(1, true, true);
            activities = generator.generated_activities;
            data_objects = generator.generated_data_objects;
            frame
        };

        let Some(node) = process.node(task) else { continue };
        let incoming = neighbours(&process, node.incoming(), |s| s.source());
        let outgoing = neighbours(&process, node.outgoing(), |s| s.sink());
        process.remove_node(task);

        match frame {
            Some(frame) => {
                debug!(task = %task, entry = %frame.entry, exit = %frame.exit, "task replaced");
                for link in &incoming {
                    let sequence = process.link(link.node, frame.entry);
                    link.restore(&mut process, sequence);
                }
                for link in &outgoing {
                    let sequence = process.link(frame.exit, link.node);
                    link.restore(&mut process, sequence);
                }
            }
            None => {
                debug!(task = %task, "task removed");
                for before in &incoming {
                    for after in outgoing.iter().filter(|after| after.node != before.node) {
                        let sequence = process.link(before.node, after.node);
                        before.restore(&mut process, sequence);
                        after.restore_data(&mut process, sequence);
                    }
                }
            }
        }
    }
    process
}

/// A sequence about to be removed with its task, kept so it can be rebuilt
struct Neighbour {
    node: NodeId,
    weight: Option<f64>,
    data: Vec<DataObject>,
}

impl Neighbour {
    /// Carry the weight and the data objects over to `sequence`
    fn restore(&self, process: &mut Process, sequence: SequenceId) {
        if let Some(weight) = self.weight {
            process.set_sequence_weight(sequence, weight);
        }
        self.restore_data(process, sequence);
    }

    fn restore_data(&self, process: &mut Process, sequence: SequenceId) {
        for object in &self.data {
            process.add_data_object(
                object.name(),
                object.value().clone(),
                Some(Owner::Sequence(sequence)),
                object.direction(),
            );
        }
    }
}

/// The nodes on the other side of the given sequences, with what those sequences carry
fn neighbours(process: &Process, sequences: &[SequenceId], other: impl Fn(&Sequence) -> NodeId) -> Vec<Neighbour> {
    sequences
        .iter()
        .filter_map(|s| process.sequence(*s))
        .map(|s| Neighbour {
            node: other(s),
            weight: s.weight(),
            data: process
                .data_objects()
                .filter(|d| d.owner() == Some(Owner::Sequence(s.id())))
                .cloned()
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::generator::generate;
    use crate::process::{DataValue, Direction};
    use crate::value::Value;

    #[test]
    fn test_evolution_is_valid_and_different() -> Result<(), Box<dyn Error>> {
        let generator = GeneratorConfig::default();
        let config = EvolutionConfig { activity_evolution_probability: 0.5 };
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let original = generate("base", &generator, &mut rng)?;
            let evolved = evolve(&original, &generator, &config, &mut rng)?;
            evolved.check()?;
            assert_eq!(evolved.name(), "Evolution of base");
            assert_eq!(original.name(), "base");
        }
        Ok(())
    }

    #[test]
    fn test_zero_probability_keeps_structure() -> Result<(), Box<dyn Error>> {
        let generator = GeneratorConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let original = generate("base", &generator, &mut rng)?;
        let config = EvolutionConfig { activity_evolution_probability: 0.0 };
        let evolved = evolve(&original, &generator, &config, &mut rng)?;
        assert_eq!(evolved.size(), original.size());
        Ok(())
    }

    #[test]
    fn test_new_activities_continue_naming() -> Result<(), Box<dyn Error>> {
        let mut process = Process::new("base");
        let start = process.add_start_event();
        let task = process.add_task("Activity A");
        let end = process.add_end_event();
        process.add_sequence(start, task)?;
        process.add_sequence(task, end)?;

        let generator = GeneratorConfig::default();
        let config = EvolutionConfig { activity_evolution_probability: 1.0 };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let evolved = evolve(&process, &generator, &config, &mut rng)?;
        assert!(evolved.tasks().all(|t| t.name() != "Activity A"));
        Ok(())
    }

    #[test]
    fn test_sequence_data_survives_evolution() -> Result<(), Box<dyn Error>> {
        // start -> XOR split -> {A, B} -> XOR join -> end, with "route" on split -> A
        let mut process = Process::new("base");
        let start = process.add_start_event();
        let split = process.add_xor_gateway();
        let a = process.add_task("Activity A");
        let b = process.add_task("Activity B");
        let join = process.add_xor_gateway();
        let end = process.add_end_event();
        process.add_sequence(start, split)?;
        let to_a = process.add_sequence(split, a)?;
        process.add_sequence(split, b)?;
        process.add_sequence(a, join)?;
        process.add_sequence(b, join)?;
        process.add_sequence(join, end)?;
        process.set_sequence_weight(to_a, 0.3);
        process.add_data_object(
            "route",
            DataValue::Literal(Value::from("fast")),
            Some(Owner::Sequence(to_a)),
            Direction::Generated,
        );

        let generator = GeneratorConfig { data_object_probability: 0.0, ..Default::default() };
        let config = EvolutionConfig { activity_evolution_probability: 1.0 };
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let evolved = evolve(&process, &generator, &config, &mut rng)?;
            let carried = evolved
                .data_objects()
                .filter_map(|d| match d.owner() {
                    Some(Owner::Sequence(s)) => Some((d.name().to_string(), evolved.sequence(s)?)),
                    _ => None,
                })
                .collect::<Vec<_>>();
            assert_eq!(carried.len(), 1, "seed {}", seed);
            let (name, sequence) = &carried[0];
            assert_eq!(name, "route");
            assert_eq!(sequence.source(), split);
            assert_eq!(sequence.weight(), Some(0.3));
        }
        Ok(())
    }

    #[test]
    fn test_invalid_probability() {
        let config = EvolutionConfig { activity_evolution_probability: -0.1 };
        assert!(config.validate().is_err());
    }
}
