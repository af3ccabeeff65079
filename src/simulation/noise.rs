//! Noise injection on simulated traces.
//!
//! Every probability defaults to zero, in which case traces are left untouched.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Event, EventKind, Trace};
use crate::error::Error;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NoiseConfig {
    pub activity_name: f64, // Replace an activity label with a random string
    pub string_data: f64, // Replace a string value with a random string
    pub integer_data: f64, // Shift an integer value by up to integer_data_delta
    pub integer_data_delta: i64,
    pub trace_alien_event: f64, // Insert an event with a random label
    pub trace_double_event: f64, // Duplicate an event
    pub trace_missing_episode: f64, // Drop a run of consecutive events
    pub trace_missing_episode_size: usize,
    pub trace_missing_head: f64, // Drop events at the beginning
    pub trace_missing_head_size: usize,
    pub trace_missing_tail: f64, // Drop events at the end
    pub trace_missing_tail_size: usize,
    pub trace_perturbed_order: f64, // Swap two events
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            activity_name: 0.0,
            string_data: 0.0,
            integer_data: 0.0,
            integer_data_delta: 5,
            trace_alien_event: 0.0,
            trace_double_event: 0.0,
            trace_missing_episode: 0.0,
            trace_missing_episode_size: 3,
            trace_missing_head: 0.0,
            trace_missing_head_size: 3,
            trace_missing_tail: 0.0,
            trace_missing_tail_size: 3,
            trace_perturbed_order: 0.0,
        }
    }
}

impl NoiseConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let probabilities = [
            ("activityName", self.activity_name),
            ("stringData", self.string_data),
            ("integerData", self.integer_data),
            ("traceAlienEvent", self.trace_alien_event),
            ("traceDoubleEvent", self.trace_double_event),
            ("traceMissingEpisode", self.trace_missing_episode),
            ("traceMissingHead", self.trace_missing_head),
            ("traceMissingTail", self.trace_missing_tail),
            ("tracePerturbedOrder", self.trace_perturbed_order),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("noise probability {} must be between 0 and 1, got {}", name, p)));
            }
        }
        if self.integer_data_delta < 0 {
            return Err(Error::Config("integerDataDelta cannot be negative".into()));
        }
        Ok(())
    }

    pub fn is_silent(&self) -> bool {
        [
            self.activity_name,
            self.string_data,
            self.integer_data,
            self.trace_alien_event,
            self.trace_double_event,
            self.trace_missing_episode,
            self.trace_missing_head,
            self.trace_missing_tail,
            self.trace_perturbed_order,
        ]
        .iter()
        .all(|p| *p == 0.0)
    }
}

pub(crate) struct Noise<'c> {
    config: &'c NoiseConfig,
}

fn random_label<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..13).map(|_| rng.sample(Alphanumeric) as char).collect::<String>().to_lowercase()
}

impl<'c> Noise<'c> {
    pub fn new(config: &'c NoiseConfig) -> Self {
        Noise { config }
    }

    fn hit<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
        p > 0.0 && rng.gen_bool(p.min(1.0))
    }

    pub fn activity_name<R: Rng + ?Sized>(&self, name: &str, rng: &mut R) -> String {
        if Self::hit(rng, self.config.activity_name) {
            random_label(rng)
        } else {
            name.to_string()
        }
    }

    pub fn value<R: Rng + ?Sized>(&self, value: Value, rng: &mut R) -> Value {
        match value {
            Value::Integer(i) if Self::hit(rng, self.config.integer_data) => {
                let delta = self.config.integer_data_delta;
                Value::Integer(i.saturating_add(rng.gen_range(-delta..=delta)))
            }
            Value::String(_) if Self::hit(rng, self.config.string_data) => Value::String(random_label(rng)),
            value => value,
        }
    }

    /// Apply at most one trace level perturbation
    pub fn trace<R: Rng + ?Sized>(&self, trace: &mut Trace, rng: &mut R) {
        let events = &mut trace.events;
        let c = self.config;
        if Self::hit(rng, c.trace_alien_event) {
            let timestamp = if events.is_empty() { 0 } else { events[rng.gen_range(0..events.len())].timestamp };
            let position = events.partition_point(|e| e.timestamp <= timestamp);
            events.insert(position, Event {
                node: None,
                label: random_label(rng),
                kind: EventKind::Task,
                timestamp,
                lifecycle: None,
                data: Default::default(),
            });
        } else if Self::hit(rng, c.trace_double_event) {
            if !events.is_empty() {
                let doubled = events[rng.gen_range(0..events.len())].clone();
                let position = events.partition_point(|e| e.timestamp <= doubled.timestamp);
                events.insert(position, doubled);
            }
        } else if Self::hit(rng, c.trace_missing_episode) {
            if !events.is_empty() && c.trace_missing_episode_size > 0 {
                let first = rng.gen_range(0..events.len());
                let size = rng.gen_range(1..=c.trace_missing_episode_size.min(events.len() - first));
                events.drain(first..first + size);
            }
        } else if Self::hit(rng, c.trace_missing_head) {
            if !events.is_empty() && c.trace_missing_head_size > 0 {
                let size = rng.gen_range(1..=c.trace_missing_head_size.min(events.len()));
                events.drain(..size);
            }
        } else if Self::hit(rng, c.trace_missing_tail) {
            if !events.is_empty() && c.trace_missing_tail_size > 0 {
                let size = rng.gen_range(1..=c.trace_missing_tail_size.min(events.len()));
                events.truncate(events.len() - size);
            }
        } else if Self::hit(rng, c.trace_perturbed_order) && events.len() > 1 {
            let first = rng.gen_range(0..events.len());
            let mut second = rng.gen_range(0..events.len() - 1);
            if second >= first {
                second += 1;
            }
            let (a, b) = (events[first].timestamp, events[second].timestamp);
            events.swap(first, second);
            // Keep the timestamps where they were so only the order changes
            events[first].timestamp = a;
            events[second].timestamp = b;
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::process::NodeId;

    fn trace(len: usize) -> Trace {
        let events = (0..len)
            .map(|i| Event {
                node: Some(NodeId(i)),
                label: format!("Activity {}", i),
                kind: EventKind::Task,
                timestamp: i as i64 * 1000,
                lifecycle: None,
                data: BTreeMap::new(),
            })
            .collect();
        Trace { case_id: "case_0".into(), attributes: BTreeMap::new(), events }
    }

    #[test]
    fn test_silent_by_default() {
        let config = NoiseConfig::default();
        assert!(config.is_silent());
        let noise = Noise::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut t = trace(5);
        for _ in 0..100 {
            noise.trace(&mut t, &mut rng);
            assert_eq!(noise.activity_name("Activity A", &mut rng), "Activity A");
            assert_eq!(noise.value(Value::Integer(4), &mut rng), Value::Integer(4));
        }
        assert_eq!(t.events.len(), 5);
    }

    #[test]
    fn test_missing_head() {
        let config = NoiseConfig { trace_missing_head: 1.0, trace_missing_head_size: 2, ..Default::default() };
        assert!(!config.is_silent());
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut t = trace(5);
        Noise::new(&config).trace(&mut t, &mut rng);
        assert!(t.events.len() == 3 || t.events.len() == 4);
        assert_eq!(t.events.last().map(|e| e.timestamp), Some(4000));
    }

    #[test]
    fn test_double_event_keeps_order() {
        let config = NoiseConfig { trace_double_event: 1.0, ..Default::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut t = trace(4);
        Noise::new(&config).trace(&mut t, &mut rng);
        assert_eq!(t.events.len(), 5);
        assert!(t.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_perturbed_order() {
        let config = NoiseConfig { trace_perturbed_order: 1.0, ..Default::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut t = trace(4);
        Noise::new(&config).trace(&mut t, &mut rng);
        let labels = t.events.iter().map(|e| e.label.as_str()).collect::<Vec<_>>();
        assert_ne!(labels, vec!["Activity 0", "Activity 1", "Activity 2", "Activity 3"]);
        assert!(t.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_integer_noise_is_bounded() {
        let config = NoiseConfig { integer_data: 1.0, integer_data_delta: 3, ..Default::default() };
        let noise = Noise::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..100 {
            match noise.value(Value::Integer(10), &mut rng) {
                Value::Integer(i) => assert!((7..=13).contains(&i)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_integer_noise_saturates() {
        let config = NoiseConfig { integer_data: 1.0, integer_data_delta: 3, ..Default::default() };
        let noise = Noise::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..100 {
            match noise.value(Value::Integer(i64::MAX - 1), &mut rng) {
                Value::Integer(i) => assert!(i >= i64::MAX - 4),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_validate() {
        let config = NoiseConfig { trace_alien_event: 2.0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
