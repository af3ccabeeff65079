//! Live replay of simulated traces to network clients.
//!
//! Traces are merged into a [`StreamBuffer`], which interleaves several process
//! instances on one timeline. The [`Streamer`] pops events in timestamp order, waits the
//! original gap between consecutive events scaled by the time multiplier, and hands
//! every event to the [`BroadcastService`], which writes it to all connected clients as
//! one JSON object per line.

mod broadcast;
mod buffer;
mod source;
mod streamer;

pub use broadcast::BroadcastService;
pub use buffer::StreamBuffer;
pub use source::{ProcessHandle, ProcessSource, TraceSource};
pub use streamer::{StreamState, Streamer};

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::simulation::{Event, Lifecycle};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamConfig {
    pub service_port: u16,
    pub maximum_parallel_instances: usize,
    /// Factor applied to the simulated gap between two events to get the real delay
    pub time_multiplier: f64,
    /// Fraction of the playing trace that has to pass before a new one starts
    pub time_fraction_before_new_trace: f64,
    pub mark_trace_beginning_end: bool,
    pub refill_interval_ms: u64,
    pub accept_poll_ms: u64,
    pub idle_poll_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            service_port: 1337,
            maximum_parallel_instances: 10,
            time_multiplier: 0.001,
            time_fraction_before_new_trace: 0.5,
            mark_trace_beginning_end: false,
            refill_interval_ms: 250,
            accept_poll_ms: 100,
            idle_poll_ms: 50,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.maximum_parallel_instances == 0 {
            return Err(Error::Config("maximumParallelInstances must be positive".into()));
        }
        if !self.time_multiplier.is_finite() || self.time_multiplier < 0.0 {
            return Err(Error::Config(format!("invalid timeMultiplier {}", self.time_multiplier)));
        }
        if !(0.0..=1.0).contains(&self.time_fraction_before_new_trace) {
            return Err(Error::Config(format!(
                "timeFractionBeforeNewTrace must be between 0 and 1, got {}",
                self.time_fraction_before_new_trace
            )));
        }
        if self.refill_interval_ms == 0 || self.accept_poll_ms == 0 || self.idle_poll_ms == 0 {
            return Err(Error::Config("polling intervals must be positive".into()));
        }
        Ok(())
    }
}

/// Marks the first and last event of a trace in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceTransition {
    Start,
    Complete,
}

/// One event as sent over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub case_id: String,
    pub activity: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trace_attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_transition: Option<TraceTransition>,
}

impl StreamEvent {
    pub fn new(case_id: &str, attributes: &BTreeMap<String, Value>, event: Event) -> Self {
        StreamEvent {
            case_id: case_id.to_string(),
            activity: event.label,
            timestamp: event.timestamp,
            lifecycle: event.lifecycle,
            data: event.data,
            trace_attributes: attributes.clone(),
            trace_transition: None,
        }
    }

    /// The event as one line of JSON, newline included
    pub fn to_line(&self) -> Result<String, Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Real time to wait for a simulated gap of `gap_ms` milliseconds
pub fn scaled_delay(gap_ms: i64, time_multiplier: f64) -> Duration {
    let seconds = gap_ms.max(0) as f64 / 1000.0 * time_multiplier;
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}
