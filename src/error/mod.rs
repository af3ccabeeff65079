//! This module defines the error types for this crate.
//!
//! Errors are split by concern: structural problems of a process graph, failures of a
//! single simulated trace, failures of a value generator, and everything else that can
//! go wrong while loading files or serving the event stream.

use thiserror::Error;

use crate::process::NodeId;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Structural(#[from] StructuralError), // A process graph failed validation
    #[error(transparent)]
    Simulation(#[from] SimulationError), // A trace could not be simulated
    #[error("cannot listen on port {port}: {source}")]
    Listen { port: u16, source: std::io::Error }, // The broadcast service could not bind its port
    #[error("the streamer has been stopped and cannot be restarted")]
    StreamStopped, // start() was called after stop()
    #[error("invalid configuration: {0}")]
    Config(String), // A configuration value is out of range
    #[error("error reading configuration: {0}")]
    ConfigParse(#[from] toml::de::Error), // The configuration file is not valid TOML
    #[error("no input file provided")]
    NoInputFile, // Error when no input file is provided
    #[error("sequence flow refers to unknown element {0}")]
    UnknownReference(String), // A BPMN sequence flow names an element that was not imported
    #[error("unsupported file extension, supported file extensions are: .bpmn")]
    UnsupportedFileExt, // Error when the file extension is not supported
    #[error("error opening file: {0}")]
    IO(#[from] std::io::Error), // Error when an IO operation fails
    #[error("error parsing XML: {0}")]
    Parse(#[from] quick_xml::de::DeError), // Error when parsing XML fails
    #[error("error encoding event: {0}")]
    Json(#[from] serde_json::Error), // Error when an event cannot be encoded
}

/// A violated invariant of a process graph, naming the offending node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("process has no start event")]
    NoStartEvent,
    #[error("process has no end event")]
    NoEndEvent,
    #[error("sequence {sequence} refers to a node that does not exist")]
    DanglingSequence { sequence: String },
    #[error("{node} is a start event but has incoming sequences")]
    IncomingIntoStart { node: String },
    #[error("{node} is an end event but has outgoing sequences")]
    OutgoingFromEnd { node: String },
    #[error("{node} is isolated")]
    Isolated { node: String },
    #[error("{node} must have exactly one outgoing sequence but has {count}")]
    SingleOutgoing { node: String, count: usize },
    #[error("{node} has no incoming sequence")]
    NoIncoming { node: String },
    #[error("{node} has no outgoing sequence")]
    NoOutgoing { node: String },
    #[error("{node} cannot be reached from a start event")]
    Unreachable { node: String },
    #[error("{node} cannot reach an end event")]
    CannotReachEnd { node: String },
    #[error("{source_node} and {sink} cannot be connected: {reason}")]
    InvalidSequence { source_node: String, sink: String, reason: &'static str },
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
}

/// Failure of a single simulated trace
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("value generator failed for case {case_id}: {source}")]
    ValueGenerator { case_id: String, source: ValueError }, // Carries the generator error unchanged
    #[error("case {case_id} exceeded {limit} simulation steps")]
    StepLimitExceeded { case_id: String, limit: usize }, // Guard against runaway loops
    #[error("case {case_id}: {reason}")]
    Stuck { case_id: String, reason: String }, // The token game reached a state it cannot leave
}

/// Failure reported by a value generator binding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{0}")]
    Message(String),
    #[error("external command `{command}` failed: {reason}")]
    Command { command: String, reason: String },
    #[error("cannot interpret `{0}` as a value")]
    Unparsable(String),
}
