//! This module defines the process graph: start and end events, tasks and gateways
//! connected by sequences, plus the data objects attached to them.
//!
//! The graph is an arena. Nodes, sequences and data objects live in ordered maps keyed
//! by ids handed out from per-graph counters, and refer to each other only by id.
//! Simulation never mutates the graph, so one process can be shared by many threads.

mod check;
mod data;
mod interchange;

pub use data::{DataObject, DataObjectId, DataValue, Direction, Owner};
pub use interchange::{Exporter, Importer};

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::StructuralError;
use crate::value::SharedGenerator;

/// An ID for a node of the process graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// An ID for a sequence of the process graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(pub(crate) usize);

/// NodeIds are displayed as n followed by the ID, e.g. n0, n1, n2, ...
impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "n{}", self.0)
    }
}

/// SequenceIds are displayed as s followed by the ID, e.g. s0, s1, s2, ...
impl Display for SequenceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "s{}", self.0)
    }
}

/// Supported node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    StartEvent,
    EndEvent,
    Task,
    AndGateway,
    XorGateway,
}

impl NodeKind {
    pub fn is_gateway(self) -> bool {
        matches!(self, NodeKind::AndGateway | NodeKind::XorGateway)
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let kind = match self {
            NodeKind::StartEvent => "start event",
            NodeKind::EndEvent => "end event",
            NodeKind::Task => "task",
            NodeKind::AndGateway => "AND gateway",
            NodeKind::XorGateway => "XOR gateway",
        };
        f.write_str(kind)
    }
}

/// Duration and waiting time of a task, in seconds. Unbound values fall back to the
/// simulation defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskTiming {
    pub duration: Option<SharedGenerator>,
    pub time_after: Option<SharedGenerator>,
}

/// A node has a unique ID, a name, a kind, and ordered lists of incoming and outgoing sequences
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) timing: TaskTiming,
    pub(crate) incoming: Vec<SequenceId>,
    pub(crate) outgoing: Vec<SequenceId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn timing(&self) -> &TaskTiming {
        &self.timing
    }

    pub fn incoming(&self) -> &[SequenceId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[SequenceId] {
        &self.outgoing
    }
}

/// A sequence connects a source node to a sink node.
/// The weight is only meaningful when the source is an XOR split.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub(crate) id: SequenceId,
    pub(crate) source: NodeId,
    pub(crate) sink: NodeId,
    pub(crate) weight: Option<f64>,
}

impl Sequence {
    pub fn id(&self) -> SequenceId {
        self.id
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn sink(&self) -> NodeId {
        self.sink
    }

    pub fn weight(&self) -> Option<f64> {
        self.weight
    }
}

/// Number of elements of each type, used to compare two processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessSize {
    pub tasks: usize,
    pub gateways: usize,
    pub sequences: usize,
    pub data_objects: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Process {
    name: String,
    nodes: BTreeMap<NodeId, Node>,
    sequences: BTreeMap<SequenceId, Sequence>,
    data_objects: BTreeMap<DataObjectId, DataObject>,
    next_node_id: usize,
    next_sequence_id: usize,
    next_data_object_id: usize,
}

impl Process {
    pub fn new(name: impl Into<String>) -> Self {
        Process { name: name.into(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    fn add_node(&mut self, kind: NodeKind, name: String) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, Node {
            id,
            name,
            kind,
            timing: TaskTiming::default(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        id
    }

    pub fn add_start_event(&mut self) -> NodeId {
        self.add_node(NodeKind::StartEvent, "Start".to_string())
    }

    pub fn add_end_event(&mut self) -> NodeId {
        self.add_node(NodeKind::EndEvent, "End".to_string())
    }

    pub fn add_task(&mut self, name: impl Into<String>) -> NodeId {
        self.add_node(NodeKind::Task, name.into())
    }

    pub fn add_and_gateway(&mut self) -> NodeId {
        self.add_node(NodeKind::AndGateway, "AND".to_string())
    }

    pub fn add_xor_gateway(&mut self) -> NodeId {
        self.add_node(NodeKind::XorGateway, "XOR".to_string())
    }

    /// Add a node of the given kind, keeping the provided name
    pub fn add_named(&mut self, kind: NodeKind, name: impl Into<String>) -> NodeId {
        self.add_node(kind, name.into())
    }

    /// Connect two nodes. Sequences into start events, out of end events and self
    /// loops are rejected.
    pub fn add_sequence(&mut self, source: NodeId, sink: NodeId) -> Result<SequenceId, StructuralError> {
        let source_node = self.nodes.get(&source).ok_or(StructuralError::UnknownNode(source))?;
        let sink_node = self.nodes.get(&sink).ok_or(StructuralError::UnknownNode(sink))?;
        let reason = if source == sink {
            Some("a node cannot be connected to itself")
        } else if source_node.kind == NodeKind::EndEvent {
            Some("end events cannot have outgoing sequences")
        } else if sink_node.kind == NodeKind::StartEvent {
            Some("start events cannot have incoming sequences")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(StructuralError::InvalidSequence {
                source_node: self.describe(source),
                sink: self.describe(sink),
                reason,
            });
        }
        Ok(self.link(source, sink))
    }

    /// Connect two nodes known to exist. Used by builders that maintain the
    /// invariants themselves.
    pub(crate) fn link(&mut self, source: NodeId, sink: NodeId) -> SequenceId {
        let id = SequenceId(self.next_sequence_id);
        self.next_sequence_id += 1;
        self.sequences.insert(id, Sequence { id, source, sink, weight: None });
        if let Some(node) = self.nodes.get_mut(&source) {
            node.outgoing.push(id);
        }
        if let Some(node) = self.nodes.get_mut(&sink) {
            node.incoming.push(id);
        }
        id
    }

    /// Remove a sequence together with the data objects it owns
    pub fn remove_sequence(&mut self, id: SequenceId) -> Option<Sequence> {
        let sequence = self.sequences.remove(&id)?;
        if let Some(node) = self.nodes.get_mut(&sequence.source) {
            node.outgoing.retain(|s| *s != id);
        }
        if let Some(node) = self.nodes.get_mut(&sequence.sink) {
            node.incoming.retain(|s| *s != id);
        }
        self.data_objects.retain(|_, d| d.owner != Some(Owner::Sequence(id)));
        Some(sequence)
    }

    /// Remove a node, every sequence touching it, and the data objects they own
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let touching = {
            let node = self.nodes.get(&id)?;
            node.incoming.iter().chain(node.outgoing.iter()).copied().collect::<Vec<_>>()
        };
        for sequence in touching {
            self.remove_sequence(sequence);
        }
        self.data_objects.retain(|_, d| d.owner != Some(Owner::Node(id)));
        self.nodes.remove(&id)
    }

    pub fn set_sequence_weight(&mut self, id: SequenceId, weight: f64) {
        if let Some(sequence) = self.sequences.get_mut(&id) {
            sequence.weight = Some(weight);
        }
    }

    pub fn set_task_duration(&mut self, task: NodeId, generator: SharedGenerator) {
        if let Some(node) = self.nodes.get_mut(&task) {
            node.timing.duration = Some(generator);
        }
    }

    pub fn set_task_time_after(&mut self, task: NodeId, generator: SharedGenerator) {
        if let Some(node) = self.nodes.get_mut(&task) {
            node.timing.time_after = Some(generator);
        }
    }

    pub fn add_data_object(
        &mut self,
        name: impl Into<String>,
        value: DataValue,
        owner: Option<Owner>,
        direction: Direction,
    ) -> DataObjectId {
        let id = DataObjectId(self.next_data_object_id);
        self.next_data_object_id += 1;
        self.data_objects.insert(id, DataObject { id, name: name.into(), value, owner, direction });
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    pub fn start_events(&self) -> impl Iterator<Item = &Node> {
        self.nodes_of(NodeKind::StartEvent)
    }

    pub fn end_events(&self) -> impl Iterator<Item = &Node> {
        self.nodes_of(NodeKind::EndEvent)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Node> {
        self.nodes_of(NodeKind::Task)
    }

    pub fn gateways(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.kind.is_gateway())
    }

    pub fn sequences(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.values()
    }

    pub fn data_objects(&self) -> impl Iterator<Item = &DataObject> {
        self.data_objects.values()
    }

    /// Data objects attached to the given owner with the given direction
    pub fn data_objects_of(&self, owner: Owner, direction: Direction) -> impl Iterator<Item = &DataObject> {
        self.data_objects
            .values()
            .filter(move |d| d.owner == Some(owner) && d.direction == direction)
    }

    /// Data objects without owner, which decorate whole traces
    pub fn process_data_objects(&self) -> impl Iterator<Item = &DataObject> {
        self.data_objects.values().filter(|d| d.owner.is_none())
    }

    /// The first sequence going from `source` to `sink`, if any
    pub fn sequence_between(&self, source: NodeId, sink: NodeId) -> Option<SequenceId> {
        self.nodes.get(&source)?
            .outgoing
            .iter()
            .copied()
            .find(|s| self.sequences.get(s).is_some_and(|s| s.sink == sink))
    }

    pub fn size(&self) -> ProcessSize {
        ProcessSize {
            tasks: self.tasks().count(),
            gateways: self.gateways().count(),
            sequences: self.sequences.len(),
            data_objects: self.data_objects.len(),
        }
    }

    /// A human readable reference to a node, e.g. `task "Activity B" (n4)`
    pub fn describe(&self, id: NodeId) -> String {
        match self.nodes.get(&id) {
            Some(node) => format!("{} \"{}\" ({})", node.kind, node.name, id),
            None => format!("unknown node ({})", id),
        }
    }

    /// Validate the structural invariants of the graph.
    /// The first violation found is reported, naming the offending node.
    pub fn check(&self) -> Result<(), StructuralError> {
        check::check(self)
    }
}

/// A one line summary of the process
impl Display for Process {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let size = self.size();
        write!(
            f,
            "Process \"{}\": {} start events, {} end events, {} tasks, {} gateways, {} sequences, {} data objects",
            self.name,
            self.start_events().count(),
            self.end_events().count(),
            size.tasks,
            size.gateways,
            size.sequences,
            size.data_objects,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_ids_are_per_process() {
        let mut a = Process::new("a");
        let mut b = Process::new("b");
        let first = a.add_start_event();
        a.add_task("Activity A");
        let other = b.add_start_event();
        assert_eq!(first, other);
        assert_eq!(format!("{}", a.add_end_event()), "n2");
    }

    #[test]
    fn test_add_sequence_rejects_invalid_endpoints() {
        let mut process = Process::new("p");
        let start = process.add_start_event();
        let task = process.add_task("Activity A");
        let end = process.add_end_event();
        assert!(process.add_sequence(start, task).is_ok());
        assert!(matches!(
            process.add_sequence(task, start),
            Err(StructuralError::InvalidSequence { .. })
        ));
        assert!(matches!(
            process.add_sequence(end, task),
            Err(StructuralError::InvalidSequence { .. })
        ));
        assert!(matches!(
            process.add_sequence(task, task),
            Err(StructuralError::InvalidSequence { .. })
        ));
        assert_eq!(
            process.add_sequence(task, NodeId(99)),
            Err(StructuralError::UnknownNode(NodeId(99)))
        );
    }

    #[test]
    fn test_remove_node_drops_sequences_and_data() {
        let mut process = Process::new("p");
        let start = process.add_start_event();
        let task = process.add_task("Activity A");
        let end = process.add_end_event();
        let s1 = process.add_sequence(start, task).unwrap();
        process.add_sequence(task, end).unwrap();
        process.add_data_object("amount", DataValue::Literal(Value::Integer(3)), Some(Owner::Node(task)), Direction::Generated);
        process.add_data_object("flag", DataValue::Literal(Value::from("x")), Some(Owner::Sequence(s1)), Direction::Generated);

        process.remove_node(task);
        assert_eq!(process.sequences().count(), 0);
        assert_eq!(process.data_objects().count(), 0);
        assert!(process.node(start).unwrap().outgoing().is_empty());
        assert!(process.node(end).unwrap().incoming().is_empty());
    }

    #[test]
    fn test_sequence_between() {
        let mut process = Process::new("p");
        let start = process.add_start_event();
        let end = process.add_end_event();
        let id = process.add_sequence(start, end).unwrap();
        assert_eq!(process.sequence_between(start, end), Some(id));
        assert_eq!(process.sequence_between(end, start), None);
    }

    #[test]
    fn test_describe() {
        let mut process = Process::new("p");
        process.add_start_event();
        let task = process.add_task("Activity B");
        assert_eq!(process.describe(task), "task \"Activity B\" (n1)");
    }
}
