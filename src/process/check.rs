//! Structural validation of a process graph.

use std::collections::{HashSet, VecDeque};

use super::{NodeId, NodeKind, Process};
use crate::error::StructuralError;

pub(super) fn check(process: &Process) -> Result<(), StructuralError> {
    if process.start_events().next().is_none() {
        return Err(StructuralError::NoStartEvent);
    }
    if process.end_events().next().is_none() {
        return Err(StructuralError::NoEndEvent);
    }

    for sequence in process.sequences() {
        if process.node(sequence.source).is_none() || process.node(sequence.sink).is_none() {
            return Err(StructuralError::DanglingSequence { sequence: sequence.id.to_string() });
        }
    }

    for node in process.nodes() {
        let name = || process.describe(node.id);
        if node.incoming.is_empty() && node.outgoing.is_empty() {
            return Err(StructuralError::Isolated { node: name() });
        }
        match node.kind {
            NodeKind::StartEvent => {
                if !node.incoming.is_empty() {
                    return Err(StructuralError::IncomingIntoStart { node: name() });
                }
                if node.outgoing.len() != 1 {
                    return Err(StructuralError::SingleOutgoing { node: name(), count: node.outgoing.len() });
                }
            }
            NodeKind::EndEvent => {
                if !node.outgoing.is_empty() {
                    return Err(StructuralError::OutgoingFromEnd { node: name() });
                }
                if node.incoming.is_empty() {
                    return Err(StructuralError::NoIncoming { node: name() });
                }
            }
            NodeKind::Task => {
                if node.incoming.is_empty() {
                    return Err(StructuralError::NoIncoming { node: name() });
                }
                if node.outgoing.len() != 1 {
                    return Err(StructuralError::SingleOutgoing { node: name(), count: node.outgoing.len() });
                }
            }
            NodeKind::AndGateway | NodeKind::XorGateway => {
                if node.incoming.is_empty() {
                    return Err(StructuralError::NoIncoming { node: name() });
                }
                if node.outgoing.is_empty() {
                    return Err(StructuralError::NoOutgoing { node: name() });
                }
            }
        }
    }

    let forward = reachable(process, process.start_events().map(|n| n.id), Walk::Forward);
    if let Some(node) = process.nodes().find(|n| !forward.contains(&n.id)) {
        return Err(StructuralError::Unreachable { node: process.describe(node.id) });
    }

    let backward = reachable(process, process.end_events().map(|n| n.id), Walk::Backward);
    if let Some(node) = process.nodes().find(|n| !backward.contains(&n.id)) {
        return Err(StructuralError::CannotReachEnd { node: process.describe(node.id) });
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum Walk {
    Forward,
    Backward,
}

/// Breadth first search along (or against) the sequence direction
fn reachable(process: &Process, roots: impl Iterator<Item = NodeId>, walk: Walk) -> HashSet<NodeId, ahash::RandomState> {
    let mut seen = HashSet::default();
    let mut queue = roots.collect::<VecDeque<_>>();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(node) = process.node(id) else { continue };
        let edges = match walk {
            Walk::Forward => &node.outgoing,
            Walk::Backward => &node.incoming,
        };
        for sequence in edges.iter().filter_map(|s| process.sequence(*s)) {
            let next = match walk {
                Walk::Forward => sequence.sink,
                Walk::Backward => sequence.source,
            };
            if !seen.contains(&next) {
                queue.push_back(next);
            }
        }
    }
    seen
}
