//! This module defines the data structures for Petri nets
//! and provides a conversion from process graphs to Petri nets.
//!
//! The following paper is used as a reference and inspiration for the implementation:
//! [T. Murata. Petri nets: Properties, Analysis and Applications. Proceedings of the IEEE, 77(4):541–580, 1989.](http://www2.ing.unipi.it/~a009435/issw/extra/murata.pdf)

mod pnml;

pub use pnml::{Pnml, PnmlExporter};

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::process::{NodeId, NodeKind, Process};

/// An ID for a place in the Petri net
/// This is a newtype around `usize` to ensure that we can't accidentally mix up place and transition IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaceId(usize);

/// An ID for a transition in the Petri net
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionId(usize);

/// PlaceIDs are displayed as P followed by the ID, e.g. P0, P1, P2, ...
impl Display for PlaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "P{}", self.0)
    }
}

/// TransitionIDs are displayed as T followed by the ID, e.g. T0, T1, T2, ...
impl Display for TransitionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "T{}", self.0)
    }
}

/// A place has a unique ID and a name.
/// Buffer places inserted between two transitions have no originating node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    id: PlaceId,
    name: String,
    node: Option<NodeId>,
}

impl Place {
    pub fn id(&self) -> PlaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }
}

/// A transition has a unique ID and a name.
/// Silent transitions (τ) do not correspond to an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    id: TransitionId,
    name: String,
    silent: bool,
    node: Option<NodeId>,
}

impl Transition {
    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }
}

/// An arc connects a place to a transition or a transition to a place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arc {
    PlaceTransition(PlaceId, TransitionId), // Inputs to transitions
    TransitionPlace(TransitionId, PlaceId), // Outputs from transitions
}

/// Number of tokens on each place. Places without an entry hold no tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Marking(BTreeMap<PlaceId, usize>);

impl Marking {
    pub fn get(&self, place: &PlaceId) -> usize {
        self.0.get(place).copied().unwrap_or(0)
    }

    pub fn set(&mut self, place: PlaceId, tokens: usize) {
        if tokens == 0 {
            self.0.remove(&place);
        } else {
            self.0.insert(place, tokens);
        }
    }

    /// Total number of tokens
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, usize)> + '_ {
        self.0.iter().map(|(place, tokens)| (*place, *tokens))
    }
}

/// A Petri net is a tuple P = (P, T, F, M_0) where
///     P is a set of places,
///     T is a set of transitions,
///     F is a set of arcs,
///     M_0 is the initial marking.
/// All capacities are unbounded and all arc weights are 1.
#[derive(Debug, Clone, Default)]
pub struct PetriNet {
    pub id: String,
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    pub arcs: Vec<Arc>,
    pub initial_marking: Marking,
}

impl PetriNet {
    pub fn place(&self, id: PlaceId) -> Option<&Place> {
        self.places.get(id.0).filter(|p| p.id == id)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(id.0).filter(|t| t.id == id)
    }

    /// The place a start event, end event or XOR gateway was converted to
    pub fn place_of(&self, node: NodeId) -> Option<&Place> {
        self.places.iter().find(|p| p.node == Some(node))
    }

    /// The transition a task or AND gateway was converted to
    pub fn transition_of(&self, node: NodeId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.node == Some(node))
    }

    /// Input places of a transition
    pub fn preset(&self, transition: TransitionId) -> impl Iterator<Item = PlaceId> + '_ {
        self.arcs.iter().filter_map(move |arc| match arc {
            Arc::PlaceTransition(place, t) if *t == transition => Some(*place),
            _ => None,
        })
    }

    /// Output places of a transition
    pub fn postset(&self, transition: TransitionId) -> impl Iterator<Item = PlaceId> + '_ {
        self.arcs.iter().filter_map(move |arc| match arc {
            Arc::TransitionPlace(t, place) if *t == transition => Some(*place),
            _ => None,
        })
    }

    /// Fire a transition, returning the resulting marking if it was enabled
    pub fn fire(&self, from: &Marking, transition: TransitionId) -> Option<Marking> {
        let mut marking = from.clone();
        // Start by checking that all the input places have sufficient tokens to fire the transition
        for source in self.preset(transition) {
            let tokens = marking.get(&source).checked_sub(1)?;
            marking.set(source, tokens);
        }
        for target in self.postset(transition) {
            marking.set(target, marking.get(&target) + 1);
        }
        Some(marking)
    }

    /// Transitions that can fire in the given marking
    pub fn enabled(&self, marking: &Marking) -> Vec<TransitionId> {
        self.transitions
            .iter()
            .map(|t| t.id)
            .filter(|t| self.fire(marking, *t).is_some())
            .collect()
    }
}

impl Display for PetriNet {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Petri net {} with {} places, {} transitions and {} arcs",
            self.id,
            self.places.len(),
            self.transitions.len(),
            self.arcs.len()
        )
    }
}

impl From<&Process> for PetriNet {
    fn from(process: &Process) -> Self {
        /// A Petri net element can be either a place or a transition
        #[derive(Debug, Clone, Copy)]
        enum Element {
            Place(PlaceId),
            Transition(TransitionId),
        }

        /// In order to produce unique IDs for places and transitions, we use a factory
        /// This factory keeps track of the next available ID for each type of element
        #[derive(Debug, Default)]
        struct ElementFactory {
            places: Vec<Place>,
            transitions: Vec<Transition>,
        }

        impl ElementFactory {
            fn new_place(&mut self, name: String, node: Option<NodeId>) -> PlaceId {
                let id = PlaceId(self.places.len());
                self.places.push(Place { id, name, node });
                id
            }

            fn new_transition(&mut self, name: String, silent: bool, node: Option<NodeId>) -> TransitionId {
                let id = TransitionId(self.transitions.len());
                self.transitions.push(Transition { id, name, silent, node });
                id
            }
        }

        let mut factory = ElementFactory::default();
        let mut initial_marking = Marking::default();

        // Create petri net elements for each node so we can refer to them later
        let mut elements = HashMap::with_capacity_and_hasher(process.nodes().count(), ahash::RandomState::new());
        for node in process.nodes() {
            let name = node.name().to_string();
            let element = match node.kind() {
                // Start events become places with an initial marking of 1
                NodeKind::StartEvent => {
                    let place = factory.new_place(name, Some(node.id()));
                    initial_marking.set(place, 1);
                    Element::Place(place)
                }
                // End events and XOR gateways become places
                NodeKind::EndEvent | NodeKind::XorGateway => Element::Place(factory.new_place(name, Some(node.id()))),
                NodeKind::Task => Element::Transition(factory.new_transition(name, false, Some(node.id()))),
                // AND gateways only synchronise, they become silent transitions
                NodeKind::AndGateway => Element::Transition(factory.new_transition(name, true, Some(node.id()))),
            };
            elements.insert(node.id(), element);
        }

        let mut arcs = Vec::with_capacity(process.sequences().count() * 2);
        for sequence in process.sequences() {
            let (Some(source), Some(sink)) = (elements.get(&sequence.source()), elements.get(&sequence.sink())) else {
                continue;
            };
            match (*source, *sink) {
                (Element::Place(source), Element::Transition(target)) => {
                    arcs.push(Arc::PlaceTransition(source, target));
                }
                (Element::Transition(source), Element::Place(target)) => {
                    arcs.push(Arc::TransitionPlace(source, target));
                }
                (Element::Place(source), Element::Place(target)) => {
                    // Create a silent transition to connect via
                    let tau = factory.new_transition(String::new(), true, None);
                    arcs.push(Arc::PlaceTransition(source, tau));
                    arcs.push(Arc::TransitionPlace(tau, target));
                }
                (Element::Transition(source), Element::Transition(target)) => {
                    // Every sequence gets its own buffer place, so an AND join still waits
                    // for each of its branches
                    let buffer = factory.new_place(String::new(), None);
                    arcs.push(Arc::TransitionPlace(source, buffer));
                    arcs.push(Arc::PlaceTransition(buffer, target));
                }
            }
        }

        PetriNet {
            id: process.name().to_string(),
            places: factory.places,
            transitions: factory.transitions,
            arcs,
            initial_marking,
        }
    }
}
