//! This module provides serialization for Petri nets in PNML format.

use std::fmt::{Display, Formatter};
use std::io::Write;

use serde::{Deserialize, Serialize};

use super::PetriNet;
use crate::error::Error;
use crate::process::{Exporter, Process};

const PNML_NAMESPACE: &str = "http://www.pnml.org/version-2009/grammar/pnmlcoremodel";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Serialize, Deserialize)]
struct Name {
    #[serde(rename = "text")]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InitialMarking {
    #[serde(rename = "text")]
    amount: usize,
}

/// Marks silent transitions the way ProM reads them
#[derive(Debug, Serialize, Deserialize)]
struct ToolSpecific {
    #[serde(rename = "@tool")]
    tool: String,
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "@activity")]
    activity: String,
}

impl ToolSpecific {
    fn invisible() -> Self {
        ToolSpecific { tool: "ProM".into(), version: "6.4".into(), activity: "$invisible$".into() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Place {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "name")]
    name: Name,
    #[serde(rename = "initialMarking", default, skip_serializing_if = "Option::is_none")]
    initial_marking: Option<InitialMarking>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Transition {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "name")]
    name: Name,
    #[serde(rename = "toolspecific", default, skip_serializing_if = "Option::is_none")]
    tool_specific: Option<ToolSpecific>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Arc {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@source")]
    source: String,
    #[serde(rename = "@target")]
    target: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PnmlElement {
    Place(Place),
    Transition(Transition),
    Arc(Arc),
}

#[derive(Debug, Serialize, Deserialize)]
struct Net {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    r#type: String,
    #[serde(rename = "$value")]
    elements: Vec<PnmlElement>,
}

/// Internal representation of a PNML file.
/// This is the format that a Petri net is serialized to.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "pnml")]
pub struct Pnml {
    #[serde(rename = "net")]
    net: Net,
}

impl Pnml {
    /// Number of places, transitions and arcs
    pub fn counts(&self) -> (usize, usize, usize) {
        self.net.elements.iter().fold((0, 0, 0), |(p, t, a), element| match element {
            PnmlElement::Place(_) => (p + 1, t, a),
            PnmlElement::Transition(_) => (p, t + 1, a),
            PnmlElement::Arc(_) => (p, t, a + 1),
        })
    }
}

/// Display a Pnml file as XML
impl Display for Pnml {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut ser = quick_xml::se::Serializer::new(f);
        ser.indent(' ', 2);
        self.serialize(ser).map_err(|_| std::fmt::Error)
    }
}

/// Convert a Petri net to a PNML file
impl From<&PetriNet> for Pnml {
    fn from(net: &PetriNet) -> Self {
        let mut elements = Vec::with_capacity(net.places.len() + net.transitions.len() + net.arcs.len());
        for place in &net.places {
            let tokens = net.initial_marking.get(&place.id);
            elements.push(PnmlElement::Place(Place {
                id: place.id.to_string(),
                name: Name { text: place.name.clone() },
                initial_marking: (tokens > 0).then_some(InitialMarking { amount: tokens }),
            }));
        }
        for transition in &net.transitions {
            elements.push(PnmlElement::Transition(Transition {
                id: transition.id.to_string(),
                name: Name { text: transition.name.clone() },
                tool_specific: transition.silent.then(ToolSpecific::invisible),
            }));
        }
        for arc in &net.arcs {
            let (source, target) = match arc {
                super::Arc::PlaceTransition(source, target) => (source.to_string(), target.to_string()),
                super::Arc::TransitionPlace(source, target) => (source.to_string(), target.to_string()),
            };
            let id = format!("a_{}_{}", source, target);
            elements.push(PnmlElement::Arc(Arc { id, source, target }));
        }
        Pnml {
            net: Net {
                id: net.id.clone(),
                r#type: PNML_NAMESPACE.to_string(),
                elements,
            },
        }
    }
}

/// Exports a process as the PNML document of its Petri net
#[derive(Debug, Default, Clone, Copy)]
pub struct PnmlExporter;

impl Exporter for PnmlExporter {
    fn extension(&self) -> &'static str {
        "pnml"
    }

    fn export(&self, process: &Process, writer: &mut dyn Write) -> Result<(), Error> {
        let net = PetriNet::from(process);
        let pnml = Pnml::from(&net);
        writeln!(writer, "{}", XML_DECLARATION)?;
        writeln!(writer, "{}", pnml)?;
        writer.flush()?;
        Ok(())
    }
}
