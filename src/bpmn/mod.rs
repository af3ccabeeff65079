//! This module imports process graphs from BPMN 2.0 XML files.
//!
//! Only the control flow is read: start and end events, tasks of any flavour, exclusive
//! and parallel gateways, and the sequence flows between them. Diagram layout and any
//! other element are ignored.

mod parse;

use std::io::BufRead;

use tracing::debug;

use crate::error::Error;
use crate::process::{Importer, Process};

/// Reads the first `process` of a BPMN 2.0 definitions file
#[derive(Debug, Default, Clone, Copy)]
pub struct BpmnImporter;

impl BpmnImporter {
    pub fn parse_str(&self, xml: &str) -> Result<Process, Error> {
        let file: parse::BpmnXml = quick_xml::de::from_str(xml)?;
        file.into_process()
    }
}

impl Importer for BpmnImporter {
    fn import(&self, reader: &mut dyn BufRead) -> Result<Process, Error> {
        let file: parse::BpmnXml = quick_xml::de::from_reader(reader)?;
        let process = file.into_process()?;
        debug!(process = process.name(), size = ?process.size(), "BPMN imported");
        Ok(process)
    }
}
