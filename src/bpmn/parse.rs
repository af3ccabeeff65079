//! This module is responsible for parsing BPMN 2.0 XML files into a process graph.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::Error;
use crate::process::{NodeId, NodeKind, Process};

/// We just need the ID and name of each element
/// This macro generates structs with these fields
macro_rules! def_bpmn_struct {
    ($($name:ident),*) => {$(
        #[derive(Debug, Deserialize)]
        struct $name {
            #[serde(rename = "@id")]
            id: String,
            #[serde(rename = "@name", default)]
            name: Option<String>,
        }
    )*};
}

def_bpmn_struct!(
    StartEvent,
    EndEvent,
    Task,
    SendTask,
    ReceiveTask,
    UserTask,
    ServiceTask,
    ManualTask,
    BusinessRuleTask,
    ScriptTask,
    ExclusiveGateway,
    ParallelGateway
);

/// A sequence flow connects a source element to a target element
#[derive(Debug, Deserialize)]
struct SequenceFlow {
    #[serde(rename = "@sourceRef")]
    source_id: String,
    #[serde(rename = "@targetRef")]
    target_id: String,
}

/// A BPMN process consists of a unique ID and a list of start events, end events,
/// tasks, gateways, and sequence flows
#[derive(Debug, Deserialize)]
struct BpmnProcess {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "startEvent", default)]
    start_events: Vec<StartEvent>,
    #[serde(rename = "endEvent", default)]
    end_events: Vec<EndEvent>,
    #[serde(rename = "task", default)]
    tasks: Vec<Task>,
    #[serde(rename = "sendTask", default)]
    send_tasks: Vec<SendTask>,
    #[serde(rename = "receiveTask", default)]
    receive_tasks: Vec<ReceiveTask>,
    #[serde(rename = "userTask", default)]
    user_tasks: Vec<UserTask>,
    #[serde(rename = "serviceTask", default)]
    service_tasks: Vec<ServiceTask>,
    #[serde(rename = "manualTask", default)]
    manual_tasks: Vec<ManualTask>,
    #[serde(rename = "businessRuleTask", default)]
    business_rule_tasks: Vec<BusinessRuleTask>,
    #[serde(rename = "scriptTask", default)]
    script_tasks: Vec<ScriptTask>,
    #[serde(rename = "exclusiveGateway", default)]
    exclusive_gateways: Vec<ExclusiveGateway>,
    #[serde(rename = "parallelGateway", default)]
    parallel_gateways: Vec<ParallelGateway>,
    #[serde(rename = "sequenceFlow", default)]
    sequence_flows: Vec<SequenceFlow>,
}

/// The root element of a BPMN 2.0 XML file.
/// This is the type we deserialize the XML file into, and then convert into a process graph.
#[derive(Debug, Deserialize)]
pub(super) struct BpmnXml {
    #[serde(rename = "process")]
    process: BpmnProcess,
}

impl BpmnXml {
    /// Build the process graph. Unnamed elements are named after their ID.
    pub(super) fn into_process(self) -> Result<Process, Error> {
        let file = self.process;
        let mut process = Process::new(file.name.unwrap_or(file.id));
        let mut ids: HashMap<String, NodeId, ahash::RandomState> = HashMap::default();

        macro_rules! insert {
            ($iter:expr, $kind:expr) => {
                for element in $iter {
                    let name = element.name.unwrap_or_else(|| element.id.clone());
                    ids.insert(element.id, process.add_named($kind, name));
                }
            };
        }

        insert!(file.start_events, NodeKind::StartEvent);
        insert!(file.end_events, NodeKind::EndEvent);
        insert!(file.tasks, NodeKind::Task);
        insert!(file.send_tasks, NodeKind::Task);
        insert!(file.receive_tasks, NodeKind::Task);
        insert!(file.user_tasks, NodeKind::Task);
        insert!(file.service_tasks, NodeKind::Task);
        insert!(file.manual_tasks, NodeKind::Task);
        insert!(file.business_rule_tasks, NodeKind::Task);
        insert!(file.script_tasks, NodeKind::Task);
        insert!(file.exclusive_gateways, NodeKind::XorGateway);
        insert!(file.parallel_gateways, NodeKind::AndGateway);

        for flow in file.sequence_flows {
            let source = *ids.get(&flow.source_id).ok_or(Error::UnknownReference(flow.source_id))?;
            let sink = *ids.get(&flow.target_id).ok_or(Error::UnknownReference(flow.target_id))?;
            process.add_sequence(source, sink)?;
        }
        Ok(process)
    }
}
