//! Data objects attached to nodes, sequences or whole processes.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::ValueError;
use crate::process::{NodeId, SequenceId};
use crate::value::{SharedGenerator, Value};

/// An ID for a data object of the process graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataObjectId(pub(crate) usize);

/// DataObjectIds are displayed as d followed by the ID, e.g. d0, d1, d2, ...
impl Display for DataObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "d{}", self.0)
    }
}

/// The element a data object belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Node(NodeId),
    Sequence(SequenceId),
}

/// Whether the owner produces the data or needs it as input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Generated,
    Required,
}

/// Where the value of a data object comes from
#[derive(Debug, Clone)]
pub enum DataValue {
    Literal(Value),
    Generated(SharedGenerator),
}

impl DataValue {
    pub fn evaluate(&self, case_id: &str) -> Result<Option<Value>, ValueError> {
        match self {
            DataValue::Literal(value) => Ok(Some(value.clone())),
            DataValue::Generated(generator) => generator.evaluate(case_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataObject {
    pub(crate) id: DataObjectId,
    pub(crate) name: String,
    pub(crate) value: DataValue,
    pub(crate) owner: Option<Owner>,
    pub(crate) direction: Direction,
}

impl DataObject {
    pub fn id(&self) -> DataObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DataValue {
        &self.value
    }

    pub fn owner(&self) -> Option<Owner> {
        self.owner
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}
