use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::{EnhancedNode, FlowNode};

/// Authored kind of a simulation. `AiGenerated` simulations have no
/// predefined graph; everything else is classified at runtime from the node
/// structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    Predefined,
    AiGenerated,
}

/// Execution mode derived while building a context. Orthogonal to the
/// runtime's engine selection: modes describe content provenance, engines
/// describe processing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    Predefined,
    Dynamic,
    Hybrid,
    AiAssisted,
}

/// Simulation aggregate. `nodes == None` means the legacy graph exists but
/// could not be loaded by the read path; consumers must treat that as "has
/// legacy nodes" for backward compatibility rather than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub id: Uuid,
    pub name: String,
    pub kind: SimulationKind,
    pub nodes: Option<Vec<FlowNode>>,
    #[serde(default)]
    pub enhanced_nodes: Vec<EnhancedNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<Uuid>,
}

impl Simulation {
    pub fn has_legacy_nodes(&self) -> bool {
        match &self.nodes {
            Some(nodes) => !nodes.is_empty(),
            // Unloadable graph: assume legacy content is present.
            None => true,
        }
    }

    pub fn has_modern_nodes(&self) -> bool {
        !self.enhanced_nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.as_ref().map(Vec::len).unwrap_or(0) + self.enhanced_nodes.len()
    }

    pub fn legacy_nodes(&self) -> &[FlowNode] {
        self.nodes.as_deref().unwrap_or(&[])
    }
}
