//! Simulation format classification.

use std::fmt;
use std::sync::LazyLock;

use mentora_core::{FlowNode, Simulation, SimulationKind};
use regex::Regex;
use tracing::debug;

/// Execution format a simulation is classified into at evaluation time.
/// Exactly one applies per classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationType {
    Legacy,
    Modern,
    Hybrid,
    AiGenerated,
    Unknown,
}

impl SimulationType {
    pub fn description(self) -> &'static str {
        match self {
            SimulationType::Legacy => "Legacy show_predicate simulation",
            SimulationType::Modern => "Modern rule-based simulation",
            SimulationType::Hybrid => "Hybrid simulation with both legacy and modern elements",
            SimulationType::AiGenerated => "AI-generated simulation with real-time content",
            SimulationType::Unknown => "Unknown or invalid simulation format",
        }
    }
}

impl fmt::Display for SimulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationType::Legacy => "LEGACY",
            SimulationType::Modern => "MODERN",
            SimulationType::Hybrid => "HYBRID",
            SimulationType::AiGenerated => "AI_GENERATED",
            SimulationType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

static COMPLEX_PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"saveChatValue|readChatValue|whereId|message\.|anyCorrect|selected")
        .expect("static pattern compiles")
});

static SIMPLE_PREDICATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(true|false|1|0)\s*$").expect("static pattern compiles"));

#[derive(Debug, Default)]
struct DetectionMetrics {
    legacy_indicators: u32,
    modern_indicators: u32,
}

/// Classifies a simulation by its structure. Never fails: anything
/// unclassifiable degrades to [`SimulationType::Unknown`] and the legacy
/// default absorbs graphs that could not be loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationTypeDetector;

impl SimulationTypeDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, simulation: &Simulation) -> SimulationType {
        // Explicit authoring flag wins over structure.
        if simulation.kind == SimulationKind::AiGenerated {
            debug!(simulation = %simulation.name, "explicitly AI-generated");
            return SimulationType::AiGenerated;
        }

        let Some(nodes) = &simulation.nodes else {
            // Graph present but unloadable: legacy for backward
            // compatibility, never an error.
            debug!(simulation = %simulation.name, "nodes unavailable, assuming legacy");
            return SimulationType::Legacy;
        };

        if nodes.is_empty() && !simulation.has_modern_nodes() {
            return SimulationType::Unknown;
        }

        let mut metrics = DetectionMetrics::default();
        for node in nodes {
            analyze_node(node, &mut metrics);
        }
        metrics.modern_indicators += simulation
            .enhanced_nodes
            .iter()
            .filter(|n| !n.rules.is_null())
            .count() as u32
            * 3;

        let detected = match (metrics.legacy_indicators, metrics.modern_indicators) {
            (l, 0) if l > 0 => SimulationType::Legacy,
            (0, m) if m > 0 => SimulationType::Modern,
            (l, m) if l > 0 && m > 0 => SimulationType::Hybrid,
            // Nodes without clear markers: legacy is the safe default.
            _ if !nodes.is_empty() => SimulationType::Legacy,
            _ => SimulationType::Unknown,
        };

        debug!(
            simulation = %simulation.name,
            legacy = metrics.legacy_indicators,
            modern = metrics.modern_indicators,
            %detected,
            "simulation classified"
        );
        detected
    }
}

fn analyze_node(node: &FlowNode, metrics: &mut DetectionMetrics) {
    let predicate = node.show_predicate.trim();
    if !predicate.is_empty() {
        if COMPLEX_PREDICATE.is_match(predicate) {
            metrics.legacy_indicators += 3;
        } else if SIMPLE_PREDICATE.is_match(predicate) {
            metrics.legacy_indicators += 1;
        } else {
            metrics.legacy_indicators += 2;
        }
    }

    // Order-number chaining is itself a legacy marker.
    metrics.legacy_indicators += 1;
}

#[cfg(test)]
mod tests {
    use mentora_core::{EnhancedNode, MessageType, NodeContent};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn node(order: u64, predicate: &str) -> FlowNode {
        FlowNode {
            order_number: order,
            previous_order_number: order.saturating_sub(1),
            message_type: MessageType::Text,
            name: None,
            show_predicate: predicate.to_string(),
            character: None,
            content: NodeContent::Text { text: "t".into() },
        }
    }

    fn enhanced(id: u64, rules: serde_json::Value) -> EnhancedNode {
        EnhancedNode {
            message_id: id,
            previous_message_ids: vec![],
            message_type: MessageType::Text,
            interaction_type: None,
            text: None,
            options: vec![],
            correct_positions: vec![],
            character: None,
            response_time_limit_ms: None,
            show_predicate: None,
            rules,
            order_number: None,
        }
    }

    fn simulation(
        kind: SimulationKind,
        nodes: Option<Vec<FlowNode>>,
        enhanced_nodes: Vec<EnhancedNode>,
    ) -> Simulation {
        Simulation {
            id: Uuid::now_v7(),
            name: "Classification".into(),
            kind,
            nodes,
            enhanced_nodes,
            skill_id: None,
        }
    }

    #[test]
    fn explicit_flag_wins() {
        let detector = SimulationTypeDetector::new();
        let sim = simulation(
            SimulationKind::AiGenerated,
            Some(vec![node(1, "message whereId \"1\"")]),
            vec![],
        );
        assert_eq!(detector.detect(&sim), SimulationType::AiGenerated);
    }

    #[test]
    fn unloadable_nodes_default_to_legacy() {
        let detector = SimulationTypeDetector::new();
        let sim = simulation(SimulationKind::Predefined, None, vec![]);
        assert_eq!(detector.detect(&sim), SimulationType::Legacy);
    }

    #[test]
    fn empty_simulation_is_unknown() {
        let detector = SimulationTypeDetector::new();
        let sim = simulation(SimulationKind::Predefined, Some(vec![]), vec![]);
        assert_eq!(detector.detect(&sim), SimulationType::Unknown);
    }

    #[test]
    fn predicate_graphs_are_legacy() {
        let detector = SimulationTypeDetector::new();
        let sim = simulation(
            SimulationKind::Predefined,
            Some(vec![node(1, ""), node(2, "readChatValue[\"x\"] > 1")]),
            vec![],
        );
        assert_eq!(detector.detect(&sim), SimulationType::Legacy);
    }

    #[test]
    fn rule_bearing_nodes_are_modern() {
        let detector = SimulationTypeDetector::new();
        let sim = simulation(
            SimulationKind::Predefined,
            Some(vec![]),
            vec![enhanced(1, json!([{ "kind": "always_show" }]))],
        );
        assert_eq!(detector.detect(&sim), SimulationType::Modern);
    }

    #[test]
    fn mixed_structures_are_hybrid() {
        let detector = SimulationTypeDetector::new();
        let sim = simulation(
            SimulationKind::Predefined,
            Some(vec![node(1, "true")]),
            vec![enhanced(5, json!([{ "kind": "always_show" }]))],
        );
        assert_eq!(detector.detect(&sim), SimulationType::Hybrid);
    }
}
