use mentora_core::{EnhancedNode, FlowNode, Simulation};

use crate::rules::parse_rules;

/// Retrieves the opening run of nodes for simulation startup. Fails open:
/// a simulation without usable nodes yields an empty sequence rather than
/// an error.
pub struct NodeCollector;

impl NodeCollector {
    /// Legacy startup: nodes in order up to and including the first
    /// actionable one.
    pub fn initial_nodes(simulation: &Simulation) -> Vec<FlowNode> {
        let mut nodes: Vec<FlowNode> = simulation.legacy_nodes().to_vec();
        nodes.sort_by_key(|n| n.order_number);
        take_until_actionable(nodes, |n| n.is_actionable())
    }

    /// Modern startup: nodes marked ALWAYS_SHOW, in order, up to and
    /// including the first actionable one.
    pub fn initial_enhanced_nodes(simulation: &Simulation) -> Vec<EnhancedNode> {
        let mut nodes: Vec<EnhancedNode> = simulation
            .enhanced_nodes
            .iter()
            .filter(|n| parse_rules(&n.rules).iter().any(|r| r.is_always_show()))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.order_number.unwrap_or(n.message_id));
        take_until_actionable(nodes, |n| n.is_actionable())
    }
}

fn take_until_actionable<N>(nodes: Vec<N>, is_actionable: impl Fn(&N) -> bool) -> Vec<N> {
    let mut run = Vec::new();
    for node in nodes {
        let actionable = is_actionable(&node);
        run.push(node);
        if actionable {
            break;
        }
    }
    run
}
