use std::sync::Arc;

use mentora_core::Message;
use tracing::debug;

use super::cache::{FlowPatternCache, PatternKey};
use super::unifier::RuleUnifier;
use super::CandidateNode;
use crate::context::SimulationContext;

/// Determines the valid next nodes from the current position. An empty
/// result is a completion condition, not an error.
pub struct FlowResolver {
    unifier: RuleUnifier,
    cache: Arc<FlowPatternCache>,
}

impl FlowResolver {
    pub fn new(cache: Arc<FlowPatternCache>) -> Self {
        Self {
            unifier: RuleUnifier::new(),
            cache,
        }
    }

    pub fn unifier(&self) -> &RuleUnifier {
        &self.unifier
    }

    /// Candidates reachable from the last message's originating node
    /// (order 0 at simulation start), filtered through the rule unifier.
    pub fn resolve_next_nodes(
        &self,
        context: &mut SimulationContext,
        last_message: Option<&Message>,
    ) -> Vec<CandidateNode> {
        let predecessor = last_message.and_then(|m| m.node_order).unwrap_or(0);
        let candidates = self.candidate_nodes(context, predecessor);
        let total = candidates.len();

        let valid: Vec<CandidateNode> = candidates
            .into_iter()
            .filter(|node| self.unifier.evaluate_node(context, node))
            .collect();

        debug!(
            chat_id = %context.chat_id,
            predecessor,
            valid = valid.len(),
            total,
            "resolved next nodes"
        );
        valid
    }

    fn candidate_nodes(&self, context: &SimulationContext, predecessor: u64) -> Vec<CandidateNode> {
        let simulation = &context.simulation;
        let key = PatternKey {
            simulation_id: simulation.id,
            predecessor,
        };

        let mut candidates: Vec<CandidateNode> = match self.cache.get(key) {
            Some(orders) => {
                let mut nodes: Vec<_> = simulation
                    .legacy_nodes()
                    .iter()
                    .filter(|n| orders.contains(&n.order_number))
                    .cloned()
                    .collect();
                nodes.sort_by_key(|n| n.order_number);
                nodes.into_iter().map(CandidateNode::Legacy).collect()
            }
            None => {
                let mut nodes: Vec<_> = simulation
                    .legacy_nodes()
                    .iter()
                    .filter(|n| n.previous_order_number == predecessor)
                    .cloned()
                    .collect();
                nodes.sort_by_key(|n| n.order_number);
                if self.cache.should_cache(key) {
                    self.cache
                        .put(key, nodes.iter().map(|n| n.order_number).collect());
                }
                nodes.into_iter().map(CandidateNode::Legacy).collect()
            }
        };

        let mut enhanced: Vec<_> = simulation
            .enhanced_nodes
            .iter()
            .filter(|n| {
                if predecessor == 0 {
                    n.previous_message_ids.is_empty()
                } else {
                    n.previous_message_ids.contains(&predecessor)
                }
            })
            .cloned()
            .collect();
        enhanced.sort_by_key(|n| n.order_number.unwrap_or(n.message_id));
        candidates.extend(enhanced.into_iter().map(CandidateNode::Enhanced));

        candidates
    }
}
