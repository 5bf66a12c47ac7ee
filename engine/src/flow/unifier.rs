use mentora_core::{EnhancedNode, FlowNode, Message, MessagePayload};
use tracing::{debug, warn};

use super::CandidateNode;
use crate::context::SimulationContext;
use crate::interpreter::{self, PredicateHost, PredicateMessage, PredicateOption};
use crate::rules::{RuleEngine, parse_rules};

/// Single entry point for node visibility, bridging the legacy predicate
/// system and the structured rule system behind one contract.
pub struct RuleUnifier {
    rule_engine: RuleEngine,
}

impl Default for RuleUnifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleUnifier {
    pub fn new() -> Self {
        Self {
            rule_engine: RuleEngine::new(),
        }
    }

    pub fn rule_engine(&self) -> &RuleEngine {
        &self.rule_engine
    }

    /// Should this candidate be shown? Evaluation failures fail safe to
    /// false (hide) and are logged, never propagated.
    pub fn evaluate_node(&self, context: &mut SimulationContext, node: &CandidateNode) -> bool {
        match node {
            CandidateNode::Legacy(node) => self.evaluate_legacy(context, node),
            CandidateNode::Enhanced(node) => self.evaluate_enhanced(context, node),
        }
    }

    fn evaluate_legacy(&self, context: &mut SimulationContext, node: &FlowNode) -> bool {
        self.evaluate_predicate(context, &node.show_predicate, node.order_number)
    }

    fn evaluate_enhanced(&self, context: &mut SimulationContext, node: &EnhancedNode) -> bool {
        // Migrated nodes with stateful predicates still go through the
        // interpreter; everything else uses the structured rules.
        if node.has_complex_predicate() {
            let predicate = node.show_predicate.as_deref().unwrap_or_default();
            return self.evaluate_predicate(context, predicate, node.message_id);
        }

        let rules = parse_rules(&node.rules);
        let result = self.rule_engine.evaluate_all(&rules, context);
        debug!(node = node.message_id, rules = rules.len(), result, "rule evaluation");
        result
    }

    fn evaluate_predicate(
        &self,
        context: &mut SimulationContext,
        predicate: &str,
        node_key: u64,
    ) -> bool {
        if predicate.trim().is_empty() {
            return true;
        }
        let mut host = ContextPredicateHost { context };
        match interpreter::run_predicate(predicate, &mut host) {
            Ok(result) => {
                debug!(node = node_key, predicate, result, "predicate evaluated");
                result
            }
            Err(err) => {
                warn!(node = node_key, predicate, %err, "predicate failed, hiding node");
                false
            }
        }
    }
}

/// Binds the interpreter's primitives to the chat's execution state:
/// message lookup by originating node order, and the hyperparameter table
/// behind `readChatValue`/`saveChatValue`.
struct ContextPredicateHost<'a> {
    context: &'a mut SimulationContext,
}

impl PredicateHost for ContextPredicateHost<'_> {
    fn message_by_order(&self, order: u64) -> Option<PredicateMessage> {
        self.context
            .message_history
            .iter()
            .filter(|m| m.node_order == Some(order) && m.interacted)
            .next_back()
            .map(predicate_view)
    }

    fn read_chat_value(&mut self, key: &str) -> f64 {
        self.context.hyper_parameter(key)
    }

    fn save_chat_value(&mut self, key: &str, value: f64) {
        self.context.set_hyper_parameter(key, value);
    }
}

fn predicate_view(message: &Message) -> PredicateMessage {
    let node_order = message.node_order.unwrap_or_default();
    let options = match &message.payload {
        MessagePayload::SingleChoiceQuestion { options, correct, answer }
        | MessagePayload::SingleChoiceTask { options, correct, answer } => (1..=options.len())
            .map(|position| PredicateOption {
                selected: *answer == Some(position),
                correct: *correct == Some(position),
            })
            .collect(),
        MessagePayload::MultiChoiceTask { options, correct, answer } => {
            let selected = answer.clone().unwrap_or_default();
            (1..=options.len())
                .map(|position| PredicateOption {
                    selected: selected.contains(&position),
                    correct: correct.contains(&position),
                })
                .collect()
        }
        _ => Vec::new(),
    };
    PredicateMessage { node_order, options }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mentora_core::{
        Chat, ChatRole, MessageType, NodeContent, Simulation, SimulationKind, User,
    };
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn context_with_answer(answer: Vec<usize>) -> SimulationContext {
        let chat = Chat {
            id: Uuid::now_v7(),
            user: User {
                id: Uuid::now_v7(),
                name: "Kai".into(),
                organization: None,
            },
            simulation: Simulation {
                id: Uuid::now_v7(),
                name: "Listening".into(),
                kind: SimulationKind::Predefined,
                nodes: Some(vec![]),
                enhanced_nodes: vec![],
                skill_id: None,
            },
            skill: None,
            hearts: 5.0,
            finished: false,
            messages: vec![],
        };
        let mut context = SimulationContext::from_chat(&chat);
        context.add_message(Message {
            id: Uuid::now_v7(),
            chat_id: context.chat_id,
            timestamp: Utc::now(),
            previous_message_id: None,
            node_order: Some(3),
            role: ChatRole::User,
            character: None,
            interacted: true,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload: MessagePayload::MultiChoiceTask {
                options: vec!["g".into(), "h".into(), "k".into()],
                correct: vec![1, 2],
                answer: Some(answer),
            },
        });
        context
    }

    fn legacy_node(predicate: &str) -> CandidateNode {
        CandidateNode::Legacy(FlowNode {
            order_number: 9,
            previous_order_number: 3,
            message_type: MessageType::Text,
            name: None,
            show_predicate: predicate.to_string(),
            character: None,
            content: NodeContent::Text { text: "t".into() },
        })
    }

    fn enhanced_node(rules: serde_json::Value, predicate: Option<&str>) -> CandidateNode {
        CandidateNode::Enhanced(EnhancedNode {
            message_id: 9,
            previous_message_ids: vec![3],
            message_type: MessageType::Text,
            interaction_type: None,
            text: Some("t".into()),
            options: vec![],
            correct_positions: vec![],
            character: None,
            response_time_limit_ms: None,
            show_predicate: predicate.map(str::to_string),
            rules,
            order_number: None,
        })
    }

    #[test]
    fn blank_predicate_always_shows() {
        let unifier = RuleUnifier::new();
        let mut context = context_with_answer(vec![1, 2]);
        assert!(unifier.evaluate_node(&mut context, &legacy_node("")));
        assert!(unifier.evaluate_node(&mut context, &legacy_node("   ")));
    }

    #[test]
    fn predicate_reads_recorded_answers() {
        let unifier = RuleUnifier::new();
        let predicate = "message whereId \"3\" and message.allCorrect[]";

        let mut context = context_with_answer(vec![1, 2]);
        assert!(unifier.evaluate_node(&mut context, &legacy_node(predicate)));

        let mut context = context_with_answer(vec![3]);
        assert!(!unifier.evaluate_node(&mut context, &legacy_node(predicate)));
    }

    #[test]
    fn broken_predicate_hides_node() {
        let unifier = RuleUnifier::new();
        let mut context = context_with_answer(vec![1, 2]);
        assert!(!unifier.evaluate_node(&mut context, &legacy_node("message whereId \"3")));
        assert!(!unifier.evaluate_node(&mut context, &legacy_node("((broken")));
    }

    #[test]
    fn predicate_side_effects_reach_the_context() {
        let unifier = RuleUnifier::new();
        let mut context = context_with_answer(vec![1, 2]);
        assert!(unifier.evaluate_node(
            &mut context,
            &legacy_node("saveChatValue[\"empathy\", readChatValue[\"empathy\"] + 2]")
        ));
        assert_eq!(context.hyper_parameter("empathy"), 2.0);
    }

    #[test]
    fn enhanced_nodes_use_rules_unless_predicate_is_stateful() {
        let unifier = RuleUnifier::new();
        let mut context = context_with_answer(vec![1, 2]);

        // Empty rule list shows.
        assert!(unifier.evaluate_node(&mut context, &enhanced_node(json!([]), None)));

        // Failing rule hides.
        let failing = json!([{
            "kind": "message_count",
            "comparison_type": "GREATER_EQUAL",
            "threshold": 10
        }]);
        assert!(!unifier.evaluate_node(&mut context, &enhanced_node(failing, None)));

        // A stateful legacy predicate wins over the rules.
        let node = enhanced_node(
            json!([{ "kind": "message_count", "comparison_type": "GREATER_EQUAL", "threshold": 10 }]),
            Some("saveChatValue[\"seen\", 1]"),
        );
        assert!(unifier.evaluate_node(&mut context, &node));
        assert_eq!(context.hyper_parameter("seen"), 1.0);
    }

    #[test]
    fn unknown_rule_json_shows_the_node() {
        let unifier = RuleUnifier::new();
        let mut context = context_with_answer(vec![1, 2]);
        let node = enhanced_node(json!([{ "kind": "mystery" }]), None);
        assert!(unifier.evaluate_node(&mut context, &node));
    }
}
