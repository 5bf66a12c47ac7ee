//! Embedded predicate language for legacy flow nodes.
//!
//! A `show_predicate` is a small boolean expression evaluated against
//! chat-scoped state. The pipeline is tokenize → parse → evaluate; the
//! grammar, reconstructed from the authored corpus:
//!
//! ```text
//! predicate  := <empty>                          -- always true
//!             | or_expr
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := cmp_expr ("and" cmp_expr)*
//! cmp_expr   := add_expr (("==" | "!=" | ">" | "<" | ">=" | "<=") add_expr)?
//! add_expr   := postfix (("+" | "-") postfix)*
//! postfix    := primary ("." ident invoke?)*     -- ".not[]" negates
//! primary    := number | string | "true" | "false"
//!             | "[" (expr ("," expr)*)? "]"      -- list literal
//!             | "(" or_expr ")"
//!             | ident "whereId" expr             -- bind message, true if found
//!             | ident invoke                     -- readChatValue["k"],
//!                                                -- saveChatValue["k", expr]
//!             | ident
//! invoke     := "[" args "]" | "(" args ")"      -- both forms occur
//! ```
//!
//! Message methods: `.allCorrect`, `.anyCorrect`, `.allIncorrect`,
//! `.anyIncorrect` (booleans over option selection/correctness),
//! `.selected` (1-based list of chosen options), `.not` (negation).
//! Identifiers and keywords are case-insensitive; string literals are not.
//!
//! Failures never escape traversal: callers treat any [`InterpreterError`]
//! as "hide the node".

mod eval;
mod lexer;
mod parser;

pub use eval::{EvalError, PredicateHost, Value};
pub use lexer::LexError;
pub use parser::ParseError;

use eval::Evaluator;
use lexer::tokenize;
use parser::parse;

#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("predicate did not evaluate to a boolean")]
    NotBoolean,
}

/// One option of a question message, as seen by predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateOption {
    pub selected: bool,
    pub correct: bool,
}

/// Message view exposed to predicates via `whereId`.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateMessage {
    pub node_order: u64,
    pub options: Vec<PredicateOption>,
}

impl PredicateMessage {
    pub fn all_correct(&self) -> bool {
        !self.options.is_empty() && self.options.iter().all(|o| o.correct == o.selected)
    }

    pub fn any_correct(&self) -> bool {
        self.options.iter().any(|o| o.correct == o.selected)
    }

    /// 1-based positions of the selected options, ascending.
    pub fn selected_positions(&self) -> Vec<usize> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.selected)
            .map(|(i, _)| i + 1)
            .collect()
    }
}

/// Evaluate a predicate. A blank source is the literal always-true.
pub fn run_predicate(source: &str, host: &mut dyn PredicateHost) -> Result<bool, InterpreterError> {
    if source.trim().is_empty() {
        return Ok(true);
    }
    let tokens = tokenize(source)?;
    let ast = parse(&tokens)?;
    match Evaluator::new(host).eval(&ast)? {
        Value::Bool(result) => Ok(result),
        _ => Err(InterpreterError::NotBoolean),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Host with one answerable message and an in-memory value table.
    struct TestHost {
        message: PredicateMessage,
        values: HashMap<String, f64>,
    }

    impl TestHost {
        fn with_options(selected: &[bool], correct: &[bool]) -> Self {
            let options = selected
                .iter()
                .zip(correct)
                .map(|(&selected, &correct)| PredicateOption { selected, correct })
                .collect();
            Self {
                message: PredicateMessage { node_order: 3, options },
                values: HashMap::new(),
            }
        }
    }

    impl PredicateHost for TestHost {
        fn message_by_order(&self, order: u64) -> Option<PredicateMessage> {
            (order == self.message.node_order).then(|| self.message.clone())
        }

        fn read_chat_value(&mut self, key: &str) -> f64 {
            self.values.get(key).copied().unwrap_or(0.0)
        }

        fn save_chat_value(&mut self, key: &str, value: f64) {
            self.values.insert(key.to_string(), value);
        }
    }

    #[test]
    fn blank_predicate_is_always_true() {
        let mut host = TestHost::with_options(&[], &[]);
        assert!(run_predicate("", &mut host).unwrap());
        assert!(run_predicate("   ", &mut host).unwrap());
    }

    #[test]
    fn all_correct_tracks_answer_quality() {
        // Answered correctly: chose exactly the correct options.
        let mut host = TestHost::with_options(&[true, false], &[true, false]);
        assert!(
            run_predicate("message whereId \"3\" and message.allCorrect[]", &mut host).unwrap()
        );

        // Answered incorrectly: chose the wrong option.
        let mut host = TestHost::with_options(&[false, true], &[true, false]);
        assert!(
            !run_predicate("message whereId \"3\" and message.allCorrect[]", &mut host).unwrap()
        );
    }

    #[test]
    fn where_id_misses_yield_false() {
        let mut host = TestHost::with_options(&[true], &[true]);
        assert!(!run_predicate("message whereId \"9\" and message.allCorrect[]", &mut host).unwrap());
    }

    #[test]
    fn not_suffix_negates() {
        let mut host = TestHost::with_options(&[true], &[true]);
        assert!(run_predicate("message whereId \"3\" and message.anyCorrect()", &mut host).unwrap());
        assert!(
            !run_predicate(
                "message whereId \"3\" and message.anyCorrect().not()",
                &mut host
            )
            .unwrap()
        );
    }

    #[test]
    fn selected_compares_against_lists() {
        // Options g/h/k, user chose 1 and 3.
        let mut host = TestHost::with_options(&[true, false, true], &[true, true, false]);
        let predicate = "message1 whereId \"3\" and message1.selected() == [3] \
                         or message1.selected() == [1, 3]";
        assert!(run_predicate(predicate, &mut host).unwrap());
        assert!(!run_predicate("message whereId \"3\" and message.selected[] == [2]", &mut host).unwrap());
    }

    #[test]
    fn chat_values_read_and_write() {
        let mut host = TestHost::with_options(&[], &[]);
        assert!(run_predicate("saveChatValue[\"score\", 4]", &mut host).unwrap());
        assert_eq!(host.values.get("score"), Some(&4.0));

        assert!(run_predicate("readChatValue[\"score\"] > 3", &mut host).unwrap());
        assert!(!run_predicate("readChatValue[\"score\"] > 5", &mut host).unwrap());

        // Increment through an expression argument.
        assert!(
            run_predicate(
                "saveChatValue[\"score\", readChatValue[\"score\"] + 2]",
                &mut host
            )
            .unwrap()
        );
        assert_eq!(host.values.get("score"), Some(&6.0));
    }

    #[test]
    fn boolean_literals_and_grouping() {
        let mut host = TestHost::with_options(&[], &[]);
        assert!(run_predicate("true", &mut host).unwrap());
        assert!(!run_predicate("false and (true or false)", &mut host).unwrap());
        assert!(run_predicate("(true or false) and true", &mut host).unwrap());
    }

    #[test]
    fn malformed_predicates_fail_with_errors() {
        let mut host = TestHost::with_options(&[], &[]);
        assert!(run_predicate("message whereId \"3", &mut host).is_err());
        assert!(run_predicate("(true or false", &mut host).is_err());
        assert!(run_predicate("readChatValue[\"k\"] >", &mut host).is_err());
        assert!(run_predicate("7 + ", &mut host).is_err());
    }

    #[test]
    fn non_boolean_result_is_rejected() {
        let mut host = TestHost::with_options(&[], &[]);
        assert!(matches!(
            run_predicate("readChatValue[\"k\"]", &mut host),
            Err(InterpreterError::NotBoolean)
        ));
    }
}
