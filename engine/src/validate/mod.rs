//! Structural validation: advisory issues, never hard failures.

pub mod compatibility;
pub mod rules;

pub use compatibility::{CompatibilityValidator, Issue, Severity};
pub use rules::{RuleSetReport, RuleValidator, ValidationIssue};
