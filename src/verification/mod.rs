//! Grounding verification for customer messages
//!
//! Rules-based validation pass run after every draft. A message that fails
//! any rule is never shown to the customer.

pub mod extract;
pub mod rules;

pub use rules::{
    CategoryNamesRule, ComparisonDirectionRule, DatesGroundedRule, NonEmptyMessageRule,
    NumbersGroundedRule,
};

use crate::category::CategoryKnowledgeBase;
use crate::models::{GroundingCheck, GroundingReport, TimeRange};
use chrono::NaiveDate;
use extract::{scan_message, MessageFacts};
use std::collections::HashSet;
use tracing::info;

/// Facts a message is allowed to state.
#[derive(Debug, Clone, Default)]
pub struct GroundingContext {
    numbers: Vec<f64>,
    ranges: Vec<TimeRange>,
    dates: HashSet<NaiveDate>,
    category_names: HashSet<String>,
    difference: Option<f64>,
}

impl GroundingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_number(&mut self, value: f64) {
        if value.is_finite() {
            self.numbers.push(value);
        }
    }

    pub fn allow_numbers<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for value in values {
            self.allow_number(value);
        }
    }

    pub fn allow_range(&mut self, range: TimeRange) {
        if !self.ranges.contains(&range) {
            self.ranges.push(range);
        }
    }

    pub fn allow_date(&mut self, date: NaiveDate) {
        self.dates.insert(date);
    }

    pub fn allow_category_name(&mut self, name: &str) {
        self.category_names.insert(name.to_lowercase());
    }

    /// Signed difference (primary minus comparison) of a comparison answer.
    pub fn set_difference(&mut self, difference: f64) {
        self.difference = Some(difference);
    }

    pub fn numbers(&self) -> &[f64] {
        &self.numbers
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    pub fn difference(&self) -> Option<f64> {
        self.difference
    }

    pub fn date_allowed(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date) || self.ranges.iter().any(|r| r.contains(date))
    }

    pub fn category_allowed(&self, name: &str) -> bool {
        self.category_names.contains(&name.to_lowercase())
    }
}

pub struct RuleOutcome {
    pub passed: bool,
    pub details: String,
}

impl RuleOutcome {
    pub fn pass(details: impl Into<String>) -> Self {
        Self {
            passed: true,
            details: details.into(),
        }
    }

    pub fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: details.into(),
        }
    }
}

/// Trait for grounding rules
pub trait GroundingRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, message: &str, facts: &MessageFacts, ctx: &GroundingContext) -> RuleOutcome;
}

/// Runs every rule against a draft message
pub struct GroundingVerifier {
    rules: Vec<Box<dyn GroundingRule>>,
}

impl GroundingVerifier {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn GroundingRule>) {
        self.rules.push(rule);
    }

    pub fn verify(&self, message: &str, ctx: &GroundingContext) -> GroundingReport {
        let facts = scan_message(message);
        let mut checks = Vec::with_capacity(self.rules.len());
        let mut violations = Vec::new();

        for rule in &self.rules {
            let outcome = rule.check(message, &facts, ctx);
            if !outcome.passed {
                violations.push(format!("{}: {}", rule.name(), outcome.details));
            }
            checks.push(GroundingCheck {
                rule_name: rule.name().to_string(),
                passed: outcome.passed,
                details: outcome.details,
            });
        }

        let grounded = violations.is_empty();
        info!(
            rule_count = self.rules.len(),
            grounded = grounded,
            "Grounding verification completed"
        );

        GroundingReport {
            grounded,
            checks,
            violations,
        }
    }
}

impl Default for GroundingVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifier with the standard rule set
pub fn create_default_grounding_verifier(kb: &CategoryKnowledgeBase) -> GroundingVerifier {
    let mut verifier = GroundingVerifier::new();
    verifier.add_rule(Box::new(NonEmptyMessageRule));
    verifier.add_rule(Box::new(NumbersGroundedRule));
    verifier.add_rule(Box::new(DatesGroundedRule));
    verifier.add_rule(Box::new(CategoryNamesRule::from_knowledge_base(kb)));
    verifier.add_rule(Box::new(ComparisonDirectionRule));
    verifier
}
