//! Per-session conversation state
//!
//! Accumulates the slots a customer has supplied across turns, the intent of
//! an unanswered question and the clarification history. Only the router
//! mutates it.

use crate::models::{
    AccountScope, CategoryMatch, CategoryRef, ClarificationStep, ComparisonTarget, QueryIntent,
    ResolvedSlots, ResolvedTimeRange, SlotName, SlotProvenance, UseCase,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    TimeRange(ResolvedTimeRange),
    Categories(Vec<CategoryRef>),
    AmountThreshold(f64),
    AccountScope(AccountScope),
    ComparisonTarget(ComparisonTarget),
}

impl SlotValue {
    pub fn slot(&self) -> SlotName {
        match self {
            SlotValue::TimeRange(_) => SlotName::TimeRange,
            SlotValue::Categories(_) => SlotName::CategoryIds,
            SlotValue::AmountThreshold(_) => SlotName::AmountThreshold,
            SlotValue::AccountScope(_) => SlotName::AccountScope,
            SlotValue::ComparisonTarget(_) => SlotName::ComparisonTarget,
        }
    }

    /// Short human description used in the state summary.
    pub fn describe(&self) -> String {
        match self {
            SlotValue::TimeRange(t) => format!("{} ({})", t.range.label(), t.range),
            SlotValue::Categories(cats) => cats
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            SlotValue::AmountThreshold(amount) => format!("over ${:.2}", amount),
            SlotValue::AccountScope(scope) => scope.to_string(),
            SlotValue::ComparisonTarget(ComparisonTarget::Period { period }) => {
                format!("compared with {}", period.range.label())
            }
            SlotValue::ComparisonTarget(ComparisonTarget::Categories { categories }) => format!(
                "compared with {}",
                categories
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    UserDefined,
    UserOverride,
}

/// A slot value with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotEntry {
    pub value: SlotValue,
    pub source: SlotSource,
    pub turn_id: u32,
    pub original_query: String,
    pub previous_value: Option<SlotValue>,
    pub previous_turn_id: Option<u32>,
}

/// Intent of the last VAGUE turn, waiting for the missing slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingIntent {
    pub intent: QueryIntent,
    pub use_cases: Vec<UseCase>,
    pub required: BTreeSet<SlotName>,
    pub original_query: String,
    pub turn_id: u32,
    pub asked_slot: SlotName,
    pub question: String,
    /// Stored slots the customer put in doubt. They count as missing until
    /// a later turn supplies them again.
    #[serde(default)]
    pub reask: BTreeSet<SlotName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    pub customer_id: String,
    slots: BTreeMap<SlotName, SlotEntry>,
    pub summary: String,
    pub pending: Option<PendingIntent>,
    /// Intent of the last answered turn, inherited by bare follow-ups
    /// such as "what about groceries?".
    pub last_intent: Option<QueryIntent>,
    /// Candidates offered by the last category question.
    pub category_candidates: Vec<CategoryMatch>,
    pub clarification_history: Vec<ClarificationStep>,
    pub turn_count: u32,
    pub consecutive_clarifications: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            customer_id: customer_id.into(),
            slots: BTreeMap::new(),
            summary: String::new(),
            pending: None,
            last_intent: None,
            category_candidates: Vec::new(),
            clarification_history: Vec::new(),
            turn_count: 0,
            consecutive_clarifications: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn slot(&self, name: SlotName) -> Option<&SlotEntry> {
        self.slots.get(&name)
    }

    pub fn slots(&self) -> impl Iterator<Item = (&SlotName, &SlotEntry)> {
        self.slots.iter()
    }

    /// Store a value supplied at `turn_id`.
    ///
    /// Replacing a different stored value is recorded as an override with the
    /// previous value kept. Re-supplying the same value changes nothing.
    /// Returns whether the stored value changed.
    pub fn set_slot(&mut self, value: SlotValue, turn_id: u32, original_query: &str) -> bool {
        let name = value.slot();

        let entry = match self.slots.get(&name) {
            Some(existing) if existing.value == value => return false,
            Some(existing) => SlotEntry {
                previous_value: Some(existing.value.clone()),
                previous_turn_id: Some(existing.turn_id),
                value,
                source: SlotSource::UserOverride,
                turn_id,
                original_query: original_query.to_string(),
            },
            None => SlotEntry {
                value,
                source: SlotSource::UserDefined,
                turn_id,
                original_query: original_query.to_string(),
                previous_value: None,
                previous_turn_id: None,
            },
        };

        self.slots.insert(name, entry);
        true
    }

    /// Stored slot values as resolved filters.
    pub fn resolved_slots(&self) -> ResolvedSlots {
        let mut resolved = ResolvedSlots::default();
        for entry in self.slots.values() {
            match &entry.value {
                SlotValue::TimeRange(t) => resolved.time_range = Some(t.clone()),
                SlotValue::Categories(c) => resolved.category_ids = c.clone(),
                SlotValue::AmountThreshold(a) => resolved.amount_threshold = Some(*a),
                SlotValue::AccountScope(s) => resolved.account_scope = Some(*s),
                SlotValue::ComparisonTarget(t) => resolved.comparison_target = Some(t.clone()),
            }
        }
        resolved
    }

    /// Provenance of the stored slots present in `resolved`.
    pub fn provenance(&self, resolved: &ResolvedSlots) -> Vec<SlotProvenance> {
        self.slots
            .iter()
            .filter(|(name, _)| resolved.has(**name))
            .map(|(name, entry)| SlotProvenance {
                slot: *name,
                value: entry.value.describe(),
                source: entry.source,
                turn_id: entry.turn_id,
                original_query: entry.original_query.clone(),
                previous_value: entry.previous_value.as_ref().map(SlotValue::describe),
                previous_turn_id: entry.previous_turn_id,
            })
            .collect()
    }

    /// Record the customer's reply to the outstanding question.
    pub fn record_answer(&mut self, answer: &str, turn_id: u32) {
        if let Some(pending) = &self.pending {
            self.clarification_history.push(ClarificationStep {
                question: pending.question.clone(),
                user_answer: answer.to_string(),
                turn_id,
            });
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    pub fn is_expired(&self, now: DateTime<Utc>, idle_ttl: std::time::Duration) -> bool {
        let ttl = Duration::from_std(idle_ttl).unwrap_or_else(|_| Duration::days(365));
        now - self.last_activity > ttl
    }
}
