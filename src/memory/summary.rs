//! Natural-language summary of what a session has established so far.
//!
//! Regenerated by the router after every turn. Deterministic so it can be
//! compared in tests and shown to a model as context.

use super::state::ConversationState;
use crate::models::SlotName;

pub struct StateSummarizer;

impl StateSummarizer {
    pub fn summarize(state: &ConversationState) -> String {
        let mut lines: Vec<String> = Vec::new();

        for name in SlotName::PRIORITY {
            if let Some(entry) = state.slot(name) {
                lines.push(format!("{}: {}", label(name), entry.value.describe()));
            }
        }

        if let Some(pending) = &state.pending {
            lines.push(format!(
                "Open question (turn {}): \"{}\", waiting for {}",
                pending.turn_id,
                pending.original_query,
                pending.asked_slot.as_str().replace('_', " ")
            ));
        }

        if !state.category_candidates.is_empty() {
            let names: Vec<&str> = state
                .category_candidates
                .iter()
                .map(|m| m.category.name.as_str())
                .collect();
            lines.push(format!("Category options offered: {}", names.join(", ")));
        }

        if lines.is_empty() {
            return "Nothing established yet.".to_string();
        }

        lines.join("\n")
    }
}

fn label(name: SlotName) -> &'static str {
    match name {
        SlotName::TimeRange => "Time range",
        SlotName::CategoryIds => "Categories",
        SlotName::AmountThreshold => "Amount threshold",
        SlotName::AccountScope => "Account",
        SlotName::ComparisonTarget => "Comparison",
    }
}
