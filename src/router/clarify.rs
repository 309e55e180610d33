//! Clarifying questions
//!
//! Every question has a deterministic template. A language model may
//! rephrase it, but its wording is only used when it still asks exactly one
//! question and keeps every offered option.

use crate::llm::{generate_text, strip_code_fences, LanguageModel, ModelRequest, ModelTask};
use crate::models::{CategoryMatch, CategoryRef, SlotName};
use crate::text::tokenize;
use std::time::Duration;
use tracing::warn;

const MAX_QUESTION_CHARS: usize = 240;

const CLARIFY_INSTRUCTION: &str = "You help a banking assistant ask the customer for one missing detail. \
Rewrite the draft question so it reads naturally. Ask exactly one question, keep every listed option, \
and do not mention amounts, dates or categories that are not in the draft. Reply with the question only.";

/// What the question is about.
#[derive(Debug, Clone, Copy)]
pub struct QuestionContext<'a> {
    pub slot: SlotName,
    /// Vague time phrase, e.g. "recent".
    pub time_phrase: Option<&'a str>,
    /// Category phrase that did not resolve.
    pub category_phrase: Option<&'a str>,
    pub candidates: &'a [CategoryMatch],
    /// Label of the primary period, used when asking for a comparison.
    pub primary_label: Option<&'a str>,
}

impl<'a> QuestionContext<'a> {
    pub fn new(slot: SlotName) -> Self {
        Self {
            slot,
            time_phrase: None,
            category_phrase: None,
            candidates: &[],
            primary_label: None,
        }
    }
}

fn numbered_options(candidates: &[CategoryMatch]) -> String {
    let items: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{}) {}", i + 1, m.category.name))
        .collect();

    match items.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
        Some((last, _)) => last.clone(),
        None => String::new(),
    }
}

pub fn template_question(ctx: &QuestionContext<'_>) -> String {
    match ctx.slot {
        SlotName::TimeRange => match ctx.time_phrase {
            Some(phrase) => format!(
                "Which time period do you mean by \"{}\", for example last week or last month?",
                phrase
            ),
            None => "Which time period should I look at, for example last week or last month?"
                .to_string(),
        },
        SlotName::CategoryIds => match (ctx.category_phrase, ctx.candidates.is_empty()) {
            (Some(phrase), false) => format!(
                "Which category did you mean by \"{}\": {}?",
                phrase,
                numbered_options(ctx.candidates)
            ),
            (Some(phrase), true) => format!(
                "I couldn't match \"{}\" to a spending category. Which category do you mean, for example dining or groceries?",
                phrase
            ),
            (None, _) => {
                "Which spending category should I look at, for example dining or groceries?"
                    .to_string()
            }
        },
        SlotName::AmountThreshold => {
            "What amount should count as large, for example over $100 or over $500?".to_string()
        }
        SlotName::AccountScope => {
            "Which account do you mean: checking, savings, credit card or all accounts?".to_string()
        }
        SlotName::ComparisonTarget => format!(
            "What should I compare {} with, for example another month or another category?",
            ctx.primary_label.unwrap_or("that")
        ),
    }
}

/// Accept a model-phrased question only if it is a single short question
/// that still names every candidate.
pub fn validate_question(raw: &str, ctx: &QuestionContext<'_>) -> Option<String> {
    let text = strip_code_fences(raw).trim().trim_matches('"').trim();

    if text.is_empty() || text.contains('\n') || text.chars().count() > MAX_QUESTION_CHARS {
        return None;
    }
    if !text.ends_with('?') || text.matches('?').count() != 1 {
        return None;
    }

    let lower = text.to_lowercase();
    let keeps_options = ctx
        .candidates
        .iter()
        .all(|m| lower.contains(&m.category.name.to_lowercase()));
    if ctx.slot == SlotName::CategoryIds && !keeps_options {
        return None;
    }

    Some(text.to_string())
}

/// Phrase the question for `ctx`, falling back to the template on any model
/// failure or rejected wording.
pub async fn compose_question(
    model: Option<&dyn LanguageModel>,
    ctx: &QuestionContext<'_>,
    summary: &str,
    timeout: Duration,
) -> String {
    let template = template_question(ctx);
    let Some(model) = model else {
        return template;
    };

    let request = ModelRequest {
        task: ModelTask::ClarifyingQuestion,
        system_instruction: CLARIFY_INSTRUCTION.to_string(),
        prompt: format!(
            "Conversation so far:\n{}\n\nMissing detail: {}\nDraft question: {}",
            summary,
            ctx.slot.as_str().replace('_', " "),
            template
        ),
        json_output: false,
    };

    match generate_text(model, &request, timeout).await {
        Ok(raw) => match validate_question(&raw, ctx) {
            Some(question) => question,
            None => {
                warn!(slot = %ctx.slot, "Model question rejected, using template");
                template
            }
        },
        Err(e) => {
            warn!(slot = %ctx.slot, error = %e, "Question generation failed, using template");
            template
        }
    }
}

/// Message sent when the clarification limit is reached.
pub fn fallback_message(slot: SlotName) -> String {
    let detail = match slot {
        SlotName::TimeRange => "time period",
        SlotName::CategoryIds => "category",
        SlotName::AmountThreshold => "amount",
        SlotName::AccountScope => "account",
        SlotName::ComparisonTarget => "comparison",
    };
    format!(
        "I still couldn't work out the {} for your question. Please ask again with the details spelled out, for example \"How much did I spend on groceries last month?\"",
        detail
    )
}

/// Pick one of the offered candidates, by position or by name.
///
/// Returns the category and, when picked by name, the phrase that named it.
pub fn select_candidate(
    ordinal: Option<usize>,
    phrases: &[String],
    candidates: &[CategoryMatch],
) -> Option<(CategoryRef, Option<String>)> {
    if let Some(picked) = ordinal
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| candidates.get(index))
    {
        return Some((picked.category.clone(), None));
    }

    for phrase in phrases {
        let phrase_tokens = tokenize(phrase);
        if phrase_tokens.is_empty() {
            continue;
        }
        for candidate in candidates {
            let name_tokens = tokenize(&candidate.category.name);
            if phrase_tokens.iter().all(|t| name_tokens.contains(t)) {
                return Some((candidate.category.clone(), Some(phrase.clone())));
            }
        }
    }

    None
}
