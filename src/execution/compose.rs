//! Customer message composition
//!
//! The executor hands a language model (or the templates below) a fixed set
//! of facts. Nothing outside [`AnswerFacts`] may appear in the message.

use crate::llm::{ModelRequest, ModelTask};
use crate::models::{Direction, Measure, TimeRange, TransactionRecord};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Rows shown in a listing answer.
pub const MAX_LISTED_ROWS: usize = 5;

pub const FAILURE_MESSAGE: &str =
    "Sorry, I couldn't retrieve your transactions right now. Please try again in a moment.";

const COMPOSE_INSTRUCTION: &str = "You write short answers for a banking assistant. \
Use only the facts you are given: do not add amounts, dates, percentages or categories. \
Write amounts with a dollar sign and two decimals. For comparisons say increase or decrease \
exactly as the sign of the difference says. Reply with a JSON object {\"message\": \"...\"}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerShape {
    Total,
    Listing,
    Latest,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFact {
    pub date: NaiveDate,
    pub merchant: String,
    pub amount: f64,
    pub direction: Direction,
    pub category: String,
}

impl From<&TransactionRecord> for RowFact {
    fn from(row: &TransactionRecord) -> Self {
        Self {
            date: row.date,
            merchant: row.merchant.clone().unwrap_or_else(|| "Unknown merchant".to_string()),
            amount: row.amount,
            direction: row.direction,
            category: row
                .sub_category_name
                .clone()
                .unwrap_or_else(|| row.category_group_name.clone()),
        }
    }
}

/// One side of the answer: what was measured, where and when.
#[derive(Debug, Clone, Serialize)]
pub struct SideFacts {
    /// " on Dining", or empty for all categories.
    pub subject: String,
    /// "in November 2025", "between 2025-11-24 and 2025-11-30", or empty.
    pub period: String,
    pub value: f64,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerFacts {
    pub shape: AnswerShape,
    pub measure: Measure,
    /// " using your credit card" or empty.
    pub account: String,
    /// " over $200.00" or empty.
    pub threshold: String,
    pub primary: SideFacts,
    pub comparison: Option<SideFacts>,
    pub difference: Option<f64>,
    pub percent_change: Option<f64>,
    pub rows: Vec<RowFact>,
}

/// "in November 2025", "in 2024", "on 2025-11-24" or
/// "between 2025-11-24 and 2025-11-30".
pub fn period_phrase(range: &TimeRange) -> String {
    if range.is_full_month() {
        return format!("in {}", range.label());
    }
    let whole_year = range.start.month() == 1
        && range.start.day() == 1
        && range.end.month() == 12
        && range.end.day() == 31
        && range.start.year() == range.end.year();
    if whole_year {
        return format!("in {}", range.start.year());
    }
    if range.start == range.end {
        return format!("on {}", range.start.format("%Y-%m-%d"));
    }
    format!(
        "between {} and {}",
        range.start.format("%Y-%m-%d"),
        range.end.format("%Y-%m-%d")
    )
}

pub fn subject_phrase(names: &[String]) -> String {
    if names.is_empty() {
        String::new()
    } else {
        format!(" on {}", names.join(" and "))
    }
}

fn money(value: f64) -> String {
    format!("${:.2}", value.abs())
}

fn figure(measure: Measure, value: f64) -> String {
    match measure {
        Measure::Count => format!("{:.0}", value.abs()),
        _ => money(value),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "transaction"
    } else {
        "transactions"
    }
}

/// `subject period`, trimmed so an empty period leaves no gap.
fn scope(side: &SideFacts) -> String {
    if side.period.is_empty() {
        side.subject.clone()
    } else {
        format!("{} {}", side.subject, side.period)
    }
}

fn row_line(row: &RowFact) -> String {
    let credit = if row.direction == Direction::Credit { " credit" } else { "" };
    format!(
        "- {} {} {}{} ({})",
        row.date.format("%Y-%m-%d"),
        row.merchant,
        money(row.amount),
        credit,
        row.category
    )
}

fn total_sentence(facts: &AnswerFacts, side: &SideFacts) -> String {
    let filters = format!("{}{}", facts.account, facts.threshold);
    let count = side.transaction_count;
    match facts.measure {
        Measure::Spending => format!(
            "You spent {}{}{} across {} {}.",
            money(side.value),
            scope(side),
            filters,
            count,
            plural(count)
        ),
        Measure::Income => format!(
            "You received {}{}{} across {} {}.",
            money(side.value),
            scope(side),
            filters,
            count,
            plural(count)
        ),
        Measure::Count => format!("You had {} {}{}{}.", count, plural(count), scope(side), filters),
        Measure::Average => format!(
            "Your average transaction{}{} was {} across {} {}.",
            scope(side),
            filters,
            money(side.value),
            count,
            plural(count)
        ),
    }
}

fn comparison_sentence(facts: &AnswerFacts, other: &SideFacts, difference: f64) -> String {
    let against = format!("{}{}", figure(facts.measure, other.value), scope(other));
    if difference == 0.0 {
        return format!("That is the same as {}.", against);
    }

    let word = if difference > 0.0 { "an increase" } else { "a decrease" };
    match facts.percent_change {
        Some(pct) => format!(
            "That is {} of {} ({:.2}%) compared with {}.",
            word,
            figure(facts.measure, difference),
            pct.abs(),
            against
        ),
        None => format!(
            "That is {} of {} compared with {}.",
            word,
            figure(facts.measure, difference),
            against
        ),
    }
}

/// Deterministic message for `facts`.
pub fn template_message(facts: &AnswerFacts) -> String {
    let primary = &facts.primary;
    match facts.shape {
        AnswerShape::Total => {
            let mut message = total_sentence(facts, primary);
            if let (Some(other), Some(difference)) = (&facts.comparison, facts.difference) {
                message.push(' ');
                message.push_str(&comparison_sentence(facts, other, difference));
            }
            message
        }
        AnswerShape::Latest => match facts.rows.first() {
            Some(row) => format!(
                "Your most recent transaction{}{}{} was {}{} at {} on {} ({}).",
                scope(primary),
                facts.account,
                facts.threshold,
                money(row.amount),
                if row.direction == Direction::Credit { " credit" } else { "" },
                row.merchant,
                row.date.format("%Y-%m-%d"),
                row.category
            ),
            None => no_data_message(facts),
        },
        AnswerShape::Listing => {
            let count = primary.transaction_count;
            let mut lines = vec![format!(
                "You have {} {}{}{}{}.",
                count,
                plural(count),
                scope(primary),
                facts.account,
                facts.threshold
            )];
            if count > facts.rows.len() {
                lines.push(format!("The {} most recent:", facts.rows.len()));
            }
            lines.extend(facts.rows.iter().map(row_line));
            lines.join("\n")
        }
    }
}

pub fn no_data_message(facts: &AnswerFacts) -> String {
    format!(
        "I couldn't find any transactions{}{}{}.",
        scope(&facts.primary),
        facts.account,
        facts.threshold
    )
}

#[derive(Debug, Deserialize)]
pub struct ComposedAnswer {
    pub message: String,
}

/// Model request for `facts`. `feedback` lists the problems of a rejected
/// earlier draft.
pub fn composition_request(facts: &AnswerFacts, feedback: Option<&[String]>) -> crate::Result<ModelRequest> {
    let mut prompt = format!(
        "Facts:\n{}\n\nReference answer:\n{}",
        serde_json::to_string_pretty(facts)?,
        template_message(facts)
    );
    if let Some(violations) = feedback {
        prompt.push_str(&format!(
            "\n\nYour previous draft was rejected: {}. Use only the facts above.",
            violations.join("; ")
        ));
    }

    Ok(ModelRequest {
        task: ModelTask::AnswerComposition,
        system_instruction: COMPOSE_INSTRUCTION.to_string(),
        prompt,
        json_output: true,
    })
}
