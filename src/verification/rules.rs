//! Grounding rules

use super::extract::MessageFacts;
use super::{GroundingContext, GroundingRule, RuleOutcome};
use crate::category::CategoryKnowledgeBase;
use crate::text::{contains_phrase, tokenize};
use chrono::{Datelike, NaiveDate};

const AMOUNT_TOLERANCE: f64 = 0.006;

const INCREASE_WORDS: &[&str] = &[
    "increase", "increased", "more", "higher", "rose", "grew", "up by",
];
const DECREASE_WORDS: &[&str] = &[
    "decrease", "decreased", "less", "lower", "fell", "dropped", "declined", "down by",
];

/// Message must not be blank.
pub struct NonEmptyMessageRule;

impl GroundingRule for NonEmptyMessageRule {
    fn name(&self) -> &'static str {
        "non_empty_message"
    }

    fn check(&self, message: &str, _facts: &MessageFacts, _ctx: &GroundingContext) -> RuleOutcome {
        if message.trim().is_empty() {
            RuleOutcome::fail("message is empty")
        } else {
            RuleOutcome::pass("message present")
        }
    }
}

/// Every amount, count and percentage must come from tool results or
/// recorded calculations.
pub struct NumbersGroundedRule;

impl GroundingRule for NumbersGroundedRule {
    fn name(&self) -> &'static str {
        "numbers_grounded"
    }

    fn check(&self, _message: &str, facts: &MessageFacts, ctx: &GroundingContext) -> RuleOutcome {
        let mut ungrounded: Vec<&str> = facts
            .numbers
            .iter()
            .filter(|n| {
                !ctx.numbers()
                    .iter()
                    .any(|allowed| (allowed.abs() - n.value.abs()).abs() < AMOUNT_TOLERANCE)
            })
            .map(|n| n.raw.as_str())
            .collect();
        // a figure that could not be read cannot be shown to be grounded
        ungrounded.extend(facts.unparsed.iter().map(String::as_str));

        if ungrounded.is_empty() {
            RuleOutcome::pass(format!("{} numbers checked", facts.numbers.len()))
        } else {
            RuleOutcome::fail(format!("numbers not in tool results: {}", ungrounded.join(", ")))
        }
    }
}

/// Dates, months and years must fall inside the resolved periods.
pub struct DatesGroundedRule;

impl DatesGroundedRule {
    fn month_overlaps(ctx: &GroundingContext, month: u32, year: Option<i32>) -> bool {
        ctx.ranges().iter().any(|range| {
            let mut cursor = NaiveDate::from_ymd_opt(range.start.year(), range.start.month(), 1);
            while let Some(first) = cursor {
                if first > range.end {
                    break;
                }
                if first.month() == month && year.map(|y| y == first.year()).unwrap_or(true) {
                    return true;
                }
                cursor = first.checked_add_months(chrono::Months::new(1));
            }
            false
        })
    }

    fn day_covered(ctx: &GroundingContext, month: u32, day: u32, year: Option<i32>) -> bool {
        let years: Vec<i32> = match year {
            Some(y) => vec![y],
            None => ctx
                .ranges()
                .iter()
                .flat_map(|r| r.start.year()..=r.end.year())
                .collect(),
        };
        years
            .into_iter()
            .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
            .any(|date| ctx.date_allowed(date))
    }
}

impl GroundingRule for DatesGroundedRule {
    fn name(&self) -> &'static str {
        "dates_grounded"
    }

    fn check(&self, _message: &str, facts: &MessageFacts, ctx: &GroundingContext) -> RuleOutcome {
        let mut violations = Vec::new();

        for date in &facts.dates {
            if !ctx.date_allowed(*date) {
                violations.push(date.format("%Y-%m-%d").to_string());
            }
        }

        for mention in &facts.months {
            let grounded = match mention.day {
                Some(day) => Self::day_covered(ctx, mention.month, day, mention.year),
                None => Self::month_overlaps(ctx, mention.month, mention.year),
            };
            if !grounded {
                violations.push(format!(
                    "month {}{}{}",
                    mention.month,
                    mention.day.map(|d| format!(" day {}", d)).unwrap_or_default(),
                    mention.year.map(|y| format!(" year {}", y)).unwrap_or_default()
                ));
            }
        }

        for year in &facts.years {
            let covered = ctx
                .ranges()
                .iter()
                .any(|r| (r.start.year()..=r.end.year()).contains(year));
            if !covered {
                violations.push(format!("year {}", year));
            }
        }

        if violations.is_empty() {
            RuleOutcome::pass(format!(
                "{} dates, {} months, {} years checked",
                facts.dates.len(),
                facts.months.len(),
                facts.years.len()
            ))
        } else {
            RuleOutcome::fail(format!("dates outside resolved periods: {}", violations.join(", ")))
        }
    }
}

/// Category names may only be those resolved or present in returned rows.
pub struct CategoryNamesRule {
    known: Vec<(String, Vec<String>)>,
}

impl CategoryNamesRule {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = names
            .into_iter()
            .map(|name| (name.as_ref().to_lowercase(), tokenize(name.as_ref())))
            .filter(|(_, tokens)| !tokens.is_empty())
            .collect();
        Self { known }
    }

    pub fn from_knowledge_base(kb: &CategoryKnowledgeBase) -> Self {
        let names = kb.groups().iter().flat_map(|group| {
            std::iter::once(group.name.clone())
                .chain(group.subcategories.iter().map(|sub| sub.name.clone()))
        });
        Self::new(names.collect::<Vec<_>>())
    }
}

impl GroundingRule for CategoryNamesRule {
    fn name(&self) -> &'static str {
        "category_names_grounded"
    }

    fn check(&self, message: &str, _facts: &MessageFacts, ctx: &GroundingContext) -> RuleOutcome {
        let tokens = tokenize(message);

        let foreign: Vec<&str> = self
            .known
            .iter()
            .filter(|(name, name_tokens)| {
                let parts: Vec<&str> = name_tokens.iter().map(String::as_str).collect();
                contains_phrase(&tokens, &parts) && !ctx.category_allowed(name)
            })
            .map(|(name, _)| name.as_str())
            .collect();

        if foreign.is_empty() {
            RuleOutcome::pass("category names match the resolved filters")
        } else {
            RuleOutcome::fail(format!("categories not in resolved filters: {}", foreign.join(", ")))
        }
    }
}

/// Comparison wording must match the sign of the difference and state its
/// magnitude.
pub struct ComparisonDirectionRule;

impl GroundingRule for ComparisonDirectionRule {
    fn name(&self) -> &'static str {
        "comparison_direction"
    }

    fn check(&self, message: &str, facts: &MessageFacts, ctx: &GroundingContext) -> RuleOutcome {
        let Some(difference) = ctx.difference() else {
            return RuleOutcome::pass("no comparison");
        };

        let tokens = tokenize(message);
        let says_increase = crate::text::contains_any(&tokens, INCREASE_WORDS);
        let says_decrease = crate::text::contains_any(&tokens, DECREASE_WORDS);

        let wrong_direction = if difference > 0.0 {
            says_decrease
        } else if difference < 0.0 {
            says_increase
        } else {
            says_increase || says_decrease
        };
        if wrong_direction {
            return RuleOutcome::fail(format!(
                "wording contradicts a difference of {:.2}",
                difference
            ));
        }

        let magnitude_stated = difference == 0.0
            || facts
                .numbers
                .iter()
                .any(|n| (n.value.abs() - difference.abs()).abs() < AMOUNT_TOLERANCE);
        if !magnitude_stated {
            return RuleOutcome::fail(format!(
                "difference of {:.2} is not stated",
                difference.abs()
            ));
        }

        RuleOutcome::pass(format!("direction consistent with {:.2}", difference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRange;
    use crate::verification::extract::scan_message;

    fn november() -> TimeRange {
        TimeRange::new(
            NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 11, 30).unwrap(),
        )
        .unwrap()
    }

    fn check(rule: &dyn GroundingRule, message: &str, ctx: &GroundingContext) -> RuleOutcome {
        rule.check(message, &scan_message(message), ctx)
    }

    #[test]
    fn test_numbers_rule() {
        let mut ctx = GroundingContext::new();
        ctx.allow_numbers([389.40, 3.0]);

        assert!(check(&NumbersGroundedRule, "You spent $389.40 across 3 transactions.", &ctx).passed);
        let outcome = check(&NumbersGroundedRule, "You spent $400.00.", &ctx);
        assert!(!outcome.passed);
        assert!(outcome.details.contains("$400.00"));
    }

    #[test]
    fn test_numbers_rule_reads_decorated_amounts() {
        let mut ctx = GroundingContext::new();
        ctx.allow_numbers([389.40, 3.0]);

        for message in [
            "You spent a lot (about $412.00).",
            "You spent ~$412 on it.",
            "That is $412.00/month.",
            "That is USD412.00 in total.",
            "Roughly €412 went there.",
        ] {
            let outcome = check(&NumbersGroundedRule, message, &ctx);
            assert!(!outcome.passed, "{}", message);
            assert!(outcome.details.contains("412"), "{}", outcome.details);
        }

        assert!(check(&NumbersGroundedRule, "You spent (about $389.40).", &ctx).passed);
        assert!(check(&NumbersGroundedRule, "You spent ~$389.40 across 3 purchases.", &ctx).passed);
    }

    #[test]
    fn test_dates_rule() {
        let mut ctx = GroundingContext::new();
        ctx.allow_range(november());

        assert!(check(&DatesGroundedRule, "In November 2025, on Nov 28 you paid.", &ctx).passed);
        assert!(!check(&DatesGroundedRule, "In October 2025 you paid.", &ctx).passed);
        assert!(!check(&DatesGroundedRule, "On 2025-12-03 you paid.", &ctx).passed);
    }

    #[test]
    fn test_category_rule() {
        let rule = CategoryNamesRule::new(["Dining", "Groceries", "Bars & Pubs"]);
        let mut ctx = GroundingContext::new();
        ctx.allow_category_name("Dining");

        assert!(check(&rule, "You spent it on Dining.", &ctx).passed);
        assert!(!check(&rule, "Mostly at bars & pubs.", &ctx).passed);
    }

    #[test]
    fn test_direction_rule() {
        let mut ctx = GroundingContext::new();
        ctx.set_difference(21.50);

        assert!(check(&ComparisonDirectionRule, "That is an increase of $21.50.", &ctx).passed);
        assert!(!check(&ComparisonDirectionRule, "That is a decrease of $21.50.", &ctx).passed);
        assert!(!check(&ComparisonDirectionRule, "Spending went up.", &ctx).passed);
    }
}
