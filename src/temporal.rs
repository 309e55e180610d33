//! Temporal resolver
//!
//! Pure mapping from natural-language time expressions plus a reference date
//! to exact inclusive date ranges. The wall clock is never consulted; the
//! reference date always comes from configuration.

use crate::config::PeriodPolicy;
use crate::error::AgentError;
use crate::models::{ResolvedTimeRange, TimeRange};
use crate::text::tokenize;
use crate::Result;
use chrono::{Datelike, Duration, Months, NaiveDate};
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref MONTHS: HashMap<&'static str, u32> = {
        let names = [
            ("january", "jan"),
            ("february", "feb"),
            ("march", "mar"),
            ("april", "apr"),
            ("may", "may"),
            ("june", "jun"),
            ("july", "jul"),
            ("august", "aug"),
            ("september", "sep"),
            ("october", "oct"),
            ("november", "nov"),
            ("december", "dec"),
        ];
        let mut months = HashMap::new();
        for (index, (full, short)) in names.iter().enumerate() {
            months.insert(*full, index as u32 + 1);
            months.insert(*short, index as u32 + 1);
        }
        months.insert("sept", 9);
        months
    };
    static ref NUMBER_WORDS: HashMap<&'static str, u32> = [
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
        ("eleven", 11),
        ("twelve", 12),
    ]
    .into_iter()
    .collect();
}

/// Words after which "may", or a bare abbreviation such as "mar", reads as
/// the month.
pub(crate) const MONTH_CONTEXT: &[&str] = &[
    "in", "during", "of", "for", "from", "since", "through", "to", "and", "vs", "versus",
    "between", "until", "than",
];

/// Words after which a bare four-digit number is an amount, not a year.
const AMOUNT_CUES: &[&str] = &[
    "over", "above", "under", "below", "than", "exceeding", "least", "most", "spent", "paid",
];

/// Month number for a full month name or its standard abbreviation.
pub fn month_number(word: &str) -> Option<u32> {
    MONTHS.get(word.to_lowercase().as_str()).copied()
}

const QUARTER_REASON: &str = "calendar or fiscal quarter";

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Exact(ResolvedTimeRange),
    Ambiguous { phrase: String, reason: String },
}

impl Resolution {
    pub fn exact(&self) -> Option<&ResolvedTimeRange> {
        match self {
            Resolution::Exact(resolved) => Some(resolved),
            Resolution::Ambiguous { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<ResolvedTimeRange> {
        match self {
            Resolution::Exact(resolved) => Ok(resolved),
            Resolution::Ambiguous { phrase, reason } => Err(
                AgentError::UnresolvableTemporalExpression(format!("'{}': {}", phrase, reason)),
            ),
        }
    }
}

/// A time expression located in a query, as a token span.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalMention {
    pub start: usize,
    pub end: usize,
    pub resolution: Resolution,
}

enum Hit {
    Range(TimeRange, String),
    Vague(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalResolver {
    policy: PeriodPolicy,
}

impl TemporalResolver {
    pub fn new(policy: PeriodPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PeriodPolicy {
        self.policy
    }

    /// Resolve a single expression. Unrecognized text is ambiguous.
    pub fn resolve(&self, expression: &str, reference: NaiveDate) -> Resolution {
        self.scan(expression, reference)
            .into_iter()
            .next()
            .map(|mention| mention.resolution)
            .unwrap_or_else(|| Resolution::Ambiguous {
                phrase: expression.trim().to_string(),
                reason: "no recognizable time expression".to_string(),
            })
    }

    pub fn scan(&self, text: &str, reference: NaiveDate) -> Vec<TemporalMention> {
        self.scan_tokens(&tokenize(text), reference)
    }

    /// Locate every time expression in already tokenized text, left to right,
    /// without overlaps.
    pub fn scan_tokens(&self, tokens: &[String], reference: NaiveDate) -> Vec<TemporalMention> {
        let mut mentions = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            match self.match_at(tokens, i, reference) {
                Some((len, hit)) => {
                    let phrase = tokens[i..i + len].join(" ");
                    let resolution = match hit {
                        Hit::Range(range, interpretation) => Resolution::Exact(ResolvedTimeRange {
                            range,
                            phrase,
                            interpretation,
                        }),
                        Hit::Vague(reason) => Resolution::Ambiguous { phrase, reason },
                    };
                    mentions.push(TemporalMention {
                        start: i,
                        end: i + len,
                        resolution,
                    });
                    i += len;
                }
                None => i += 1,
            }
        }

        mentions
    }

    fn match_at(&self, tokens: &[String], i: usize, reference: NaiveDate) -> Option<(usize, Hit)> {
        let word = tokens[i].as_str();
        let at = |k: usize| tokens.get(i + k).map(String::as_str);

        if let Some(start) = parse_iso_date(word) {
            if matches!(at(1), Some("to" | "-" | "through" | "until" | "and")) {
                if let Some(end) = at(2).and_then(parse_iso_date) {
                    let hit = match TimeRange::new(start, end) {
                        Some(range) => Hit::Range(range, "explicit date range".to_string()),
                        None => Hit::Vague("start date is after end date".to_string()),
                    };
                    return Some((3, hit));
                }
            }
            return Some((
                1,
                Hit::Range(TimeRange::single_day(start), "explicit date".to_string()),
            ));
        }

        match word {
            "today" => Some((
                1,
                Hit::Range(TimeRange::single_day(reference), "the reference date".to_string()),
            )),
            "yesterday" => reference.pred_opt().map(|day| {
                (
                    1,
                    Hit::Range(TimeRange::single_day(day), "the day before the reference date".to_string()),
                )
            }),
            "ytd" | "year-to-date" => Some((1, year_to_date(reference))),
            "mtd" | "month-to-date" => Some((1, month_to_date(reference))),
            "year" if at(1) == Some("to") && at(2) == Some("date") => {
                Some((3, year_to_date(reference)))
            }
            "month" if at(1) == Some("to") && at(2) == Some("date") => {
                Some((3, month_to_date(reference)))
            }
            "recent" | "recently" | "lately" => {
                // "most recent" asks for the latest rows, not a period
                if i > 0 && tokens[i - 1] == "most" {
                    None
                } else {
                    Some((1, Hit::Vague("no explicit period given".to_string())))
                }
            }
            "this" | "current" => match at(1)? {
                "week" => Some((
                    2,
                    span(
                        Some(week_start(reference)),
                        Some(reference),
                        "current week to date",
                    ),
                )),
                "month" => Some((2, month_to_date(reference))),
                "year" => Some((2, year_to_date(reference))),
                "quarter" => Some((2, Hit::Vague(QUARTER_REASON.to_string()))),
                _ => None,
            },
            "last" | "past" | "previous" | "prior" => self.match_previous(tokens, i, reference),
            "first" | "second" | "third" | "fourth" if at(1) == Some("quarter") => {
                let quarter = match word {
                    "first" => 1,
                    "second" => 2,
                    "third" => 3,
                    _ => 4,
                };
                let (extra, year) = trailing_year(tokens, i + 2);
                Some((2 + extra, quarter_hit(quarter, year, reference)))
            }
            _ => {
                if let Some(quarter) = parse_quarter_token(word) {
                    let (extra, year) = trailing_year(tokens, i + 1);
                    return Some((1 + extra, quarter_hit(quarter, year, reference)));
                }
                if let Some(&month) = MONTHS.get(word) {
                    if word == "may" && !may_is_month(tokens, i) {
                        return None;
                    }
                    let (extra, year) = trailing_year(tokens, i + 1);
                    return Some((1 + extra, month_hit(month, year, false, reference)));
                }
                if let Some(year) = parse_year(word) {
                    if i > 0 && AMOUNT_CUES.contains(&tokens[i - 1].as_str()) {
                        return None;
                    }
                    if let Some(quarter) = at(1).and_then(parse_quarter_token) {
                        return Some((2, quarter_hit(quarter, Some(year), reference)));
                    }
                    return Some((1, year_hit(year, reference)));
                }
                None
            }
        }
    }

    /// "last ..." / "past ..." / "previous ..." expressions.
    fn match_previous(&self, tokens: &[String], i: usize, reference: NaiveDate) -> Option<(usize, Hit)> {
        let at = |k: usize| tokens.get(i + k).map(String::as_str);
        let next = at(1)?;

        match next {
            "week" => Some((2, self.previous_period(Unit::Week, reference))),
            "month" => Some((2, self.previous_period(Unit::Month, reference))),
            "year" => Some((2, self.previous_period(Unit::Year, reference))),
            "quarter" => Some((2, Hit::Vague(QUARTER_REASON.to_string()))),
            "few" | "several" | "couple" => {
                let unit_at = if at(2) == Some("of") { 3 } else { 2 };
                at(unit_at).and_then(parse_unit)?;
                Some((
                    unit_at + 1,
                    Hit::Vague("no exact number of periods given".to_string()),
                ))
            }
            _ => {
                if let Some(&month) = MONTHS.get(next) {
                    let (extra, year) = trailing_year(tokens, i + 2);
                    return Some((2 + extra, month_hit(month, year, true, reference)));
                }
                let count = parse_count(next)?;
                let unit = at(2).and_then(parse_unit)?;
                Some((3, self.last_n(count, unit, reference)))
            }
        }
    }

    fn previous_period(&self, unit: Unit, reference: NaiveDate) -> Hit {
        match (self.policy, unit) {
            (_, Unit::Day) => span(reference.pred_opt(), reference.pred_opt(), "the day before the reference date"),
            (PeriodPolicy::Calendar, Unit::Week) => {
                let this_week = week_start(reference);
                span(
                    this_week.checked_sub_signed(Duration::days(7)),
                    this_week.pred_opt(),
                    "previous Monday-Sunday week",
                )
            }
            (PeriodPolicy::Calendar, Unit::Month) => {
                let this_month = month_start(reference);
                span(
                    this_month.checked_sub_months(Months::new(1)),
                    this_month.pred_opt(),
                    "previous calendar month",
                )
            }
            (PeriodPolicy::Calendar, Unit::Year) => match year_range(reference.year() - 1) {
                Some(range) => Hit::Range(range, "previous calendar year".to_string()),
                None => Hit::Vague("date out of range".to_string()),
            },
            (PeriodPolicy::Rolling, Unit::Week) => rolling_days(7, reference),
            (PeriodPolicy::Rolling, Unit::Month) => rolling_days(30, reference),
            (PeriodPolicy::Rolling, Unit::Year) => rolling_days(365, reference),
        }
    }

    fn last_n(&self, count: u32, unit: Unit, reference: NaiveDate) -> Hit {
        match (self.policy, unit) {
            // always a rolling window
            (_, Unit::Day) => rolling_days(count as i64, reference),
            (PeriodPolicy::Calendar, Unit::Week) => {
                let this_week = week_start(reference);
                span(
                    this_week.checked_sub_signed(Duration::weeks(count as i64)),
                    this_week.pred_opt(),
                    &format!("previous {} complete weeks", count),
                )
            }
            (PeriodPolicy::Calendar, Unit::Month) => {
                let this_month = month_start(reference);
                span(
                    this_month.checked_sub_months(Months::new(count)),
                    this_month.pred_opt(),
                    &format!("previous {} complete calendar months", count),
                )
            }
            (PeriodPolicy::Calendar, Unit::Year) => span(
                NaiveDate::from_ymd_opt(reference.year() - count as i32, 1, 1),
                NaiveDate::from_ymd_opt(reference.year() - 1, 12, 31),
                &format!("previous {} calendar years", count),
            ),
            (PeriodPolicy::Rolling, Unit::Week) => rolling_days(7 * count as i64, reference),
            (PeriodPolicy::Rolling, Unit::Month) => span(
                reference
                    .checked_sub_months(Months::new(count))
                    .and_then(|d| d.succ_opt()),
                Some(reference),
                &format!("rolling {} months ending on the reference date", count),
            ),
            (PeriodPolicy::Rolling, Unit::Year) => span(
                reference
                    .checked_sub_months(Months::new(12 * count))
                    .and_then(|d| d.succ_opt()),
                Some(reference),
                &format!("rolling {} years ending on the reference date", count),
            ),
        }
    }
}

fn span(start: Option<NaiveDate>, end: Option<NaiveDate>, interpretation: &str) -> Hit {
    match (start, end) {
        (Some(start), Some(end)) => match TimeRange::new(start, end) {
            Some(range) => Hit::Range(range, interpretation.to_string()),
            None => Hit::Vague("empty period".to_string()),
        },
        _ => Hit::Vague("date out of range".to_string()),
    }
}

fn rolling_days(days: i64, reference: NaiveDate) -> Hit {
    span(
        reference.checked_sub_signed(Duration::days(days - 1)),
        Some(reference),
        &format!("rolling {} days ending on the reference date", days),
    )
}

fn year_to_date(reference: NaiveDate) -> Hit {
    span(
        NaiveDate::from_ymd_opt(reference.year(), 1, 1),
        Some(reference),
        "current year to date",
    )
}

fn month_to_date(reference: NaiveDate) -> Hit {
    span(Some(month_start(reference)), Some(reference), "current month to date")
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn month_range(year: i32, month: u32) -> Option<TimeRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    TimeRange::new(start, end)
}

fn year_range(year: i32) -> Option<TimeRange> {
    TimeRange::new(
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    )
}

fn quarter_range(year: i32, quarter: u32) -> Option<TimeRange> {
    let start = NaiveDate::from_ymd_opt(year, 3 * quarter - 2, 1)?;
    let end = start.checked_add_months(Months::new(3))?.pred_opt()?;
    TimeRange::new(start, end)
}

/// Periods that have not started yet are ambiguous; periods still running
/// end on the reference date.
fn clip(full: Option<TimeRange>, reference: NaiveDate, interpretation: String) -> Hit {
    match full {
        None => Hit::Vague("date out of range".to_string()),
        Some(range) if range.start > reference => {
            Hit::Vague(format!("{} is after the reference date", range.label()))
        }
        Some(range) if range.end > reference => Hit::Range(
            TimeRange {
                start: range.start,
                end: reference,
            },
            format!("{} up to the reference date", interpretation),
        ),
        Some(range) => Hit::Range(range, interpretation),
    }
}

/// Without a year, a month means its latest occurrence not after the
/// reference date (strictly before the current month for "last <month>").
fn month_hit(month: u32, year: Option<i32>, strictly_before: bool, reference: NaiveDate) -> Hit {
    let year = year.unwrap_or_else(|| {
        if month < reference.month() || (!strictly_before && month == reference.month()) {
            reference.year()
        } else {
            reference.year() - 1
        }
    });
    clip(month_range(year, month), reference, "calendar month".to_string())
}

fn quarter_hit(quarter: u32, year: Option<i32>, reference: NaiveDate) -> Hit {
    let year = year.unwrap_or_else(|| {
        if 3 * quarter - 2 <= reference.month() {
            reference.year()
        } else {
            reference.year() - 1
        }
    });
    clip(
        quarter_range(year, quarter),
        reference,
        format!("calendar quarter Q{}", quarter),
    )
}

fn year_hit(year: i32, reference: NaiveDate) -> Hit {
    clip(year_range(year), reference, "calendar year".to_string())
}

fn trailing_year(tokens: &[String], j: usize) -> (usize, Option<i32>) {
    match tokens.get(j).map(String::as_str) {
        Some(word) if parse_year(word).is_some() => (1, parse_year(word)),
        Some("of") => match tokens.get(j + 1).and_then(|w| parse_year(w)) {
            Some(year) => (2, Some(year)),
            None => (0, None),
        },
        _ => (0, None),
    }
}

fn may_is_month(tokens: &[String], i: usize) -> bool {
    let followed_by_year = tokens.get(i + 1).and_then(|w| parse_year(w)).is_some();
    let after_preposition = i > 0 && MONTH_CONTEXT.contains(&tokens[i - 1].as_str());
    followed_by_year || after_preposition
}

fn parse_iso_date(word: &str) -> Option<NaiveDate> {
    if word.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(word, "%Y-%m-%d").ok()
}

fn parse_year(word: &str) -> Option<i32> {
    if word.len() != 4 || !word.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    word.parse::<i32>().ok().filter(|y| (1990..=2100).contains(y))
}

fn parse_quarter_token(word: &str) -> Option<u32> {
    match word {
        "q1" => Some(1),
        "q2" => Some(2),
        "q3" => Some(3),
        "q4" => Some(4),
        _ => None,
    }
}

fn parse_count(word: &str) -> Option<u32> {
    word.parse::<u32>()
        .ok()
        .filter(|n| (1..=3650).contains(n))
        .or_else(|| NUMBER_WORDS.get(word).copied())
}

fn parse_unit(word: &str) -> Option<Unit> {
    match word {
        "day" | "days" => Some(Unit::Day),
        "week" | "weeks" => Some(Unit::Week),
        "month" | "months" => Some(Unit::Month),
        "year" | "years" => Some(Unit::Year),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reference() -> NaiveDate {
        day(2025, 12, 1)
    }

    fn range_of(resolver: &TemporalResolver, expr: &str, reference: NaiveDate) -> TimeRange {
        match resolver.resolve(expr, reference) {
            Resolution::Exact(resolved) => resolved.range,
            other => panic!("expected exact range for '{}', got {:?}", expr, other),
        }
    }

    #[test]
    fn test_last_month_calendar() {
        let resolver = TemporalResolver::default();
        let range = range_of(&resolver, "How much did I spend on dining last month?", reference());
        assert_eq!(range, TimeRange::new(day(2025, 11, 1), day(2025, 11, 30)).unwrap());
    }

    #[test]
    fn test_last_month_rolling() {
        let resolver = TemporalResolver::new(PeriodPolicy::Rolling);
        let range = range_of(&resolver, "last month", reference());
        assert_eq!(range, TimeRange::new(day(2025, 11, 2), day(2025, 12, 1)).unwrap());
    }

    #[test]
    fn test_last_week_is_previous_monday_to_sunday() {
        let resolver = TemporalResolver::default();
        let range = range_of(&resolver, "last week", reference());
        assert_eq!(range, TimeRange::new(day(2025, 11, 24), day(2025, 11, 30)).unwrap());
    }

    #[test]
    fn test_last_n_days_is_inclusive_rolling() {
        let resolver = TemporalResolver::default();
        let range = range_of(&resolver, "last 14 days", day(2025, 11, 22));
        assert_eq!(range, TimeRange::new(day(2025, 11, 9), day(2025, 11, 22)).unwrap());
        assert_eq!(range.days(), 14);
    }

    #[test]
    fn test_last_three_months_calendar() {
        let resolver = TemporalResolver::default();
        let range = range_of(&resolver, "the past three months", reference());
        assert_eq!(range, TimeRange::new(day(2025, 9, 1), day(2025, 11, 30)).unwrap());
    }

    #[test]
    fn test_this_month_is_to_date() {
        let resolver = TemporalResolver::default();
        let range = range_of(&resolver, "this month", reference());
        assert_eq!(range, TimeRange::single_day(day(2025, 12, 1)));
    }

    #[test]
    fn test_month_names_without_year() {
        let resolver = TemporalResolver::default();
        assert_eq!(
            range_of(&resolver, "Nov", reference()),
            TimeRange::new(day(2025, 11, 1), day(2025, 11, 30)).unwrap()
        );
        assert_eq!(
            range_of(&resolver, "last december", reference()),
            TimeRange::new(day(2024, 12, 1), day(2024, 12, 31)).unwrap()
        );
        // current month clipped at the reference date
        assert_eq!(
            range_of(&resolver, "december", day(2025, 12, 10)),
            TimeRange::new(day(2025, 12, 1), day(2025, 12, 10)).unwrap()
        );
    }

    #[test]
    fn test_month_with_year_and_quarter() {
        let resolver = TemporalResolver::default();
        assert_eq!(
            range_of(&resolver, "November 2024", reference()),
            TimeRange::new(day(2024, 11, 1), day(2024, 11, 30)).unwrap()
        );
        assert_eq!(
            range_of(&resolver, "Q3 2025", reference()),
            TimeRange::new(day(2025, 7, 1), day(2025, 9, 30)).unwrap()
        );
        assert_eq!(
            range_of(&resolver, "2024", reference()),
            TimeRange::new(day(2024, 1, 1), day(2024, 12, 31)).unwrap()
        );
    }

    #[test]
    fn test_ambiguous_expressions() {
        let resolver = TemporalResolver::default();
        for expr in ["recent transactions", "this quarter", "last quarter", "lately", "last few weeks"] {
            assert!(
                matches!(resolver.resolve(expr, reference()), Resolution::Ambiguous { .. }),
                "{} should be ambiguous",
                expr
            );
        }
    }

    #[test]
    fn test_most_recent_is_not_a_period() {
        let resolver = TemporalResolver::default();
        assert!(resolver.scan("my most recent transaction", reference()).is_empty());
        assert!(resolver.scan("show my last 5 transactions", reference()).is_empty());
    }

    #[test]
    fn test_may_needs_context() {
        let resolver = TemporalResolver::default();
        assert!(resolver.scan("may I see my spending", reference()).is_empty());
        let mentions = resolver.scan("spending in may", reference());
        assert_eq!(mentions.len(), 1);
        assert_eq!(
            mentions[0].resolution.exact().unwrap().range,
            TimeRange::new(day(2025, 5, 1), day(2025, 5, 31)).unwrap()
        );
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        let resolver = TemporalResolver::default();
        let original = TimeRange::new(day(2025, 11, 1), day(2025, 11, 30)).unwrap();
        let again = range_of(&resolver, &original.to_string(), reference());
        assert_eq!(original, again);
        assert_eq!(range_of(&resolver, &again.to_string(), reference()), original);
    }

    #[test]
    fn test_scan_finds_comparison_periods() {
        let resolver = TemporalResolver::default();
        let mentions = resolver.scan("How much on groceries in Nov vs Oct?", reference());
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].resolution.exact().unwrap().range.start, day(2025, 11, 1));
        assert_eq!(mentions[1].resolution.exact().unwrap().range.start, day(2025, 10, 1));
    }

    #[test]
    fn test_future_period_is_ambiguous() {
        let resolver = TemporalResolver::default();
        let resolution = resolver.resolve("March 2026", reference());
        assert!(resolution.into_result().is_err());
    }

    #[test]
    fn test_amount_is_not_a_year() {
        let resolver = TemporalResolver::default();
        assert!(resolver.scan("purchases over 2000", reference()).is_empty());
    }

    #[test]
    fn test_periods_across_the_year_boundary() {
        let reference = day(2026, 1, 15);
        let calendar = TemporalResolver::new(PeriodPolicy::Calendar);
        let rolling = TemporalResolver::new(PeriodPolicy::Rolling);

        let cases = [
            (
                "last 3 months",
                (day(2025, 10, 1), day(2025, 12, 31)),
                (day(2025, 10, 16), day(2026, 1, 15)),
            ),
            (
                "last month",
                (day(2025, 12, 1), day(2025, 12, 31)),
                (day(2025, 12, 17), day(2026, 1, 15)),
            ),
            (
                "last week",
                (day(2026, 1, 5), day(2026, 1, 11)),
                (day(2026, 1, 9), day(2026, 1, 15)),
            ),
            (
                "Dec",
                (day(2025, 12, 1), day(2025, 12, 31)),
                (day(2025, 12, 1), day(2025, 12, 31)),
            ),
        ];

        for (expr, (cal_start, cal_end), (roll_start, roll_end)) in cases {
            assert_eq!(
                range_of(&calendar, expr, reference),
                TimeRange::new(cal_start, cal_end).unwrap(),
                "calendar '{}'",
                expr
            );
            assert_eq!(
                range_of(&rolling, expr, reference),
                TimeRange::new(roll_start, roll_end).unwrap(),
                "rolling '{}'",
                expr
            );
        }
    }
}
