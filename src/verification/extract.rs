//! Pull numbers, dates and month references out of a drafted message.

use crate::temporal::{month_number, MONTH_CONTEXT};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct NumberMention {
    pub raw: String,
    pub value: f64,
    pub money: bool,
    pub percent: bool,
}

/// "November", "Nov 24", "November 24, 2025", "November 2025".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthMention {
    pub month: u32,
    pub day: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFacts {
    pub numbers: Vec<NumberMention>,
    pub dates: Vec<NaiveDate>,
    pub months: Vec<MonthMention>,
    pub years: Vec<i32>,
    /// Digit-bearing tokens no number could be read from.
    pub unparsed: Vec<String>,
}

const FULL_MONTH_NAMES: [&str; 11] = [
    "january",
    "february",
    "march",
    "april",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

fn is_wrapper(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';' | ':' | '"' | '\'' | '!' | '?' | '*'
    )
}

fn clean(word: &str) -> &str {
    word.trim_start_matches(is_wrapper)
        .trim_end_matches(|c: char| is_wrapper(c) || c == '.')
}

/// Month for `words[i]`. Full names always count; "may" and abbreviations
/// only with a day or year after them or a preposition before them.
fn month_at(words: &[&str], i: usize, followed: bool) -> Option<u32> {
    let word = words[i];
    let month = month_number(word)?;
    let lower = word.to_lowercase();
    if FULL_MONTH_NAMES.contains(&lower.as_str()) || followed {
        return Some(month);
    }
    let after_preposition = i > 0 && MONTH_CONTEXT.contains(&words[i - 1].to_lowercase().as_str());
    after_preposition.then_some(month)
}

fn day_number(word: &str) -> Option<u32> {
    let digits = word
        .trim_end_matches("st")
        .trim_end_matches("nd")
        .trim_end_matches("rd")
        .trim_end_matches("th");
    digits.parse::<u32>().ok().filter(|d| (1..=31).contains(d))
}

fn year_number(word: &str) -> Option<i32> {
    if word.len() != 4 || !word.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    word.parse::<i32>().ok().filter(|y| (1990..=2100).contains(y))
}

/// Numeric runs inside a token: digits with optional thousands separators,
/// an optional decimal part and an optional trailing `%`.
fn numeric_cores(word: &str) -> Vec<(&str, bool)> {
    let bytes = word.as_bytes();
    let digit_at = |k: usize| bytes.get(k).map(u8::is_ascii_digit).unwrap_or(false);
    let mut cores = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !digit_at(i) {
            i += 1;
            continue;
        }
        let start = i;
        while digit_at(i) || (bytes.get(i) == Some(&b',') && digit_at(i + 1)) {
            i += 1;
        }
        if bytes.get(i) == Some(&b'.') && digit_at(i + 1) {
            i += 1;
            while digit_at(i) {
                i += 1;
            }
        }
        let percent = bytes.get(i) == Some(&b'%');
        cores.push((&word[start..i], percent));
        if percent {
            i += 1;
        }
    }
    cores
}

fn is_money_token(word: &str) -> bool {
    word.contains(|c: char| matches!(c, '$' | '€' | '£')) || word.to_lowercase().contains("usd")
}

fn scan_numbers(word: &str, facts: &mut MessageFacts) {
    let cores = numeric_cores(word);
    if cores.is_empty() {
        facts.unparsed.push(word.to_string());
        return;
    }

    let money = is_money_token(word);
    for (core, percent) in cores {
        if !money && !percent {
            if let Some(year) = year_number(core) {
                facts.years.push(year);
                continue;
            }
        }
        match core.replace(',', "").parse::<f64>() {
            Ok(value) => facts.numbers.push(NumberMention {
                raw: word.to_string(),
                value,
                money,
                percent,
            }),
            Err(_) => facts.unparsed.push(word.to_string()),
        }
    }
}

pub fn scan_message(message: &str) -> MessageFacts {
    let words: Vec<&str> = message.split_whitespace().map(clean).collect();
    let mut facts = MessageFacts::default();
    let mut i = 0;

    while i < words.len() {
        let word = words[i];

        if let Ok(date) = NaiveDate::parse_from_str(word, "%Y-%m-%d") {
            facts.dates.push(date);
            i += 1;
            continue;
        }

        if month_number(word).is_some() {
            let day = words.get(i + 1).and_then(|w| day_number(w));
            let year_at = if day.is_some() { i + 2 } else { i + 1 };
            let year = words.get(year_at).and_then(|w| year_number(w));

            if let Some(month) = month_at(&words, i, day.is_some() || year.is_some()) {
                facts.months.push(MonthMention { month, day, year });
                i = match (day, year) {
                    (_, Some(_)) => year_at + 1,
                    (Some(_), None) => i + 2,
                    (None, None) => i + 1,
                };
                continue;
            }
        }

        if word.chars().any(|c| c.is_ascii_digit()) {
            scan_numbers(word, &mut facts);
        }
        i += 1;
    }

    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_amounts_and_percentages() {
        let facts = scan_message("That is an increase of $21.50 (7.96%), across 6 purchases.");
        let values: Vec<f64> = facts.numbers.iter().map(|n| n.value).collect();
        assert_eq!(values, vec![21.50, 7.96, 6.0]);
        assert!(facts.numbers[0].money);
        assert!(facts.numbers[1].percent);
    }

    #[test]
    fn test_scan_dates_months_and_years() {
        let facts = scan_message("Between 2025-11-24 and 2025-11-30, and on November 7, 2025 and in October 2025.");
        assert_eq!(facts.dates.len(), 2);
        assert_eq!(
            facts.months,
            vec![
                MonthMention { month: 11, day: Some(7), year: Some(2025) },
                MonthMention { month: 10, day: None, year: Some(2025) },
            ]
        );
        assert!(facts.numbers.is_empty());
        assert!(facts.years.is_empty());
    }

    #[test]
    fn test_may_as_a_verb_is_not_a_month() {
        let facts = scan_message("You may want to check May 2025 too.");
        assert_eq!(facts.months.len(), 1);
        assert_eq!(facts.months[0].year, Some(2025));
    }

    #[test]
    fn test_amounts_inside_punctuation_and_units() {
        let facts = scan_message("You spent ~$412 (about $412.00). That is $35.50/month or USD412.00 or €9.");
        let values: Vec<f64> = facts.numbers.iter().map(|n| n.value).collect();
        assert_eq!(values, vec![412.0, 412.0, 35.5, 412.0, 9.0]);
        assert!(facts.numbers.iter().all(|n| n.money));
        assert!(facts.unparsed.is_empty());
    }

    #[test]
    fn test_abbreviation_needs_date_context() {
        let facts = scan_message("You paid Mar Vista Grill, then Dec Hardware.");
        assert!(facts.months.is_empty());

        let facts = scan_message("Compared with Oct, spending in Nov rose. On Dec 3 you paid.");
        let months: Vec<u32> = facts.months.iter().map(|m| m.month).collect();
        assert_eq!(months, vec![11, 12]);
        assert_eq!(facts.months[1].day, Some(3));
    }

    #[test]
    fn test_thousands_separator() {
        let facts = scan_message("You received $4,200.00 in 2025");
        assert_eq!(facts.numbers[0].value, 4200.0);
        assert_eq!(facts.years, vec![2025]);
    }
}
