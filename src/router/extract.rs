//! Slot extraction from raw query text
//!
//! Locates time expressions, amount thresholds, account references and
//! option picks. Whatever is left after those and the stop words are removed
//! becomes a candidate category phrase.

use crate::models::AccountScope;
use crate::temporal::{TemporalMention, TemporalResolver};
use crate::text::tokenize;
use chrono::NaiveDate;

/// Words that introduce a minimum amount ("over $100", "more than 50").
const MIN_AMOUNT_CUES: &[&str] = &["over", "above", "exceeding", "least", "than"];

/// Words after which an amount is a maximum; kept out of category phrases.
const MAX_AMOUNT_CUES: &[&str] = &["under", "below", "less"];

const LARGE_WORDS: &[&str] = &[
    "large", "larger", "big", "bigger", "huge", "expensive", "significant", "major",
];

const STOPWORDS: &[&str] = &[
    // question and filler words
    "what", "whats", "how", "much", "many", "which", "when", "where", "who", "why", "did", "do",
    "does", "done", "was", "were", "is", "are", "am", "be", "been", "have", "has", "had", "can",
    "could", "would", "should", "will", "please", "tell", "give", "me", "show", "list", "find",
    "get", "got", "see", "want", "know", "about", "also", "just", "only", "then", "there", "here",
    "hi", "hello", "hey", "thanks", "thank", "you", "ok", "okay", "yes", "no", "not", "sure",
    "hmm", "idk", "dunno", "maybe", "mean", "meant", "like", "one", "ones", "option", "choice",
    "else", "again", "instead", "actually",
    // pronouns and articles
    "i", "my", "mine", "we", "our", "us", "it", "its", "that", "this", "these", "those", "the",
    "a", "an", "any", "some", "all", "every", "each", "both", "either", "other", "same",
    // spending verbs and nouns
    "spend", "spent", "spending", "spends", "pay", "paid", "paying", "cost", "costs", "buy",
    "bought", "purchase", "purchases", "purchased", "transaction", "transactions", "payment",
    "payments", "charge", "charges", "charged", "expense", "expenses", "money", "amount",
    "amounts", "activity", "history", "statement", "statements", "records", "record", "category",
    "categories", "stuff", "things", "items", "everything", "anything", "something", "total",
    "totals", "sum", "average", "avg", "typical", "count", "number", "breakdown",
    "summary", "overall", "altogether", "combined", "latest", "newest", "recent", "most",
    // comparison
    "compare", "compared", "comparison", "versus", "vs", "difference", "between", "against",
    "than", "more", "less", "fewer", "over", "above", "under", "below", "exceeding", "least",
    "higher", "lower", "large", "big",
    // prepositions and joiners
    "on", "in", "at", "for", "from", "to", "of", "with", "by", "during", "since", "through",
    "until", "per", "and", "or", "but", "into", "out", "off", "up", "as", "so", "if",
    // time units and words
    "day", "days", "week", "weeks", "month", "months", "year", "years", "quarter", "quarters",
    "period", "time", "last", "past", "previous", "prior", "next", "current", "ago", "far",
    "lately", "recently", "weekly", "monthly", "yearly",
    // income words
    "income", "earn", "earned", "earnings", "received", "receive", "credits", "credit", "debit",
    "debits", "incoming", "outgoing", "go", "went", "goes",
    // accounts
    "account", "accounts", "checking", "savings", "card", "cards",
    // ordinals
    "first", "second", "third", "1st", "2nd", "3rd",
];

/// Everything the router needs from one query's text.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub tokens: Vec<String>,
    pub temporal: Vec<TemporalMention>,
    pub category_phrases: Vec<String>,
    /// Minimum amount introduced by a cue word.
    pub amount_threshold: Option<f64>,
    /// Amounts with no cue word; used when answering an amount question.
    pub bare_amounts: Vec<f64>,
    /// "large", "big" and friends without a number.
    pub wants_large: bool,
    pub account_scope: Option<AccountScope>,
    /// The singular word "account" with no type.
    pub vague_account: bool,
    /// "first", "2", "option 3": 1-based.
    pub ordinal: Option<usize>,
}

fn parse_amount(token: &str) -> Option<f64> {
    let digits = token.trim_start_matches('$').replace(',', "");
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    digits.parse::<f64>().ok().filter(|v| *v >= 0.0)
}

fn parse_ordinal(token: &str) -> Option<usize> {
    match token {
        "1" | "first" | "1st" => Some(1),
        "2" | "second" | "2nd" => Some(2),
        "3" | "third" | "3rd" => Some(3),
        _ => None,
    }
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

pub fn extract(text: &str, temporal: &TemporalResolver, reference: NaiveDate) -> Extraction {
    let tokens = tokenize(text);
    let mut consumed = vec![false; tokens.len()];

    let mentions = temporal.scan_tokens(&tokens, reference);
    for mention in &mentions {
        for flag in &mut consumed[mention.start..mention.end] {
            *flag = true;
        }
    }

    let mut extraction = Extraction {
        temporal: mentions,
        ..Default::default()
    };

    // ================= Amounts =================
    for i in 0..tokens.len() {
        if consumed[i] {
            continue;
        }
        let Some(amount) = parse_amount(&tokens[i]) else {
            continue;
        };
        let previous = i.checked_sub(1).map(|p| tokens[p].as_str());
        match previous {
            Some(cue) if MIN_AMOUNT_CUES.contains(&cue) => {
                if extraction.amount_threshold.is_none() {
                    extraction.amount_threshold = Some(amount);
                }
            }
            Some(cue) if MAX_AMOUNT_CUES.contains(&cue) => {}
            _ if tokens[i].starts_with('$') => extraction.bare_amounts.push(amount),
            _ => {
                // bare integers may be option picks; keep them for later
                if parse_ordinal(&tokens[i]).is_none() {
                    extraction.bare_amounts.push(amount);
                }
                continue;
            }
        }
        consumed[i] = true;
    }

    extraction.wants_large = tokens.iter().any(|t| LARGE_WORDS.contains(&t.as_str()));

    // ================= Accounts =================
    for i in 0..tokens.len() {
        let word = tokens[i].as_str();
        let next = tokens.get(i + 1).map(String::as_str);
        let scope = match (word, next) {
            ("credit", Some("card" | "cards")) => {
                consumed[i + 1] = true;
                Some(AccountScope::CreditCard)
            }
            ("card" | "cards", _) => Some(AccountScope::CreditCard),
            ("checking", _) => Some(AccountScope::Checking),
            ("savings", _) => Some(AccountScope::Savings),
            ("all" | "every" | "each", Some("accounts" | "account")) => {
                consumed[i + 1] = true;
                Some(AccountScope::All)
            }
            ("all", Some("my")) if tokens.get(i + 2).map(String::as_str) == Some("accounts") => {
                consumed[i + 1] = true;
                consumed[i + 2] = true;
                Some(AccountScope::All)
            }
            ("accounts", _) => Some(AccountScope::All),
            _ => None,
        };
        if let Some(scope) = scope {
            consumed[i] = true;
            if extraction.account_scope.is_none() {
                extraction.account_scope = Some(scope);
            }
        }
    }
    extraction.vague_account =
        extraction.account_scope.is_none() && tokens.iter().any(|t| t == "account");

    // ================= Ordinals =================
    extraction.ordinal = tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed[*i])
        .find_map(|(_, t)| parse_ordinal(t));

    // ================= Category phrases =================
    let mut current: Vec<&str> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let breaks = consumed[i]
            || is_stopword(token)
            || LARGE_WORDS.contains(&token.as_str())
            || token == "-"
            || token.starts_with('$')
            || token.chars().any(|c| c.is_ascii_digit());
        if breaks {
            flush(&mut current, &mut extraction.category_phrases);
        } else {
            current.push(token.as_str());
        }
    }
    flush(&mut current, &mut extraction.category_phrases);

    extraction.tokens = tokens;
    extraction
}

fn flush(current: &mut Vec<&str>, phrases: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let phrase = current.join(" ");
    if !phrases.contains(&phrase) {
        phrases.push(phrase);
    }
    current.clear();
}
