//! Query intent detection
//!
//! Keyword heuristics decide which use case a query belongs to and what it
//! measures. The same tokens always give the same intent.

use crate::models::{Measure, QueryIntent, UseCase};
use crate::text::contains_any;

/// Static keyword lists
const RETRIEVAL_PHRASES: &[&str] = &[
    "most recent",
    "latest",
    "newest",
    "last transaction",
    "last purchase",
    "last payment",
    "last charge",
];

const AGGREGATION_KEYWORDS: &[&str] = &[
    "how much", "total", "sum", "spend", "spent", "spending", "cost", "paid", "pay", "expenses",
    "expense", "earn", "earned", "income", "received", "average", "avg", "how many", "count",
    "number of",
];

const COMPARISON_KEYWORDS: &[&str] = &[
    "vs", "versus", "compare", "compared", "comparison", "difference between", "against",
];

const LISTING_KEYWORDS: &[&str] = &[
    "transactions", "transaction", "purchases", "purchase", "payments", "charges", "list", "show",
    "history", "statement", "activity",
];

const INCOME_KEYWORDS: &[&str] = &[
    "income", "earn", "earned", "earnings", "received", "salary", "deposits", "paid me", "credits",
];

const COUNT_KEYWORDS: &[&str] = &["how many", "count", "number of"];

const AVERAGE_KEYWORDS: &[&str] = &["average", "avg", "typical", "mean"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentSignals {
    pub intent: QueryIntent,
    /// Whether the query states an intent of its own. A bare answer such
    /// as "last week" does not.
    pub explicit: bool,
}

pub fn detect_intent(tokens: &[String], has_category: bool) -> IntentSignals {
    let retrieval = contains_any(tokens, RETRIEVAL_PHRASES);
    let aggregation = contains_any(tokens, AGGREGATION_KEYWORDS);
    let comparison = contains_any(tokens, COMPARISON_KEYWORDS);
    let listing = contains_any(tokens, LISTING_KEYWORDS);

    let measure = if contains_any(tokens, COUNT_KEYWORDS) {
        Measure::Count
    } else if contains_any(tokens, AVERAGE_KEYWORDS) {
        Measure::Average
    } else if contains_any(tokens, INCOME_KEYWORDS) {
        Measure::Income
    } else {
        Measure::Spending
    };

    let (primary, limit) = if retrieval && !aggregation && !comparison {
        (UseCase::DirectRetrieval, Some(1))
    } else if aggregation || comparison {
        (UseCase::Aggregation, None)
    } else if listing {
        if has_category {
            (UseCase::CategoryBased, None)
        } else {
            (UseCase::Temporal, None)
        }
    } else if has_category {
        (UseCase::Aggregation, None)
    } else {
        (UseCase::Temporal, None)
    };

    IntentSignals {
        intent: QueryIntent {
            primary,
            measure,
            comparison,
            limit,
        },
        explicit: retrieval || aggregation || comparison || listing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::tokenize;

    fn detect(text: &str, has_category: bool) -> IntentSignals {
        detect_intent(&tokenize(text), has_category)
    }

    #[test]
    fn test_aggregation_questions() {
        let signals = detect("How much did I spend on dining last month?", true);
        assert!(signals.explicit);
        assert_eq!(signals.intent.primary, UseCase::Aggregation);
        assert_eq!(signals.intent.measure, Measure::Spending);
        assert!(!signals.intent.comparison);
    }

    #[test]
    fn test_comparison_detected() {
        let signals = detect("How much on groceries in Nov vs Oct?", true);
        assert!(signals.intent.comparison);
        assert_eq!(signals.intent.primary, UseCase::Aggregation);
    }

    #[test]
    fn test_listing_questions() {
        assert_eq!(detect("Recent transactions", false).intent.primary, UseCase::Temporal);
        assert_eq!(
            detect("Show my dining transactions in November", true).intent.primary,
            UseCase::CategoryBased
        );
    }

    #[test]
    fn test_direct_retrieval_limits_to_one_row() {
        let signals = detect("What was my most recent purchase?", false);
        assert_eq!(signals.intent.primary, UseCase::DirectRetrieval);
        assert_eq!(signals.intent.limit, Some(1));
    }

    #[test]
    fn test_measures() {
        assert_eq!(detect("How many transactions last week", false).intent.measure, Measure::Count);
        assert_eq!(detect("average grocery bill", true).intent.measure, Measure::Average);
        assert_eq!(detect("how much income did I get", false).intent.measure, Measure::Income);
    }

    #[test]
    fn test_bare_answers_are_not_explicit() {
        assert!(!detect("last week", false).explicit);
        assert!(!detect("the first one", false).explicit);
        assert!(!detect("checking", false).explicit);
    }
}
