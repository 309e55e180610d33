//! Query text normalization shared by the resolvers and the router.

/// Lowercased word tokens with surrounding punctuation removed.
///
/// A leading `$` is kept so amounts stay distinguishable from years,
/// and interior `-` is kept so ISO dates stay one token.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|word| {
            if word == "-" || word == "–" {
                return Some("-".to_string());
            }
            let trimmed = word
                .trim_start_matches(|c: char| !(c.is_alphanumeric() || c == '$'))
                .trim_end_matches(|c: char| !c.is_alphanumeric());
            // possessive: "november's"
            let trimmed = trimmed.strip_suffix("'s").unwrap_or(trimmed);
            (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
        })
        .collect()
}

/// Whether `phrase` (already tokenized) occurs as a contiguous run in `tokens`.
pub fn contains_phrase(tokens: &[String], phrase: &[&str]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(phrase.len())
        .any(|w| w.iter().zip(phrase).all(|(a, b)| a == b))
}

/// Whether any single-word keyword or multi-word phrase from `list` occurs.
pub fn contains_any(tokens: &[String], list: &[&str]) -> bool {
    list.iter().any(|entry| {
        let parts: Vec<&str> = entry.split(' ').collect();
        contains_phrase(tokens, &parts)
    })
}
