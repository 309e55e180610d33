//! Category resolution
//!
//! Maps free-text category phrases ("dining", "coffee shops") onto canonical
//! category identifiers. A phrase is only auto-resolved when the best match
//! is both strong and clearly ahead of the runner-up; otherwise the top
//! candidates are handed back so the router can ask the customer.

pub mod index;
pub mod knowledge_base;

pub use index::{HashingEmbedder, ScoredCategory, SemanticIndex, VectorIndex};
pub use knowledge_base::{CategoryKnowledgeBase, CategoryGroup, Subcategory};

use crate::config::CategoryThresholds;
use crate::error::AgentError;
use crate::models::{CategoryMatch, CategoryRef};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PhraseResolution {
    Resolved {
        phrase: String,
        category: CategoryRef,
        matches: Vec<CategoryMatch>,
    },
    Unresolved {
        phrase: String,
        candidates: Vec<CategoryMatch>,
    },
}

impl PhraseResolution {
    pub fn into_result(self) -> Result<CategoryRef> {
        match self {
            PhraseResolution::Resolved { category, .. } => Ok(category),
            PhraseResolution::Unresolved { phrase, candidates } => Err(AgentError::UnresolvedCategory(
                format!("'{}' with {} candidate(s)", phrase, candidates.len()),
            )),
        }
    }
}

/// Outcome of resolving every category phrase of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryOutcome {
    /// Resolved categories, deduplicated, in mention order.
    pub resolved: Vec<CategoryRef>,
    /// Every ranked match considered, best score kept per category id.
    pub matches: Vec<CategoryMatch>,
    pub unresolved: Vec<(String, Vec<CategoryMatch>)>,
}

pub struct CategoryResolver {
    index: Arc<dyn SemanticIndex>,
    thresholds: CategoryThresholds,
    timeout: Duration,
}

impl CategoryResolver {
    pub fn new(index: Arc<dyn SemanticIndex>, thresholds: CategoryThresholds, timeout: Duration) -> Self {
        Self {
            index,
            thresholds,
            timeout,
        }
    }

    pub fn thresholds(&self) -> &CategoryThresholds {
        &self.thresholds
    }

    /// Ranked matches above the similarity floor, best first.
    pub async fn resolve(&self, phrase: &str, top_k: usize) -> Result<Vec<CategoryMatch>> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Ok(Vec::new());
        }

        let scored = tokio::time::timeout(self.timeout, self.index.search(phrase, top_k))
            .await
            .map_err(|_| AgentError::Timeout(format!("category search for '{}'", phrase)))??;

        Ok(scored
            .into_iter()
            .filter(|s| s.score >= self.thresholds.similarity_floor)
            .take(top_k)
            .enumerate()
            .map(|(rank, s)| CategoryMatch {
                query_phrase: phrase.to_string(),
                category: s.category,
                similarity_score: s.score,
                rank: rank + 1,
            })
            .collect())
    }

    /// Auto-resolve a phrase or return its candidates.
    pub async fn resolve_phrase(&self, phrase: &str) -> Result<PhraseResolution> {
        let matches = self.resolve(phrase, self.thresholds.top_k.max(2)).await?;

        let top = matches.first().map(|m| m.similarity_score).unwrap_or(0.0);
        let runner_up = matches.get(1).map(|m| m.similarity_score).unwrap_or(0.0);
        let confident = top >= self.thresholds.acceptance_threshold
            && (top - runner_up) >= self.thresholds.min_margin;

        debug!(
            phrase = phrase,
            top_score = top,
            margin = top - runner_up,
            confident = confident,
            "Category phrase scored"
        );

        match matches.first() {
            Some(best) if confident => Ok(PhraseResolution::Resolved {
                phrase: phrase.to_string(),
                category: best.category.clone(),
                matches,
            }),
            _ => {
                if matches.is_empty() {
                    warn!(phrase = phrase, "No category above similarity floor");
                }
                let mut candidates = matches;
                candidates.truncate(self.thresholds.top_k.clamp(2, 3));
                Ok(PhraseResolution::Unresolved {
                    phrase: phrase.to_string(),
                    candidates,
                })
            }
        }
    }

    /// Resolve several phrases independently and merge the results.
    pub async fn resolve_phrases(&self, phrases: &[String]) -> Result<CategoryOutcome> {
        let mut outcome = CategoryOutcome::default();

        for phrase in phrases {
            match self.resolve_phrase(phrase).await? {
                PhraseResolution::Resolved { category, matches, .. } => {
                    if !outcome.resolved.iter().any(|c| c.id == category.id) {
                        outcome.resolved.push(category);
                    }
                    merge_matches(&mut outcome.matches, matches);
                }
                PhraseResolution::Unresolved { phrase, candidates } => {
                    merge_matches(&mut outcome.matches, candidates.clone());
                    outcome.unresolved.push((phrase, candidates));
                }
            }
        }

        Ok(outcome)
    }
}

/// Keep the best score per category id; re-rank by score then id.
fn merge_matches(into: &mut Vec<CategoryMatch>, matches: Vec<CategoryMatch>) {
    for m in matches {
        match into.iter_mut().find(|existing| existing.category.id == m.category.id) {
            Some(existing) if existing.similarity_score < m.similarity_score => *existing = m,
            Some(_) => {}
            None => into.push(m),
        }
    }

    into.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.id.cmp(&b.category.id))
    });
    for (rank, m) in into.iter_mut().enumerate() {
        m.rank = rank + 1;
    }
}
