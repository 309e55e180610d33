//! Shared fixtures for unit tests.

use crate::category::{CategoryKnowledgeBase, ScoredCategory, SemanticIndex};
use crate::error::AgentError;
use crate::models::CategoryRef;
use crate::tools::InMemoryTransactionStore;
use crate::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

/// Index returning fixed scores per phrase; unknown phrases match nothing.
pub struct StubIndex {
    scores: HashMap<String, Vec<ScoredCategory>>,
    fail: bool,
}

impl StubIndex {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            fail: false,
        }
    }

    /// Index whose every search fails.
    pub fn failing() -> Self {
        Self {
            scores: HashMap::new(),
            fail: true,
        }
    }

    /// Register `phrase` with `(category id, score)` pairs taken from the
    /// built-in knowledge base.
    pub fn with(mut self, phrase: &str, scores: &[(&str, f32)]) -> Self {
        let kb = knowledge_base();
        let scored = scores
            .iter()
            .filter_map(|(id, score)| {
                kb.get(id).map(|category| ScoredCategory {
                    category: category.clone(),
                    score: *score,
                })
            })
            .collect();
        self.scores.insert(phrase.to_lowercase(), scored);
        self
    }

    /// "bars" scores below the acceptance threshold with three candidates;
    /// "dining" and "groceries" resolve cleanly.
    pub fn bars() -> Self {
        Self::new()
            .with("bars", &[("C801", 0.62), ("C803", 0.55), ("C10005", 0.48)])
            .with("dining", &[("CG800", 1.0), ("C803", 0.41)])
            .with("groceries", &[("CG10000", 1.0), ("C10001", 0.38)])
    }
}

impl Default for StubIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SemanticIndex for StubIndex {
    async fn search(&self, phrase: &str, top_k: usize) -> Result<Vec<ScoredCategory>> {
        if self.fail {
            return Err(AgentError::Timeout("stub index".to_string()));
        }
        let mut scored = self
            .scores
            .get(&phrase.trim().to_lowercase())
            .cloned()
            .unwrap_or_default();
        scored.truncate(top_k);
        Ok(scored)
    }
}

pub fn knowledge_base() -> CategoryKnowledgeBase {
    CategoryKnowledgeBase::builtin().unwrap()
}

pub fn category(id: &str) -> CategoryRef {
    knowledge_base().get(id).cloned().unwrap()
}

pub fn fixture_store() -> Arc<InMemoryTransactionStore> {
    Arc::new(InMemoryTransactionStore::demo().unwrap())
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Reference date used by the scenario tests (a Monday).
pub fn reference_date() -> NaiveDate {
    day(2025, 12, 1)
}
