//! Semantic index over the category knowledge base
//!
//! The built-in index uses a deterministic feature-hashing embedder (word
//! unigrams plus character trigrams) and cosine similarity. Any nearest
//! neighbour service can be plugged in through [`SemanticIndex`].

use super::knowledge_base::CategoryKnowledgeBase;
use crate::models::CategoryRef;
use crate::text::tokenize;
use crate::Result;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Tokens that carry no category meaning.
const IGNORED_TOKENS: &[&str] = &["and", "the", "of", "a", "an"];

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCategory {
    pub category: CategoryRef,
    pub score: f32,
}

/// Nearest-neighbour lookup from a phrase to categories.
///
/// Results are ordered by descending score. Implementations must be
/// deterministic for a fixed index and phrase.
#[async_trait::async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn search(&self, phrase: &str, top_k: usize) -> Result<Vec<ScoredCategory>>;
}

/// Sparse L2-normalised embedding keyed by feature hash.
///
/// Features are kept in key order so every sum runs in the same order and
/// scores are bit-identical between calls.
#[derive(Debug, Clone, Default)]
pub struct SparseVector(BTreeMap<u64, f32>);

impl SparseVector {
    pub fn cosine(&self, other: &SparseVector) -> f32 {
        let mut left = self.0.iter().peekable();
        let mut right = other.0.iter().peekable();
        let mut dot = 0.0f32;

        while let (Some((lk, lv)), Some((rk, rv))) = (left.peek(), right.peek()) {
            match lk.cmp(rk) {
                Ordering::Less => {
                    left.next();
                }
                Ordering::Greater => {
                    right.next();
                }
                Ordering::Equal => {
                    dot += *lv * *rv;
                    left.next();
                    right.next();
                }
            }
        }
        dot
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn embed(&self, text: &str) -> SparseVector {
        let mut features: BTreeMap<u64, f32> = BTreeMap::new();

        for token in tokenize(text) {
            if IGNORED_TOKENS.contains(&token.as_str()) {
                continue;
            }
            *features.entry(fnv1a(b'w', token.as_bytes())).or_insert(0.0) += WORD_WEIGHT;

            let padded: Vec<char> = std::iter::once('#')
                .chain(token.chars())
                .chain(std::iter::once('#'))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                *features.entry(fnv1a(b'c', trigram.as_bytes())).or_insert(0.0) += TRIGRAM_WEIGHT;
            }
        }

        let norm = features.values().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in features.values_mut() {
                *value /= norm;
            }
        }

        SparseVector(features)
    }
}

/// FNV-1a over a namespace byte followed by the feature text.
fn fnv1a(namespace: u8, bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in std::iter::once(&namespace).chain(bytes) {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

struct IndexedDocument {
    category: usize,
    vector: SparseVector,
}

/// In-memory index built once from the knowledge base and shared read-only.
pub struct VectorIndex {
    embedder: HashingEmbedder,
    categories: Vec<CategoryRef>,
    documents: Vec<IndexedDocument>,
}

impl VectorIndex {
    pub fn build(kb: &CategoryKnowledgeBase) -> Self {
        let embedder = HashingEmbedder;
        let mut categories = Vec::new();
        let mut documents = Vec::new();

        for entry in kb.entries() {
            let slot = categories.len();
            categories.push(entry.category);
            for text in entry.texts {
                let vector = embedder.embed(&text);
                if !vector.is_empty() {
                    documents.push(IndexedDocument { category: slot, vector });
                }
            }
        }

        debug!(
            categories = categories.len(),
            documents = documents.len(),
            "Category index built"
        );

        Self {
            embedder,
            categories,
            documents,
        }
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Best document score per category, sorted by score then id.
    pub fn rank(&self, phrase: &str) -> Vec<ScoredCategory> {
        let query = self.embedder.embed(phrase);
        if query.is_empty() {
            return Vec::new();
        }

        let mut best = vec![0.0f32; self.categories.len()];
        for doc in &self.documents {
            let score = query.cosine(&doc.vector);
            if score > best[doc.category] {
                best[doc.category] = score;
            }
        }

        let mut scored: Vec<ScoredCategory> = best
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .map(|(slot, score)| ScoredCategory {
                category: self.categories[slot].clone(),
                score,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.category.id.cmp(&b.category.id))
        });
        scored
    }
}

#[async_trait::async_trait]
impl SemanticIndex for VectorIndex {
    async fn search(&self, phrase: &str, top_k: usize) -> Result<Vec<ScoredCategory>> {
        let mut ranked = self.rank(phrase);
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VectorIndex {
        VectorIndex::build(&CategoryKnowledgeBase::builtin().unwrap())
    }

    #[test]
    fn test_embedding_is_normalised() {
        let v = HashingEmbedder.embed("coffee shops");
        assert!((v.cosine(&v) - 1.0).abs() < 1e-5);
        assert!(HashingEmbedder.embed("  ").is_empty());
    }

    #[test]
    fn test_exact_phrase_scores_highest() {
        let ranked = index().rank("dining");
        assert_eq!(ranked[0].category.id, "CG800");
        assert!((ranked[0].score - 1.0).abs() < 1e-5);
        assert!(ranked[0].score - ranked[1].score > 0.3);
    }

    #[test]
    fn test_ranking_is_deterministic_and_ordered() {
        let index = index();
        let first = index.rank("food");
        let second = index.rank("food");
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_scores_are_bit_identical_across_indexes() {
        let (a, b) = (index(), index());
        for phrase in ["food", "groceries", "coffee shops", "bars", "travel and hotels"] {
            let left: Vec<(String, u32)> = a
                .rank(phrase)
                .into_iter()
                .map(|s| (s.category.id, s.score.to_bits()))
                .collect();
            let right: Vec<(String, u32)> = b
                .rank(phrase)
                .into_iter()
                .map(|s| (s.category.id, s.score.to_bits()))
                .collect();
            assert_eq!(left, right, "{}", phrase);
        }

        let x = HashingEmbedder.embed("fast food restaurants");
        let y = HashingEmbedder.embed("food delivery");
        assert_eq!(x.cosine(&y).to_bits(), y.cosine(&x).to_bits());
    }

    #[tokio::test]
    async fn test_search_truncates_to_top_k() {
        let results = index().search("coffee shops", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].category.id, "C806");
    }
}
