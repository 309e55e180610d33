//! Category knowledge base: groups with their subcategories.

use crate::error::AgentError;
use crate::models::{CategoryKind, CategoryRef};
use crate::Result;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const BUILTIN_KB: &str = include_str!("../../data/categories_kb.json");

#[derive(Debug, Clone, Deserialize)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, Deserialize)]
struct KnowledgeBaseFile {
    groups: Vec<CategoryGroup>,
}

/// A category together with the texts it is indexed under.
#[derive(Debug, Clone)]
pub struct CategoryEntry {
    pub category: CategoryRef,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryKnowledgeBase {
    groups: Vec<CategoryGroup>,
    by_id: HashMap<String, CategoryRef>,
}

impl CategoryKnowledgeBase {
    /// The knowledge base shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_KB)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: KnowledgeBaseFile = serde_json::from_str(raw)
            .map_err(|e| AgentError::KnowledgeBase(format!("invalid knowledge base: {}", e)))?;
        Self::from_groups(file.groups)
    }

    pub fn from_groups(groups: Vec<CategoryGroup>) -> Result<Self> {
        if groups.is_empty() {
            return Err(AgentError::KnowledgeBase("knowledge base has no groups".to_string()));
        }

        let mut by_id = HashMap::new();
        let mut seen = HashSet::new();

        for group in &groups {
            if !seen.insert(group.id.clone()) {
                return Err(AgentError::KnowledgeBase(format!("duplicate category id {}", group.id)));
            }
            by_id.insert(
                group.id.clone(),
                CategoryRef {
                    id: group.id.clone(),
                    name: group.name.clone(),
                    kind: CategoryKind::Group,
                    parent_group_id: None,
                },
            );

            for sub in &group.subcategories {
                if !seen.insert(sub.id.clone()) {
                    return Err(AgentError::KnowledgeBase(format!("duplicate category id {}", sub.id)));
                }
                by_id.insert(
                    sub.id.clone(),
                    CategoryRef {
                        id: sub.id.clone(),
                        name: sub.name.clone(),
                        kind: CategoryKind::Subcategory,
                        parent_group_id: Some(group.id.clone()),
                    },
                );
            }
        }

        Ok(Self { groups, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&CategoryRef> {
        self.by_id.get(id)
    }

    pub fn groups(&self) -> &[CategoryGroup] {
        &self.groups
    }

    /// Number of groups plus subcategories.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every category with its name and example phrases.
    pub fn entries(&self) -> Vec<CategoryEntry> {
        let mut entries = Vec::with_capacity(self.by_id.len());

        for group in &self.groups {
            if let Some(category) = self.by_id.get(&group.id) {
                entries.push(CategoryEntry {
                    category: category.clone(),
                    texts: indexed_texts(&group.name, &group.phrases),
                });
            }
            for sub in &group.subcategories {
                if let Some(category) = self.by_id.get(&sub.id) {
                    entries.push(CategoryEntry {
                        category: category.clone(),
                        texts: indexed_texts(&sub.name, &sub.phrases),
                    });
                }
            }
        }

        entries
    }
}

fn indexed_texts(name: &str, phrases: &[String]) -> Vec<String> {
    std::iter::once(name.to_string())
        .chain(phrases.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kb_loads() {
        let kb = CategoryKnowledgeBase::builtin().unwrap();
        assert!(kb.groups().len() >= 20);
        assert!(kb.len() >= 100);

        let dining = kb.get("CG800").unwrap();
        assert_eq!(dining.name, "Dining");
        assert_eq!(dining.kind, CategoryKind::Group);

        let cafes = kb.get("C806").unwrap();
        assert_eq!(cafes.parent_group_id.as_deref(), Some("CG800"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let raw = r#"{"groups": [
            {"id": "CG1", "name": "A", "subcategories": [{"id": "CG1", "name": "B"}]}
        ]}"#;
        assert!(matches!(
            CategoryKnowledgeBase::from_json(raw),
            Err(AgentError::KnowledgeBase(_))
        ));
    }

    #[test]
    fn test_entries_include_name_and_phrases() {
        let kb = CategoryKnowledgeBase::builtin().unwrap();
        let entries = kb.entries();
        let dining = entries.iter().find(|e| e.category.id == "CG800").unwrap();
        assert_eq!(dining.texts[0], "Dining");
        assert!(dining.texts.iter().any(|t| t == "eating out"));
    }
}
