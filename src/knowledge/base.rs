//! In-memory knowledge base with keyword search.
//!
//! Readers take a cheap snapshot (`Arc` clone under a short read lock), so a
//! `replace` from an administrative refresh never stalls in-flight lookups;
//! they simply finish against the previous snapshot.

use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::info;

use crate::error::KnowledgeError;

use super::types::{KnowledgeItem, KnowledgeMatch, KnowledgeSource};

/// Seed entries embedded at compile time from `config/roof_knowledge.toml`.
const DEFAULT_KNOWLEDGE: &str = include_str!("../../config/roof_knowledge.toml");

#[derive(Deserialize)]
struct KnowledgeFile {
    items: Vec<KnowledgeItem>,
}

/// The knowledge entries embedded in the binary.
///
/// # Panics
/// Panics if the embedded TOML is invalid (this would be a compile-time bug).
pub fn default_knowledge() -> Vec<KnowledgeItem> {
    let file: KnowledgeFile =
        toml::from_str(DEFAULT_KNOWLEDGE).expect("embedded roof_knowledge.toml must be valid TOML");
    file.items
}

pub struct KnowledgeBase {
    items: RwLock<Arc<Vec<KnowledgeItem>>>,
}

impl KnowledgeBase {
    pub fn new(items: Vec<KnowledgeItem>) -> Self {
        Self {
            items: RwLock::new(Arc::new(items)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_knowledge())
    }

    pub fn snapshot(&self) -> Arc<Vec<KnowledgeItem>> {
        let guard = self.items.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new entry set. Lookups already running keep their snapshot.
    pub fn replace(&self, items: Vec<KnowledgeItem>) {
        let count = items.len();
        let mut guard = self.items.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(items);
        info!("Knowledge base replaced with {} entries", count);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keyword search. Returns matches sorted by score (best first); equal
    /// scores keep entry order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeMatch> {
        let query_words = tokenize(query);
        if query_words.is_empty() || limit == 0 {
            return vec![];
        }

        let snapshot = self.snapshot();
        let mut matches: Vec<KnowledgeMatch> = snapshot
            .iter()
            .filter_map(|item| {
                let score = compute_match_score(&query_words, item);
                if score > 0.0 {
                    Some(KnowledgeMatch {
                        item: item.clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        // sort_by is stable, so ties keep entry order
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        matches
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl KnowledgeSource for KnowledgeBase {
    fn lookup(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
        Ok(self
            .search(query, limit)
            .into_iter()
            .map(|m| m.item)
            .collect())
    }
}

/// Lowercase alphanumeric words of at least two characters.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '/')
        .filter(|w| w.len() >= 2)
        .map(|w| w.to_string())
        .collect()
}

/// Score an entry against query words. 0 means no query word matched.
fn compute_match_score(query_words: &[String], item: &KnowledgeItem) -> f32 {
    let search_text = format!(
        "{} {} {} {}",
        item.content,
        item.category,
        item.material.replace('_', " "),
        item.id.replace('_', " ")
    );
    let search_words = tokenize(&search_text);

    let mut total_score = 0.0;
    for qw in query_words {
        // Exact word match: high score
        if search_words.iter().any(|sw| sw == qw) {
            total_score += 10.0;
        }
        // Entry word starts with query word ("roof" -> "roofing")
        else if search_words.iter().any(|sw| sw.starts_with(qw.as_str())) {
            total_score += 8.0;
        }
        // Query word starts with entry word ("shingles" -> "shingle")
        else if search_words
            .iter()
            .any(|sw| sw.len() >= 4 && qw.starts_with(sw.as_str()))
        {
            total_score += 6.0;
        }
        // Substring
        else if qw.len() >= 4 && search_words.iter().any(|sw| sw.contains(qw.as_str())) {
            total_score += 4.0;
        }
    }

    if total_score == 0.0 {
        return 0.0;
    }

    // Bonus when the entry is specific to a material named in the query
    let material = item.material.to_lowercase();
    if material != "general" {
        let material_words = tokenize(&material.replace('_', " "));
        if material_words.iter().all(|mw| query_words.contains(mw)) {
            total_score += 15.0;
        }
    }

    total_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_knowledge_has_ten_entries() {
        let items = default_knowledge();
        assert_eq!(items.len(), 10);
        assert!(items.iter().any(|i| i.id == "shingles_coverage"));
        assert!(items.iter().all(|i| !i.content.is_empty()));
    }

    #[test]
    fn test_material_specific_entry_ranks_first() {
        let kb = KnowledgeBase::with_defaults();
        let matches = kb.search("shingles roof gable 40x25", 5);
        assert!(!matches.is_empty());
        assert_eq!(matches[0].item.id, "shingles_coverage");
        for window in matches.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }

    #[test]
    fn test_metal_sheets_query() {
        let kb = KnowledgeBase::with_defaults();
        let matches = kb.search("metal_sheets roof hip 30x20", 5);
        assert_eq!(matches[0].item.id, "metal_sheets_basic");
    }

    #[test]
    fn test_limit_respected() {
        let kb = KnowledgeBase::with_defaults();
        assert!(kb.search("roof", 3).len() <= 3);
        assert!(kb.search("roof", 0).is_empty());
    }

    #[test]
    fn test_no_match_returns_empty() {
        let kb = KnowledgeBase::with_defaults();
        assert!(kb.search("zzzz qqqq", 5).is_empty());
        assert!(kb.search("   ", 5).is_empty());
    }

    #[test]
    fn test_replace_swaps_entries_without_touching_old_snapshot() {
        let kb = KnowledgeBase::with_defaults();
        let before = kb.snapshot();

        kb.replace(vec![KnowledgeItem {
            id: "slate_basics".to_string(),
            content: "Slate roofing lasts over 100 years.".to_string(),
            category: "materials".to_string(),
            material: "slate".to_string(),
        }]);

        assert_eq!(before.len(), 10);
        assert_eq!(kb.len(), 1);
        let hits = kb.lookup("slate roof", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "slate_basics");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Metal  roofing, 3/12!"), vec!["metal", "roofing", "3/12"]);
        assert!(tokenize("a b").is_empty());
    }
}
