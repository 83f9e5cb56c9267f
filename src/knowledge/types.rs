use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

/// One knowledge-base snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub content: String,
    /// materials, calculations, accessories, labor, pricing
    pub category: String,
    /// Material key, or "general" for material-independent entries
    pub material: String,
}

/// Search hit with its match score.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeMatch {
    pub item: KnowledgeItem,
    pub score: f32,
}

/// Read side of the knowledge store, as seen by the orchestrator.
pub trait KnowledgeSource: Send + Sync {
    /// Up to `limit` snippets relevant to `query`, best first.
    fn lookup(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeItem>, KnowledgeError>;
}
