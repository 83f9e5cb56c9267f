//! Roofing knowledge snippets used as advisory context.
//!
//! Entries live in a SQLite catalog (seeded from `config/roof_knowledge.toml`)
//! and are served from an in-memory `KnowledgeBase` that can be swapped out
//! wholesale while lookups continue against the previous snapshot.

mod base;
mod catalog;
mod types;

pub use base::{default_knowledge, KnowledgeBase};
pub use catalog::KnowledgeCatalog;
pub use types::{KnowledgeItem, KnowledgeMatch, KnowledgeSource};
