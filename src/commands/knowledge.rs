//! Knowledge search and administration.

use tracing::info;

use crate::context::AppContext;
use crate::error::RoofMateError;
use crate::knowledge::{KnowledgeCatalog, KnowledgeItem, KnowledgeMatch};

use super::blocking;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Free-text search over the loaded knowledge base.
pub fn search_knowledge(ctx: &AppContext, query: &str, limit: Option<usize>) -> Vec<KnowledgeMatch> {
    let matches = ctx
        .knowledge
        .search(query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT));
    info!("Knowledge search '{}' returned {} matches", query, matches.len());
    matches
}

/// Catalog entries in a category, most used first. With a material, only
/// that material's and general entries.
pub async fn list_knowledge(
    ctx: &AppContext,
    category: &str,
    material: Option<&str>,
) -> Result<Vec<KnowledgeItem>, RoofMateError> {
    let db_path = ctx.knowledge_db().to_path_buf();
    let category = category.to_string();
    let material = material.map(|m| m.to_string());
    blocking(move || {
        let catalog = KnowledgeCatalog::new(&db_path)?;
        Ok(catalog.by_category(&category, material.as_deref())?)
    })
    .await
}

/// Insert or update a catalog entry, then swap the refreshed entry set into
/// the live knowledge base. Returns the new entry count.
pub async fn upsert_knowledge(ctx: &AppContext, item: KnowledgeItem) -> Result<usize, RoofMateError> {
    let db_path = ctx.knowledge_db().to_path_buf();
    let id = item.id.clone();
    let items = blocking(move || {
        let catalog = KnowledgeCatalog::new(&db_path)?;
        catalog.upsert(&item)?;
        Ok(catalog.all()?)
    })
    .await?;

    let count = items.len();
    ctx.knowledge.replace(items);
    info!("Upserted knowledge entry '{}'", id);
    Ok(count)
}
