//! SQLite-backed knowledge catalog.
//!
//! The catalog is the persistent source for the in-memory knowledge base:
//! it is seeded from the embedded defaults on first start, edited by
//! administrative operations, and tracks how often each entry is used in
//! advisory context.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;

use crate::error::KnowledgeError;

use super::types::KnowledgeItem;

/// All operations are synchronous (rusqlite is blocking).
/// Callers in async contexts should use `tokio::task::spawn_blocking`.
pub struct KnowledgeCatalog {
    conn: Connection,
}

impl KnowledgeCatalog {
    /// Open or create the catalog database.
    pub fn new(db_path: &Path) -> Result<Self, KnowledgeError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KnowledgeError::Unavailable(format!("Failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS roof_knowledge (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                knowledge_id TEXT UNIQUE NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL,
                material TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_knowledge_category ON roof_knowledge(category, material);",
        )?;

        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize, KnowledgeError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM roof_knowledge", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Insert or update an entry by its knowledge id.
    pub fn upsert(&self, item: &KnowledgeItem) -> Result<(), KnowledgeError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO roof_knowledge
             (knowledge_id, content, category, material, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(knowledge_id) DO UPDATE SET
                content = excluded.content,
                category = excluded.category,
                material = excluded.material,
                updated_at = excluded.updated_at",
            params![item.id, item.content, item.category, item.material, now],
        )?;
        Ok(())
    }

    /// Insert the given entries when the catalog is empty. Returns how many were added.
    pub fn seed_if_empty(&self, items: &[KnowledgeItem]) -> Result<usize, KnowledgeError> {
        if self.count()? > 0 {
            return Ok(0);
        }
        for item in items {
            self.upsert(item)?;
        }
        info!("Seeded knowledge catalog with {} entries", items.len());
        Ok(items.len())
    }

    /// Every entry, in insertion order.
    pub fn all(&self) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
        let mut stmt = self.conn.prepare(
            "SELECT knowledge_id, content, category, material FROM roof_knowledge ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_item)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Entries in a category, most used first. With a material, only entries
    /// for that material or "general" ones are returned.
    pub fn by_category(
        &self,
        category: &str,
        material: Option<&str>,
    ) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
        let items = match material {
            Some(material) => {
                let mut stmt = self.conn.prepare(
                    "SELECT knowledge_id, content, category, material FROM roof_knowledge
                     WHERE category = ?1 AND (material = ?2 OR material = 'general')
                     ORDER BY usage_count DESC, id",
                )?;
                let rows = stmt.query_map(params![category, material], row_to_item)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT knowledge_id, content, category, material FROM roof_knowledge
                     WHERE category = ?1
                     ORDER BY usage_count DESC, id",
                )?;
                let rows = stmt.query_map(params![category], row_to_item)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(items)
    }

    /// Bump usage counters for entries that went into an advisory prompt.
    pub fn increment_usage(&self, knowledge_ids: &[String]) -> Result<(), KnowledgeError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare(
            "UPDATE roof_knowledge SET usage_count = usage_count + 1, updated_at = ?1
             WHERE knowledge_id = ?2",
        )?;
        for id in knowledge_ids {
            stmt.execute(params![now, id])?;
        }
        Ok(())
    }

    pub fn usage_count(&self, knowledge_id: &str) -> Result<Option<i64>, KnowledgeError> {
        let result = self.conn.query_row(
            "SELECT usage_count FROM roof_knowledge WHERE knowledge_id = ?1",
            params![knowledge_id],
            |row| row.get(0),
        );
        match result {
            Ok(count) => Ok(Some(count)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    Ok(KnowledgeItem {
        id: row.get(0)?,
        content: row.get(1)?,
        category: row.get(2)?,
        material: row.get(3)?,
    })
}
