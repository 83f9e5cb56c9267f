use std::path::Path;

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::HistoryError;
use crate::estimator::{
    CalculationRequest, CalculationResult, Complexity, MaterialType, RoofType, Source,
};

use super::types::{CalculationRecord, CalculationStats, Feedback, MaterialStats, SourceStats};

/// Write/read contract for calculation history.
pub trait HistoryStore {
    /// Store a finished calculation. Returns the record id.
    fn save(
        &self,
        user_key: &str,
        request: &CalculationRequest,
        result: &CalculationResult,
    ) -> Result<i64, HistoryError>;

    /// A user's records, newest first.
    fn recent(&self, user_key: &str, limit: usize) -> Result<Vec<CalculationRecord>, HistoryError>;
}

/// SQLite store for calculation history and feedback.
/// All operations are synchronous (rusqlite is blocking).
/// Callers in async contexts should use `tokio::task::spawn_blocking`.
pub struct CalculationHistory {
    conn: Connection,
}

const RECORD_COLUMNS: &str = "id, user_key, created_at, length, width, roof_type, material_type,
    location, slope, complexity, materials_needed, cost_estimate, recommendations,
    confidence_score, calculation_source, substituted_factors";

impl CalculationHistory {
    /// Create or open the history database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HistoryError::Open(format!("Failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(db_path).map_err(|e| HistoryError::Open(e.to_string()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS roof_calculations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_key TEXT NOT NULL,
                length REAL NOT NULL,
                width REAL NOT NULL,
                roof_type TEXT NOT NULL,
                material_type TEXT NOT NULL,
                location TEXT,
                slope REAL NOT NULL DEFAULT 0.0,
                complexity TEXT NOT NULL DEFAULT 'simple',
                materials_needed TEXT NOT NULL,
                cost_estimate TEXT NOT NULL,
                recommendations TEXT NOT NULL,
                confidence_score REAL NOT NULL,
                calculation_source TEXT NOT NULL,
                substituted_factors TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_calc_user ON roof_calculations(user_key);
            CREATE INDEX IF NOT EXISTS idx_calc_created ON roof_calculations(created_at DESC);
            CREATE TABLE IF NOT EXISTS calculation_feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                calculation_id INTEGER NOT NULL REFERENCES roof_calculations(id),
                rating INTEGER NOT NULL,
                comments TEXT,
                actual_cost REAL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;

        info!("Opened calculation history database at {:?}", db_path);
        Ok(Self { conn })
    }

    /// Record a finished calculation. Returns the new record id.
    pub fn record_calculation(
        &self,
        user_key: &str,
        request: &CalculationRequest,
        result: &CalculationResult,
    ) -> Result<i64, HistoryError> {
        let materials_json = serde_json::to_string(&result.materials_needed)?;
        let costs_json = serde_json::to_string(&result.cost_estimate)?;
        let recs_json = serde_json::to_string(&result.recommendations)?;
        let substitution_json = result
            .substituted_factors
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO roof_calculations
             (user_key, length, width, roof_type, material_type, location, slope, complexity,
              materials_needed, cost_estimate, recommendations, confidence_score, calculation_source,
              substituted_factors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                user_key,
                request.length,
                request.width,
                request.roof_type.as_key(),
                request.material_type.as_key(),
                request.location,
                request.slope,
                request.complexity.as_key(),
                materials_json,
                costs_json,
                recs_json,
                result.confidence_score,
                result.source.as_str(),
                substitution_json,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        info!(
            "Recorded calculation {} for user '{}' (source {})",
            id, user_key, result.source
        );
        Ok(id)
    }

    /// A user's calculations, newest first.
    pub fn list_calculations(
        &self,
        user_key: &str,
        limit: usize,
    ) -> Result<Vec<CalculationRecord>, HistoryError> {
        let sql = format!(
            "SELECT {} FROM roof_calculations WHERE user_key = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_key, limit as i64], RawRecord::from_row)?;

        let raw = rows.collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRecord::into_record).collect()
    }

    pub fn get_calculation(&self, id: i64) -> Result<CalculationRecord, HistoryError> {
        let sql = format!("SELECT {} FROM roof_calculations WHERE id = ?1", RECORD_COLUMNS);
        let raw = self
            .conn
            .query_row(&sql, params![id], RawRecord::from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => HistoryError::NotFound(id),
                other => HistoryError::Query(other),
            })?;
        raw.into_record()
    }

    /// Attach feedback to a stored calculation. Returns the feedback id.
    ///
    /// The rating is not range-checked here; callers validate `Feedback` first.
    pub fn record_feedback(
        &self,
        calculation_id: i64,
        feedback: &Feedback,
    ) -> Result<i64, HistoryError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM roof_calculations WHERE id = ?1)",
            params![calculation_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(HistoryError::NotFound(calculation_id));
        }

        self.conn.execute(
            "INSERT INTO calculation_feedback (calculation_id, rating, comments, actual_cost)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                calculation_id,
                feedback.rating,
                feedback.comments,
                feedback.actual_cost
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        info!(
            "Recorded feedback {} (rating {}) for calculation {}",
            id, feedback.rating, calculation_id
        );
        Ok(id)
    }

    /// Feedback for a calculation, oldest first.
    pub fn feedback_for(&self, calculation_id: i64) -> Result<Vec<Feedback>, HistoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT rating, comments, actual_cost FROM calculation_feedback
             WHERE calculation_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![calculation_id], |row| {
            Ok(Feedback {
                rating: row.get(0)?,
                comments: row.get(1)?,
                actual_cost: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Activity over the last 30 days.
    pub fn stats(&self) -> Result<CalculationStats, HistoryError> {
        const WINDOW: &str = "created_at > datetime('now', '-30 days')";

        let (total_calculations, unique_users): (i64, i64) = self.conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT user_key) FROM roof_calculations WHERE {}",
                WINDOW
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT calculation_source, COUNT(*) AS n, AVG(confidence_score)
             FROM roof_calculations WHERE {}
             GROUP BY calculation_source ORDER BY n DESC, calculation_source",
            WINDOW
        ))?;
        let by_source = stmt
            .query_map([], |row| {
                Ok(SourceStats {
                    source: row.get(0)?,
                    count: row.get(1)?,
                    avg_confidence: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT material_type, COUNT(*) AS n
             FROM roof_calculations WHERE {}
             GROUP BY material_type ORDER BY n DESC, material_type",
            WINDOW
        ))?;
        let by_material = stmt
            .query_map([], |row| {
                Ok(MaterialStats {
                    material_type: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CalculationStats {
            total_calculations,
            unique_users,
            by_source,
            by_material,
        })
    }
}

impl HistoryStore for CalculationHistory {
    fn save(
        &self,
        user_key: &str,
        request: &CalculationRequest,
        result: &CalculationResult,
    ) -> Result<i64, HistoryError> {
        self.record_calculation(user_key, request, result)
    }

    fn recent(&self, user_key: &str, limit: usize) -> Result<Vec<CalculationRecord>, HistoryError> {
        self.list_calculations(user_key, limit)
    }
}

/// Row as stored, before the JSON columns are decoded.
struct RawRecord {
    id: i64,
    user_key: String,
    created_at: String,
    length: f64,
    width: f64,
    roof_type: String,
    material_type: String,
    location: Option<String>,
    slope: f64,
    complexity: String,
    materials_needed: String,
    cost_estimate: String,
    recommendations: String,
    confidence_score: f64,
    source: String,
    substituted_factors: Option<String>,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_key: row.get(1)?,
            created_at: row.get(2)?,
            length: row.get(3)?,
            width: row.get(4)?,
            roof_type: row.get(5)?,
            material_type: row.get(6)?,
            location: row.get(7)?,
            slope: row.get(8)?,
            complexity: row.get(9)?,
            materials_needed: row.get(10)?,
            cost_estimate: row.get(11)?,
            recommendations: row.get(12)?,
            confidence_score: row.get(13)?,
            source: row.get(14)?,
            substituted_factors: row.get(15)?,
        })
    }

    fn into_record(self) -> Result<CalculationRecord, HistoryError> {
        let source: Source = serde_json::from_value(serde_json::Value::String(self.source))?;
        Ok(CalculationRecord {
            id: self.id,
            user_key: self.user_key,
            created_at: self.created_at,
            request: CalculationRequest {
                length: self.length,
                width: self.width,
                roof_type: RoofType::from_str(&self.roof_type),
                material_type: MaterialType::from_str(&self.material_type),
                location: self.location,
                slope: self.slope,
                complexity: Complexity::from_str(&self.complexity),
            },
            result: CalculationResult {
                materials_needed: serde_json::from_str(&self.materials_needed)?,
                cost_estimate: serde_json::from_str(&self.cost_estimate)?,
                recommendations: serde_json::from_str(&self.recommendations)?,
                confidence_score: self.confidence_score,
                source,
                substituted_factors: self
                    .substituted_factors
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?,
            },
        })
    }
}
