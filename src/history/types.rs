use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::estimator::{CalculationRequest, CalculationResult};

/// One stored calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationRecord {
    pub id: i64,
    pub user_key: String,
    pub created_at: String,
    pub request: CalculationRequest,
    pub result: CalculationResult,
}

/// User feedback on a stored calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// 1 (poor) to 5 (excellent)
    pub rating: i64,
    #[serde(default)]
    pub comments: Option<String>,
    /// What the job actually cost, if reported
    #[serde(default)]
    pub actual_cost: Option<f64>,
}

impl Feedback {
    pub fn new(rating: i64) -> Self {
        Self {
            rating,
            comments: None,
            actual_cost: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=5).contains(&self.rating) {
            return Err(ValidationError::InvalidRating(self.rating));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub source: String,
    pub count: i64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialStats {
    pub material_type: String,
    pub count: i64,
}

/// Calculation activity over the last 30 days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationStats {
    pub total_calculations: i64,
    pub unique_users: i64,
    pub by_source: Vec<SourceStats>,
    /// Most requested first
    pub by_material: Vec<MaterialStats>,
}
