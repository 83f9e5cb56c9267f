//! Estimate command: orchestrate, record, and format.
//!
//! Recording the calculation and bumping knowledge usage are best effort. A
//! computed result is always returned, with `calculation_id` left empty when
//! it could not be stored.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::error::RoofMateError;
use crate::estimator::{CalculationRequest, CalculationResult};
use crate::history::{CalculationHistory, HistoryStore};
use crate::knowledge::KnowledgeCatalog;
use crate::orchestrator::Strategy;

use super::blocking;

/// Display currency for formatted costs.
const CURRENCY: &str = "RWF";
/// Costs are estimated in thousands of the display currency.
const DISPLAY_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Serialize)]
pub struct EstimateResponse {
    #[serde(flatten)]
    pub result: CalculationResult,
    pub area: f64,
    pub strategy: String,
    pub calculation_id: Option<i64>,
    pub formatted_costs: BTreeMap<String, String>,
}

/// Estimate a roof for `user_key` with the given strategy.
///
/// Fails only with `RoofMateError::Validation` for a bad request.
pub async fn run_estimate(
    ctx: &AppContext,
    user_key: &str,
    request: CalculationRequest,
    strategy: Strategy,
) -> Result<EstimateResponse, RoofMateError> {
    let run = ctx.orchestrator.run(&request, strategy).await?;
    let result = run.result;

    let calculation_id = {
        let history_db = ctx.history_db().to_path_buf();
        let user_key = user_key.to_string();
        let request = request.clone();
        let result = result.clone();
        blocking(move || {
            let store = CalculationHistory::new(&history_db)?;
            Ok(record_calculation(&store, &user_key, &request, &result))
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Could not open calculation history, result not recorded: {}", e);
            None
        })
    };

    if !run.knowledge_ids.is_empty() {
        let knowledge_db = ctx.knowledge_db().to_path_buf();
        let ids = run.knowledge_ids;
        let outcome = blocking(move || {
            let catalog = KnowledgeCatalog::new(&knowledge_db)?;
            Ok(catalog.increment_usage(&ids)?)
        })
        .await;
        if let Err(e) = outcome {
            warn!("Failed to update knowledge usage counts: {}", e);
        }
    }

    info!(
        "Estimate for '{}': source={}, total_cost={:.2}, calculation_id={:?}",
        user_key, result.source, result.cost_estimate.total_cost, calculation_id
    );

    Ok(EstimateResponse {
        formatted_costs: format_costs(&result),
        area: request.area(),
        strategy: strategy.to_string(),
        calculation_id,
        result,
    })
}

/// Store a result, logging instead of failing.
pub fn record_calculation(
    store: &dyn HistoryStore,
    user_key: &str,
    request: &CalculationRequest,
    result: &CalculationResult,
) -> Option<i64> {
    match store.save(user_key, request, result) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Failed to record calculation for '{}': {}", user_key, e);
            None
        }
    }
}

/// Every cost line rendered for display, e.g. `RWF 1,234,000`.
pub fn format_costs(result: &CalculationResult) -> BTreeMap<String, String> {
    result
        .cost_estimate
        .lines()
        .into_iter()
        .map(|(key, value)| (key, format_rwf(value)))
        .collect()
}

/// Cost in thousands rendered in whole display units; fractions are cut.
pub fn format_rwf(value: f64) -> String {
    let scaled = (value * DISPLAY_SCALE).trunc() as i64;
    let digits = scaled.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if scaled < 0 { "-" } else { "" };
    format!("{} {}{}", CURRENCY, sign, grouped)
}
