//! Commands for calculation history, feedback and statistics.

use tracing::info;

use crate::context::AppContext;
use crate::error::RoofMateError;
use crate::history::{CalculationHistory, CalculationRecord, CalculationStats, Feedback};

use super::blocking;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// List a user's calculations, newest first.
pub async fn list_history(
    ctx: &AppContext,
    user_key: &str,
    limit: Option<usize>,
) -> Result<Vec<CalculationRecord>, RoofMateError> {
    let db_path = ctx.history_db().to_path_buf();
    let user = user_key.to_string();
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let records = blocking(move || {
        let history = CalculationHistory::new(&db_path)?;
        Ok(history.list_calculations(&user, limit)?)
    })
    .await?;

    info!("Listed {} calculations for '{}'", records.len(), user_key);
    Ok(records)
}

pub async fn get_calculation(ctx: &AppContext, id: i64) -> Result<CalculationRecord, RoofMateError> {
    let db_path = ctx.history_db().to_path_buf();
    blocking(move || {
        let history = CalculationHistory::new(&db_path)?;
        Ok(history.get_calculation(id)?)
    })
    .await
}

/// Attach feedback to a calculation. The rating must be 1 to 5.
pub async fn submit_feedback(
    ctx: &AppContext,
    calculation_id: i64,
    feedback: Feedback,
) -> Result<i64, RoofMateError> {
    feedback.validate()?;

    let db_path = ctx.history_db().to_path_buf();
    blocking(move || {
        let history = CalculationHistory::new(&db_path)?;
        Ok(history.record_feedback(calculation_id, &feedback)?)
    })
    .await
}

/// Calculation activity over the last 30 days.
pub async fn calculation_stats(ctx: &AppContext) -> Result<CalculationStats, RoofMateError> {
    let db_path = ctx.history_db().to_path_buf();
    blocking(move || {
        let history = CalculationHistory::new(&db_path)?;
        Ok(history.stats()?)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::estimate::run_estimate;
    use crate::config::AppConfig;
    use crate::error::{HistoryError, ValidationError};
    use crate::estimator::{CalculationRequest, MaterialType, RoofType};
    use crate::orchestrator::Strategy;
    use tempfile::TempDir;

    fn test_context(dir: &TempDir) -> AppContext {
        let mut config = AppConfig::default();
        config.advisory.enabled = false;
        config.storage.data_dir = Some(dir.path().to_path_buf());
        AppContext::from_config(config).unwrap()
    }

    async fn estimate(ctx: &AppContext, user: &str, material: MaterialType) -> i64 {
        let request = CalculationRequest::new(12.0, 8.0, RoofType::Shed, material);
        run_estimate(ctx, user, request, Strategy::DeterministicOnly)
            .await
            .unwrap()
            .calculation_id
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);

        let first = estimate(&ctx, "alice", MaterialType::Shingles).await;
        let second = estimate(&ctx, "alice", MaterialType::Tiles).await;
        estimate(&ctx, "bob", MaterialType::Membrane).await;

        let records = list_history(&ctx, "alice", None).await.unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second, first]);

        let limited = list_history(&ctx, "alice", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);

        let record = get_calculation(&ctx, first).await.unwrap();
        assert_eq!(record.request.material_type, MaterialType::Shingles);
        assert_eq!(record.user_key, "alice");
    }

    #[tokio::test]
    async fn test_get_unknown_calculation() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        assert!(matches!(
            get_calculation(&ctx, 77).await,
            Err(RoofMateError::History(HistoryError::NotFound(77)))
        ));
    }

    #[tokio::test]
    async fn test_feedback_validation() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let id = estimate(&ctx, "alice", MaterialType::Shingles).await;

        assert!(matches!(
            submit_feedback(&ctx, id, Feedback::new(6)).await,
            Err(RoofMateError::Validation(ValidationError::InvalidRating(6)))
        ));
        assert!(matches!(
            submit_feedback(&ctx, id, Feedback::new(0)).await,
            Err(RoofMateError::Validation(_))
        ));
        assert!(matches!(
            submit_feedback(&ctx, id + 100, Feedback::new(3)).await,
            Err(RoofMateError::History(HistoryError::NotFound(_)))
        ));

        let feedback = Feedback {
            rating: 5,
            comments: Some("Spot on".to_string()),
            actual_cost: Some(310.0),
        };
        assert!(submit_feedback(&ctx, id, feedback).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        estimate(&ctx, "alice", MaterialType::Shingles).await;
        estimate(&ctx, "bob", MaterialType::Shingles).await;
        estimate(&ctx, "bob", MaterialType::MetalSheets).await;

        let stats = calculation_stats(&ctx).await.unwrap();
        assert_eq!(stats.total_calculations, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.by_material[0].material_type, "shingles");
        assert_eq!(stats.by_material[0].count, 2);
    }
}
