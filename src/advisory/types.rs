//! Advisory request context and typed validation of advisory replies.
//!
//! Advisory services answer with free-form JSON. Nothing from that JSON is
//! trusted until `map_response_to_result` has checked it against the
//! `CalculationResult` shape; any mismatch is an `AdvisoryError::Schema` and
//! the orchestrator falls back to the deterministic estimate.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::AdvisoryError;
use crate::estimator::{
    CalculationRequest, CalculationResult, CostEstimate, Source, MAX_RECOMMENDATIONS,
};
use crate::knowledge::KnowledgeItem;

/// Fewest recommendations a reply may carry.
const MIN_RECOMMENDATIONS: usize = 3;

/// Everything an advisory service is told about one request.
#[derive(Debug, Clone)]
pub struct AdvisoryContext {
    pub request: CalculationRequest,
    /// Knowledge snippets, best match first (at most five)
    pub snippets: Vec<KnowledgeItem>,
}

impl AdvisoryContext {
    pub fn new(request: CalculationRequest, snippets: Vec<KnowledgeItem>) -> Self {
        Self { request, snippets }
    }

    pub fn knowledge_ids(&self) -> Vec<String> {
        self.snippets.iter().map(|s| s.id.clone()).collect()
    }
}

/// Strip markdown code fences from an LLM reply if present.
pub(crate) fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let after_open = match trimmed.find('\n') {
            Some(pos) => &trimmed[pos + 1..],
            None => trimmed.trim_start_matches('`'),
        };
        let cleaned = after_open.trim_end();
        match cleaned.strip_suffix("```") {
            Some(inner) => inner.trim().to_string(),
            None => cleaned.to_string(),
        }
    } else {
        trimmed.to_string()
    }
}

/// Parse raw advisory reply text into a result tagged `advisory`.
///
/// `area` is the plan area of the request, used when the reply omits
/// `cost_per_unit_area`.
pub fn parse_advisory_response(text: &str, area: f64) -> Result<CalculationResult, AdvisoryError> {
    let cleaned = strip_markdown_json(text);
    let json: Value = serde_json::from_str(&cleaned).map_err(|e| {
        let truncated: String = cleaned.chars().take(500).collect();
        AdvisoryError::Parse(format!("{} (first 500 chars: {})", e, truncated))
    })?;
    map_response_to_result(&json, area)
}

/// Check reply JSON against the result shape and build a typed result.
pub fn map_response_to_result(json: &Value, area: f64) -> Result<CalculationResult, AdvisoryError> {
    let obj = json
        .as_object()
        .ok_or_else(|| schema("reply is not a JSON object"))?;

    let materials_needed = parse_materials(
        obj.get("materials_needed")
            .ok_or_else(|| schema("missing 'materials_needed'"))?,
    )?;
    let cost_estimate = parse_costs(
        obj.get("cost_estimate")
            .ok_or_else(|| schema("missing 'cost_estimate'"))?,
        area,
    )?;
    let recommendations = parse_recommendations(obj.get("recommendations"))?;

    let confidence_score = obj
        .get("confidence_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| schema("missing or non-numeric 'confidence_score'"))?;
    if !(0.0..=1.0).contains(&confidence_score) {
        return Err(schema(&format!(
            "confidence_score {} outside [0, 1]",
            confidence_score
        )));
    }

    Ok(CalculationResult {
        materials_needed,
        cost_estimate,
        recommendations,
        confidence_score,
        source: Source::Advisory,
        substituted_factors: None,
    })
}

fn schema(msg: &str) -> AdvisoryError {
    AdvisoryError::Schema(msg.to_string())
}

fn parse_materials(value: &Value) -> Result<BTreeMap<String, u64>, AdvisoryError> {
    let obj = value
        .as_object()
        .ok_or_else(|| schema("'materials_needed' is not an object"))?;

    if obj.is_empty() {
        return Err(schema("'materials_needed' is empty"));
    }

    let mut materials = BTreeMap::new();
    for (key, v) in obj {
        let n = v.as_f64().ok_or_else(|| {
            schema(&format!("materials_needed.{} must be a number, got {}", key, v))
        })?;
        if !n.is_finite() || n <= 0.0 {
            return Err(schema(&format!(
                "materials_needed.{} must be positive, got {}",
                key, n
            )));
        }
        let quantity = n.ceil() as u64;
        materials.insert(key.clone(), quantity);
    }
    Ok(materials)
}

fn parse_costs(value: &Value, area: f64) -> Result<CostEstimate, AdvisoryError> {
    let obj = value
        .as_object()
        .ok_or_else(|| schema("'cost_estimate' is not an object"))?;

    let mut lines = BTreeMap::new();
    for (key, v) in obj {
        let n = v
            .as_f64()
            .ok_or_else(|| schema(&format!("cost_estimate.{} is not a number", key)))?;
        if !n.is_finite() || n < 0.0 {
            return Err(schema(&format!(
                "cost_estimate.{} must be non-negative, got {}",
                key, n
            )));
        }
        lines.insert(key.clone(), n);
    }

    let mut take = |key: &str| {
        lines
            .remove(key)
            .ok_or_else(|| schema(&format!("missing 'cost_estimate.{}'", key)))
    };
    let material_cost = take("material_cost")?;
    let labor_cost = take("labor_cost")?;
    let total_cost = take("total_cost")?;
    let cost_per_unit_area = match lines.remove("cost_per_unit_area") {
        Some(v) => v,
        None if area > 0.0 => total_cost / area,
        None => 0.0,
    };

    Ok(CostEstimate {
        material_cost,
        labor_cost,
        total_cost,
        cost_per_unit_area,
        extra: lines,
    })
}

fn parse_recommendations(value: Option<&Value>) -> Result<Vec<String>, AdvisoryError> {
    let value = value.ok_or_else(|| schema("missing 'recommendations'"))?;
    let arr = value
        .as_array()
        .ok_or_else(|| schema("'recommendations' is not an array"))?;

    let mut recs = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| schema("recommendations must be strings"))?;
        let s = s.trim();
        if !s.is_empty() {
            recs.push(s.to_string());
        }
    }
    if recs.len() < MIN_RECOMMENDATIONS {
        return Err(schema(&format!(
            "expected at least {} recommendations, got {}",
            MIN_RECOMMENDATIONS,
            recs.len()
        )));
    }
    recs.truncate(MAX_RECOMMENDATIONS);
    Ok(recs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_reply() -> Value {
        json!({
            "materials_needed": {"bundles": 37.2, "underlayment_rolls": 4, "ridge_cap_bundles": 1},
            "cost_estimate": {
                "material_cost": 1700.0,
                "labor_cost": 1300.0,
                "total_cost": 3000.0,
                "permits": 150.0
            },
            "recommendations": ["Use synthetic underlayment", "Install drip edge", "Check ventilation"],
            "confidence_score": 0.9
        })
    }

    #[test]
    fn test_map_valid_reply() {
        let result = map_response_to_result(&valid_reply(), 1000.0).unwrap();
        assert_eq!(result.source, Source::Advisory);
        assert_eq!(result.materials_needed["bundles"], 38);
        assert_eq!(result.materials_needed["underlayment_rolls"], 4);
        assert_eq!(result.materials_needed["ridge_cap_bundles"], 1);
        assert_eq!(result.cost_estimate.total_cost, 3000.0);
        assert_eq!(result.cost_estimate.cost_per_unit_area, 3.0);
        assert_eq!(result.cost_estimate.extra["permits"], 150.0);
        assert_eq!(result.recommendations.len(), 3);
        assert_eq!(result.confidence_score, 0.9);
    }

    #[test]
    fn test_missing_cost_field_is_schema_error() {
        let mut reply = valid_reply();
        reply["cost_estimate"]
            .as_object_mut()
            .unwrap()
            .remove("labor_cost");
        let err = map_response_to_result(&reply, 1000.0).unwrap_err();
        assert!(matches!(err, AdvisoryError::Schema(ref m) if m.contains("labor_cost")));
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let mut reply = valid_reply();
        reply["confidence_score"] = json!(1.7);
        assert!(matches!(
            map_response_to_result(&reply, 1000.0),
            Err(AdvisoryError::Schema(_))
        ));

        reply.as_object_mut().unwrap().remove("confidence_score");
        assert!(matches!(
            map_response_to_result(&reply, 1000.0),
            Err(AdvisoryError::Schema(_))
        ));
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let mut reply = valid_reply();
        reply["materials_needed"]["bundles"] = json!(-3);
        assert!(matches!(
            map_response_to_result(&reply, 1000.0),
            Err(AdvisoryError::Schema(_))
        ));
    }

    #[test]
    fn test_text_quantity_rejected() {
        let mut reply = valid_reply();
        reply["materials_needed"]["bundles"] = json!("about forty");
        let err = map_response_to_result(&reply, 1000.0).unwrap_err();
        assert!(matches!(err, AdvisoryError::Schema(ref m) if m.contains("bundles")));
    }

    #[test]
    fn test_empty_materials_rejected() {
        let mut reply = valid_reply();
        reply["materials_needed"] = json!({});
        assert!(matches!(
            map_response_to_result(&reply, 1000.0),
            Err(AdvisoryError::Schema(_))
        ));
    }

    #[test]
    fn test_recommendations_required() {
        let mut reply = valid_reply();
        reply.as_object_mut().unwrap().remove("recommendations");
        let err = map_response_to_result(&reply, 1000.0).unwrap_err();
        assert!(matches!(err, AdvisoryError::Schema(ref m) if m.contains("recommendations")));

        reply["recommendations"] = json!([]);
        assert!(matches!(
            map_response_to_result(&reply, 1000.0),
            Err(AdvisoryError::Schema(_))
        ));

        // Blank lines do not count
        reply["recommendations"] = json!(["Install drip edge", "  ", "Check ventilation"]);
        assert!(matches!(
            map_response_to_result(&reply, 1000.0),
            Err(AdvisoryError::Schema(_))
        ));
    }

    #[test]
    fn test_non_string_recommendation_rejected() {
        let mut reply = valid_reply();
        reply["recommendations"] = json!(["ok", 42]);
        assert!(matches!(
            map_response_to_result(&reply, 1000.0),
            Err(AdvisoryError::Schema(_))
        ));
    }

    #[test]
    fn test_recommendations_truncated_to_five() {
        let mut reply = valid_reply();
        reply["recommendations"] = json!(["a", "b", "c", "d", "e", "f", "g"]);
        let result = map_response_to_result(&reply, 1000.0).unwrap();
        assert_eq!(result.recommendations, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_parse_fenced_reply() {
        let text = format!("```json\n{}\n```", valid_reply());
        let result = parse_advisory_response(&text, 1000.0).unwrap();
        assert_eq!(result.cost_estimate.material_cost, 1700.0);
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let err = parse_advisory_response("Sorry, I can't help with that.", 1000.0).unwrap_err();
        assert!(matches!(err, AdvisoryError::Parse(_)));

        let err = parse_advisory_response("[1, 2, 3]", 1000.0).unwrap_err();
        assert!(matches!(err, AdvisoryError::Schema(_)));
    }

    #[test]
    fn test_strip_markdown_json() {
        assert_eq!(strip_markdown_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_json("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_markdown_json("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_context_knowledge_ids() {
        let request = CalculationRequest::new(
            40.0,
            25.0,
            crate::estimator::RoofType::Gable,
            crate::estimator::MaterialType::Shingles,
        );
        let snippets = crate::knowledge::default_knowledge().into_iter().take(2).collect();
        let ctx = AdvisoryContext::new(request, snippets);
        assert_eq!(ctx.knowledge_ids(), vec!["metal_sheets_basic", "shingles_coverage"]);
    }
}
