use super::types::AdvisoryContext;

pub const SYSTEM_PROMPT: &str =
    "You are an expert roof calculation assistant. Always respond with valid JSON only, no markdown formatting or code blocks.";

/// JSON schema of the advisory reply. Embedded in the prompt as guidance;
/// the reply is validated independently on our side.
pub fn advisory_result_json_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "materials_needed": {
                "type": "object",
                "description": "Map of unit name (bundles, sheets, tiles, rolls, boxes...) to the whole number of units needed",
                "minProperties": 1,
                "additionalProperties": {"type": "number", "exclusiveMinimum": 0}
            },
            "cost_estimate": {
                "type": "object",
                "properties": {
                    "material_cost": {"type": "number"},
                    "labor_cost": {"type": "number"},
                    "total_cost": {"type": "number"},
                    "cost_per_unit_area": {"type": "number"}
                },
                "required": ["material_cost", "labor_cost", "total_cost"],
                "additionalProperties": {"type": "number"}
            },
            "recommendations": {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 3,
                "maxItems": 5
            },
            "confidence_score": {
                "type": "number",
                "minimum": 0,
                "maximum": 1
            }
        },
        "required": ["materials_needed", "cost_estimate", "recommendations", "confidence_score"]
    })
}

/// Build the user prompt for one advisory request.
pub fn build_advisory_prompt(context: &AdvisoryContext) -> String {
    let req = &context.request;

    let mut knowledge = String::from("Roof calculation knowledge base:\n");
    if context.snippets.is_empty() {
        knowledge.push_str("- (no relevant entries)\n");
    }
    for snippet in &context.snippets {
        knowledge.push_str(&format!("- {}\n", snippet.content));
    }

    let slope = if req.slope > 0.0 {
        format!("{}/12 pitch", req.slope)
    } else {
        "not specified".to_string()
    };
    let location = req.location.as_deref().unwrap_or("not specified");
    let schema = serde_json::to_string_pretty(&advisory_result_json_schema())
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are an expert roof calculator. Use the provided knowledge base to calculate materials and costs.

{knowledge}
Calculate for this roof:
- Dimensions: {length}ft x {width}ft ({area} sq ft)
- Roof Type: {roof_type}
- Material: {material}
- Complexity: {complexity}
- Slope: {slope}
- Location: {location}

RULES:
- materials_needed maps unit names to quantities. Use whole numbers.
- cost_estimate must include material_cost, labor_cost and total_cost, with total_cost = material_cost + labor_cost.
- Give 3 to 5 short, practical recommendations.
- confidence_score is your confidence in the estimate, between 0 and 1.
- Be precise and use the knowledge base information.

Return a JSON object matching this schema:
{schema}"#,
        length = req.length,
        width = req.width,
        area = req.area(),
        roof_type = req.roof_type,
        material = req.material_type,
        complexity = req.complexity,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{CalculationRequest, Complexity, MaterialType, RoofType};
    use crate::knowledge::default_knowledge;

    fn context() -> AdvisoryContext {
        let request = CalculationRequest::new(40.0, 25.0, RoofType::Hip, MaterialType::Tiles)
            .with_slope(6.0)
            .with_complexity(Complexity::Moderate)
            .with_location("Kigali");
        let snippets = default_knowledge()
            .into_iter()
            .filter(|k| k.material == "tiles")
            .collect();
        AdvisoryContext::new(request, snippets)
    }

    #[test]
    fn test_prompt_includes_request_fields() {
        let prompt = build_advisory_prompt(&context());
        assert!(prompt.contains("40ft x 25ft (1000 sq ft)"));
        assert!(prompt.contains("Roof Type: hip"));
        assert!(prompt.contains("Material: tiles"));
        assert!(prompt.contains("Complexity: moderate"));
        assert!(prompt.contains("Slope: 6/12 pitch"));
        assert!(prompt.contains("Location: Kigali"));
        assert!(prompt.contains("confidence_score"));
    }

    #[test]
    fn test_prompt_includes_snippets() {
        let ctx = context();
        let prompt = build_advisory_prompt(&ctx);
        for snippet in &ctx.snippets {
            assert!(prompt.contains(&snippet.content));
        }
    }

    #[test]
    fn test_prompt_without_snippets_or_slope() {
        let request = CalculationRequest::new(10.0, 10.0, RoofType::Flat, MaterialType::Membrane);
        let prompt = build_advisory_prompt(&AdvisoryContext::new(request, vec![]));
        assert!(prompt.contains("(no relevant entries)"));
        assert!(prompt.contains("Slope: not specified"));
        assert!(prompt.contains("Location: not specified"));
    }

    #[test]
    fn test_schema_requires_result_fields() {
        let schema = advisory_result_json_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
        assert!(required.contains(&serde_json::json!("confidence_score")));
    }
}
