//! Deterministic roof estimation engine.
//!
//! The `Estimator` maps a validated request to material units and a cost
//! breakdown using the factor table. It holds no mutable state, so one
//! instance can serve concurrent requests.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::ValidationError;

use super::factors::{default_factors, FactorTable, MaterialFactors};
use super::types::*;

/// Used only if the table has no bucket near the default pitch.
const DEFAULT_SLOPE_MULTIPLIER: f64 = 1.05;

/// Intermediate figures of one estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateBreakdown {
    pub area: f64,
    pub slope_multiplier: f64,
    pub complexity_multiplier: f64,
    pub adjusted_area: f64,
    /// Factor-table key actually used
    pub material_key: String,
    /// True when the requested material had no entry and the fallback set was used
    pub used_fallback_factors: bool,
    pub unit: String,
    pub units_needed: u64,
    pub waste_factor: f64,
}

pub struct Estimator {
    factors: FactorTable,
}

impl Estimator {
    pub fn new(factors: FactorTable) -> Self {
        Self { factors }
    }

    pub fn factors(&self) -> &FactorTable {
        &self.factors
    }

    /// Estimate materials and cost for a request.
    ///
    /// Fails only when the request does not validate; no partial result is
    /// produced in that case.
    pub fn estimate(&self, request: &CalculationRequest) -> Result<CalculationResult, ValidationError> {
        request.validate()?;

        let b = self.breakdown(request);
        let factors = self.lookup(&b.material_key);

        let material_cost = b.adjusted_area * factors.cost_per_unit_area;
        let labor_cost = material_cost * self.factors.defaults.labor_ratio;
        let cost_estimate = CostEstimate::from_parts(material_cost, labor_cost, b.area);

        let mut materials_needed = BTreeMap::new();
        materials_needed.insert(b.unit.clone(), b.units_needed);

        let substituted_factors = b.used_fallback_factors.then(|| FactorSubstitution {
            requested: request.material_type.to_string(),
            used: b.material_key.clone(),
        });
        let recommendations = self.recommendations(request, &b, substituted_factors.as_ref());

        debug!(
            "Estimated {} {} for {:.1} sq ft (adjusted {:.1}), total cost {:.2}",
            b.units_needed, b.unit, b.area, b.adjusted_area, cost_estimate.total_cost
        );

        Ok(CalculationResult {
            materials_needed,
            cost_estimate,
            recommendations,
            confidence_score: DETERMINISTIC_CONFIDENCE,
            source: Source::Deterministic,
            substituted_factors,
        })
    }

    /// Compute the intermediate figures for a request. Does not validate.
    pub fn breakdown(&self, request: &CalculationRequest) -> EstimateBreakdown {
        let area = request.area();
        let slope_multiplier = self.slope_multiplier(request.slope);
        let complexity_multiplier = self.complexity_multiplier(&request.complexity);
        let adjusted_area = area * slope_multiplier * complexity_multiplier;

        let requested = request.material_type.as_key();
        let used_fallback_factors = !self.factors.materials.contains_key(requested);
        let material_key = if used_fallback_factors {
            warn!(
                "No factor entry for material '{}', using '{}' factors",
                requested, self.factors.defaults.fallback_material
            );
            self.factors.defaults.fallback_material.clone()
        } else {
            requested.to_string()
        };

        let factors = self.lookup(&material_key);
        let raw_units = adjusted_area / factors.coverage_per_unit * (1.0 + factors.waste_factor);
        let units_needed = (raw_units.ceil() as u64).max(1);

        EstimateBreakdown {
            area,
            slope_multiplier,
            complexity_multiplier,
            adjusted_area,
            material_key,
            used_fallback_factors,
            unit: factors.unit.clone(),
            units_needed,
            waste_factor: factors.waste_factor,
        }
    }

    /// Multiplier of the pitch bucket nearest to `slope`.
    ///
    /// Zero, negative and non-finite slopes use the default pitch. A slope
    /// exactly between two buckets resolves to the lower one.
    pub fn slope_multiplier(&self, slope: f64) -> f64 {
        let rise = if slope.is_finite() && slope > 0.0 {
            slope
        } else {
            self.factors.defaults.pitch_rise
        };

        let mut best: Option<(f64, f64)> = None;
        for bucket in &self.factors.pitch {
            let distance = (bucket.rise - rise).abs();
            match best {
                Some((d, _)) if distance >= d => {}
                _ => best = Some((distance, bucket.multiplier)),
            }
        }
        best.map_or(DEFAULT_SLOPE_MULTIPLIER, |(_, m)| m)
    }

    pub fn complexity_multiplier(&self, complexity: &Complexity) -> f64 {
        self.factors
            .complexity
            .get(complexity.as_key())
            .copied()
            .unwrap_or(self.factors.defaults.complexity_multiplier)
    }

    fn lookup(&self, key: &str) -> &MaterialFactors {
        // The fallback entry is guaranteed by FactorTable validation
        self.factors
            .materials
            .get(key)
            .or_else(|| self.factors.materials.get(&self.factors.defaults.fallback_material))
            .unwrap_or_else(|| unreachable!("factor table validated with fallback material"))
    }

    fn recommendations(
        &self,
        request: &CalculationRequest,
        b: &EstimateBreakdown,
        substitution: Option<&FactorSubstitution>,
    ) -> Vec<String> {
        let mut recs = vec![
            format!("Based on {:.0} sq ft roof area", b.area),
            format!("Adjusted for {} roof complexity", request.complexity),
            format!("Material waste factor: {:.0}%", b.waste_factor * 100.0),
        ];
        if request.slope == 0.0 {
            recs.push(format!(
                "Slope not specified; estimated at {}/12 pitch",
                self.factors.defaults.pitch_rise
            ));
        }
        let pinned: Vec<String> = substitution.map(|s| s.note()).into_iter().collect();
        recs.extend(pinned.iter().cloned());
        cap_recommendations(recs, &pinned)
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new(default_factors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_estimator() -> Estimator {
        Estimator::default()
    }

    fn shingles_request() -> CalculationRequest {
        CalculationRequest::new(40.0, 25.0, RoofType::Gable, MaterialType::Shingles)
    }

    #[test]
    fn test_reference_shingles_scenario() {
        let estimator = make_estimator();
        let request = shingles_request();

        let b = estimator.breakdown(&request);
        assert_eq!(b.area, 1000.0);
        assert_eq!(b.slope_multiplier, 1.05);
        assert_eq!(b.complexity_multiplier, 1.10);
        assert!((b.adjusted_area - 1155.0).abs() < 1e-9);
        assert_eq!(b.units_needed, 39);

        let result = estimator.estimate(&request).unwrap();
        assert_eq!(result.materials_needed["bundles"], 39);
        assert_eq!(result.confidence_score, 0.85);
        assert_eq!(result.source, Source::Deterministic);
    }

    #[test]
    fn test_costs_follow_formula() {
        let estimator = make_estimator();
        let result = estimator.estimate(&shingles_request()).unwrap();
        let cost = &result.cost_estimate;

        assert!((cost.material_cost - 1155.0 * 1.5).abs() < 1e-6);
        assert!((cost.labor_cost - cost.material_cost * 0.75).abs() < 1e-9);
        assert_eq!(cost.total_cost, cost.material_cost + cost.labor_cost);
        assert!((cost.cost_per_unit_area - cost.total_cost / 1000.0).abs() < 1e-12);
        assert!(cost.is_balanced());
    }

    #[test]
    fn test_slope_buckets() {
        let estimator = make_estimator();
        assert_eq!(estimator.slope_multiplier(0.0), 1.05);
        assert_eq!(estimator.slope_multiplier(3.0), 1.03);
        assert_eq!(estimator.slope_multiplier(6.0), 1.12);
        assert_eq!(estimator.slope_multiplier(8.0), 1.20);
        assert_eq!(estimator.slope_multiplier(12.0), 1.41);
        // nearest bucket
        assert_eq!(estimator.slope_multiplier(7.2), 1.20);
        assert_eq!(estimator.slope_multiplier(1.0), 1.03);
        assert_eq!(estimator.slope_multiplier(18.0), 1.41);
        // ties go to the lower pitch
        assert_eq!(estimator.slope_multiplier(5.0), 1.05);
        assert_eq!(estimator.slope_multiplier(10.0), 1.20);
        // unresolvable
        assert_eq!(estimator.slope_multiplier(f64::NAN), 1.05);
        assert_eq!(estimator.slope_multiplier(-3.0), 1.05);
    }

    #[test]
    fn test_complexity_multipliers() {
        let estimator = make_estimator();
        assert_eq!(estimator.complexity_multiplier(&Complexity::Simple), 1.10);
        assert_eq!(estimator.complexity_multiplier(&Complexity::Moderate), 1.20);
        assert_eq!(estimator.complexity_multiplier(&Complexity::Complex), 1.30);
        assert_eq!(
            estimator.complexity_multiplier(&Complexity::Other("dormered".to_string())),
            1.15
        );
    }

    #[test]
    fn test_unknown_material_uses_shingles_and_flags_it() {
        let estimator = make_estimator();
        let request = CalculationRequest::new(
            40.0,
            25.0,
            RoofType::Gable,
            MaterialType::from_str("thatch"),
        );

        let b = estimator.breakdown(&request);
        assert!(b.used_fallback_factors);
        assert_eq!(b.material_key, "shingles");

        let result = estimator.estimate(&request).unwrap();
        assert!(result.materials_needed.contains_key("bundles"));
        assert!(result.cost_estimate.is_balanced());
        let substitution = result.substituted_factors.as_ref().unwrap();
        assert_eq!(substitution.requested, "thatch");
        assert_eq!(substitution.used, "shingles");
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.contains("thatch") && r.contains("shingles")));
        assert!(result.recommendations.len() <= MAX_RECOMMENDATIONS);
    }

    #[test]
    fn test_zero_length_is_validation_error() {
        let estimator = make_estimator();
        let request = CalculationRequest::new(0.0, 10.0, RoofType::Gable, MaterialType::Shingles);
        assert!(matches!(
            estimator.estimate(&request),
            Err(ValidationError::NonPositiveDimension { field: "length", .. })
        ));
    }

    #[test]
    fn test_tiny_roof_needs_at_least_one_unit() {
        let estimator = make_estimator();
        let request =
            CalculationRequest::new(0.5, 0.5, RoofType::Flat, MaterialType::MetalSheets);
        let result = estimator.estimate(&request).unwrap();
        assert_eq!(result.materials_needed["sheets"], 1);
    }

    #[test]
    fn test_tiles_counted_per_tile() {
        let estimator = make_estimator();
        let request = CalculationRequest::new(10.0, 9.0, RoofType::Hip, MaterialType::Tiles)
            .with_slope(4.0);
        let b = estimator.breakdown(&request);
        // 90 * 1.05 * 1.10 = 103.95 sq ft / 0.9 * 1.15 = 132.8 -> 133 tiles
        assert_eq!(b.units_needed, 133);
        assert_eq!(b.unit, "tiles");
    }

    #[test]
    fn test_estimate_is_idempotent() {
        let estimator = make_estimator();
        let request = CalculationRequest::new(33.3, 17.7, RoofType::Hip, MaterialType::Membrane)
            .with_slope(6.0)
            .with_complexity(Complexity::Complex);
        let a = estimator.estimate(&request).unwrap();
        let b = estimator.estimate(&request).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.cost_estimate.total_cost.to_bits(),
            b.cost_estimate.total_cost.to_bits()
        );
    }

    #[test]
    fn test_recommendation_templates() {
        let estimator = make_estimator();
        let result = estimator.estimate(&shingles_request()).unwrap();
        assert_eq!(result.recommendations[0], "Based on 1000 sq ft roof area");
        assert_eq!(result.recommendations[1], "Adjusted for simple roof complexity");
        assert_eq!(result.recommendations[2], "Material waste factor: 10%");
        assert!(result.recommendations[3].contains("4/12"));

        let sloped = shingles_request().with_slope(6.0);
        let result = estimator.estimate(&sloped).unwrap();
        assert_eq!(result.recommendations.len(), 3);
    }
}
