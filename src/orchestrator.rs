//! Strategy selection, blending and fallback.
//!
//! The orchestrator always computes the deterministic estimate first. When a
//! strategy needs the advisory service it is called once, bounded by an
//! explicit timeout; any failure there is absorbed and replaced by the
//! deterministic numbers tagged `fallback`. The only error a caller can get
//! back is a `ValidationError` for the request itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::advisory::{AdvisoryContext, AdvisoryService};
use crate::error::ValidationError;
use crate::estimator::{
    cap_recommendations, CalculationRequest, CalculationResult, CostEstimate, Estimator,
    FactorSubstitution, Source, FALLBACK_CONFIDENCE, MAX_RECOMMENDATIONS,
};
use crate::knowledge::{KnowledgeItem, KnowledgeSource};

pub const DEFAULT_ADVISORY_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_KNOWLEDGE_LIMIT: usize = 5;

const FALLBACK_NOTE: &str = "Advisory estimate unavailable; figures use the standard calculation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    AdvisoryOnly,
    DeterministicOnly,
    #[default]
    Blended,
}

impl Strategy {
    /// Accepts the canonical names and the short `ai` / `ml` / `hybrid` forms.
    pub fn from_str(input: &str) -> Result<Strategy, ValidationError> {
        match input.trim().to_lowercase().replace('-', "_").as_str() {
            "advisory_only" | "advisory" | "ai" => Ok(Strategy::AdvisoryOnly),
            "deterministic_only" | "deterministic" | "ml" => Ok(Strategy::DeterministicOnly),
            "blended" | "hybrid" => Ok(Strategy::Blended),
            other => Err(ValidationError::UnknownStrategy(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::AdvisoryOnly => "advisory_only",
            Strategy::DeterministicOnly => "deterministic_only",
            Strategy::Blended => "blended",
        }
    }

    fn needs_advisory(&self) -> bool {
        !matches!(self, Strategy::DeterministicOnly)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one orchestrated request.
#[derive(Debug, Clone)]
pub struct Orchestration {
    pub result: CalculationResult,
    /// Knowledge entries sent to the advisory service, if it was called
    pub knowledge_ids: Vec<String>,
}

pub struct Orchestrator {
    estimator: Arc<Estimator>,
    advisory: Option<Arc<dyn AdvisoryService>>,
    knowledge: Arc<dyn KnowledgeSource>,
    timeout: Duration,
    knowledge_limit: usize,
}

impl Orchestrator {
    pub fn new(estimator: Arc<Estimator>, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        Self {
            estimator,
            advisory: None,
            knowledge,
            timeout: DEFAULT_ADVISORY_TIMEOUT,
            knowledge_limit: DEFAULT_KNOWLEDGE_LIMIT,
        }
    }

    pub fn with_advisory(mut self, advisory: Arc<dyn AdvisoryService>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_advisory(&self) -> bool {
        self.advisory.is_some()
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub async fn estimate_with_strategy(
        &self,
        request: &CalculationRequest,
        strategy: Strategy,
    ) -> Result<CalculationResult, ValidationError> {
        Ok(self.run(request, strategy).await?.result)
    }

    /// Like `estimate_with_strategy`, also reporting which knowledge entries
    /// went into the advisory context.
    pub async fn run(
        &self,
        request: &CalculationRequest,
        strategy: Strategy,
    ) -> Result<Orchestration, ValidationError> {
        let deterministic = self.estimator.estimate(request)?;

        if !strategy.needs_advisory() {
            return Ok(Orchestration {
                result: deterministic,
                knowledge_ids: vec![],
            });
        }

        let (advisory, knowledge_ids) = self.advise_or_fallback(request, &deterministic).await;

        let result = match strategy {
            Strategy::Blended => blend(&advisory, &deterministic),
            _ => advisory,
        };

        info!(
            "Estimated {} x {} {} with strategy {}: source={}, confidence={:.3}",
            request.length,
            request.width,
            request.material_type,
            strategy,
            result.source,
            result.confidence_score
        );

        Ok(Orchestration {
            result,
            knowledge_ids,
        })
    }

    /// One advisory call. Never fails: every error path returns the
    /// deterministic figures tagged `fallback`.
    async fn advise_or_fallback(
        &self,
        request: &CalculationRequest,
        deterministic: &CalculationResult,
    ) -> (CalculationResult, Vec<String>) {
        let Some(service) = &self.advisory else {
            debug!("No advisory service configured, using fallback");
            return (fallback_from(deterministic), vec![]);
        };

        let context = AdvisoryContext::new(request.clone(), self.snippets(request));
        let knowledge_ids = context.knowledge_ids();

        match tokio::time::timeout(self.timeout, service.advise(&context)).await {
            Ok(Ok(mut result)) => {
                result.source = Source::Advisory;
                result.recommendations.truncate(MAX_RECOMMENDATIONS);
                (result, knowledge_ids)
            }
            Ok(Err(e)) => {
                warn!("Advisory service '{}' failed, falling back: {}", service.name(), e);
                (fallback_from(deterministic), knowledge_ids)
            }
            Err(_) => {
                warn!(
                    "Advisory service '{}' timed out after {:?}, falling back",
                    service.name(),
                    self.timeout
                );
                (fallback_from(deterministic), knowledge_ids)
            }
        }
    }

    fn snippets(&self, request: &CalculationRequest) -> Vec<KnowledgeItem> {
        match self
            .knowledge
            .lookup(&request.knowledge_query(), self.knowledge_limit)
        {
            Ok(mut items) => {
                items.truncate(self.knowledge_limit);
                items
            }
            Err(e) => {
                warn!("Knowledge lookup failed, continuing without snippets: {}", e);
                vec![]
            }
        }
    }
}

/// Deterministic figures standing in for a failed advisory call.
///
/// The fallback note and any factor-substitution note survive the cap; the
/// generic lines are dropped first.
pub fn fallback_from(deterministic: &CalculationResult) -> CalculationResult {
    let substitution = deterministic.substituted_factors.as_ref();
    let mut recommendations = deterministic.recommendations.clone();
    recommendations.push(FALLBACK_NOTE.to_string());

    CalculationResult {
        materials_needed: deterministic.materials_needed.clone(),
        cost_estimate: deterministic.cost_estimate.clone(),
        recommendations: cap_recommendations(recommendations, &pinned_lines(substitution)),
        confidence_score: FALLBACK_CONFIDENCE,
        source: Source::Fallback,
        substituted_factors: substitution.cloned(),
    }
}

/// Merge an advisory result with a deterministic one.
///
/// Keys present on both sides are averaged; keys on one side only are kept
/// as-is. Material counts are averaged and rounded up so they stay whole.
/// Numeric merging is symmetric in its arguments. A factor substitution on
/// either side is carried into the result along with its note.
pub fn blend(advisory: &CalculationResult, deterministic: &CalculationResult) -> CalculationResult {
    let substitution = advisory
        .substituted_factors
        .as_ref()
        .or(deterministic.substituted_factors.as_ref());

    CalculationResult {
        materials_needed: blend_materials(&advisory.materials_needed, &deterministic.materials_needed),
        cost_estimate: blend_costs(&advisory.cost_estimate, &deterministic.cost_estimate),
        recommendations: merge_recommendations(
            &advisory.recommendations,
            &deterministic.recommendations,
            &pinned_lines(substitution),
        ),
        confidence_score: (advisory.confidence_score + deterministic.confidence_score) / 2.0,
        source: Source::Blended,
        substituted_factors: substitution.cloned(),
    }
}

/// Lines no recommendation cap may drop.
fn pinned_lines(substitution: Option<&FactorSubstitution>) -> Vec<String> {
    let mut pinned = vec![FALLBACK_NOTE.to_string()];
    pinned.extend(substitution.map(|s| s.note()));
    pinned
}

fn blend_materials(first: &BTreeMap<String, u64>, second: &BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    let mut merged = second.clone();
    for (key, a) in first {
        let value = match second.get(key) {
            Some(b) => mean_round_up(*a, *b),
            None => *a,
        };
        merged.insert(key.clone(), value);
    }
    merged
}

fn mean_round_up(a: u64, b: u64) -> u64 {
    ((a as u128 + b as u128 + 1) / 2) as u64
}

fn blend_costs(first: &CostEstimate, second: &CostEstimate) -> CostEstimate {
    let mean = |a: f64, b: f64| (a + b) / 2.0;

    let mut extra = second.extra.clone();
    for (key, a) in &first.extra {
        let value = match second.extra.get(key) {
            Some(b) => mean(*a, *b),
            None => *a,
        };
        extra.insert(key.clone(), value);
    }

    CostEstimate {
        material_cost: mean(first.material_cost, second.material_cost),
        labor_cost: mean(first.labor_cost, second.labor_cost),
        total_cost: mean(first.total_cost, second.total_cost),
        cost_per_unit_area: mean(first.cost_per_unit_area, second.cost_per_unit_area),
        extra,
    }
}

/// Order-preserving union, first list first, capped at five. A pinned line
/// already present on either side always makes the cut, and a substitution
/// note is added when neither side carries it.
fn merge_recommendations(first: &[String], second: &[String], pinned: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = first.iter().chain(second).cloned().collect();
    for line in pinned {
        if line != FALLBACK_NOTE && !merged.contains(line) {
            merged.push(line.clone());
        }
    }
    cap_recommendations(merged, pinned)
}
