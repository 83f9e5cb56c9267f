//! Type definitions for roof estimation requests and results.
//!
//! These types are shared by the deterministic estimator, the advisory
//! boundary and the blending orchestrator, and serialize unchanged into
//! command responses and history records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Confidence reported by the deterministic estimator.
pub const DETERMINISTIC_CONFIDENCE: f64 = 0.85;
/// Confidence reported when the advisory path fell back to the estimator.
pub const FALLBACK_CONFIDENCE: f64 = 0.6;
/// Upper bound on recommendations carried by any result.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// Lowercase, trim, and join words with underscores ("Metal Sheets" -> "metal_sheets").
pub(crate) fn normalize_key(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<&str>>()
        .join("_")
}

// =============================================================================
// REQUEST ENUMS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoofType {
    Flat,
    Gable,
    Hip,
    Mansard,
    Gambrel,
    Shed,
    Other(String),
}

impl RoofType {
    pub fn from_str(input: &str) -> RoofType {
        match normalize_key(input).as_str() {
            "flat" => RoofType::Flat,
            "gable" => RoofType::Gable,
            "hip" => RoofType::Hip,
            "mansard" => RoofType::Mansard,
            "gambrel" => RoofType::Gambrel,
            "shed" => RoofType::Shed,
            other => RoofType::Other(other.to_string()),
        }
    }

    pub fn as_key(&self) -> &str {
        match self {
            RoofType::Flat => "flat",
            RoofType::Gable => "gable",
            RoofType::Hip => "hip",
            RoofType::Mansard => "mansard",
            RoofType::Gambrel => "gambrel",
            RoofType::Shed => "shed",
            RoofType::Other(s) => s,
        }
    }
}

/// Roofing material. Parsed leniently so "Metal Sheets", "metal-sheets" and
/// "metal_sheets" all resolve to the same variant; anything else is kept as
/// `Other` and estimated with the fallback factor set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MaterialType {
    MetalSheets,
    Shingles,
    Tiles,
    Membrane,
    Polycarbonate,
    Other(String),
}

impl MaterialType {
    pub fn from_str(input: &str) -> MaterialType {
        let key = normalize_key(input);
        if key.contains("metal") {
            MaterialType::MetalSheets
        } else if key.contains("shingle") {
            MaterialType::Shingles
        } else if key.contains("tile") {
            MaterialType::Tiles
        } else if key.contains("membrane") {
            MaterialType::Membrane
        } else if key.contains("polycarbonate") {
            MaterialType::Polycarbonate
        } else {
            MaterialType::Other(key)
        }
    }

    /// Key into the material factor table.
    pub fn as_key(&self) -> &str {
        match self {
            MaterialType::MetalSheets => "metal_sheets",
            MaterialType::Shingles => "shingles",
            MaterialType::Tiles => "tiles",
            MaterialType::Membrane => "membrane",
            MaterialType::Polycarbonate => "polycarbonate",
            MaterialType::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Other(String),
}

impl Complexity {
    pub fn from_str(input: &str) -> Complexity {
        match normalize_key(input).as_str() {
            "simple" => Complexity::Simple,
            "moderate" => Complexity::Moderate,
            "complex" => Complexity::Complex,
            other => Complexity::Other(other.to_string()),
        }
    }

    pub fn as_key(&self) -> &str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::Other(s) => s,
        }
    }
}

macro_rules! string_conversions {
    ($ty:ident) => {
        impl From<String> for $ty {
            fn from(s: String) -> Self {
                $ty::from_str(&s)
            }
        }

        impl From<$ty> for String {
            fn from(v: $ty) -> Self {
                v.as_key().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_key())
            }
        }
    };
}

string_conversions!(RoofType);
string_conversions!(MaterialType);
string_conversions!(Complexity);

// =============================================================================
// REQUEST
// =============================================================================

fn default_roof_type() -> RoofType {
    RoofType::Gable
}

fn default_complexity() -> Complexity {
    Complexity::Simple
}

/// A single roof estimation request. Dimensions are in feet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub length: f64,
    pub width: f64,
    #[serde(default = "default_roof_type")]
    pub roof_type: RoofType,
    pub material_type: MaterialType,
    #[serde(default)]
    pub location: Option<String>,
    /// Rise per 12 run. 0 means unspecified.
    #[serde(default)]
    pub slope: f64,
    #[serde(default = "default_complexity")]
    pub complexity: Complexity,
}

impl CalculationRequest {
    pub fn new(length: f64, width: f64, roof_type: RoofType, material_type: MaterialType) -> Self {
        Self {
            length,
            width,
            roof_type,
            material_type,
            location: None,
            slope: 0.0,
            complexity: Complexity::Simple,
        }
    }

    pub fn with_slope(mut self, slope: f64) -> Self {
        self.slope = slope;
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.location = if location.trim().is_empty() {
            None
        } else {
            Some(location)
        };
        self
    }

    /// Reject non-positive or non-finite dimensions and negative slopes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [("length", self.length), ("width", self.width)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::NonPositiveDimension { field, value });
            }
        }
        if !self.slope.is_finite() || self.slope < 0.0 {
            return Err(ValidationError::InvalidSlope(self.slope));
        }
        Ok(())
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    /// Free-text query used to pull knowledge snippets for this request.
    pub fn knowledge_query(&self) -> String {
        format!(
            "{} roof {} {}x{}",
            self.material_type, self.roof_type, self.length, self.width
        )
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Deterministic,
    Advisory,
    Blended,
    Fallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Deterministic => "deterministic",
            Source::Advisory => "advisory",
            Source::Blended => "blended",
            Source::Fallback => "fallback",
        }
    }

    pub fn from_str(input: &str) -> Option<Source> {
        match input {
            "deterministic" => Some(Source::Deterministic),
            "advisory" => Some(Source::Advisory),
            "blended" => Some(Source::Blended),
            "fallback" => Some(Source::Fallback),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set when the requested material has no factor entry and another
/// material's factors produced the figures. Carried through fallback and
/// blending so the substitution is never silent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorSubstitution {
    pub requested: String,
    pub used: String,
}

impl FactorSubstitution {
    pub fn note(&self) -> String {
        format!(
            "No factor data for '{}'; quantities use {} factors",
            self.requested, self.used
        )
    }
}

/// Cap `lines` at `MAX_RECOMMENDATIONS` after dropping duplicates. Lines in
/// `pinned` are kept; the others go from the end first.
pub fn cap_recommendations(lines: Vec<String>, pinned: &[String]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if !kept.contains(&line) {
            kept.push(line);
        }
    }
    while kept.len() > MAX_RECOMMENDATIONS {
        match kept.iter().rposition(|l| !pinned.contains(l)) {
            Some(i) => {
                kept.remove(i);
            }
            None => kept.truncate(MAX_RECOMMENDATIONS),
        }
    }
    kept
}

/// Cost breakdown. The four named fields are always present; advisory
/// results may add further numeric lines in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub material_cost: f64,
    pub labor_cost: f64,
    pub total_cost: f64,
    pub cost_per_unit_area: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl CostEstimate {
    /// Build a breakdown whose total is exactly material + labor.
    pub fn from_parts(material_cost: f64, labor_cost: f64, area: f64) -> Self {
        let total_cost = material_cost + labor_cost;
        Self {
            material_cost,
            labor_cost,
            total_cost,
            cost_per_unit_area: if area > 0.0 { total_cost / area } else { 0.0 },
            extra: BTreeMap::new(),
        }
    }

    /// True when total == material + labor within 1e-6 relative tolerance.
    pub fn is_balanced(&self) -> bool {
        let expected = self.material_cost + self.labor_cost;
        let scale = expected.abs().max(self.total_cost.abs()).max(1.0);
        (self.total_cost - expected).abs() <= 1e-6 * scale
    }

    /// All lines as a flat map, named fields included.
    pub fn lines(&self) -> BTreeMap<String, f64> {
        let mut lines = self.extra.clone();
        lines.insert("material_cost".to_string(), self.material_cost);
        lines.insert("labor_cost".to_string(), self.labor_cost);
        lines.insert("total_cost".to_string(), self.total_cost);
        lines.insert("cost_per_unit_area".to_string(), self.cost_per_unit_area);
        lines
    }
}

/// Outcome of one estimation request. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Whole units per material line, each at least 1
    pub materials_needed: BTreeMap<String, u64>,
    pub cost_estimate: CostEstimate,
    pub recommendations: Vec<String>,
    pub confidence_score: f64,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substituted_factors: Option<FactorSubstitution>,
}
