//! Material factor table loading for the deterministic estimator.
//!
//! Provides two loading methods:
//! - `default_factors()` - Loads the table embedded in the binary
//! - `load_factors(path)` - Loads a custom table from a file path

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use serde::Deserialize;

/// Default table embedded at compile time from `config/material_factors.toml`.
const DEFAULT_FACTORS: &str = include_str!("../../config/material_factors.toml");

/// Per-material constants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MaterialFactors {
    /// Unit name used as the `materials_needed` key (e.g. "bundles")
    pub unit: String,
    /// Area one unit covers before waste
    pub coverage_per_unit: f64,
    /// Fractional extra material for cuts, overlaps and breakage
    pub waste_factor: f64,
    /// Material cost per unit of adjusted roof area
    pub cost_per_unit_area: f64,
}

/// One discrete roof pitch, `rise`/12.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PitchBucket {
    pub rise: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FactorDefaults {
    /// Pitch assumed when slope is unspecified
    pub pitch_rise: f64,
    /// Multiplier for complexity values missing from the table
    pub complexity_multiplier: f64,
    /// Material whose factors stand in for unmapped materials
    pub fallback_material: String,
    /// Labor cost as a fraction of material cost
    pub labor_ratio: f64,
}

/// The complete factor table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FactorTable {
    pub defaults: FactorDefaults,
    pub materials: BTreeMap<String, MaterialFactors>,
    pub complexity: BTreeMap<String, f64>,
    pub pitch: Vec<PitchBucket>,
}

impl FactorTable {
    /// Parse and validate a table from TOML text. Pitch buckets are sorted by rise.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut table: FactorTable = toml::from_str(content)?;
        table
            .pitch
            .sort_by(|a, b| a.rise.partial_cmp(&b.rise).unwrap_or(std::cmp::Ordering::Equal));
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        if !self.materials.contains_key(&self.defaults.fallback_material) {
            bail!(
                "fallback material '{}' has no factor entry",
                self.defaults.fallback_material
            );
        }
        for (name, f) in &self.materials {
            if !(f.coverage_per_unit > 0.0) {
                bail!("material '{}': coverage_per_unit must be positive", name);
            }
            if !(f.waste_factor >= 0.0) || !(f.cost_per_unit_area >= 0.0) {
                bail!("material '{}': waste and cost must be non-negative", name);
            }
            if f.unit.trim().is_empty() {
                bail!("material '{}': unit must not be empty", name);
            }
        }
        if self.pitch.is_empty() {
            bail!("at least one pitch bucket is required");
        }
        if self.pitch.iter().any(|p| !(p.multiplier >= 1.0) || !(p.rise > 0.0)) {
            bail!("pitch buckets need a positive rise and a multiplier >= 1.0");
        }
        if !(self.defaults.labor_ratio >= 0.0) {
            bail!("labor_ratio must be non-negative");
        }
        Ok(())
    }
}

/// Load a factor table from a TOML file at the given path.
///
/// # Example
/// ```ignore
/// let factors = load_factors(Path::new("/etc/roofmate/factors.toml"))?;
/// ```
pub fn load_factors(path: &Path) -> Result<FactorTable> {
    let content = std::fs::read_to_string(path)?;
    FactorTable::from_toml(&content)
}

/// Get the factor table embedded in the binary.
///
/// # Panics
/// Panics if the embedded TOML is invalid (this would be a compile-time bug).
pub fn default_factors() -> FactorTable {
    FactorTable::from_toml(DEFAULT_FACTORS).expect("embedded material_factors.toml must be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factors_loads() {
        let factors = default_factors();
        assert_eq!(factors.materials.len(), 5);
        for key in ["metal_sheets", "shingles", "tiles", "membrane", "polycarbonate"] {
            assert!(factors.materials.contains_key(key), "missing {}", key);
        }
        assert_eq!(factors.defaults.fallback_material, "shingles");
        assert_eq!(factors.defaults.labor_ratio, 0.75);
    }

    #[test]
    fn test_shingles_constants() {
        let factors = default_factors();
        let shingles = &factors.materials["shingles"];
        assert_eq!(shingles.unit, "bundles");
        assert_eq!(shingles.coverage_per_unit, 33.3);
        assert_eq!(shingles.waste_factor, 0.10);
        assert_eq!(shingles.cost_per_unit_area, 1.5);
    }

    #[test]
    fn test_pitch_buckets_sorted() {
        let factors = default_factors();
        let rises: Vec<f64> = factors.pitch.iter().map(|p| p.rise).collect();
        assert_eq!(rises, vec![3.0, 4.0, 6.0, 8.0, 12.0]);
    }

    #[test]
    fn test_complexity_table() {
        let factors = default_factors();
        assert_eq!(factors.complexity["simple"], 1.10);
        assert_eq!(factors.complexity["moderate"], 1.20);
        assert_eq!(factors.complexity["complex"], 1.30);
        assert_eq!(factors.defaults.complexity_multiplier, 1.15);
    }

    #[test]
    fn test_rejects_missing_fallback_material() {
        let toml = r#"
            [defaults]
            pitch_rise = 4.0
            complexity_multiplier = 1.15
            fallback_material = "slate"
            labor_ratio = 0.75

            [materials.shingles]
            unit = "bundles"
            coverage_per_unit = 33.3
            waste_factor = 0.1
            cost_per_unit_area = 1.5

            [complexity]

            [[pitch]]
            rise = 4.0
            multiplier = 1.05
        "#;
        let err = FactorTable::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("slate"));
    }

    #[test]
    fn test_load_factors_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("factors.toml");
        std::fs::write(&path, DEFAULT_FACTORS).unwrap();

        let loaded = load_factors(&path).unwrap();
        assert_eq!(loaded, default_factors());
    }

    #[test]
    fn test_load_factors_missing_file() {
        assert!(load_factors(Path::new("/nonexistent/factors.toml")).is_err());
    }
}
