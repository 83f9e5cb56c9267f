//! Deterministic roof material and cost estimation.
//!
//! This module provides a TOML-driven estimator that turns roof dimensions,
//! pitch, complexity and material into whole material units and a cost
//! breakdown.
//!
//! # Architecture
//!
//! - **Factors**: Loaded from TOML (embedded defaults or a custom file)
//! - **Area**: `length * width`, adjusted by pitch bucket and complexity
//! - **Units**: adjusted area over coverage, plus waste, rounded up
//! - **Costs**: material cost per adjusted area, labor as a fixed ratio
//!
//! # Example
//!
//! ```ignore
//! use roofmate::estimator::{CalculationRequest, Estimator, MaterialType, RoofType};
//!
//! let estimator = Estimator::default();
//! let request = CalculationRequest::new(40.0, 25.0, RoofType::Gable, MaterialType::Shingles);
//! let result = estimator.estimate(&request)?;
//!
//! for (unit, qty) in &result.materials_needed {
//!     println!("{}: {:?}", unit, qty);
//! }
//! println!("total: {:.2}", result.cost_estimate.total_cost);
//! ```

mod engine;
mod factors;
mod types;

pub use engine::{EstimateBreakdown, Estimator};
pub use factors::{default_factors, load_factors, FactorDefaults, FactorTable, MaterialFactors, PitchBucket};
pub use types::*;
