//! External advisory service boundary.
//!
//! An advisory service is an LLM asked to propose a complete calculation
//! result from the request and a handful of knowledge snippets. Its reply is
//! parsed into the same typed `CalculationResult` the deterministic estimator
//! produces; anything that does not fit is rejected here, never passed on.

mod client;
mod prompts;
mod types;

pub use client::{AdvisoryProvider, AdvisoryService, HttpAdvisoryService};
pub use prompts::{advisory_result_json_schema, build_advisory_prompt};
pub use types::{map_response_to_result, parse_advisory_response, AdvisoryContext};
