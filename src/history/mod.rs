mod store;
mod types;

pub use store::{CalculationHistory, HistoryStore};
pub use types::{CalculationRecord, CalculationStats, Feedback, MaterialStats, SourceStats};
