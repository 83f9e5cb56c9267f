use thiserror::Error;

/// Rejected calculation input. The only failure a caller ever sees from an
/// estimation request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimensions. {field} must be a positive number, got {value}")]
    NonPositiveDimension { field: &'static str, value: f64 },

    #[error("Invalid slope {0}. Slope must be a non-negative number (rise per 12 run)")]
    InvalidSlope(f64),

    #[error("Invalid rating {0}. Rating must be between 1 and 5")]
    InvalidRating(i64),

    #[error("Unknown calculation method: {0}")]
    UnknownStrategy(String),
}

/// Failure of the external advisory service. Always recovered by falling
/// back to the deterministic estimator.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("Unsupported AI provider: '{0}'. Supported: openai, claude, openrouter")]
    UnsupportedProvider(String),

    #[error("Advisory request timed out after {0}s")]
    Timeout(u64),

    #[error("Advisory request failed: {0}")]
    Http(String),

    #[error("Advisory API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse advisory response as JSON: {0}")]
    Parse(String),

    #[error("Advisory response does not match the expected result shape: {0}")]
    Schema(String),
}

impl From<reqwest::Error> for AdvisoryError {
    fn from(e: reqwest::Error) -> Self {
        AdvisoryError::Http(e.to_string())
    }
}

/// Knowledge lookup failure. Treated as an empty snippet list by the orchestrator.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge store unavailable: {0}")]
    Unavailable(String),

    #[error("Knowledge catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to open history db: {0}")]
    Open(String),

    #[error("History query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Failed to serialize calculation: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Calculation not found: {0}")]
    NotFound(i64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum RoofMateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Advisory(#[from] AdvisoryError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<RoofMateError> for String {
    fn from(err: RoofMateError) -> Self {
        err.to_string()
    }
}
