//! Caller-facing operations.
//!
//! Each command takes the shared `AppContext`, does its blocking SQLite work
//! on the blocking pool, and returns a serializable response.

pub mod estimate;
pub mod history;
pub mod knowledge;

use crate::error::RoofMateError;

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, RoofMateError>
where
    F: FnOnce() -> Result<T, RoofMateError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RoofMateError::Task(e.to_string()))?
}
