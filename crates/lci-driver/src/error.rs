//! Error types for scenario orchestration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("scenario '{0}' aborted: {1}")]
    ScenarioAborted(String, String),
    #[error("cache I/O error: {0}")]
    Cache(#[from] std::io::Error),
    #[error("cache (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;
