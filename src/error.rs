//! Error types for the carbon-aware scheduler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Live carbon intensity could not be fetched or parsed
    #[error("Carbon intensity source unavailable: {0}")]
    SourceUnavailable(String),

    /// Configuration is inconsistent; raised before any work starts
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Existing decision log could not be read. Recovered locally, never propagated.
    #[error("Decision log corrupt: {0}")]
    DecisionLogCorrupt(String),

    /// Evidence table already contains this run identifier
    #[error("Run id already recorded: {0}")]
    DuplicateRunId(String),

    /// The workload itself failed
    #[error("Workload failed: {0}")]
    Workload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::SourceUnavailable(format!("request timed out: {e}"))
        } else {
            Error::SourceUnavailable(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
