use crate::record::Operator;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Schema mismatch ({operator}): {reason}")]
    SchemaMismatch { operator: Operator, reason: String },

    #[error("Ingestion failed for {path}: {reason}")]
    Ingestion { path: String, reason: String },

    #[error("Detector '{detector}' misconfigured: {reason}")]
    DetectorConfig { detector: String, reason: String },

    #[error("Aggregation invariant violated: {reason}")]
    Aggregation { reason: String },

    #[error("Session cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalysisError {
    pub fn schema(operator: Operator, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch { operator, reason: reason.into() }
    }

    pub fn detector_config(detector: &str, reason: impl Into<String>) -> Self {
        Self::DetectorConfig { detector: detector.to_string(), reason: reason.into() }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
