//! Fare service error types

use thiserror::Error;

/// Errors raised by training, relay and start-up paths.
///
/// Per-record join failures are not errors; see [`crate::samples::SkipReason`].
#[derive(Error, Debug)]
pub enum FareError {
    #[error("failed to load {path}: {reason}")]
    DataLoad { path: String, reason: String },

    #[error("model response is not valid JSON: {0}")]
    ModelFormat(String),

    #[error("model response has no usable fare lines")]
    EmptyModel,

    #[error("no training samples could be built from the fare and station data")]
    NoSamples,

    #[error("AI call failed: {0}")]
    Collaborator(String),

    #[error("failed to persist fare model: {0}")]
    Persist(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FareError {
    pub fn data_load(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        FareError::DataLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for FareError {
    fn from(err: serde_json::Error) -> Self {
        FareError::ModelFormat(err.to_string())
    }
}

impl From<reqwest::Error> for FareError {
    fn from(err: reqwest::Error) -> Self {
        FareError::Collaborator(err.to_string())
    }
}
