//! Error types for the question answering service

use lectern_state::StateError;
use std::time::Duration;
use thiserror::Error;

/// Failures of the external Answerer capability
#[derive(Error, Debug)]
pub enum AnswererError {
    /// The backend is absent or refused the connection
    #[error("Answerer unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time
    #[error("Answerer timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with an error or an unreadable body
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Outcome of a failed question or admin call
#[derive(Error, Debug)]
pub enum QaError {
    #[error("The answer service is not available right now: {0}")]
    ServiceUnavailable(String),

    #[error("No answer found with enough confidence (score {score:.4})")]
    NoConfidentAnswer { score: f64 },

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StateError),

    #[error("Failed to reload both the context and the answerer")]
    ReloadFailed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AnswererError> for QaError {
    fn from(e: AnswererError) -> Self {
        match e {
            AnswererError::Unavailable(_) | AnswererError::Timeout(_) => {
                QaError::ServiceUnavailable(e.to_string())
            }
            AnswererError::Inference(_) => QaError::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
