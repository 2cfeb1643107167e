//! Error taxonomy for the verification workflow.

use thiserror::Error;

use crate::services::backend::BackendError;
use crate::workflow::WorkflowPhase;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Required input missing or empty; caught before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential missing or rejected by the backend.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The submit request failed; the job never started.
    #[error("Submission failed: {0}")]
    Submission(#[source] BackendError),

    /// A status request failed; the polling session is over.
    #[error("Polling failed: {0}")]
    Polling(#[source] BackendError),

    /// The context registry could not be read or written.
    #[error("Context registry error: {0}")]
    Context(#[source] BackendError),

    #[error("A job is already processing")]
    AlreadyProcessing,

    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        phase: WorkflowPhase,
        action: &'static str,
    },
}

impl WorkflowError {
    /// Classify a submit-time backend failure.
    pub fn from_submit(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized(status) => {
                WorkflowError::Auth(format!("backend rejected credentials (HTTP {status})"))
            }
            other => WorkflowError::Submission(other),
        }
    }

    pub fn missing_credential() -> Self {
        WorkflowError::Auth("no bearer credential configured".to_string())
    }
}
