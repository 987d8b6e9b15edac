//! Saga error types.

use common::{RecordId, SagaId};
use domain::ValidationError;
use resource_gateway::GatewayError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a failed step may succeed if the whole saga is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Store unavailable, timeout: safe to retry the saga.
    Transient,
    /// Validation or constraint failure: never retry.
    Permanent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure of a single step's execute or compensate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} failure: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// The step did not answer within the coordinator's step timeout.
    pub fn timeout(step: &str, after: std::time::Duration) -> Self {
        Self::transient(format!("step '{step}' timed out after {after:?}"))
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl From<GatewayError> for StepError {
    fn from(err: GatewayError) -> Self {
        if err.is_transient() {
            StepError::transient(err.to_string())
        } else {
            StepError::permanent(err.to_string())
        }
    }
}

/// A compensation could not be completed; a resource is left behind and
/// needs manual cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Compensation of step '{step}' in saga {saga_id} failed after {attempts} attempt(s): {source}"
)]
pub struct CompensationError {
    pub saga_id: SagaId,
    pub reference: String,
    pub step: String,
    pub collection: String,
    pub resource_id: Option<RecordId>,
    pub attempts: u32,
    pub source: StepError,
}

/// Errors surfaced by saga definitions to their callers.
#[derive(Debug, Clone, Error)]
pub enum SagaError {
    /// The request was rejected before any step ran; no saga was created.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A step failed and nothing externally visible remains.
    #[error("Step '{step}' failed: {source}")]
    StepFailed { step: String, source: StepError },

    /// A compensation failed; see the operator log for cleanup details.
    #[error(transparent)]
    Compensation(#[from] CompensationError),
}

impl SagaError {
    /// Returns true if the caller may safely retry the whole request.
    pub fn is_retryable(&self) -> bool {
        match self {
            SagaError::StepFailed { source, .. } => source.is_transient(),
            SagaError::Validation(_) | SagaError::Compensation(_) => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
