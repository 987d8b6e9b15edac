//! Terminal saga status and the immutable outcome record.

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

use crate::error::{CompensationError, ErrorKind, SagaError, StepError};
use crate::step::{ErrorInfo, StepResult};

/// Terminal status of a saga run.
///
/// ```text
/// AllOrNothing: all steps ok ─────────────► Completed
///               soft step failed ─────────► PartiallyCompleted
///               failure, undo ok ─────────► Compensated
///               failure, undo failed ─────► Failed
/// BestEffort:   all / some / none ok ─────► Completed / PartiallyCompleted / Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaStatus {
    Completed,
    PartiallyCompleted,
    Compensated,
    Failed,
}

impl SagaStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Completed => "Completed",
            SagaStatus::PartiallyCompleted => "PartiallyCompleted",
            SagaStatus::Compensated => "Compensated",
            SagaStatus::Failed => "Failed",
        }
    }

    /// Returns true if at least part of the saga's work was kept.
    pub fn is_success(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::PartiallyCompleted)
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The result of one saga run. Built once by the coordinator and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SagaOutcome {
    saga_id: SagaId,
    saga_name: String,
    reference: String,
    status: SagaStatus,
    results: Vec<StepResult>,
    compensation_results: Vec<StepResult>,
    failure: Option<ErrorInfo>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    #[serde(skip)]
    compensation_error: Option<CompensationError>,
}

impl SagaOutcome {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        saga_id: SagaId,
        saga_name: &str,
        reference: &str,
        status: SagaStatus,
        results: Vec<StepResult>,
        compensation_results: Vec<StepResult>,
        failure: Option<ErrorInfo>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            saga_id,
            saga_name: saga_name.to_string(),
            reference: reference.to_string(),
            status,
            results,
            compensation_results,
            failure,
            started_at,
            finished_at: Utc::now(),
            compensation_error: None,
        }
    }

    pub(crate) fn with_compensation_error(mut self, error: Option<CompensationError>) -> Self {
        self.compensation_error = error;
        self
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn saga_name(&self) -> &str {
        &self.saga_name
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Step results in declaration order.
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Compensation results in the order they were run (reverse of execution).
    pub fn compensation_results(&self) -> &[StepResult] {
        &self.compensation_results
    }

    /// The first failure that shaped the outcome, if any.
    pub fn failure(&self) -> Option<&ErrorInfo> {
        self.failure.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn succeeded_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| r.succeeded)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| !r.succeeded)
    }

    pub fn compensation_failures(&self) -> impl Iterator<Item = &StepResult> {
        self.compensation_results.iter().filter(|r| !r.succeeded)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether observers should hear about this outcome.
    pub fn has_visible_effects(&self) -> bool {
        self.status != SagaStatus::Failed
    }

    /// Returns true if re-running the saga with the same reference may
    /// succeed where this run did not.
    ///
    /// Never true once a compensation has failed, since the store then holds
    /// state that needs manual cleanup.
    pub fn is_retryable(&self) -> bool {
        if self.status == SagaStatus::Completed || self.compensation_failures().next().is_some() {
            return false;
        }
        let mut failures = self.failed_steps().peekable();
        failures.peek().is_some()
            && failures.all(|r| r.error_kind() == Some(ErrorKind::Transient))
    }

    /// Converts a run in which nothing was kept into an error.
    ///
    /// Returns `None` for `Completed` and `PartiallyCompleted`.
    pub fn error(&self) -> Option<SagaError> {
        if self.status.is_success() {
            return None;
        }
        if let Some(err) = &self.compensation_error {
            return Some(SagaError::Compensation(err.clone()));
        }
        let failed = self.failed_steps().next();
        let step = failed.map_or_else(String::new, |r| r.step_name.clone());
        let kind = if self.is_retryable() {
            ErrorKind::Transient
        } else {
            ErrorKind::Permanent
        };
        let message = failed
            .and_then(|r| r.error.as_ref())
            .or(self.failure.as_ref())
            .map_or_else(|| "saga failed".to_string(), |e| e.message.clone());
        Some(SagaError::StepFailed {
            step,
            source: StepError { kind, message },
        })
    }
}
