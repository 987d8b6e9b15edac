//! The step abstraction and the per-run context steps read from.

use async_trait::async_trait;
use common::{RecordId, SagaId};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StepError};

/// What a step produced when it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// The resource the step created, if any.
    pub resource_id: Option<RecordId>,
    /// The created resource as JSON.
    pub payload: serde_json::Value,
}

/// A serializable copy of a step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StepError> for ErrorInfo {
    fn from(err: &StepError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

/// Outcome of executing (or compensating) one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub collection: String,
    pub succeeded: bool,
    pub resource_id: Option<RecordId>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl StepResult {
    pub fn success(step_name: &str, collection: &str, output: StepOutput) -> Self {
        Self {
            step_name: step_name.to_string(),
            collection: collection.to_string(),
            succeeded: true,
            resource_id: output.resource_id,
            payload: output.payload,
            error: None,
        }
    }

    pub fn failure(step_name: &str, collection: &str, error: &StepError) -> Self {
        Self {
            step_name: step_name.to_string(),
            collection: collection.to_string(),
            succeeded: false,
            resource_id: None,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// Returns the failure kind, if this result is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// State shared with the steps of a single saga run.
///
/// Holds the results of the steps that have succeeded so far, so that later
/// steps can reference resources created by earlier ones.
#[derive(Debug, Clone)]
pub struct SagaContext {
    saga_id: SagaId,
    reference: String,
    completed: Vec<StepResult>,
}

impl SagaContext {
    /// Creates a context for a new run with a fresh saga id.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            saga_id: SagaId::new(),
            reference: reference.into(),
            completed: Vec::new(),
        }
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    /// The business reference the run is keyed on (e.g. a booking reference).
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn completed(&self) -> &[StepResult] {
        &self.completed
    }

    /// Returns the resource created by an earlier, successful step.
    pub fn resource_id(&self, step_name: &str) -> Option<RecordId> {
        self.completed
            .iter()
            .find(|r| r.step_name == step_name)
            .and_then(|r| r.resource_id)
    }

    /// Like [`resource_id`](Self::resource_id), but a missing resource is a
    /// permanent step failure.
    pub fn require_resource_id(&self, step_name: &str) -> Result<RecordId, StepError> {
        self.resource_id(step_name).ok_or_else(|| {
            StepError::permanent(format!(
                "step '{step_name}' has not produced a resource in this saga"
            ))
        })
    }

    pub(crate) fn record(&mut self, result: StepResult) {
        self.completed.push(result);
    }
}

/// One forward action of a saga together with its compensating action.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Step name, unique within a saga definition.
    fn name(&self) -> &str;

    /// The collection this step writes to.
    fn collection(&self) -> &str;

    /// Whether a failure of this step rolls back the saga. Only consulted in
    /// all-or-nothing mode.
    fn compensate_on_failure(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<StepOutput, StepError>;

    /// Finds a resource that a failed `execute` may still have created, such
    /// as a write that committed after the step timed out. Steps that cannot
    /// tell return `Ok(None)`.
    async fn recover(&self, _ctx: &SagaContext) -> Result<Option<StepOutput>, StepError> {
        Ok(None)
    }

    /// Undoes a successful execution. Must tolerate the resource already
    /// being gone.
    async fn compensate(&self, ctx: &SagaContext, result: &StepResult) -> Result<(), StepError>;
}
