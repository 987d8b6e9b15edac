//! Saga definitions: an ordered list of steps plus an execution mode.

use serde::{Deserialize, Serialize};

use crate::step::SagaStep;

/// How a saga reacts to a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SagaMode {
    /// Steps run in order; a failure compensates every completed step in
    /// reverse order.
    AllOrNothing,
    /// Steps are independent and all attempted; successes are kept.
    BestEffort,
}

impl SagaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaMode::AllOrNothing => "all-or-nothing",
            SagaMode::BestEffort => "best-effort",
        }
    }
}

impl std::fmt::Display for SagaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, ordered list of steps run in one mode.
pub struct SagaDefinition {
    name: &'static str,
    mode: SagaMode,
    steps: Vec<Box<dyn SagaStep>>,
}

impl SagaDefinition {
    pub fn new(name: &'static str, mode: SagaMode) -> Self {
        Self {
            name,
            mode,
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn SagaStep>) {
        self.steps.push(step);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn mode(&self) -> SagaMode {
        self.mode
    }

    pub fn steps(&self) -> &[Box<dyn SagaStep>] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for SagaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("steps", &self.step_names())
            .finish()
    }
}
