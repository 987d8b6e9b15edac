//! Saga orchestration for multi-collection writes.
//!
//! A [`SagaDefinition`] is an ordered list of [`SagaStep`]s, each pairing a
//! forward action with a compensating one, interpreted by the
//! [`SagaCoordinator`] in one of two modes:
//!
//! - **All-or-nothing** (guide onboarding): steps run in order and a failure
//!   compensates every completed step in reverse order.
//! - **Best-effort** (combined booking): independent steps run concurrently
//!   and each is reported on its own.

pub mod booking;
pub mod coordinator;
pub mod create_resource;
pub mod definition;
pub mod error;
pub mod onboarding;
pub mod outcome;
pub mod step;

pub use booking::{BookingResult, CombinedBookingSaga};
pub use coordinator::{CoordinatorConfig, OPERATOR_ALERT_TARGET, OutcomePublisher, SagaCoordinator};
pub use create_resource::CreateResource;
pub use definition::{SagaDefinition, SagaMode};
pub use error::{CompensationError, ErrorKind, Result, SagaError, StepError};
pub use onboarding::{GuideOnboardingSaga, OnboardingResult};
pub use outcome::{SagaOutcome, SagaStatus};
pub use step::{ErrorInfo, SagaContext, SagaStep, StepOutput, StepResult};
