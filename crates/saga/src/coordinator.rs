//! Saga coordinator: interprets a [`SagaDefinition`] against a context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;

use crate::definition::{SagaDefinition, SagaMode};
use crate::error::{CompensationError, ErrorKind, StepError};
use crate::outcome::{SagaOutcome, SagaStatus};
use crate::step::{ErrorInfo, SagaContext, SagaStep, StepResult};

/// Log target for failures that need a human to clean up.
pub const OPERATOR_ALERT_TARGET: &str = "operator_alert";

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_COMPENSATION_RETRIES: u32 = 3;
const DEFAULT_COMPENSATION_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Timeouts, retry and concurrency limits applied to every saga run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound for a single execute or compensate call.
    pub step_timeout: Duration,
    /// Extra attempts for a compensation that failed transiently.
    pub compensation_retries: u32,
    /// Fixed pause between compensation attempts.
    pub compensation_backoff: Duration,
    /// Concurrency limit for best-effort steps.
    pub max_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
            compensation_retries: DEFAULT_COMPENSATION_RETRIES,
            compensation_backoff: DEFAULT_COMPENSATION_BACKOFF,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Receives outcomes whose effects are visible to observers.
#[async_trait]
pub trait OutcomePublisher: Send + Sync {
    async fn publish(&self, outcome: &SagaOutcome);
}

struct RunReport {
    status: SagaStatus,
    results: Vec<StepResult>,
    compensation_results: Vec<StepResult>,
    failure: Option<ErrorInfo>,
    compensation_error: Option<CompensationError>,
}

/// Runs sagas. Holds no per-run state, so one coordinator can be shared by
/// any number of concurrent requests.
#[derive(Clone, Default)]
pub struct SagaCoordinator {
    config: CoordinatorConfig,
    publisher: Option<Arc<dyn OutcomePublisher>>,
}

impl SagaCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            publisher: None,
        }
    }

    /// Sets the publisher that receives every non-failed outcome.
    pub fn with_publisher(mut self, publisher: Arc<dyn OutcomePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Runs `definition` to a terminal status.
    ///
    /// Never returns an error: every failure, including a failed
    /// compensation, is captured in the returned outcome.
    #[tracing::instrument(
        skip(self, definition, ctx),
        fields(
            saga = definition.name(),
            mode = %definition.mode(),
            saga_id = %ctx.saga_id(),
            reference = ctx.reference(),
        )
    )]
    pub async fn run(&self, definition: &SagaDefinition, ctx: SagaContext) -> SagaOutcome {
        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();
        let started_at = Utc::now();
        let saga_id = ctx.saga_id();
        let reference = ctx.reference().to_string();

        let report = match definition.mode() {
            SagaMode::AllOrNothing => self.run_all_or_nothing(definition, ctx).await,
            SagaMode::BestEffort => self.run_best_effort(definition, &ctx).await,
        };

        let outcome = SagaOutcome::new(
            saga_id,
            definition.name(),
            &reference,
            report.status,
            report.results,
            report.compensation_results,
            report.failure,
            started_at,
        )
        .with_compensation_error(report.compensation_error);

        match outcome.status() {
            SagaStatus::Completed => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!("saga completed");
            }
            SagaStatus::PartiallyCompleted => {
                metrics::counter!("saga_partially_completed").increment(1);
                tracing::warn!(
                    failed_steps = outcome.failed_steps().count(),
                    "saga partially completed"
                );
            }
            SagaStatus::Compensated => {
                metrics::counter!("saga_compensated").increment(1);
                tracing::warn!("saga compensated");
            }
            SagaStatus::Failed => {
                metrics::counter!("saga_failed").increment(1);
                tracing::warn!("saga failed");
            }
        }
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());

        if outcome.has_visible_effects()
            && let Some(publisher) = &self.publisher
        {
            publisher.publish(&outcome).await;
        }

        outcome
    }

    async fn run_all_or_nothing(
        &self,
        definition: &SagaDefinition,
        mut ctx: SagaContext,
    ) -> RunReport {
        let mut results = Vec::with_capacity(definition.len());
        let mut completed: Vec<(usize, StepResult)> = Vec::new();
        let mut soft_failure: Option<ErrorInfo> = None;

        for (index, step) in definition.steps().iter().enumerate() {
            tracing::info!(step = step.name(), "saga step started");
            let result = self.execute_step(step.as_ref(), &ctx).await;

            if result.succeeded {
                ctx.record(result.clone());
                completed.push((index, result.clone()));
                results.push(result);
                continue;
            }

            let failure = result.error.clone();
            results.push(result);

            if !step.compensate_on_failure() {
                tracing::warn!(
                    step = step.name(),
                    error = ?failure,
                    "saga step failed; continuing without compensation"
                );
                if soft_failure.is_none() {
                    soft_failure = failure;
                }
                continue;
            }

            tracing::warn!(step = step.name(), error = ?failure, "saga step failed; compensating");
            if failure.as_ref().is_some_and(|f| f.kind == ErrorKind::Transient)
                && let Some(recovered) = self.recover_step(step.as_ref(), &ctx).await
            {
                completed.push((index, recovered));
            }
            let (compensation_results, compensation_error) =
                self.compensate(definition, &ctx, &completed).await;
            let status = if compensation_error.is_none() {
                SagaStatus::Compensated
            } else {
                SagaStatus::Failed
            };
            return RunReport {
                status,
                results,
                compensation_results,
                failure,
                compensation_error,
            };
        }

        let status = if soft_failure.is_some() {
            SagaStatus::PartiallyCompleted
        } else {
            SagaStatus::Completed
        };
        RunReport {
            status,
            results,
            compensation_results: Vec::new(),
            failure: soft_failure,
            compensation_error: None,
        }
    }

    async fn run_best_effort(&self, definition: &SagaDefinition, ctx: &SagaContext) -> RunReport {
        let step_futures: Vec<_> = definition
            .steps()
            .iter()
            .map(|step| async move {
                tracing::info!(step = step.name(), "saga step started");
                let result = self.execute_step(step.as_ref(), ctx).await;
                if let Some(error) = &result.error {
                    tracing::warn!(
                        step = step.name(),
                        kind = %error.kind,
                        error = %error.message,
                        "saga step failed"
                    );
                }
                result
            })
            .collect();
        let results: Vec<StepResult> = futures_util::stream::iter(step_futures)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.succeeded).count();
        let status = if succeeded == results.len() {
            SagaStatus::Completed
        } else if succeeded > 0 {
            SagaStatus::PartiallyCompleted
        } else {
            SagaStatus::Failed
        };
        let failure = results.iter().find_map(|r| r.error.clone());

        RunReport {
            status,
            results,
            compensation_results: Vec::new(),
            failure,
            compensation_error: None,
        }
    }

    async fn execute_step(&self, step: &dyn SagaStep, ctx: &SagaContext) -> StepResult {
        let timeout = self.config.step_timeout;
        let result = match tokio::time::timeout(timeout, step.execute(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::timeout(step.name(), timeout)),
        };
        match result {
            Ok(output) => StepResult::success(step.name(), step.collection(), output),
            Err(e) => StepResult::failure(step.name(), step.collection(), &e),
        }
    }

    /// Looks for a resource left behind by a step that failed transiently,
    /// returning it as a result to compensate.
    async fn recover_step(&self, step: &dyn SagaStep, ctx: &SagaContext) -> Option<StepResult> {
        let timeout = self.config.step_timeout;
        let recovered = match tokio::time::timeout(timeout, step.recover(ctx)).await {
            Ok(recovered) => recovered,
            Err(_) => Err(StepError::timeout(step.name(), timeout)),
        };
        match recovered {
            Ok(Some(output)) => {
                tracing::warn!(
                    step = step.name(),
                    resource_id = ?output.resource_id,
                    "failed step committed a resource; compensating it"
                );
                Some(StepResult::success(step.name(), step.collection(), output))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(
                    target: OPERATOR_ALERT_TARGET,
                    saga_id = %ctx.saga_id(),
                    reference = ctx.reference(),
                    step = step.name(),
                    collection = step.collection(),
                    error = %e,
                    "could not check whether a failed step committed; may require manual cleanup"
                );
                None
            }
        }
    }

    /// Compensates `completed` in reverse order. A failed compensation does
    /// not stop the remaining ones; the first failure is returned.
    async fn compensate(
        &self,
        definition: &SagaDefinition,
        ctx: &SagaContext,
        completed: &[(usize, StepResult)],
    ) -> (Vec<StepResult>, Option<CompensationError>) {
        let mut compensation_results = Vec::with_capacity(completed.len());
        let mut first_error = None;

        for (index, result) in completed.iter().rev() {
            let step = definition.steps()[*index].as_ref();
            match self.compensate_step(step, ctx, result).await {
                Ok(()) => {
                    tracing::info!(step = step.name(), "compensation step completed");
                    compensation_results.push(StepResult {
                        error: None,
                        ..result.clone()
                    });
                }
                Err(err) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(
                        target: OPERATOR_ALERT_TARGET,
                        saga_id = %err.saga_id,
                        reference = %err.reference,
                        step = %err.step,
                        collection = %err.collection,
                        resource_id = ?err.resource_id,
                        attempts = err.attempts,
                        payload = %result.payload,
                        error = %err.source,
                        "compensation failed; resource requires manual cleanup"
                    );
                    let mut failed =
                        StepResult::failure(step.name(), step.collection(), &err.source);
                    failed.resource_id = result.resource_id;
                    compensation_results.push(failed);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        (compensation_results, first_error)
    }

    async fn compensate_step(
        &self,
        step: &dyn SagaStep,
        ctx: &SagaContext,
        result: &StepResult,
    ) -> Result<(), CompensationError> {
        let timeout = self.config.step_timeout;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let attempt = match tokio::time::timeout(timeout, step.compensate(ctx, result)).await {
                Ok(attempt) => attempt,
                Err(_) => Err(StepError::timeout(step.name(), timeout)),
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempts <= self.config.compensation_retries => {
                    tracing::warn!(
                        step = step.name(),
                        attempt = attempts,
                        error = %e,
                        "compensation attempt failed; retrying"
                    );
                    tokio::time::sleep(self.config.compensation_backoff).await;
                }
                Err(e) => {
                    return Err(CompensationError {
                        saga_id: ctx.saga_id(),
                        reference: ctx.reference().to_string(),
                        step: step.name().to_string(),
                        collection: step.collection().to_string(),
                        resource_id: result.resource_id,
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }
}
