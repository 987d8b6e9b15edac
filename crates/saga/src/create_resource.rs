//! A reusable step that creates one record and deletes it on compensation.

use async_trait::async_trait;
use resource_gateway::{GatewayError, NewRecord, ResourceGateway};

use crate::error::StepError;
use crate::step::{SagaContext, SagaStep, StepOutput, StepResult};

/// Field stamped into every record created by a saga step, holding the
/// saga reference that owns it.
pub const OWNER_FIELD: &str = "saga_reference";

type BuildFn = dyn Fn(&SagaContext) -> Result<NewRecord, StepError> + Send + Sync;

/// Creates a record in `collection` from a body built against the context.
///
/// When the built record carries a natural key, an existing record with that
/// key owned by the same saga reference is reused instead of creating a
/// duplicate, which makes a re-run with the same reference idempotent. A
/// record with that key owned by anyone else is a permanent conflict.
pub struct CreateResource<G> {
    name: &'static str,
    collection: &'static str,
    gateway: G,
    build: Box<BuildFn>,
    compensate_on_failure: bool,
}

impl<G> CreateResource<G>
where
    G: ResourceGateway,
{
    pub fn new<F>(name: &'static str, collection: &'static str, gateway: G, build: F) -> Self
    where
        F: Fn(&SagaContext) -> Result<NewRecord, StepError> + Send + Sync + 'static,
    {
        Self {
            name,
            collection,
            gateway,
            build: Box::new(build),
            compensate_on_failure: true,
        }
    }

    /// Marks this step as non-critical: its failure does not roll back the
    /// saga.
    pub fn soft(mut self, soft: bool) -> Self {
        self.compensate_on_failure = !soft;
        self
    }

    async fn reuse_existing(
        &self,
        ctx: &SagaContext,
        key: &str,
    ) -> Result<Option<StepOutput>, StepError> {
        let Some(existing) = self.gateway.find_by_key(self.collection, key).await? else {
            return Ok(None);
        };
        let owner = existing.data.get(OWNER_FIELD).and_then(|v| v.as_str());
        if owner != Some(ctx.reference()) {
            return Err(GatewayError::Conflict {
                collection: self.collection.to_string(),
                key: key.to_string(),
            }
            .into());
        }
        tracing::debug!(
            step = self.name,
            resource_id = %existing.id,
            "resource already created by an earlier attempt; reusing"
        );
        Ok(Some(StepOutput {
            resource_id: Some(existing.id),
            payload: existing.to_json(),
        }))
    }
}

#[async_trait]
impl<G> SagaStep for CreateResource<G>
where
    G: ResourceGateway + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn collection(&self) -> &str {
        self.collection
    }

    fn compensate_on_failure(&self) -> bool {
        self.compensate_on_failure
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<StepOutput, StepError> {
        let mut record = (self.build)(ctx)?;
        if let Some(body) = record.data.as_object_mut() {
            body.insert(OWNER_FIELD.to_string(), ctx.reference().into());
        }

        if let Some(key) = record.natural_key.clone()
            && let Some(output) = self.reuse_existing(ctx, &key).await?
        {
            return Ok(output);
        }

        let created = self.gateway.create(self.collection, record).await?;
        Ok(StepOutput {
            resource_id: Some(created.id),
            payload: created.to_json(),
        })
    }

    async fn recover(&self, ctx: &SagaContext) -> Result<Option<StepOutput>, StepError> {
        let Some(key) = (self.build)(ctx)?.natural_key else {
            return Ok(None);
        };
        let owned = self
            .gateway
            .find_by_key(self.collection, &key)
            .await?
            .filter(|record| {
                record.data.get(OWNER_FIELD).and_then(|v| v.as_str()) == Some(ctx.reference())
            });
        Ok(owned.map(|record| StepOutput {
            resource_id: Some(record.id),
            payload: record.to_json(),
        }))
    }

    async fn compensate(&self, _ctx: &SagaContext, result: &StepResult) -> Result<(), StepError> {
        let Some(id) = result.resource_id else {
            return Ok(());
        };
        match self.gateway.delete(self.collection, id).await {
            Ok(()) | Err(GatewayError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
