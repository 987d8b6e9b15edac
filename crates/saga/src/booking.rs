//! Combined booking saga: experience, lodging and transport legs booked
//! independently in best-effort mode.

use domain::collections::{EXPERIENCE_BOOKINGS, LODGING_BOOKINGS, TRANSPORT_BOOKINGS};
use domain::{BookingPlan, CombinedBookingRequest, Money, PricingPolicy};
use resource_gateway::{NewRecord, ResourceGateway};
use serde::Serialize;
use serde_json::{Value, json};

use crate::coordinator::SagaCoordinator;
use crate::create_resource::CreateResource;
use crate::definition::{SagaDefinition, SagaMode};
use crate::error::Result;
use crate::outcome::SagaOutcome;
use crate::step::SagaContext;

pub const SAGA_NAME: &str = "CombinedBooking";
pub const STEP_EXPERIENCE: &str = "reserve_experience";
pub const STEP_LODGING: &str = "reserve_lodging";
pub const STEP_TRANSPORT: &str = "reserve_transport";

/// A priced plan together with the outcome of booking it.
#[derive(Debug, Clone)]
pub struct BookingResult {
    pub plan: BookingPlan,
    pub outcome: SagaOutcome,
}

/// Builds and runs the combined booking saga.
#[derive(Clone)]
pub struct CombinedBookingSaga<G> {
    gateway: G,
    pricing: PricingPolicy,
}

impl<G> CombinedBookingSaga<G>
where
    G: ResourceGateway + Clone + 'static,
{
    pub fn new(gateway: G, pricing: PricingPolicy) -> Self {
        Self { gateway, pricing }
    }

    /// Validates and prices a request. No resource is touched.
    pub fn plan(&self, request: CombinedBookingRequest) -> Result<BookingPlan> {
        Ok(request.into_plan(&self.pricing)?)
    }

    /// One step per leg present in the plan, in experience, lodging,
    /// transport order.
    pub fn definition(&self, plan: &BookingPlan) -> SagaDefinition {
        let mut definition = SagaDefinition::new(SAGA_NAME, SagaMode::BestEffort);
        if let Some(leg) = &plan.experience {
            definition.push(Box::new(self.leg_step(
                STEP_EXPERIENCE,
                EXPERIENCE_BOOKINGS,
                leg_payload(plan, leg, leg.amount()),
            )));
        }
        if let Some(leg) = &plan.lodging {
            let mut payload = leg_payload(plan, leg, leg.amount());
            payload["nights"] = json!(leg.nights());
            definition.push(Box::new(self.leg_step(STEP_LODGING, LODGING_BOOKINGS, payload)));
        }
        if let Some(leg) = &plan.transport {
            definition.push(Box::new(self.leg_step(
                STEP_TRANSPORT,
                TRANSPORT_BOOKINGS,
                leg_payload(plan, leg, leg.amount()),
            )));
        }
        definition
    }

    /// Validates, prices and books a request.
    ///
    /// Fails only on validation; booking failures are reported per leg in
    /// the outcome.
    #[tracing::instrument(skip(self, coordinator, request))]
    pub async fn execute(
        &self,
        coordinator: &SagaCoordinator,
        request: CombinedBookingRequest,
    ) -> Result<BookingResult> {
        let plan = self.plan(request)?;
        tracing::info!(
            reference = %plan.reference,
            legs = plan.leg_count(),
            total_cents = plan.breakdown.total.cents(),
            "combined booking planned"
        );
        let definition = self.definition(&plan);
        let outcome = coordinator
            .run(&definition, SagaContext::new(plan.reference.clone()))
            .await;
        Ok(BookingResult { plan, outcome })
    }

    fn leg_step(
        &self,
        name: &'static str,
        collection: &'static str,
        payload: Value,
    ) -> CreateResource<G> {
        CreateResource::new(name, collection, self.gateway.clone(), move |ctx| {
            Ok(NewRecord::new(payload.clone())
                .with_natural_key(format!("{}:{}", ctx.reference(), name)))
        })
    }
}

/// The record body of one leg: the leg's own fields plus the shared,
/// read-only booking details.
fn leg_payload(plan: &BookingPlan, leg: &impl Serialize, amount: Money) -> Value {
    let mut payload = serde_json::to_value(leg).unwrap_or_else(|_| json!({}));
    if let Some(body) = payload.as_object_mut() {
        body.insert("reference".into(), json!(plan.reference));
        body.insert("traveler_id".into(), json!(plan.traveler_id));
        body.insert("status".into(), json!("confirmed"));
        body.insert("amount_cents".into(), json!(amount.cents()));
        body.insert("breakdown".into(), json!(plan.breakdown));
        if let Some(requests) = &plan.special_requests {
            body.insert("special_requests".into(), json!(requests));
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use resource_gateway::InMemoryResourceGateway;

    fn request() -> CombinedBookingRequest {
        CombinedBookingRequest {
            traveler_id: Some("traveler-1".into()),
            reference: Some("BK-TEST0001".into()),
            experience_id: Some("exp-1".into()),
            experience_date: NaiveDate::from_ymd_opt(2026, 7, 1),
            participants: Some(2),
            experience_price_cents: Some(5_000),
            room_type: Some("double".into()),
            lodging_id: Some("lodge-1".into()),
            check_in: NaiveDate::from_ymd_opt(2026, 7, 1),
            check_out: NaiveDate::from_ymd_opt(2026, 7, 3),
            nightly_rate_cents: Some(12_000),
            ..Default::default()
        }
    }

    fn saga() -> CombinedBookingSaga<InMemoryResourceGateway> {
        CombinedBookingSaga::new(InMemoryResourceGateway::new(), PricingPolicy::default())
    }

    #[test]
    fn test_definition_has_one_step_per_leg() {
        let saga = saga();
        let plan = saga.plan(request()).unwrap();

        let definition = saga.definition(&plan);

        assert_eq!(definition.mode(), SagaMode::BestEffort);
        assert_eq!(definition.step_names(), vec![STEP_EXPERIENCE, STEP_LODGING]);
    }

    #[test]
    fn test_leg_payload_carries_shared_breakdown() {
        let saga = saga();
        let plan = saga.plan(request()).unwrap();
        let lodging = plan.lodging.as_ref().unwrap();

        let payload = leg_payload(&plan, lodging, lodging.amount());

        assert_eq!(payload["reference"], "BK-TEST0001");
        assert_eq!(payload["room_type"], "double");
        assert_eq!(payload["amount_cents"], 24_000);
        // 10_000 + 24_000 = 34_000; tax 1_700; fee 500.
        assert_eq!(payload["breakdown"]["total_cents"], 36_200);
    }

    #[test]
    fn test_invalid_request_is_rejected_before_any_step() {
        let saga = saga();
        let request = CombinedBookingRequest {
            traveler_id: Some("traveler-1".into()),
            ..Default::default()
        };

        assert!(matches!(
            saga.plan(request),
            Err(crate::SagaError::Validation(domain::ValidationError::NothingToBook))
        ));
    }
}
