//! Guide onboarding saga: identity, profile and verification records
//! created all-or-nothing.

use domain::collections::{GUIDE_IDENTITIES, GUIDE_PROFILES, GUIDE_VERIFICATIONS};
use domain::{GuideApplication, GuideOnboardingRequest};
use resource_gateway::{NewRecord, ResourceGateway};
use serde_json::json;

use crate::coordinator::SagaCoordinator;
use crate::create_resource::CreateResource;
use crate::definition::{SagaDefinition, SagaMode};
use crate::error::Result;
use crate::outcome::SagaOutcome;
use crate::step::SagaContext;

pub const SAGA_NAME: &str = "GuideOnboarding";
pub const STEP_IDENTITY: &str = "create_identity";
pub const STEP_PROFILE: &str = "create_profile";
pub const STEP_VERIFICATION: &str = "create_verification";

/// A validated application together with the outcome of onboarding it.
#[derive(Debug, Clone)]
pub struct OnboardingResult {
    pub application: GuideApplication,
    pub outcome: SagaOutcome,
}

/// Builds and runs the guide onboarding saga.
///
/// With `require_verification` off, a failed verification insert leaves the
/// identity and profile in place and the saga ends `PartiallyCompleted`.
#[derive(Clone)]
pub struct GuideOnboardingSaga<G> {
    gateway: G,
    require_verification: bool,
}

impl<G> GuideOnboardingSaga<G>
where
    G: ResourceGateway + Clone + 'static,
{
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            require_verification: false,
        }
    }

    pub fn require_verification(mut self, required: bool) -> Self {
        self.require_verification = required;
        self
    }

    pub fn definition(&self, application: &GuideApplication) -> SagaDefinition {
        let identity = application.clone();
        let profile = application.clone();
        let verification = application.clone();

        SagaDefinition::new(SAGA_NAME, SagaMode::AllOrNothing)
            .step(CreateResource::new(
                STEP_IDENTITY,
                GUIDE_IDENTITIES,
                self.gateway.clone(),
                move |_| {
                    Ok(NewRecord::new(json!({
                        "email": identity.email,
                        "full_name": identity.full_name,
                        "phone": identity.phone,
                    }))
                    .with_natural_key(identity.email.clone()))
                },
            ))
            .step(CreateResource::new(
                STEP_PROFILE,
                GUIDE_PROFILES,
                self.gateway.clone(),
                move |ctx| {
                    let identity_id = ctx.require_resource_id(STEP_IDENTITY)?;
                    Ok(NewRecord::new(json!({
                        "identity_id": identity_id,
                        "full_name": profile.full_name,
                        "bio": profile.bio,
                        "languages": profile.languages,
                        "years_experience": profile.years_experience,
                        "status": "pending_verification",
                    }))
                    .with_natural_key(identity_id.to_string()))
                },
            ))
            .step(
                CreateResource::new(
                    STEP_VERIFICATION,
                    GUIDE_VERIFICATIONS,
                    self.gateway.clone(),
                    move |ctx| {
                        let profile_id = ctx.require_resource_id(STEP_PROFILE)?;
                        Ok(NewRecord::new(json!({
                            "profile_id": profile_id,
                            "document_type": verification.document_type.as_str(),
                            "document_number": verification.document_number,
                            "status": "pending",
                        }))
                        .with_natural_key(profile_id.to_string()))
                    },
                )
                .soft(!self.require_verification),
            )
    }

    /// Validates and onboards an application.
    #[tracing::instrument(skip(self, coordinator, request))]
    pub async fn execute(
        &self,
        coordinator: &SagaCoordinator,
        request: GuideOnboardingRequest,
    ) -> Result<OnboardingResult> {
        let application = request.validate()?;
        let definition = self.definition(&application);
        let outcome = coordinator
            .run(&definition, SagaContext::new(generate_reference()))
            .await;
        Ok(OnboardingResult {
            application,
            outcome,
        })
    }
}

/// Generates an onboarding reference such as `GD-3F9A61C2`.
pub fn generate_reference() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("GD-{}", id[..8].to_uppercase())
}
