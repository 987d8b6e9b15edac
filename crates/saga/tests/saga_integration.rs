//! Integration tests for the booking and onboarding sagas against the
//! in-memory gateway.

use std::time::Duration;

use chrono::NaiveDate;
use domain::collections::{
    EXPERIENCE_BOOKINGS, GUIDE_IDENTITIES, GUIDE_PROFILES, GUIDE_VERIFICATIONS, LODGING_BOOKINGS,
    TRANSPORT_BOOKINGS,
};
use domain::{CombinedBookingRequest, GuideOnboardingRequest, PricingPolicy};
use resource_gateway::{Fault, InMemoryResourceGateway, ResourceGateway};
use saga::{
    CombinedBookingSaga, CoordinatorConfig, ErrorKind, GuideOnboardingSaga, SagaCoordinator,
    SagaError, SagaStatus,
};

struct TestHarness {
    gateway: InMemoryResourceGateway,
    coordinator: SagaCoordinator,
    booking: CombinedBookingSaga<InMemoryResourceGateway>,
    onboarding: GuideOnboardingSaga<InMemoryResourceGateway>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_verification_required(false)
    }

    fn with_verification_required(required: bool) -> Self {
        let gateway = InMemoryResourceGateway::new();
        let coordinator = SagaCoordinator::new(CoordinatorConfig {
            step_timeout: Duration::from_millis(100),
            compensation_retries: 2,
            compensation_backoff: Duration::from_millis(1),
            max_concurrency: 3,
        });
        Self {
            booking: CombinedBookingSaga::new(gateway.clone(), PricingPolicy::default()),
            onboarding: GuideOnboardingSaga::new(gateway.clone()).require_verification(required),
            gateway,
            coordinator,
        }
    }

    async fn count(&self, collection: &str) -> usize {
        self.gateway.count(collection).await
    }
}

fn date(day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2026, 8, day)
}

fn lodging_only(reference: &str) -> CombinedBookingRequest {
    CombinedBookingRequest {
        traveler_id: Some("traveler-1".into()),
        reference: Some(reference.into()),
        lodging_id: Some("lodge-9".into()),
        room_type: Some("suite".into()),
        check_in: date(10),
        check_out: date(13),
        nightly_rate_cents: Some(20_000),
        ..Default::default()
    }
}

fn full_trip(reference: &str) -> CombinedBookingRequest {
    CombinedBookingRequest {
        experience_id: Some("exp-3".into()),
        experience_date: date(11),
        participants: Some(2),
        experience_price_cents: Some(7_500),
        transport_id: Some("shuttle-1".into()),
        transport_type: Some("shuttle".into()),
        pickup_date: date(10),
        transport_price_cents: Some(4_000),
        ..lodging_only(reference)
    }
}

fn guide(email: &str) -> GuideOnboardingRequest {
    GuideOnboardingRequest {
        email: Some(email.into()),
        full_name: Some("Rita Moreno".into()),
        languages: vec!["es".into(), "en".into()],
        years_experience: Some(6),
        document_type: Some("national_id".into()),
        document_number: Some("ID-778899".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_lodging_only_booking_completes_with_one_result() {
    let h = TestHarness::new();

    let result = h
        .booking
        .execute(&h.coordinator, lodging_only("BK-LODGE001"))
        .await
        .unwrap();

    assert_eq!(result.outcome.status(), SagaStatus::Completed);
    assert_eq!(result.outcome.results().len(), 1);
    assert_eq!(result.outcome.results()[0].step_name, "reserve_lodging");
    assert_eq!(h.count(LODGING_BOOKINGS).await, 1);
    assert_eq!(h.count(EXPERIENCE_BOOKINGS).await, 0);
    assert_eq!(h.count(TRANSPORT_BOOKINGS).await, 0);
    // 3 nights at 200.00, 5% tax, 5.00 fee.
    assert_eq!(result.plan.breakdown.total.cents(), 63_500);
}

#[tokio::test]
async fn test_best_effort_legs_are_independent() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(TRANSPORT_BOOKINGS, Fault::Permanent)
        .await;

    let result = h
        .booking
        .execute(&h.coordinator, full_trip("BK-TRIP0001"))
        .await
        .unwrap();

    let outcome = &result.outcome;
    assert_eq!(outcome.status(), SagaStatus::PartiallyCompleted);
    let succeeded: Vec<_> = outcome.results().iter().map(|r| r.succeeded).collect();
    assert_eq!(succeeded, vec![true, true, false]);
    assert!(outcome.compensation_results().is_empty());
    assert_eq!(h.count(EXPERIENCE_BOOKINGS).await, 1);
    assert_eq!(h.count(LODGING_BOOKINGS).await, 1);
    assert_eq!(h.count(TRANSPORT_BOOKINGS).await, 0);
}

#[tokio::test]
async fn test_booking_with_no_successful_leg_fails() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(LODGING_BOOKINGS, Fault::Transient)
        .await;

    let result = h
        .booking
        .execute(&h.coordinator, lodging_only("BK-LODGE002"))
        .await
        .unwrap();

    assert_eq!(result.outcome.status(), SagaStatus::Failed);
    assert!(result.outcome.is_retryable());
    let err = result.outcome.error().unwrap();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_retry_with_same_reference_reuses_created_legs() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(TRANSPORT_BOOKINGS, Fault::Transient)
        .await;

    let first = h
        .booking
        .execute(&h.coordinator, full_trip("BK-RETRY001"))
        .await
        .unwrap();
    assert_eq!(first.outcome.status(), SagaStatus::PartiallyCompleted);
    assert!(first.outcome.is_retryable());

    h.gateway.clear_faults().await;
    let second = h
        .booking
        .execute(&h.coordinator, full_trip("BK-RETRY001"))
        .await
        .unwrap();

    assert_eq!(second.outcome.status(), SagaStatus::Completed);
    assert_eq!(
        first.outcome.results()[0].resource_id,
        second.outcome.results()[0].resource_id
    );
    assert_eq!(h.count(EXPERIENCE_BOOKINGS).await, 1);
    assert_eq!(h.count(LODGING_BOOKINGS).await, 1);
    assert_eq!(h.count(TRANSPORT_BOOKINGS).await, 1);
}

#[tokio::test]
async fn test_hanging_leg_times_out_as_transient() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(LODGING_BOOKINGS, Fault::Hang)
        .await;

    let result = h
        .booking
        .execute(&h.coordinator, full_trip("BK-HANG0001"))
        .await
        .unwrap();

    let lodging = &result.outcome.results()[1];
    assert!(!lodging.succeeded);
    assert_eq!(lodging.error_kind(), Some(ErrorKind::Transient));
    assert_eq!(result.outcome.status(), SagaStatus::PartiallyCompleted);
}

#[tokio::test]
async fn test_invalid_booking_creates_nothing() {
    let h = TestHarness::new();
    let request = CombinedBookingRequest {
        check_out: date(9),
        ..lodging_only("BK-BAD00001")
    };

    let err = h
        .booking
        .execute(&h.coordinator, request)
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::Validation(_)));
    assert_eq!(h.count(LODGING_BOOKINGS).await, 0);
}

#[tokio::test]
async fn test_onboarding_completes() {
    let h = TestHarness::new();

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    assert_eq!(result.outcome.status(), SagaStatus::Completed);
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 1);
    assert_eq!(h.count(GUIDE_PROFILES).await, 1);
    assert_eq!(h.count(GUIDE_VERIFICATIONS).await, 1);

    let identity_id = result.outcome.results()[0].resource_id.unwrap();
    let profile = h
        .gateway
        .get(GUIDE_PROFILES, result.outcome.results()[1].resource_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.data["identity_id"], identity_id.to_string());
}

#[tokio::test]
async fn test_profile_failure_deletes_identity() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(GUIDE_PROFILES, Fault::Permanent)
        .await;

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    let outcome = &result.outcome;
    assert_eq!(outcome.status(), SagaStatus::Compensated);
    assert_eq!(outcome.compensation_results().len(), 1);
    assert_eq!(outcome.compensation_results()[0].step_name, "create_identity");
    assert!(!outcome.is_retryable());
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 0);
    assert_eq!(h.count(GUIDE_PROFILES).await, 0);
    assert_eq!(h.count(GUIDE_VERIFICATIONS).await, 0);
}

#[tokio::test]
async fn test_profile_committed_after_timeout_is_compensated() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(GUIDE_PROFILES, Fault::HangAfterWrite)
        .await;

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    let outcome = &result.outcome;
    assert_eq!(outcome.status(), SagaStatus::Compensated);
    assert!(outcome.is_retryable());
    let order: Vec<_> = outcome
        .compensation_results()
        .iter()
        .map(|r| r.step_name.as_str())
        .collect();
    assert_eq!(order, vec!["create_profile", "create_identity"]);
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 0);
    assert_eq!(h.count(GUIDE_PROFILES).await, 0);
}

#[tokio::test]
async fn test_timed_out_step_that_wrote_nothing_has_nothing_extra_to_undo() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(GUIDE_PROFILES, Fault::Hang)
        .await;

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    let outcome = &result.outcome;
    assert_eq!(outcome.status(), SagaStatus::Compensated);
    assert_eq!(outcome.compensation_results().len(), 1);
    assert_eq!(outcome.compensation_results()[0].step_name, "create_identity");
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 0);
}

#[tokio::test]
async fn test_soft_verification_failure_keeps_guide() {
    let h = TestHarness::new();
    h.gateway
        .inject_create_fault(GUIDE_VERIFICATIONS, Fault::Permanent)
        .await;

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    assert_eq!(result.outcome.status(), SagaStatus::PartiallyCompleted);
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 1);
    assert_eq!(h.count(GUIDE_PROFILES).await, 1);
    assert_eq!(h.count(GUIDE_VERIFICATIONS).await, 0);
}

#[tokio::test]
async fn test_required_verification_failure_rolls_back_everything() {
    let h = TestHarness::with_verification_required(true);
    h.gateway
        .inject_create_fault(GUIDE_VERIFICATIONS, Fault::Transient)
        .await;

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    let outcome = &result.outcome;
    assert_eq!(outcome.status(), SagaStatus::Compensated);
    let order: Vec<_> = outcome
        .compensation_results()
        .iter()
        .map(|r| r.step_name.as_str())
        .collect();
    assert_eq!(order, vec!["create_profile", "create_identity"]);
    assert!(outcome.is_retryable());
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 0);
    assert_eq!(h.count(GUIDE_PROFILES).await, 0);
}

#[tokio::test]
async fn test_transient_compensation_failure_is_retried() {
    let h = TestHarness::with_verification_required(true);
    h.gateway
        .inject_create_fault(GUIDE_VERIFICATIONS, Fault::Permanent)
        .await;
    h.gateway
        .inject_delete_fault_times(GUIDE_PROFILES, Fault::Transient, 2)
        .await;

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    assert_eq!(result.outcome.status(), SagaStatus::Compensated);
    assert_eq!(h.count(GUIDE_PROFILES).await, 0);
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 0);
}

#[tokio::test]
async fn test_exhausted_compensation_is_fatal() {
    let h = TestHarness::with_verification_required(true);
    h.gateway
        .inject_create_fault(GUIDE_VERIFICATIONS, Fault::Permanent)
        .await;
    h.gateway
        .inject_delete_fault(GUIDE_PROFILES, Fault::Transient)
        .await;

    let result = h
        .onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    let outcome = &result.outcome;
    assert_eq!(outcome.status(), SagaStatus::Failed);
    assert_eq!(outcome.compensation_failures().count(), 1);
    // The identity is still compensated after the profile failed.
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 0);
    assert_eq!(h.count(GUIDE_PROFILES).await, 1);
    match outcome.error() {
        Some(SagaError::Compensation(err)) => {
            assert_eq!(err.step, "create_profile");
            assert_eq!(err.attempts, 3);
        }
        other => panic!("expected compensation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_email_is_permanent() {
    let h = TestHarness::new();
    h.onboarding
        .execute(&h.coordinator, guide("rita@example.com"))
        .await
        .unwrap();

    let second = h
        .onboarding
        .execute(&h.coordinator, guide("RITA@example.com"))
        .await
        .unwrap();

    assert_eq!(second.outcome.status(), SagaStatus::Compensated);
    assert!(!second.outcome.is_retryable());
    assert_eq!(h.count(GUIDE_IDENTITIES).await, 1);
}
