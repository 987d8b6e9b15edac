//! Combined booking requests.
//!
//! One flat request may name up to three independent legs. A leg is part of
//! the plan only if its triggering field is present:
//! experience ⇐ `experience_id`, lodging ⇐ `room_type`,
//! transport ⇐ `transport_id`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::{Money, PriceBreakdown, PricingPolicy};

const MAX_REFERENCE_LEN: usize = 64;

/// Largest accepted unit price: $10,000,000.00.
const MAX_PRICE_CENTS: i64 = 1_000_000_000;
const MAX_PARTICIPANTS: u32 = 1_000;
const MAX_ROOMS: u32 = 500;
const MAX_NIGHTS: u32 = 365;

/// Flat combined booking request as submitted by the booking app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedBookingRequest {
    pub traveler_id: Option<String>,
    /// Client-chosen booking reference. Resubmitting with the same
    /// reference reuses legs that were already created.
    pub reference: Option<String>,

    pub experience_id: Option<String>,
    pub experience_date: Option<NaiveDate>,
    pub participants: Option<u32>,
    pub experience_price_cents: Option<i64>,

    pub lodging_id: Option<String>,
    pub room_type: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub rooms: Option<u32>,
    pub nightly_rate_cents: Option<i64>,

    pub transport_id: Option<String>,
    pub transport_type: Option<String>,
    pub pickup_date: Option<NaiveDate>,
    pub pickup_location: Option<String>,
    pub transport_price_cents: Option<i64>,

    pub special_requests: Option<String>,
}

/// A validated experience reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperienceLeg {
    pub experience_id: String,
    pub date: NaiveDate,
    pub participants: u32,
    pub unit_price: Money,
    #[serde(skip)]
    amount: Money,
}

impl ExperienceLeg {
    pub fn amount(&self) -> Money {
        self.amount
    }
}

/// A validated lodging reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LodgingLeg {
    pub lodging_id: String,
    pub room_type: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: u32,
    pub nightly_rate: Money,
    #[serde(skip)]
    amount: Money,
}

impl LodgingLeg {
    pub fn nights(&self) -> u32 {
        nights_between(self.check_in, self.check_out)
    }

    pub fn amount(&self) -> Money {
        self.amount
    }
}

/// A validated transport reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportLeg {
    pub transport_id: String,
    pub transport_type: Option<String>,
    pub pickup_date: NaiveDate,
    pub pickup_location: Option<String>,
    pub price: Money,
}

impl TransportLeg {
    pub fn amount(&self) -> Money {
        self.price
    }
}

/// A validated, priced booking ready to be turned into a saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingPlan {
    pub reference: String,
    pub traveler_id: String,
    pub special_requests: Option<String>,
    pub experience: Option<ExperienceLeg>,
    pub lodging: Option<LodgingLeg>,
    pub transport: Option<TransportLeg>,
    pub breakdown: PriceBreakdown,
}

impl BookingPlan {
    /// Returns the number of legs in the plan (1 to 3).
    pub fn leg_count(&self) -> usize {
        usize::from(self.experience.is_some())
            + usize::from(self.lodging.is_some())
            + usize::from(self.transport.is_some())
    }
}

impl CombinedBookingRequest {
    /// Validates the request and prices it under `policy`.
    pub fn into_plan(self, policy: &PricingPolicy) -> Result<BookingPlan, ValidationError> {
        let traveler_id =
            present(self.traveler_id).ok_or(ValidationError::MissingField("traveler_id"))?;

        let reference = match present(self.reference) {
            Some(reference) => validate_reference(reference)?,
            None => generate_reference(),
        };

        let experience = match present(self.experience_id) {
            None => None,
            Some(experience_id) => {
                let participants = self.participants.unwrap_or(1);
                if participants == 0 {
                    return Err(ValidationError::invalid(
                        "participants",
                        "must be at least 1",
                    ));
                }
                if participants > MAX_PARTICIPANTS {
                    return Err(ValidationError::invalid(
                        "participants",
                        format!("must be at most {MAX_PARTICIPANTS}"),
                    ));
                }
                let unit_price = price(self.experience_price_cents, "experience_price_cents")?;
                let amount = unit_price
                    .checked_multiply(participants)
                    .ok_or_else(|| too_large("participants"))?;
                Some(ExperienceLeg {
                    experience_id,
                    date: self
                        .experience_date
                        .ok_or(ValidationError::MissingField("experience_date"))?,
                    participants,
                    unit_price,
                    amount,
                })
            }
        };

        let lodging = match present(self.room_type) {
            None => None,
            Some(room_type) => {
                let check_in = self
                    .check_in
                    .ok_or(ValidationError::MissingField("check_in"))?;
                let check_out = self
                    .check_out
                    .ok_or(ValidationError::MissingField("check_out"))?;
                if check_out <= check_in {
                    return Err(ValidationError::invalid(
                        "check_out",
                        "must be after check_in",
                    ));
                }
                if nights_between(check_in, check_out) > MAX_NIGHTS {
                    return Err(ValidationError::invalid(
                        "check_out",
                        format!("stay must be at most {MAX_NIGHTS} nights"),
                    ));
                }
                let rooms = self.rooms.unwrap_or(1);
                if rooms == 0 {
                    return Err(ValidationError::invalid("rooms", "must be at least 1"));
                }
                if rooms > MAX_ROOMS {
                    return Err(ValidationError::invalid(
                        "rooms",
                        format!("must be at most {MAX_ROOMS}"),
                    ));
                }
                let nightly_rate = price(self.nightly_rate_cents, "nightly_rate_cents")?;
                let amount = nights_between(check_in, check_out)
                    .checked_mul(rooms)
                    .and_then(|room_nights| nightly_rate.checked_multiply(room_nights))
                    .ok_or_else(|| too_large("rooms"))?;
                Some(LodgingLeg {
                    lodging_id: present(self.lodging_id)
                        .ok_or(ValidationError::MissingField("lodging_id"))?,
                    room_type,
                    check_in,
                    check_out,
                    rooms,
                    nightly_rate,
                    amount,
                })
            }
        };

        let transport = match present(self.transport_id) {
            None => None,
            Some(transport_id) => Some(TransportLeg {
                transport_id,
                transport_type: present(self.transport_type),
                pickup_date: self
                    .pickup_date
                    .ok_or(ValidationError::MissingField("pickup_date"))?,
                pickup_location: present(self.pickup_location),
                price: price(self.transport_price_cents, "transport_price_cents")?,
            }),
        };

        if experience.is_none() && lodging.is_none() && transport.is_none() {
            return Err(ValidationError::NothingToBook);
        }

        let breakdown = policy
            .quote(
                experience
                    .as_ref()
                    .map(ExperienceLeg::amount)
                    .into_iter()
                    .chain(lodging.as_ref().map(LodgingLeg::amount))
                    .chain(transport.as_ref().map(TransportLeg::amount)),
            )
            .ok_or_else(|| too_large("total"))?;

        Ok(BookingPlan {
            reference,
            traveler_id,
            special_requests: present(self.special_requests),
            experience,
            lodging,
            transport,
            breakdown,
        })
    }
}

/// Generates a booking reference such as `BK-3F9A61C2`.
pub fn generate_reference() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("BK-{}", id[..8].to_uppercase())
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn price(cents: Option<i64>, field: &'static str) -> Result<Money, ValidationError> {
    let cents = cents.ok_or(ValidationError::MissingField(field))?;
    if cents < 0 {
        return Err(ValidationError::invalid(field, "must not be negative"));
    }
    if cents > MAX_PRICE_CENTS {
        return Err(too_large(field));
    }
    Ok(Money::from_cents(cents))
}

fn too_large(field: &'static str) -> ValidationError {
    ValidationError::invalid(field, "amount too large")
}

fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> u32 {
    u32::try_from((check_out - check_in).num_days()).unwrap_or(u32::MAX)
}

fn validate_reference(reference: String) -> Result<String, ValidationError> {
    if reference.len() > MAX_REFERENCE_LEN {
        return Err(ValidationError::invalid(
            "reference",
            format!("must be at most {MAX_REFERENCE_LEN} characters"),
        ));
    }
    if !reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid(
            "reference",
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn lodging_only() -> CombinedBookingRequest {
        CombinedBookingRequest {
            traveler_id: Some("traveler-1".into()),
            lodging_id: Some("hotel-7".into()),
            room_type: Some("double".into()),
            check_in: Some(date("2026-03-01")),
            check_out: Some(date("2026-03-04")),
            nightly_rate_cents: Some(8_000),
            ..Default::default()
        }
    }

    fn full_request() -> CombinedBookingRequest {
        CombinedBookingRequest {
            experience_id: Some("tour-1".into()),
            experience_date: Some(date("2026-03-02")),
            participants: Some(2),
            experience_price_cents: Some(4_500),
            transport_id: Some("shuttle-3".into()),
            pickup_date: Some(date("2026-03-01")),
            transport_price_cents: Some(3_000),
            ..lodging_only()
        }
    }

    #[test]
    fn test_lodging_only_plan() {
        let plan = lodging_only().into_plan(&PricingPolicy::default()).unwrap();

        assert_eq!(plan.leg_count(), 1);
        assert!(plan.experience.is_none());
        assert!(plan.transport.is_none());
        let lodging = plan.lodging.unwrap();
        assert_eq!(lodging.nights(), 3);
        assert_eq!(plan.breakdown.subtotal.cents(), 24_000);
        assert_eq!(plan.breakdown.tax.cents(), 1_200);
        assert_eq!(plan.breakdown.total.cents(), 25_700);
        assert!(plan.reference.starts_with("BK-"));
    }

    #[test]
    fn test_full_plan_prices_all_legs_once() {
        let plan = full_request().into_plan(&PricingPolicy::default()).unwrap();

        assert_eq!(plan.leg_count(), 3);
        // 2 x 45.00 + 3 nights x 80.00 + 30.00
        assert_eq!(plan.breakdown.subtotal.cents(), 9_000 + 24_000 + 3_000);
        assert_eq!(plan.breakdown.service_fee.cents(), 500);
    }

    #[test]
    fn test_lodging_without_room_type_is_not_booked() {
        let request = CombinedBookingRequest {
            room_type: None,
            ..full_request()
        };
        let plan = request.into_plan(&PricingPolicy::default()).unwrap();
        assert!(plan.lodging.is_none());
        assert_eq!(plan.leg_count(), 2);
    }

    #[test]
    fn test_nothing_to_book() {
        let request = CombinedBookingRequest {
            traveler_id: Some("traveler-1".into()),
            room_type: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(
            request.into_plan(&PricingPolicy::default()),
            Err(ValidationError::NothingToBook)
        );
    }

    #[test]
    fn test_missing_traveler() {
        let request = CombinedBookingRequest {
            traveler_id: None,
            ..lodging_only()
        };
        assert_eq!(
            request.into_plan(&PricingPolicy::default()),
            Err(ValidationError::MissingField("traveler_id"))
        );
    }

    #[test]
    fn test_check_out_must_follow_check_in() {
        let request = CombinedBookingRequest {
            check_out: Some(date("2026-03-01")),
            ..lodging_only()
        };
        assert!(matches!(
            request.into_plan(&PricingPolicy::default()),
            Err(ValidationError::InvalidField {
                field: "check_out",
                ..
            })
        ));
    }

    #[test]
    fn test_negative_price_rejected() {
        let request = CombinedBookingRequest {
            nightly_rate_cents: Some(-1),
            ..lodging_only()
        };
        assert!(matches!(
            request.into_plan(&PricingPolicy::default()),
            Err(ValidationError::InvalidField {
                field: "nightly_rate_cents",
                ..
            })
        ));
    }

    fn invalid_field(request: CombinedBookingRequest) -> Option<&'static str> {
        match request.into_plan(&PricingPolicy::default()) {
            Err(ValidationError::InvalidField { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_oversized_prices_rejected() {
        let huge = Some(100_000_000_000_000_000);
        let request = CombinedBookingRequest {
            transport_price_cents: huge,
            ..full_request()
        };
        assert_eq!(invalid_field(request), Some("transport_price_cents"));

        let request = CombinedBookingRequest {
            experience_price_cents: huge,
            ..full_request()
        };
        assert_eq!(invalid_field(request), Some("experience_price_cents"));

        let request = CombinedBookingRequest {
            nightly_rate_cents: huge,
            ..lodging_only()
        };
        assert_eq!(invalid_field(request), Some("nightly_rate_cents"));
    }

    #[test]
    fn test_oversized_quantities_rejected() {
        let request = CombinedBookingRequest {
            participants: Some(u32::MAX),
            ..full_request()
        };
        assert_eq!(invalid_field(request), Some("participants"));

        let request = CombinedBookingRequest {
            rooms: Some(u32::MAX),
            ..lodging_only()
        };
        assert_eq!(invalid_field(request), Some("rooms"));

        let request = CombinedBookingRequest {
            check_in: Some(NaiveDate::MIN),
            check_out: Some(NaiveDate::MAX),
            ..lodging_only()
        };
        assert_eq!(invalid_field(request), Some("check_out"));
    }

    #[test]
    fn test_largest_booking_is_priced() {
        let request = CombinedBookingRequest {
            experience_price_cents: Some(MAX_PRICE_CENTS),
            participants: Some(MAX_PARTICIPANTS),
            nightly_rate_cents: Some(MAX_PRICE_CENTS),
            check_in: Some(date("2026-01-01")),
            check_out: Some(date("2027-01-01")),
            rooms: Some(MAX_ROOMS),
            transport_price_cents: Some(MAX_PRICE_CENTS),
            ..full_request()
        };
        let plan = request.into_plan(&PricingPolicy::default()).unwrap();
        let lodging = plan.lodging.unwrap();
        assert_eq!(lodging.nights(), MAX_NIGHTS);
        assert_eq!(lodging.amount().cents(), MAX_PRICE_CENTS * 365 * 500);
    }

    #[test]
    fn test_total_overflow_rejected() {
        let policy = PricingPolicy::with_service_fee(Money::from_cents(i64::MAX));
        assert_eq!(
            full_request().into_plan(&policy),
            Err(ValidationError::invalid("total", "amount too large"))
        );
    }

    #[test]
    fn test_largest_price_is_accepted() {
        let request = CombinedBookingRequest {
            transport_price_cents: Some(MAX_PRICE_CENTS),
            ..full_request()
        };
        let plan = request.into_plan(&PricingPolicy::default()).unwrap();
        assert_eq!(plan.transport.unwrap().amount().cents(), MAX_PRICE_CENTS);
    }

    #[test]
    fn test_client_reference_is_kept_and_checked() {
        let request = CombinedBookingRequest {
            reference: Some("trip-2026_01".into()),
            ..lodging_only()
        };
        let plan = request.into_plan(&PricingPolicy::default()).unwrap();
        assert_eq!(plan.reference, "trip-2026_01");

        let request = CombinedBookingRequest {
            reference: Some("bad ref!".into()),
            ..lodging_only()
        };
        assert!(request.into_plan(&PricingPolicy::default()).is_err());
    }

    #[test]
    fn test_generated_references_differ() {
        let a = generate_reference();
        assert_eq!(a.len(), 11);
        assert_ne!(a, generate_reference());
    }
}
