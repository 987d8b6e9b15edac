//! Travel booking domain.
//!
//! Pure types with no I/O:
//! - [`Money`] and the upfront [`PricingPolicy`] quote
//! - validation of combined booking and guide onboarding requests
//! - the collection names shared by the sagas and the dashboard hub

pub mod booking;
pub mod collections;
pub mod error;
pub mod guide;
pub mod money;
pub mod pricing;

pub use booking::{
    BookingPlan, CombinedBookingRequest, ExperienceLeg, LodgingLeg, TransportLeg,
    generate_reference,
};
pub use error::ValidationError;
pub use guide::{DocumentType, GuideApplication, GuideOnboardingRequest};
pub use money::Money;
pub use pricing::{PriceBreakdown, PricingPolicy};
