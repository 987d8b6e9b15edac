//! Upfront pricing of a combined booking.
//!
//! The quote is computed exactly once per request and copied into every
//! leg's payload; legs never price themselves.

use serde::{Deserialize, Serialize};

use crate::Money;

/// Default tax rate: 5%.
pub const DEFAULT_TAX_RATE_BPS: u32 = 500;

/// Default flat service fee: $5.00.
pub const DEFAULT_SERVICE_FEE_CENTS: i64 = 500;

/// Tax rate and service fee applied to every quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate_bps: u32,
    pub service_fee: Money,
}

impl PricingPolicy {
    /// Creates a policy with the default tax rate and the given fee.
    pub fn with_service_fee(service_fee: Money) -> Self {
        Self {
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            service_fee,
        }
    }

    /// Prices the given leg amounts. `None` if any sum overflows.
    pub fn quote(&self, leg_amounts: impl IntoIterator<Item = Money>) -> Option<PriceBreakdown> {
        let subtotal = leg_amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))?;
        let tax = subtotal.checked_percentage_bps(self.tax_rate_bps)?;
        let total = subtotal.checked_add(tax)?.checked_add(self.service_fee)?;
        Some(PriceBreakdown {
            subtotal,
            tax,
            service_fee: self.service_fee,
            total,
        })
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self::with_service_fee(Money::from_cents(DEFAULT_SERVICE_FEE_CENTS))
    }
}

/// The price quoted to the traveler, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    #[serde(rename = "subtotal_cents")]
    pub subtotal: Money,
    #[serde(rename = "tax_cents")]
    pub tax: Money,
    #[serde(rename = "service_fee_cents")]
    pub service_fee: Money,
    #[serde(rename = "total_cents")]
    pub total: Money,
}
