//! Totals computation for cart summaries and checkout.

use common::Money;
use serde::Serialize;

use crate::error::CommerceError;

/// How shipping is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShippingPolicy {
    Free,
    Flat(Money),
}

impl ShippingPolicy {
    pub fn cost(&self) -> Money {
        match self {
            ShippingPolicy::Free => Money::zero(),
            ShippingPolicy::Flat(amount) => *amount,
        }
    }
}

/// Tax rate and shipping rule applied to a set of lines.
///
/// The cart summary and the checkout use different policies; the summary is
/// advisory and the checkout figures are the ones persisted on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Tax rate in basis points (1000 = 10%).
    pub tax_rate_bps: u32,
    pub shipping: ShippingPolicy,
}

impl PricingPolicy {
    /// 11% tax, free shipping.
    pub const fn cart_summary() -> Self {
        Self {
            tax_rate_bps: 1_100,
            shipping: ShippingPolicy::Free,
        }
    }

    /// 10% tax, flat shipping of 10000.
    pub const fn checkout() -> Self {
        Self {
            tax_rate_bps: 1_000,
            shipping: ShippingPolicy::Flat(Money::new(10_000)),
        }
    }

    /// Computes totals for `(unit price, quantity)` lines.
    ///
    /// Tax is computed once on the subtotal and truncated. Amounts or item
    /// counts beyond the representable range are a validation error.
    pub fn quote(
        &self,
        lines: impl IntoIterator<Item = (Money, u32)>,
    ) -> Result<Totals, CommerceError> {
        let mut subtotal = Money::zero();
        let mut total_items = 0u32;
        for (unit_price, quantity) in lines {
            subtotal = unit_price
                .checked_multiply(quantity)
                .and_then(|line| subtotal.checked_add(line))
                .ok_or_else(too_large)?;
            total_items = total_items.checked_add(quantity).ok_or_else(too_large)?;
        }

        let tax = subtotal.apply_rate(self.tax_rate_bps).ok_or_else(too_large)?;
        let shipping = self.shipping.cost();
        let total = subtotal
            .checked_add(tax)
            .and_then(|t| t.checked_add(shipping))
            .ok_or_else(too_large)?;

        Ok(Totals {
            subtotal,
            tax,
            shipping,
            total,
            total_items,
        })
    }
}

fn too_large() -> CommerceError {
    CommerceError::validation("Cart total exceeds the supported amount")
}

/// Computed money totals for a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
    pub total_items: u32,
}
