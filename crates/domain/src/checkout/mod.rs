//! Checkout: converting the active cart into an order.

mod service;

pub use service::{CheckoutService, MAX_ORDER_NUMBER_ATTEMPTS};

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, PaymentMethod};
use serde::{Deserialize, Serialize};
use store::{Order, ShippingAddress};
use uuid::Uuid;

/// Input to a checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What the customer gets back from a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
}

impl From<&Order> for CheckoutReceipt {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            total_amount: order.total,
            payment_method: order.payment_method,
        }
    }
}

/// Source of human-readable order numbers.
///
/// Numbers need not be globally unique; the store rejects duplicates and
/// checkout asks for another.
pub trait OrderNumberGenerator: Send + Sync {
    fn generate(&self, now: DateTime<Utc>) -> String;
}

/// `ORD-YYYYMMDD-xxxxxxxx`: the UTC date plus 8 random hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyOrderNumbers;

impl OrderNumberGenerator for DailyOrderNumbers {
    fn generate(&self, now: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("ORD-{}-{}", now.format("%Y%m%d"), &suffix[..8])
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn daily_order_number_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 0).unwrap();
        let number = DailyOrderNumbers.generate(now);

        assert!(number.starts_with("ORD-20250309-"));
        assert_eq!(number.len(), "ORD-20250309-".len() + 8);
        assert!(number[13..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn order_numbers_vary() {
        let now = Utc::now();
        assert_ne!(
            DailyOrderNumbers.generate(now),
            DailyOrderNumbers.generate(now)
        );
    }

    #[test]
    fn checkout_request_accepts_wire_shape() {
        let request: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "shipping_address": {
                "type": "home",
                "address": "Jl. Malioboro 1",
                "city": "Yogyakarta",
                "province": "DI Yogyakarta",
                "postal_code": "55271"
            },
            "payment_method": "cod"
        }))
        .unwrap();

        assert_eq!(request.payment_method, PaymentMethod::CashOnDelivery);
        assert_eq!(request.shipping_address.label.as_deref(), Some("home"));
        assert!(request.notes.is_none());
    }
}
