//! Order lifecycle: history, customer cancellation and back-office updates.

mod service;

pub use service::OrderService;

use common::{OrderStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::Order;

use crate::pagination::{self, Pagination};

/// Administrative fulfillment update.
///
/// The status is overwritten unconditionally; tracking number and notes
/// only when supplied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            tracking_number: None,
            notes: None,
        }
    }
}

/// Filters for the administrative order listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

impl OrderFilter {
    /// Returns the resolved 1-based page and page size.
    pub fn paging(&self) -> (usize, usize) {
        pagination::resolve(self.page, self.limit)
    }
}

/// One page of the administrative order listing.
#[derive(Debug, Clone, Serialize)]
pub struct OrderListing {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

    #[test]
    fn filter_defaults() {
        assert_eq!(OrderFilter::default().paging(), (1, DEFAULT_PAGE_LIMIT));
    }

    #[test]
    fn filter_clamps_out_of_range_values() {
        let filter = OrderFilter {
            page: Some(0),
            limit: Some(1_000),
            ..Default::default()
        };
        assert_eq!(filter.paging(), (1, MAX_PAGE_LIMIT));
    }

    #[test]
    fn filter_query_string_shape() {
        let filter: OrderFilter =
            serde_json::from_str(r#"{"page":2,"status":"pending"}"#).unwrap();
        assert_eq!(filter.paging(), (2, DEFAULT_PAGE_LIMIT));
        assert_eq!(filter.status, Some(OrderStatus::Pending));
    }

    #[test]
    fn status_update_wire_shape() {
        let update: StatusUpdate =
            serde_json::from_str(r#"{"status":"shipped","tracking_number":"JNE123"}"#).unwrap();
        assert_eq!(update.status, OrderStatus::Shipped);
        assert_eq!(update.tracking_number.as_deref(), Some("JNE123"));
        assert!(update.notes.is_none());
    }
}
