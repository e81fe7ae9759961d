//! Domain error types.

use common::{OrderId, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// The referenced record does not exist or is not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// The record exists but belongs to someone else.
    #[error("{0}")]
    Forbidden(String),

    /// The requested quantity exceeds available stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Checkout was attempted without an active cart or with an empty one.
    #[error("Cart is empty")]
    EmptyCart,

    /// Stored data is inconsistent with the requested operation.
    #[error("{0}")]
    InvalidState(String),

    /// The order status does not allow the requested action.
    #[error("Cannot {action} order {order_id} in status {current}")]
    InvalidTransition {
        order_id: OrderId,
        current: OrderStatus,
        action: &'static str,
    },

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// The operation collided with a concurrent write.
    #[error("{0}")]
    Conflict(String),

    /// Missing, invalid or expired credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// An unexpected failure outside the store, such as password hashing.
    #[error("{0}")]
    Internal(String),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl CommerceError {
    /// Returns the snake_case error kind reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            CommerceError::NotFound(_) => "not_found",
            CommerceError::Forbidden(_) => "forbidden",
            CommerceError::InsufficientStock { .. } => "insufficient_stock",
            CommerceError::EmptyCart => "empty_cart",
            CommerceError::InvalidState(_) => "invalid_state",
            CommerceError::InvalidTransition { .. } => "invalid_transition",
            CommerceError::Validation(_) => "validation",
            CommerceError::Conflict(_) => "conflict",
            CommerceError::Unauthorized(_) => "unauthorized",
            CommerceError::Store(StoreError::ConcurrencyConflict { .. }) => "conflict",
            CommerceError::Internal(_) | CommerceError::Store(_) => "internal",
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        CommerceError::Validation(message.into())
    }
}

impl From<StoreError> for CommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::NotFound { entity, id } => {
                CommerceError::NotFound(format!("{entity} not found: {id}"))
            }
            other => CommerceError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_stock_error_keeps_its_kind() {
        let err: CommerceError = StoreError::InsufficientStock {
            product_id: ProductId::new(5),
            requested: 3,
            available: 1,
        }
        .into();
        assert_eq!(err.code(), "insufficient_stock");
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: CommerceError = StoreError::NotFound {
            entity: "Order",
            id: 4,
        }
        .into();
        assert!(matches!(err, CommerceError::NotFound(ref m) if m == "Order not found: 4"));
    }

    #[test]
    fn invalid_transition_message() {
        let err = CommerceError::InvalidTransition {
            order_id: OrderId::new(9),
            current: OrderStatus::Shipped,
            action: "cancel",
        };
        assert_eq!(err.to_string(), "Cannot cancel order 9 in status shipped");
        assert_eq!(err.code(), "invalid_transition");
    }
}
