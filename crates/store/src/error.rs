use common::{CartId, OrderId, OrderStatus, ProductId};
use thiserror::Error;

use crate::Version;

/// Unique index allowing a single registration per email.
pub const USERS_EMAIL_KEY: &str = "users_email_key";
/// Unique index on category names, ignoring case.
pub const CATEGORIES_NAME_KEY: &str = "categories_name_key";
/// Partial unique index allowing one active cart per user.
pub const CARTS_ONE_ACTIVE_PER_USER: &str = "carts_one_active_per_user";
/// Unique index allowing one line per product within a cart.
pub const CART_ITEMS_CART_PRODUCT_KEY: &str = "cart_items_cart_product_key";
/// Unique index on human-readable order numbers.
pub const ORDERS_ORDER_NUMBER_KEY: &str = "orders_order_number_key";

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cart was modified since it was read.
    #[error("Concurrency conflict for cart {cart_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        cart_id: CartId,
        expected: Version,
        actual: Version,
    },

    /// A write collided with a unique index.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Not enough stock remained when the order transaction ran.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A guarded order update found the order in another status.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusMismatch {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The cart has already been checked out.
    #[error("Cart {0} is no longer active")]
    CartInactive(CartId),

    /// A stored value could not be decoded into a domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    /// Returns true if this error is a violation of the named unique index.
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_matches_by_name() {
        let err = StoreError::unique(ORDERS_ORDER_NUMBER_KEY);
        assert!(err.is_unique_violation(ORDERS_ORDER_NUMBER_KEY));
        assert!(!err.is_unique_violation(USERS_EMAIL_KEY));
    }

    #[test]
    fn not_found_message() {
        let err = StoreError::not_found("Order", OrderId::new(12));
        assert_eq!(err.to_string(), "Order not found: 12");
    }
}
