//! Cart aggregate and related types.

mod aggregate;
mod service;

pub use aggregate::CartAggregate;
pub use service::CartService;

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId};
use serde::Serialize;
use store::{CartItem, Product, Version};
use thiserror::Error;

use crate::error::CommerceError;
use crate::pricing::Totals;

/// Errors that can occur during cart commands.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The product is inactive.
    #[error("Product not found: {0}")]
    ProductUnavailable(ProductId),

    /// The resulting line quantity exceeds stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The line is not in this cart.
    #[error("Cart item not found: {0}")]
    ItemNotFound(CartItemId),
}

impl From<CartError> for CommerceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::InvalidQuantity { .. } => CommerceError::Validation(e.to_string()),
            CartError::ProductUnavailable(_) | CartError::ItemNotFound(_) => {
                CommerceError::NotFound(e.to_string())
            }
            CartError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            },
        }
    }
}

/// A cart line joined with its current product.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Product,
}

/// The active cart as shown to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: CartId,
    pub user_id: UserId,
    pub is_active: bool,
    pub version: Version,
    pub cart_items: Vec<CartLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Advisory totals for the active cart. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    #[serde(flatten)]
    pub totals: Totals,
    pub cart_items: Vec<CartLine>,
}
