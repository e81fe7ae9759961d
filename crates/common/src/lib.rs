//! Shared types for the commerce backend.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, ParseStatusError, PaymentMethod, PaymentStatus};
pub use types::{
    AddressId, CartId, CartItemId, CategoryId, OrderId, OrderItemId, ProductId, UserId,
};
