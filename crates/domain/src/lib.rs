//! Domain layer for the commerce backend.
//!
//! This crate provides the services behind the HTTP API:
//! - Cart aggregate and CommandHandler applying cart changes with optimistic concurrency
//! - Guest-cart merge run at login
//! - Checkout turning the active cart into an order
//! - Order lifecycle for customers and administrators
//! - Registration, login and bearer tokens
//! - Catalog browsing and back-office product, category and user management

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod command;
pub mod error;
pub mod guest_cart;
pub mod order;
pub mod pagination;
pub mod pricing;
pub mod users;

pub use auth::{AuthResponse, AuthService, Claims, Credentials, Registration, TokenIssuer};
pub use cart::{CartAggregate, CartError, CartLine, CartService, CartSummary, CartView};
pub use catalog::{CatalogService, ProductFilter, ProductListing};
pub use checkout::{
    CheckoutReceipt, CheckoutRequest, CheckoutService, DailyOrderNumbers, OrderNumberGenerator,
};
pub use command::{CommandHandler, CommandResult};
pub use error::CommerceError;
pub use guest_cart::{GuestCartLine, GuestCartMerger, MergeOutcome, MergeReport, SkipReason};
pub use order::{OrderFilter, OrderListing, OrderService, StatusUpdate};
pub use pagination::Pagination;
pub use pricing::{PricingPolicy, ShippingPolicy, Totals};
pub use users::{AccountUpdate, NewAccount, UserFilter, UserListing, UserService};
