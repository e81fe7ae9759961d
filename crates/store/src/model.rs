//! Records persisted by the store.

use chrono::{DateTime, Utc};
use common::{
    AddressId, CartId, CartItemId, CategoryId, Money, OrderId, OrderItemId, OrderStatus,
    PaymentMethod, PaymentStatus, ProductId, UserId,
};
use serde::{Deserialize, Serialize};

/// Version number of a cart, used for optimistic concurrency control.
///
/// A freshly created cart is at version 0; every successful mutation
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a cart that has never been mutated.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Catalog --

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a category. Names are unique ignoring case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if `quantity` units can be sold from current stock.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        quantity <= self.stock
    }
}

/// Fields required to create a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewProduct {
    /// Creates an active product with no description.
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            category_id: None,
            name: name.into(),
            description: String::new(),
            price,
            stock,
            is_active: true,
        }
    }
}

/// Partial product update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub category_id: Option<CategoryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<u32>,
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

// -- Users --

/// Access role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parses a stored role name.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

/// Partial user update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

// -- Addresses --

/// A shipping address as submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Free-form label such as "home" or "work".
    #[serde(default, rename = "type")]
    pub label: Option<String>,
    /// Street and house number.
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

impl ShippingAddress {
    /// Formats the address into the single line stored on an order.
    pub fn to_single_line(&self) -> String {
        format!(
            "{}, {}, {}, {}",
            self.address, self.city, self.province, self.postal_code
        )
    }
}

/// A stored address record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub fields: ShippingAddress,
    pub created_at: DateTime<Utc>,
}

// -- Carts --

/// A cart with its current lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub is_active: bool,
    pub version: Version,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line inside a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line together with the ownership of the cart holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemRef {
    pub item: CartItem,
    pub owner: UserId,
    pub cart_is_active: bool,
}

/// A single mutation applied to a cart.
///
/// Cart commands produce a list of changes; the store applies the whole
/// list atomically against an expected cart version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    /// Insert a new line for a product not yet in the cart.
    ItemAdded {
        product_id: ProductId,
        quantity: u32,
    },
    /// Overwrite the quantity of an existing line.
    QuantityChanged { item_id: CartItemId, quantity: u32 },
    /// Delete one line.
    ItemRemoved { item_id: CartItemId },
    /// Delete every line.
    Cleared,
}

// -- Orders --

/// A placed order with its line snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    #[serde(rename = "total_amount")]
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    #[serde(rename = "order_items")]
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Frozen price and quantity of one purchased product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(rename = "total_price")]
    pub line_total: Money,
}

/// Everything the store needs to create an order in one transaction.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    /// The cart the lines were read from and the version they were read at.
    pub cart_id: CartId,
    pub cart_version: Version,
    pub order_number: String,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub address: ShippingAddress,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// A line to snapshot into an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewOrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Mutable order fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

impl OrderUpdate {
    /// An update that only changes the fulfillment status.
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// An update that only changes the payment status.
    pub fn payment_status(payment_status: PaymentStatus) -> Self {
        Self {
            payment_status: Some(payment_status),
            ..Default::default()
        }
    }
}
