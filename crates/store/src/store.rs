use std::collections::HashMap;

use async_trait::async_trait;
use common::{CartId, CartItemId, CategoryId, OrderId, OrderStatus, ProductId, UserId};

use crate::{
    Cart, CartChange, CartItemRef, Category, NewCategory, NewOrder, NewProduct, NewUser, Order,
    OrderPage, OrderQuery, OrderUpdate, Product, ProductPage, ProductQuery, ProductUpdate, Result,
    StoreError, User, UserPage, UserQuery, UserUpdate, Version,
    error::CARTS_ONE_ACTIVE_PER_USER,
};

/// Core trait for persistence implementations.
///
/// The store owns every invariant that must hold under concurrency: one
/// active cart per user, one line per product in a cart, unique emails,
/// category names and order numbers, and non-negative stock. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Inserts a category. Fails with a `categories_name_key` violation if
    /// the name is taken.
    async fn insert_category(&self, category: NewCategory) -> Result<Category>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    /// Lists categories ordered by name.
    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>>;

    /// Inserts a product.
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    /// Applies a partial update to a product.
    ///
    /// Fails with `NotFound` if the product does not exist.
    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product>;

    /// Retrieves a product regardless of its active flag.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves several products at once, keyed by id.
    ///
    /// Ids that do not resolve are absent from the map.
    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    /// Lists products matching a query, ordered by id, with the total count.
    async fn list_products(&self, query: ProductQuery) -> Result<ProductPage>;

    /// Inserts a user. Fails with a `users_email_key` violation if the
    /// email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Looks up a user by email, compared case-insensitively.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Lists users matching a query, newest first, with the total count.
    async fn list_users(&self, query: UserQuery) -> Result<UserPage>;

    /// Applies a partial update to a user.
    ///
    /// Fails with `NotFound` if the user does not exist and with a
    /// `users_email_key` violation if the new email belongs to another user.
    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User>;

    /// Retrieves the user's active cart with its lines.
    async fn get_active_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Creates an empty active cart at the initial version.
    ///
    /// Fails with a `carts_one_active_per_user` violation if the user
    /// already has an active cart.
    async fn create_active_cart(&self, user_id: UserId) -> Result<Cart>;

    /// Retrieves a cart line together with the owner of its cart.
    async fn find_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItemRef>>;

    /// Applies changes to an active cart atomically.
    ///
    /// The operation fails with `ConcurrencyConflict` if the cart is not at
    /// `expected`, and with `CartInactive` if the cart has been checked out.
    /// On success the cart version is incremented once and the updated
    /// cart is returned.
    async fn apply_cart_changes(
        &self,
        cart_id: CartId,
        changes: Vec<CartChange>,
        expected: Version,
    ) -> Result<Cart>;

    /// Retires a checked-out cart and opens a fresh one.
    ///
    /// Deactivates the cart, deletes its lines, and creates a new empty
    /// active cart for the same user in one transaction. Returns the new
    /// cart.
    async fn rotate_cart(&self, cart_id: CartId) -> Result<Cart>;

    /// Creates an order in a single transaction.
    ///
    /// The transaction claims the source cart (it must still be active and
    /// at `cart_version`; its version is bumped), decrements stock for every
    /// line, stores the shipping address, and inserts the order with its
    /// items. Any failure rolls everything back.
    async fn place_order(&self, order: NewOrder) -> Result<Order>;

    /// Retrieves an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching a query, newest first, with the total count.
    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage>;

    /// Updates the mutable fields of an order.
    ///
    /// When `expected_status` is set the update only applies if the order is
    /// currently in that status; otherwise it fails with `StatusMismatch`.
    async fn update_order(
        &self,
        id: OrderId,
        update: OrderUpdate,
        expected_status: Option<OrderStatus>,
    ) -> Result<Order>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait CommerceStoreExt: CommerceStore {
    /// Returns the user's active cart, creating it if absent.
    ///
    /// Two concurrent callers may both try to create the cart; the loser
    /// sees the unique violation and re-reads the winner's cart.
    async fn find_or_create_active_cart(&self, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = self.get_active_cart(user_id).await? {
            return Ok(cart);
        }

        match self.create_active_cart(user_id).await {
            Ok(cart) => Ok(cart),
            Err(e) if e.is_unique_violation(CARTS_ONE_ACTIVE_PER_USER) => {
                tracing::debug!(%user_id, "lost active cart creation race, re-reading");
                self.get_active_cart(user_id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("Cart", user_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Retrieves an order, failing with `NotFound` if it does not exist.
    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", id))
    }
}

// Blanket implementation for all CommerceStore implementations
impl<T: CommerceStore + ?Sized> CommerceStoreExt for T {}
