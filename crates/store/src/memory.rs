use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{
    AddressId, CartId, CartItemId, CategoryId, OrderId, OrderItemId, OrderStatus, PaymentStatus,
    ProductId, UserId,
};
use tokio::sync::RwLock;

use crate::{
    Address, Cart, CartChange, CartItem, CartItemRef, Category, NewCategory, NewOrder,
    NewProduct, NewUser, Order, OrderItem, OrderPage, OrderQuery, OrderUpdate, Product,
    ProductPage, ProductQuery, ProductUpdate, Result, StoreError, User, UserPage, UserQuery,
    UserUpdate, Version,
    error::{
        CART_ITEMS_CART_PRODUCT_KEY, CARTS_ONE_ACTIVE_PER_USER, CATEGORIES_NAME_KEY,
        ORDERS_ORDER_NUMBER_KEY, USERS_EMAIL_KEY,
    },
    store::CommerceStore,
};

#[derive(Default)]
struct Sequences {
    category: i64,
    product: i64,
    user: i64,
    cart: i64,
    cart_item: i64,
    address: i64,
    order: i64,
    order_item: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Applies offset and limit to an already filtered and sorted listing.
fn paginate<T>(items: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[derive(Default)]
struct State {
    seq: Sequences,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    users: BTreeMap<UserId, User>,
    carts: BTreeMap<CartId, Cart>,
    addresses: BTreeMap<AddressId, Address>,
    orders: BTreeMap<OrderId, Order>,
}

impl State {
    fn check_category(&self, category_id: Option<CategoryId>) -> Result<()> {
        match category_id {
            Some(id) if !self.categories.contains_key(&id) => {
                Err(StoreError::not_found("Category", id))
            }
            _ => Ok(()),
        }
    }

    fn active_cart(&self, user_id: UserId) -> Option<&Cart> {
        self.carts
            .values()
            .find(|c| c.user_id == user_id && c.is_active)
    }

    fn new_cart(&mut self, user_id: UserId) -> Result<Cart> {
        if self.active_cart(user_id).is_some() {
            return Err(StoreError::unique(CARTS_ONE_ACTIVE_PER_USER));
        }
        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(next_id(&mut self.seq.cart)),
            user_id,
            is_active: true,
            version: Version::initial(),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }
}

/// In-memory store implementation.
///
/// Used by tests and for running the server without a database. It
/// enforces the same constraints as the PostgreSQL schema, and every
/// operation runs under a single lock so multi-record writes are atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_on_rotate: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `rotate_cart` calls fail.
    pub fn set_fail_on_rotate(&self, fail: bool) {
        self.fail_on_rotate.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns every cart ever created for a user, oldest first.
    pub async fn carts_for_user(&self, user_id: UserId) -> Vec<Cart> {
        self.state
            .read()
            .await
            .carts
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Returns the addresses recorded for a user.
    pub async fn addresses_for_user(&self, user_id: UserId) -> Vec<Address> {
        self.state
            .read()
            .await
            .addresses
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn insert_category(&self, category: NewCategory) -> Result<Category> {
        let mut state = self.state.write().await;
        if state
            .categories
            .values()
            .any(|c| c.name.eq_ignore_ascii_case(&category.name))
        {
            return Err(StoreError::unique(CATEGORIES_NAME_KEY));
        }

        let now = Utc::now();
        let category = Category {
            id: CategoryId::new(next_id(&mut state.seq.category)),
            name: category.name,
            description: category.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut categories: Vec<_> = state
            .categories
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let mut state = self.state.write().await;
        state.check_category(product.category_id)?;

        let now = Utc::now();
        let product = Product {
            id: ProductId::new(next_id(&mut state.seq.product)),
            category_id: product.category_id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            is_active: product.is_active,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let mut state = self.state.write().await;
        state.check_category(update.category_id)?;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;

        if let Some(category_id) = update.category_id {
            product.category_id = Some(category_id);
        }
        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(stock) = update.stock {
            product.stock = stock;
        }
        if let Some(is_active) = update.is_active {
            product.is_active = is_active;
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn list_products(&self, query: ProductQuery) -> Result<ProductPage> {
        let state = self.state.read().await;
        let products: Vec<_> = state
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();

        let total = products.len() as u64;
        Ok(ProductPage {
            products: paginate(products, query.limit, query.offset),
            total,
        })
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::unique(USERS_EMAIL_KEY));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(next_id(&mut state.seq.user)),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            phone: user.phone,
            role: user.role,
            is_active: user.is_active,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self, query: UserQuery) -> Result<UserPage> {
        let state = self.state.read().await;
        let mut users: Vec<_> = state
            .users
            .values()
            .filter(|u| query.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = users.len() as u64;
        Ok(UserPage {
            users: paginate(users, query.limit, query.offset),
            total,
        })
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User> {
        let mut state = self.state.write().await;
        if let Some(ref email) = update.email
            && state
                .users
                .values()
                .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email))
        {
            return Err(StoreError::unique(USERS_EMAIL_KEY));
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("User", id))?;
        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(password_hash) = update.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(phone) = update.phone {
            user.phone = Some(phone);
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn get_active_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.active_cart(user_id).cloned())
    }

    async fn create_active_cart(&self, user_id: UserId) -> Result<Cart> {
        self.state.write().await.new_cart(user_id)
    }

    async fn find_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItemRef>> {
        let state = self.state.read().await;
        Ok(state.carts.values().find_map(|cart| {
            cart.items
                .iter()
                .find(|i| i.id == item_id)
                .map(|item| CartItemRef {
                    item: item.clone(),
                    owner: cart.user_id,
                    cart_is_active: cart.is_active,
                })
        }))
    }

    async fn apply_cart_changes(
        &self,
        cart_id: CartId,
        changes: Vec<CartChange>,
        expected: Version,
    ) -> Result<Cart> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let cart = state
            .carts
            .get(&cart_id)
            .ok_or_else(|| StoreError::not_found("Cart", cart_id))?;
        if !cart.is_active {
            return Err(StoreError::CartInactive(cart_id));
        }
        if cart.version != expected {
            return Err(StoreError::ConcurrencyConflict {
                cart_id,
                expected,
                actual: cart.version,
            });
        }

        // Work on a copy so a failing change leaves the cart untouched
        let now = Utc::now();
        let mut items = cart.items.clone();
        for change in changes {
            match change {
                CartChange::ItemAdded {
                    product_id,
                    quantity,
                } => {
                    if !state.products.contains_key(&product_id) {
                        return Err(StoreError::not_found("Product", product_id));
                    }
                    if items.iter().any(|i| i.product_id == product_id) {
                        return Err(StoreError::unique(CART_ITEMS_CART_PRODUCT_KEY));
                    }
                    items.push(CartItem {
                        id: CartItemId::new(next_id(&mut state.seq.cart_item)),
                        cart_id,
                        product_id,
                        quantity,
                        created_at: now,
                        updated_at: now,
                    });
                }
                CartChange::QuantityChanged { item_id, quantity } => {
                    let item = items
                        .iter_mut()
                        .find(|i| i.id == item_id)
                        .ok_or_else(|| StoreError::not_found("CartItem", item_id))?;
                    item.quantity = quantity;
                    item.updated_at = now;
                }
                CartChange::ItemRemoved { item_id } => items.retain(|i| i.id != item_id),
                CartChange::Cleared => items.clear(),
            }
        }

        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("Cart", cart_id))?;
        cart.items = items;
        cart.version = cart.version.next();
        cart.updated_at = now;
        Ok(cart.clone())
    }

    async fn rotate_cart(&self, cart_id: CartId) -> Result<Cart> {
        if self.fail_on_rotate.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut state = self.state.write().await;
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("Cart", cart_id))?;
        cart.is_active = false;
        cart.items.clear();
        cart.version = cart.version.next();
        cart.updated_at = Utc::now();
        let user_id = cart.user_id;

        match state.active_cart(user_id) {
            Some(existing) => Ok(existing.clone()),
            None => state.new_cart(user_id),
        }
    }

    async fn place_order(&self, order: NewOrder) -> Result<Order> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let cart = state
            .carts
            .get(&order.cart_id)
            .ok_or_else(|| StoreError::not_found("Cart", order.cart_id))?;
        if !cart.is_active {
            return Err(StoreError::CartInactive(order.cart_id));
        }
        if cart.version != order.cart_version {
            return Err(StoreError::ConcurrencyConflict {
                cart_id: order.cart_id,
                expected: order.cart_version,
                actual: cart.version,
            });
        }
        if state
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::unique(ORDERS_ORDER_NUMBER_KEY));
        }

        // Validate every line before mutating anything
        let mut lines = order.items.clone();
        lines.sort_by_key(|l| l.product_id);
        for line in &lines {
            let product = state
                .products
                .get(&line.product_id)
                .ok_or_else(|| StoreError::not_found("Product", line.product_id))?;
            if product.stock < line.quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: product.stock,
                });
            }
        }

        let now = Utc::now();
        for line in &lines {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.stock -= line.quantity;
                product.updated_at = now;
            }
        }
        if let Some(cart) = state.carts.get_mut(&order.cart_id) {
            cart.version = cart.version.next();
            cart.updated_at = now;
        }

        let address = Address {
            id: AddressId::new(next_id(&mut state.seq.address)),
            user_id: order.user_id,
            fields: order.address.clone(),
            created_at: now,
        };
        state.addresses.insert(address.id, address);

        let order_id = OrderId::new(next_id(&mut state.seq.order));
        let items = order
            .items
            .iter()
            .map(|line| OrderItem {
                id: OrderItemId::new(next_id(&mut state.seq.order_item)),
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total(),
            })
            .collect();

        let created = Order {
            id: order_id,
            user_id: order.user_id,
            order_number: order.order_number,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            subtotal: order.subtotal,
            tax: order.tax,
            shipping_cost: order.shipping_cost,
            total: order.total,
            payment_method: order.payment_method,
            shipping_address: order.address.to_single_line(),
            tracking_number: None,
            notes: order.notes,
            items,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order_id, created.clone());
        Ok(created)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();

        // Newest first, ties broken by id
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = orders.len() as u64;
        Ok(OrderPage {
            orders: paginate(orders, query.limit, query.offset),
            total,
        })
    }

    async fn update_order(
        &self,
        id: OrderId,
        update: OrderUpdate,
        expected_status: Option<OrderStatus>,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;

        if let Some(expected) = expected_status
            && order.status != expected
        {
            return Err(StoreError::StatusMismatch {
                order_id: id,
                expected,
                actual: order.status,
            });
        }

        if let Some(status) = update.status {
            order.status = status;
        }
        if let Some(payment_status) = update.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(tracking_number) = update.tracking_number {
            order.tracking_number = Some(tracking_number);
        }
        if let Some(notes) = update.notes {
            order.notes = Some(notes);
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}
