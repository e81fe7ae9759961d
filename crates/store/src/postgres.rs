use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    CartId, CartItemId, CategoryId, Money, OrderId, OrderItemId, OrderStatus, PaymentMethod,
    PaymentStatus, ProductId, UserId,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use crate::{
    Cart, CartChange, CartItem, CartItemRef, Category, NewCategory, NewOrder, NewProduct,
    NewUser, Order, OrderItem, OrderPage, OrderQuery, OrderUpdate, Product, ProductPage,
    ProductQuery, ProductUpdate, Result, Role, StoreError, User, UserPage, UserQuery, UserUpdate,
    Version,
    error::{
        CART_ITEMS_CART_PRODUCT_KEY, CARTS_ONE_ACTIVE_PER_USER, CATEGORIES_NAME_KEY,
        ORDERS_ORDER_NUMBER_KEY, USERS_EMAIL_KEY,
    },
    store::CommerceStore,
};

const UNIQUE_CONSTRAINTS: [&str; 5] = [
    USERS_EMAIL_KEY,
    CATEGORIES_NAME_KEY,
    CARTS_ONE_ACTIVE_PER_USER,
    CART_ITEMS_CART_PRODUCT_KEY,
    ORDERS_ORDER_NUMBER_KEY,
];

const CATEGORY_COLUMNS: &str = "id, name, description, is_active, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
    "id, category_id, name, description, price, stock, is_active, created_at, updated_at";
const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, phone, role, is_active, created_at, updated_at";
const CART_COLUMNS: &str = "id, user_id, is_active, version, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, order_number, status, payment_status, subtotal, tax, shipping_cost, total_amount, payment_method, shipping_address, tracking_number, notes, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, product_id, quantity, unit_price, total_price";

/// Maps named unique index violations to `UniqueViolation`.
fn map_unique(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && let Some(name) = db_err.constraint()
        && UNIQUE_CONSTRAINTS.contains(&name)
    {
        return StoreError::unique(name);
    }
    StoreError::Database(e)
}

fn to_db_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| StoreError::Decode(format!("quantity {quantity} too large")))
}

fn from_db_quantity(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("negative quantity {value}")))
}

fn to_db_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_paging(
    builder: &mut QueryBuilder<'_, Postgres>,
    limit: Option<usize>,
    offset: Option<usize>,
) {
    if let Some(limit) = limit {
        builder.push(" LIMIT ").push_bind(to_db_count(limit));
    }
    if let Some(offset) = offset {
        builder.push(" OFFSET ").push_bind(to_db_count(offset));
    }
}

fn decode<T: std::str::FromStr>(value: String) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| StoreError::Decode(e.to_string()))
}

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_category(row: PgRow) -> Result<Category> {
        Ok(Category {
            id: CategoryId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            category_id: row
                .try_get::<Option<i64>, _>("category_id")?
                .map(CategoryId::new),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::new(row.try_get("price")?),
            stock: from_db_quantity(row.try_get("stock")?)?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: UserId::new(row.try_get("id")?),
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            phone: row.try_get("phone")?,
            role: Role::parse(&role).ok_or_else(|| StoreError::Decode(format!("role {role}")))?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
        Ok(CartItem {
            id: CartItemId::new(row.try_get("id")?),
            cart_id: CartId::new(row.try_get("cart_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: from_db_quantity(row.try_get("quantity")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            order_number: row.try_get("order_number")?,
            status: decode::<OrderStatus>(row.try_get("status")?)?,
            payment_status: decode::<PaymentStatus>(row.try_get("payment_status")?)?,
            subtotal: Money::new(row.try_get("subtotal")?),
            tax: Money::new(row.try_get("tax")?),
            shipping_cost: Money::new(row.try_get("shipping_cost")?),
            total: Money::new(row.try_get("total_amount")?),
            payment_method: decode::<PaymentMethod>(row.try_get("payment_method")?)?,
            shipping_address: row.try_get("shipping_address")?,
            tracking_number: row.try_get("tracking_number")?,
            notes: row.try_get("notes")?,
            items: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: from_db_quantity(row.try_get("quantity")?)?,
            unit_price: Money::new(row.try_get("unit_price")?),
            line_total: Money::new(row.try_get("total_price")?),
        })
    }

    async fn load_cart(conn: &mut PgConnection, row: PgRow) -> Result<Cart> {
        let id = CartId::new(row.try_get("id")?);
        let items = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY id ASC"
        ))
        .bind(id.as_i64())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(Self::row_to_cart_item)
        .collect::<Result<Vec<_>>>()?;

        Ok(Cart {
            id,
            user_id: UserId::new(row.try_get("user_id")?),
            is_active: row.try_get("is_active")?,
            version: Version::new(row.try_get("version")?),
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn cart_by_id(conn: &mut PgConnection, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::load_cart(conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn active_cart(conn: &mut PgConnection, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 AND is_active"
        ))
        .bind(user_id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;
        match row {
            Some(row) => Ok(Some(Self::load_cart(conn, row).await?)),
            None => Ok(None),
        }
    }

    /// Bumps the cart version if it is active and at `expected`.
    ///
    /// On failure, re-reads the cart to report why the claim was refused.
    async fn claim_cart(conn: &mut PgConnection, cart_id: CartId, expected: Version) -> Result<()> {
        let claimed = sqlx::query(
            r#"
            UPDATE carts SET version = version + 1, updated_at = NOW()
            WHERE id = $1 AND is_active AND version = $2
            "#,
        )
        .bind(cart_id.as_i64())
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if claimed == 1 {
            return Ok(());
        }

        let row = sqlx::query("SELECT is_active, version FROM carts WHERE id = $1")
            .bind(cart_id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            None => Err(StoreError::not_found("Cart", cart_id)),
            Some(row) if !row.try_get::<bool, _>("is_active")? => {
                Err(StoreError::CartInactive(cart_id))
            }
            Some(row) => Err(StoreError::ConcurrencyConflict {
                cart_id,
                expected,
                actual: Version::new(row.try_get("version")?),
            }),
        }
    }

    async fn attach_items(conn: &mut PgConnection, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id ASC"
        ))
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = Self::row_to_order_item(row)?;
            by_order.entry(item.order_id).or_default().push(item);
        }
        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn order_by_id(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = [Self::row_to_order(&row)?];
        Self::attach_items(conn, &mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    fn push_order_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
        builder.push(" WHERE 1=1");
        if let Some(user_id) = query.user_id {
            builder.push(" AND user_id = ").push_bind(user_id.as_i64());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(payment_status) = query.payment_status {
            builder
                .push(" AND payment_status = ")
                .push_bind(payment_status.as_str());
        }
        if let Some(ref term) = query.search {
            let pattern = format!("%{term}%");
            builder
                .push(" AND (order_number ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR shipping_address ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    fn push_product_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
        builder.push(" WHERE 1=1");
        if query.active_only {
            builder.push(" AND is_active");
        }
        if let Some(category_id) = query.category_id {
            builder
                .push(" AND category_id = ")
                .push_bind(category_id.as_i64());
        }
        if let Some(min) = query.min_price {
            builder.push(" AND price >= ").push_bind(min.amount());
        }
        if let Some(max) = query.max_price {
            builder.push(" AND price <= ").push_bind(max.amount());
        }
        if let Some(ref term) = query.search {
            let pattern = format!("%{term}%");
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    fn push_user_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
        builder.push(" WHERE 1=1");
        if let Some(role) = query.role {
            builder.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(is_active) = query.is_active {
            builder.push(" AND is_active = ").push_bind(is_active);
        }
        if let Some(ref term) = query.search {
            let pattern = format!("%{term}%");
            builder
                .push(" AND (first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR last_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn insert_category(&self, category: NewCategory) -> Result<Category> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(&category.name)
        .bind(&category.description)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;

        Self::row_to_category(row)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_category)
            .transpose()
    }

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE is_active OR NOT $1 ORDER BY name ASC"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_category).collect()
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, description, price, stock, is_active, category_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(to_db_quantity(product.stock)?)
        .bind(product.is_active)
        .bind(product.category_id.map(|id| id.as_i64()))
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let stock = update.stock.map(to_db_quantity).transpose()?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                stock = COALESCE($5, stock),
                is_active = COALESCE($6, is_active),
                category_id = COALESCE($7, category_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(update.name)
        .bind(update.description)
        .bind(update.price.map(|p| p.amount()))
        .bind(stock)
        .bind(update.is_active)
        .bind(update.category_id.map(|id| id.as_i64()))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_product(row),
            None => Err(StoreError::not_found("Product", id)),
        }
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_product)
            .transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.as_i64()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&raw)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn list_products(&self, query: ProductQuery) -> Result<ProductPage> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
        Self::push_product_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        Self::push_product_filters(&mut select, &query);
        select.push(" ORDER BY id ASC");
        push_paging(&mut select, query.limit, query.offset);

        let products = select
            .build()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;

        Ok(ProductPage {
            products,
            total: total as u64,
        })
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, phone, role, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;

        Self::row_to_user(row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }

    async fn list_users(&self, query: UserQuery) -> Result<UserPage> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
        Self::push_user_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        Self::push_user_filters(&mut select, &query);
        select.push(" ORDER BY created_at DESC, id DESC");
        push_paging(&mut select, query.limit, query.offset);

        let users = select
            .build()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_user)
            .collect::<Result<Vec<_>>>()?;

        Ok(UserPage {
            users,
            total: total as u64,
        })
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                password_hash = COALESCE($5, password_hash),
                phone = COALESCE($6, phone),
                role = COALESCE($7, role),
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.email)
        .bind(update.password_hash)
        .bind(update.phone)
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique)?;

        match row {
            Some(row) => Self::row_to_user(row),
            None => Err(StoreError::not_found("User", id)),
        }
    }

    async fn get_active_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        Self::active_cart(&mut conn, user_id).await
    }

    async fn create_active_cart(&self, user_id: UserId) -> Result<Cart> {
        let row = sqlx::query(&format!(
            "INSERT INTO carts (user_id) VALUES ($1) RETURNING {CART_COLUMNS}"
        ))
        .bind(user_id.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;

        Ok(Cart {
            id: CartId::new(row.try_get("id")?),
            user_id,
            is_active: row.try_get("is_active")?,
            version: Version::new(row.try_get("version")?),
            items: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn find_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItemRef>> {
        let row = sqlx::query(
            r#"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.created_at, ci.updated_at,
                   c.user_id AS owner, c.is_active AS cart_is_active
            FROM cart_items ci
            JOIN carts c ON c.id = ci.cart_id
            WHERE ci.id = $1
            "#,
        )
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(CartItemRef {
                item: Self::row_to_cart_item(&row)?,
                owner: UserId::new(row.try_get("owner")?),
                cart_is_active: row.try_get("cart_is_active")?,
            })),
            None => Ok(None),
        }
    }

    async fn apply_cart_changes(
        &self,
        cart_id: CartId,
        changes: Vec<CartChange>,
        expected: Version,
    ) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        Self::claim_cart(&mut tx, cart_id, expected).await?;

        for change in changes {
            match change {
                CartChange::ItemAdded {
                    product_id,
                    quantity,
                } => {
                    sqlx::query(
                        "INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3)",
                    )
                    .bind(cart_id.as_i64())
                    .bind(product_id.as_i64())
                    .bind(to_db_quantity(quantity)?)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_unique)?;
                }
                CartChange::QuantityChanged { item_id, quantity } => {
                    let updated = sqlx::query(
                        r#"
                        UPDATE cart_items SET quantity = $3, updated_at = NOW()
                        WHERE id = $1 AND cart_id = $2
                        "#,
                    )
                    .bind(item_id.as_i64())
                    .bind(cart_id.as_i64())
                    .bind(to_db_quantity(quantity)?)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                    if updated == 0 {
                        return Err(StoreError::not_found("CartItem", item_id));
                    }
                }
                CartChange::ItemRemoved { item_id } => {
                    sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
                        .bind(item_id.as_i64())
                        .bind(cart_id.as_i64())
                        .execute(&mut *tx)
                        .await?;
                }
                CartChange::Cleared => {
                    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
                        .bind(cart_id.as_i64())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        let cart = Self::cart_by_id(&mut tx, cart_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Cart", cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn rotate_cart(&self, cart_id: CartId) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE carts SET is_active = FALSE, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING user_id
            "#,
        )
        .bind(cart_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;
        let user_id = UserId::new(user_id.ok_or_else(|| StoreError::not_found("Cart", cart_id))?);

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) WHERE is_active DO NOTHING",
        )
        .bind(user_id.as_i64())
        .execute(&mut *tx)
        .await?;

        let cart = Self::active_cart(&mut tx, user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Cart", user_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn place_order(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        Self::claim_cart(&mut tx, order.cart_id, order.cart_version).await?;

        // Lock product rows in id order so concurrent checkouts cannot deadlock
        let mut lines = order.items.clone();
        lines.sort_by_key(|l| l.product_id);
        for line in &lines {
            let requested = to_db_quantity(line.quantity)?;
            let decremented = sqlx::query(
                r#"
                UPDATE products SET stock = stock - $2, updated_at = NOW()
                WHERE id = $1 AND stock >= $2
                "#,
            )
            .bind(line.product_id.as_i64())
            .bind(requested)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if decremented == 0 {
                let available: Option<i32> =
                    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                        .bind(line.product_id.as_i64())
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match available {
                    Some(available) => StoreError::InsufficientStock {
                        product_id: line.product_id,
                        requested: line.quantity,
                        available: from_db_quantity(available)?,
                    },
                    None => StoreError::not_found("Product", line.product_id),
                });
            }
        }

        let address_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO addresses (user_id, label, address, city, province, postal_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(order.user_id.as_i64())
        .bind(&order.address.label)
        .bind(&order.address.address)
        .bind(&order.address.city)
        .bind(&order.address.province)
        .bind(&order.address.postal_code)
        .fetch_one(&mut *tx)
        .await?;

        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, order_number, status, payment_status, subtotal, tax,
                                shipping_cost, total_amount, payment_method, shipping_address,
                                address_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(order.user_id.as_i64())
        .bind(&order.order_number)
        .bind(OrderStatus::Pending.as_str())
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(order.subtotal.amount())
        .bind(order.tax.amount())
        .bind(order.shipping_cost.amount())
        .bind(order.total.amount())
        .bind(order.payment_method.as_str())
        .bind(order.address.to_single_line())
        .bind(address_id)
        .bind(&order.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        for line in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price, total_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order_id)
            .bind(line.product_id.as_i64())
            .bind(to_db_quantity(line.quantity)?)
            .bind(line.unit_price.amount())
            .bind(line.line_total().amount())
            .execute(&mut *tx)
            .await?;
        }

        let created = Self::order_by_id(&mut tx, OrderId::new(order_id))
            .await?
            .ok_or_else(|| StoreError::not_found("Order", order_id))?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::order_by_id(&mut conn, id).await
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
        Self::push_order_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        Self::push_order_filters(&mut select, &query);
        select.push(" ORDER BY created_at DESC, id DESC");
        push_paging(&mut select, query.limit, query.offset);

        let mut conn = self.pool.acquire().await?;
        let rows = select.build().fetch_all(&mut *conn).await?;
        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Self::attach_items(&mut conn, &mut orders).await?;

        Ok(OrderPage {
            orders,
            total: total as u64,
        })
    }

    async fn update_order(
        &self,
        id: OrderId,
        update: OrderUpdate,
        expected_status: Option<OrderStatus>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = COALESCE($2, status),
                payment_status = COALESCE($3, payment_status),
                tracking_number = COALESCE($4, tracking_number),
                notes = COALESCE($5, notes),
                updated_at = NOW()
            WHERE id = $1 AND ($6::TEXT IS NULL OR status = $6)
            "#,
        )
        .bind(id.as_i64())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.payment_status.map(|s| s.as_str()))
        .bind(update.tracking_number)
        .bind(update.notes)
        .bind(expected_status.map(|s| s.as_str()))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let order = Self::order_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", id))?;

        if updated == 0
            && let Some(expected) = expected_status
        {
            return Err(StoreError::StatusMismatch {
                order_id: id,
                expected,
                actual: order.status,
            });
        }

        tx.commit().await?;
        Ok(order)
    }
}
