use common::{CategoryId, Money, OrderStatus, PaymentStatus, UserId};

use crate::{Order, Product, Role, User};

/// Offset of a 1-based page. Offsets past `usize::MAX` saturate, which
/// yields an empty page.
fn page_offset(page: usize, per_page: usize) -> usize {
    (page.max(1) - 1).saturating_mul(per_page)
}

fn normalize_search(term: String) -> Option<String> {
    let trimmed = term.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Builder for constructing order listing queries.
///
/// Filters combine with AND. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Restrict to orders placed by one user.
    pub user_id: Option<UserId>,

    /// Filter by fulfillment status.
    pub status: Option<OrderStatus>,

    /// Filter by payment status.
    pub payment_status: Option<PaymentStatus>,

    /// Case-insensitive substring matched against the order number or
    /// the shipping address.
    pub search: Option<String>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the orders of a specific user.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Filters by owner.
    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Filters by fulfillment status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by payment status.
    pub fn payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    /// Filters by a search term. Blank terms are ignored.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = normalize_search(term.into());
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips a number of results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets limit and offset from a 1-based page number.
    pub fn page(self, page: usize, per_page: usize) -> Self {
        self.limit(per_page).offset(page_offset(page, per_page))
    }

    /// Returns true if the order passes every filter except paging.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id != user_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(payment_status) = self.payment_status
            && order.payment_status != payment_status
        {
            return false;
        }
        if let Some(ref term) = self.search {
            let term = term.to_lowercase();
            if !contains_ignore_case(&order.order_number, &term)
                && !contains_ignore_case(&order.shipping_address, &term)
            {
                return false;
            }
        }
        true
    }
}

/// One page of orders plus the count of all matching orders.
#[derive(Debug, Clone, Default)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

/// Catalog listing query, ordered by product id.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Hide deactivated products.
    pub active_only: bool,
    pub category_id: Option<CategoryId>,
    /// Case-insensitive substring matched against name or description.
    pub search: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ProductQuery {
    /// Query over every product, active or not.
    pub fn all() -> Self {
        Self::default()
    }

    /// Query over the products customers may see.
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Filters by a search term. Blank terms are ignored.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = normalize_search(term.into());
        self
    }

    /// Restricts to prices within `min..=max`; either bound may be open.
    pub fn price_range(mut self, min: Option<Money>, max: Option<Money>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.limit = Some(per_page);
        self.offset = Some(page_offset(page, per_page));
        self
    }

    /// Returns true if the product passes every filter except paging.
    pub fn matches(&self, product: &Product) -> bool {
        if self.active_only && !product.is_active {
            return false;
        }
        if self.category_id.is_some() && product.category_id != self.category_id {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price < min)
            || self.max_price.is_some_and(|max| product.price > max)
        {
            return false;
        }
        if let Some(ref term) = self.search {
            let term = term.to_lowercase();
            if !contains_ignore_case(&product.name, &term)
                && !contains_ignore_case(&product.description, &term)
            {
                return false;
            }
        }
        true
    }
}

/// One page of products plus the count of all matching products.
#[derive(Debug, Clone, Default)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: u64,
}

/// User listing query for the back office. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Case-insensitive substring matched against first name, last name or
    /// email.
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl UserQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    /// Filters by a search term. Blank terms are ignored.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = normalize_search(term.into());
        self
    }

    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.limit = Some(per_page);
        self.offset = Some(page_offset(page, per_page));
        self
    }

    /// Returns true if the user passes every filter except paging.
    pub fn matches(&self, user: &User) -> bool {
        if self.role.is_some_and(|role| user.role != role)
            || self.is_active.is_some_and(|active| user.is_active != active)
        {
            return false;
        }
        if let Some(ref term) = self.search {
            let term = term.to_lowercase();
            return [&user.first_name, &user.last_name, &user.email]
                .into_iter()
                .any(|field| contains_ignore_case(field, &term));
        }
        true
    }
}

/// One page of users plus the count of all matching users.
#[derive(Debug, Clone, Default)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query() {
        let query = OrderQuery::new();
        assert!(query.user_id.is_none());
        assert!(query.status.is_none());
        assert!(query.search.is_none());
        assert!(query.limit.is_none());
    }

    #[test]
    fn huge_page_saturates_offset() {
        let query = OrderQuery::new().page(usize::MAX, 100);
        assert_eq!(query.offset, Some(usize::MAX));
    }

    #[test]
    fn query_for_user() {
        let query = OrderQuery::for_user(UserId::new(9));
        assert_eq!(query.user_id, Some(UserId::new(9)));
    }

    #[test]
    fn query_builder_chain() {
        let query = OrderQuery::new()
            .status(OrderStatus::Shipped)
            .payment_status(PaymentStatus::Paid)
            .search("  ORD-2025 ")
            .page(3, 10);

        assert_eq!(query.status, Some(OrderStatus::Shipped));
        assert_eq!(query.payment_status, Some(PaymentStatus::Paid));
        assert_eq!(query.search.as_deref(), Some("ORD-2025"));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));
    }

    #[test]
    fn blank_search_is_ignored() {
        assert!(OrderQuery::new().search("   ").search.is_none());
    }

    #[test]
    fn page_zero_is_first_page() {
        let query = OrderQuery::new().page(0, 5);
        assert_eq!(query.offset, Some(0));
    }

    fn product(name: &str, price: i64, is_active: bool, category: Option<i64>) -> Product {
        let now = chrono::Utc::now();
        Product {
            id: common::ProductId::new(1),
            category_id: category.map(CategoryId::new),
            name: name.to_string(),
            description: "Single origin".to_string(),
            price: Money::new(price),
            stock: 5,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn product_query_filters() {
        let kopi = product("Kopi Toraja", 85_000, true, Some(2));

        assert!(ProductQuery::active().matches(&kopi));
        assert!(!ProductQuery::active().matches(&product("Old", 1, false, None)));
        assert!(ProductQuery::all().matches(&product("Old", 1, false, None)));

        assert!(ProductQuery::all().category(CategoryId::new(2)).matches(&kopi));
        assert!(!ProductQuery::all().category(CategoryId::new(3)).matches(&kopi));

        assert!(ProductQuery::all().search("toraja").matches(&kopi));
        assert!(ProductQuery::all().search("ORIGIN").matches(&kopi));
        assert!(!ProductQuery::all().search("teh").matches(&kopi));

        let in_range = ProductQuery::all().price_range(Some(Money::new(85_000)), None);
        assert!(in_range.matches(&kopi));
        let below = ProductQuery::all().price_range(None, Some(Money::new(84_999)));
        assert!(!below.matches(&kopi));
    }

    #[test]
    fn user_query_filters() {
        let now = chrono::Utc::now();
        let user = User {
            id: UserId::new(1),
            first_name: "Siti".to_string(),
            last_name: "Rahma".to_string(),
            email: "siti@example.com".to_string(),
            password_hash: String::new(),
            phone: None,
            role: Role::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        assert!(UserQuery::new().matches(&user));
        assert!(UserQuery::new().search("RAHMA").matches(&user));
        assert!(UserQuery::new().search("example.com").matches(&user));
        assert!(!UserQuery::new().search("budi").matches(&user));
        assert!(!UserQuery::new().role(Role::Admin).matches(&user));
        assert!(!UserQuery::new().is_active(false).matches(&user));
    }
}
