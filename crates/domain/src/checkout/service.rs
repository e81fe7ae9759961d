//! Checkout service: cart → order.

use std::time::Instant;

use chrono::Utc;
use common::{CartId, ProductId, UserId};
use store::{
    CommerceStore, NewOrder, NewOrderItem, Order, StoreError, error::ORDERS_ORDER_NUMBER_KEY,
};

use crate::error::CommerceError;
use crate::pricing::PricingPolicy;

use super::{CheckoutReceipt, CheckoutRequest, DailyOrderNumbers, OrderNumberGenerator};

/// Attempts at allocating an order number before giving up.
pub const MAX_ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Converts a user's active cart into an order.
///
/// The order, its items, the shipping address, the stock decrements and the
/// claim on the cart are written in one store transaction. Retiring the
/// consumed cart happens afterwards and may fail without affecting the
/// order.
pub struct CheckoutService<S, G = DailyOrderNumbers>
where
    S: CommerceStore,
    G: OrderNumberGenerator,
{
    store: S,
    pricing: PricingPolicy,
    numbers: G,
}

impl<S: CommerceStore> CheckoutService<S> {
    /// Creates a checkout service with the default pricing and order numbers.
    pub fn new(store: S) -> Self {
        Self::with_pricing(store, PricingPolicy::checkout())
    }

    pub fn with_pricing(store: S, pricing: PricingPolicy) -> Self {
        Self {
            store,
            pricing,
            numbers: DailyOrderNumbers,
        }
    }
}

impl<S, G> CheckoutService<S, G>
where
    S: CommerceStore,
    G: OrderNumberGenerator,
{
    /// Replaces the order number generator.
    pub fn with_order_numbers<H: OrderNumberGenerator>(self, numbers: H) -> CheckoutService<S, H> {
        CheckoutService {
            store: self.store,
            pricing: self.pricing,
            numbers,
        }
    }

    /// Places an order for everything in the user's active cart.
    #[tracing::instrument(skip(self, request), fields(payment_method = %request.payment_method))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, CommerceError> {
        let started = Instant::now();

        let (order, cart_id) = match self.place(user_id, request).await {
            Ok(placed) => placed,
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.code()).increment(1);
                tracing::warn!(%user_id, error = %e, "checkout failed");
                return Err(e);
            }
        };

        metrics::counter!("checkout_orders_created_total").increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            %user_id,
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "order created"
        );

        self.retire_cart(user_id, cart_id).await;
        Ok(CheckoutReceipt::from(&order))
    }

    async fn place(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<(Order, CartId), CommerceError> {
        validate_request(&request)?;

        let cart = self
            .store
            .get_active_cart(user_id)
            .await?
            .filter(|cart| !cart.items.is_empty())
            .ok_or(CommerceError::EmptyCart)?;

        let ids: Vec<ProductId> = cart.items.iter().map(|i| i.product_id).collect();
        let products = self.store.get_products(&ids).await?;

        // One price snapshot feeds both the totals and the order items
        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            let product = products
                .get(&line.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    CommerceError::InvalidState(format!(
                        "Product {} in cart is no longer available",
                        line.product_id
                    ))
                })?;
            if !product.has_stock_for(line.quantity) {
                return Err(CommerceError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock,
                });
            }
            items.push(NewOrderItem {
                product_id: product.id,
                quantity: line.quantity,
                unit_price: product.price,
            });
        }

        let totals = self
            .pricing
            .quote(items.iter().map(|i| (i.unit_price, i.quantity)))?;

        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            let order_number = self.numbers.generate(Utc::now());
            let new_order = NewOrder {
                user_id,
                cart_id: cart.id,
                cart_version: cart.version,
                order_number: order_number.clone(),
                subtotal: totals.subtotal,
                tax: totals.tax,
                shipping_cost: totals.shipping,
                total: totals.total,
                payment_method: request.payment_method,
                address: request.shipping_address.clone(),
                notes: request.notes.clone(),
                items: items.clone(),
            };

            match self.store.place_order(new_order).await {
                Ok(order) => return Ok((order, cart.id)),
                Err(e) if e.is_unique_violation(ORDERS_ORDER_NUMBER_KEY) => {
                    metrics::counter!("order_number_collisions_total").increment(1);
                    tracing::warn!(attempt, %order_number, "order number collision");
                }
                Err(StoreError::ConcurrencyConflict { .. } | StoreError::CartInactive(_)) => {
                    return Err(CommerceError::Conflict(
                        "Cart changed during checkout, please review it and try again".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CommerceError::Conflict(
            "Could not allocate a unique order number".to_string(),
        ))
    }

    async fn retire_cart(&self, user_id: UserId, cart_id: CartId) {
        if let Err(e) = self.store.rotate_cart(cart_id).await {
            metrics::counter!("cart_rotation_failures_total").increment(1);
            tracing::error!(%user_id, %cart_id, error = %e, "failed to rotate cart after checkout");
        }
    }
}

fn validate_request(request: &CheckoutRequest) -> Result<(), CommerceError> {
    let address = &request.shipping_address;
    for (field, value) in [
        ("address", &address.address),
        ("city", &address.city),
        ("province", &address.province),
        ("postal_code", &address.postal_code),
    ] {
        if value.trim().is_empty() {
            return Err(CommerceError::validation(format!(
                "Shipping address {field} is required"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chrono::DateTime;
    use common::{Money, OrderStatus, PaymentMethod, PaymentStatus};
    use store::{CommerceStoreExt, InMemoryStore, NewProduct, Product, ProductUpdate, ShippingAddress};

    use super::*;
    use crate::cart::CartService;

    /// Hands out preset numbers in order, repeating the last one.
    struct ScriptedNumbers(Mutex<VecDeque<String>>);

    impl ScriptedNumbers {
        fn new(numbers: &[&str]) -> Self {
            Self(Mutex::new(numbers.iter().map(|n| n.to_string()).collect()))
        }
    }

    impl OrderNumberGenerator for ScriptedNumbers {
        fn generate(&self, _now: DateTime<Utc>) -> String {
            let mut numbers = self.0.lock().unwrap();
            if numbers.len() > 1 {
                numbers.pop_front().unwrap()
            } else {
                numbers.front().cloned().unwrap()
            }
        }
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            shipping_address: ShippingAddress {
                label: Some("home".to_string()),
                address: "Jl. Braga 12".to_string(),
                city: "Bandung".to_string(),
                province: "Jawa Barat".to_string(),
                postal_code: "40111".to_string(),
            },
            payment_method: PaymentMethod::BankTransfer,
            notes: Some("leave at the gate".to_string()),
        }
    }

    async fn seed(store: &InMemoryStore, price: i64, stock: u32) -> Product {
        store
            .insert_product(NewProduct::new("Kopi Gayo", Money::new(price), stock))
            .await
            .unwrap()
    }

    async fn fill_cart(store: &InMemoryStore, user: UserId, product: &Product, quantity: u32) {
        CartService::new(store.clone())
            .add_item(user, product.id, quantity)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn checkout_creates_order_and_rotates_cart() {
        let store = InMemoryStore::new();
        let product = seed(&store, 150_000, 5).await;
        let user = UserId::new(1);
        fill_cart(&store, user, &product, 2).await;

        let receipt = CheckoutService::new(store.clone())
            .checkout(user, request())
            .await
            .unwrap();

        assert_eq!(receipt.status, OrderStatus::Pending);
        assert_eq!(receipt.total_amount, Money::new(340_000));
        assert_eq!(receipt.payment_method, PaymentMethod::BankTransfer);
        assert!(receipt.order_number.starts_with("ORD-"));

        let order = store.require_order(receipt.order_id).await.unwrap();
        assert_eq!(order.subtotal, Money::new(300_000));
        assert_eq!(order.tax, Money::new(30_000));
        assert_eq!(order.shipping_cost, Money::new(10_000));
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(
            order.shipping_address,
            "Jl. Braga 12, Bandung, Jawa Barat, 40111"
        );
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].unit_price, Money::new(150_000));
        assert_eq!(order.items[0].line_total, Money::new(300_000));

        let stock = store.get_product(product.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 3);

        let carts = store.carts_for_user(user).await;
        assert_eq!(carts.len(), 2);
        assert!(!carts[0].is_active);
        assert!(carts[1].is_active && carts[1].items.is_empty());
        assert_eq!(store.addresses_for_user(user).await.len(), 1);
    }

    #[tokio::test]
    async fn checkout_without_cart_is_empty_cart() {
        let store = InMemoryStore::new();
        let err = CheckoutService::new(store.clone())
            .checkout(UserId::new(1), request())
            .await
            .unwrap_err();

        assert!(matches!(err, CommerceError::EmptyCart));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn checkout_with_unrepresentable_total_places_nothing() {
        let store = InMemoryStore::new();
        let product = seed(&store, 5_000_000_000_000_000_000, 3).await;
        let user = UserId::new(1);
        fill_cart(&store, user, &product, 2).await;

        let err = CheckoutService::new(store.clone())
            .checkout(user, request())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "validation");
        assert_eq!(store.order_count().await, 0);
        let stock = store.get_product(product.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 3);
    }

    #[tokio::test]
    async fn checkout_with_empty_active_cart_is_empty_cart() {
        let store = InMemoryStore::new();
        let user = UserId::new(1);
        store.find_or_create_active_cart(user).await.unwrap();

        let err = CheckoutService::new(store)
            .checkout(user, request())
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::EmptyCart));
    }

    #[tokio::test]
    async fn blank_address_field_is_rejected() {
        let store = InMemoryStore::new();
        let mut request = request();
        request.shipping_address.city = "  ".to_string();

        let err = CheckoutService::new(store)
            .checkout(UserId::new(1), request)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));
    }

    #[tokio::test]
    async fn stock_shortfall_fails_without_writing() {
        let store = InMemoryStore::new();
        let product = seed(&store, 20_000, 5).await;
        let user = UserId::new(1);
        fill_cart(&store, user, &product, 4).await;
        store
            .update_product(
                product.id,
                ProductUpdate {
                    stock: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = CheckoutService::new(store.clone())
            .checkout(user, request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommerceError::InsufficientStock {
                requested: 4,
                available: 2,
                ..
            }
        ));
        assert_eq!(store.order_count().await, 0);
        let cart = store.get_active_cart(user).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);
    }

    #[tokio::test]
    async fn deactivated_product_is_invalid_state() {
        let store = InMemoryStore::new();
        let product = seed(&store, 20_000, 5).await;
        let user = UserId::new(1);
        fill_cart(&store, user, &product, 1).await;
        store
            .update_product(
                product.id,
                ProductUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = CheckoutService::new(store)
            .checkout(user, request())
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn order_number_collision_is_retried() {
        let store = InMemoryStore::new();
        let product = seed(&store, 10_000, 10).await;
        let first = UserId::new(1);
        let second = UserId::new(2);
        fill_cart(&store, first, &product, 1).await;
        fill_cart(&store, second, &product, 1).await;

        CheckoutService::new(store.clone())
            .with_order_numbers(ScriptedNumbers::new(&["ORD-20250101-aaaaaaaa"]))
            .checkout(first, request())
            .await
            .unwrap();

        let receipt = CheckoutService::new(store.clone())
            .with_order_numbers(ScriptedNumbers::new(&[
                "ORD-20250101-aaaaaaaa",
                "ORD-20250101-bbbbbbbb",
            ]))
            .checkout(second, request())
            .await
            .unwrap();

        assert_eq!(receipt.order_number, "ORD-20250101-bbbbbbbb");
        assert_eq!(store.order_count().await, 2);
    }

    #[tokio::test]
    async fn exhausted_order_numbers_is_conflict() {
        let store = InMemoryStore::new();
        let product = seed(&store, 10_000, 10).await;
        let first = UserId::new(1);
        let second = UserId::new(2);
        fill_cart(&store, first, &product, 1).await;
        fill_cart(&store, second, &product, 1).await;
        let numbers = || ScriptedNumbers::new(&["ORD-20250101-aaaaaaaa"]);

        CheckoutService::new(store.clone())
            .with_order_numbers(numbers())
            .checkout(first, request())
            .await
            .unwrap();
        let err = CheckoutService::new(store.clone())
            .with_order_numbers(numbers())
            .checkout(second, request())
            .await
            .unwrap_err();

        assert!(matches!(err, CommerceError::Conflict(_)));
        assert_eq!(store.order_count().await, 1);
        let stock = store.get_product(product.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 9);
    }

    #[tokio::test]
    async fn rotation_failure_does_not_fail_checkout() {
        let store = InMemoryStore::new();
        let product = seed(&store, 10_000, 10).await;
        let user = UserId::new(1);
        fill_cart(&store, user, &product, 1).await;
        store.set_fail_on_rotate(true);

        let receipt = CheckoutService::new(store.clone())
            .checkout(user, request())
            .await
            .unwrap();

        assert!(store.require_order(receipt.order_id).await.is_ok());
        let carts = store.carts_for_user(user).await;
        assert_eq!(carts.len(), 1);
        assert!(carts[0].is_active);
    }
}
