//! Integration tests for the cart → checkout → order workflow.
//!
//! These tests drive the services together against the in-memory store,
//! including concurrent callers racing on the same cart and stock.

use std::collections::HashSet;

use chrono::Duration;
use common::{Money, OrderStatus, PaymentMethod, ProductId, UserId};
use domain::{
    AuthService, CartService, CheckoutRequest, CheckoutService, CommerceError, Credentials,
    OrderService, Registration, StatusUpdate, TokenIssuer,
};
use futures_util::future::join_all;
use serde_json::json;
use store::{
    CommerceStore, CommerceStoreExt, InMemoryStore, NewProduct, ProductUpdate, ShippingAddress,
};

async fn seed_product(store: &InMemoryStore, name: &str, price: i64, stock: u32) -> ProductId {
    store
        .insert_product(NewProduct::new(name, Money::new(price), stock))
        .await
        .unwrap()
        .id
}

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: ShippingAddress {
            label: Some("home".to_string()),
            address: "Jl. Gajah Mada 8".to_string(),
            city: "Medan".to_string(),
            province: "Sumatera Utara".to_string(),
            postal_code: "20112".to_string(),
        },
        payment_method: PaymentMethod::CashOnDelivery,
        notes: None,
    }
}

mod workflow {
    use super::*;

    #[tokio::test]
    async fn login_merge_checkout_and_cancel() {
        let store = InMemoryStore::new();
        let tea = seed_product(&store, "Teh Tarik", 100_000, 10).await;
        let coffee = seed_product(&store, "Kopi Luwak", 50_000, 10).await;

        let auth = AuthService::new(
            store.clone(),
            TokenIssuer::new("integration", Duration::hours(1)),
        );
        let user = auth
            .register(Registration {
                first_name: "Ayu".to_string(),
                last_name: "Lestari".to_string(),
                email: "ayu@example.com".to_string(),
                password: "kopi-enak".to_string(),
                phone: None,
            })
            .await
            .unwrap()
            .user;

        let login = auth
            .login(Credentials {
                email: "ayu@example.com".to_string(),
                password: "kopi-enak".to_string(),
                guest_cart: json!([{"product_id": tea.as_i64(), "quantity": 2}]),
            })
            .await
            .unwrap();
        assert_eq!(login.guest_cart.unwrap().inserted(), 1);

        let carts = CartService::new(store.clone());
        carts.add_item(user.id, tea, 1).await.unwrap();
        carts.add_item(user.id, coffee, 1).await.unwrap();

        let summary = carts.summary(user.id).await.unwrap();
        assert_eq!(summary.totals.subtotal, Money::new(350_000));
        assert_eq!(summary.totals.tax, Money::new(38_500));
        assert_eq!(summary.totals.shipping, Money::zero());
        assert_eq!(summary.totals.total_items, 4);

        let receipt = CheckoutService::new(store.clone())
            .checkout(user.id, checkout_request())
            .await
            .unwrap();
        assert_eq!(receipt.total_amount, Money::new(395_000));

        let view = carts.get_cart(user.id).await.unwrap();
        assert!(view.cart_items.is_empty());
        assert!(view.is_active);

        let orders = OrderService::new(store.clone());
        let history = orders.history(user.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].items.len(), 2);

        let cancelled = orders.cancel(user.id, receipt.order_id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn price_change_after_checkout_leaves_order_untouched() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, "Gudeg", 100_000, 10).await;
        let user = UserId::new(1);
        CartService::new(store.clone())
            .add_item(user, product, 3)
            .await
            .unwrap();

        let receipt = CheckoutService::new(store.clone())
            .checkout(user, checkout_request())
            .await
            .unwrap();
        store
            .update_product(
                product,
                ProductUpdate {
                    price: Some(Money::new(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let order = store.require_order(receipt.order_id).await.unwrap();
        assert_eq!(order.subtotal, Money::new(300_000));
        assert_eq!(order.tax, Money::new(30_000));
        assert_eq!(order.total, Money::new(340_000));
        assert_eq!(order.items[0].unit_price, Money::new(100_000));
    }

    #[tokio::test]
    async fn cancel_after_processing_keeps_status() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, "Pempek", 30_000, 10).await;
        let user = UserId::new(1);
        CartService::new(store.clone())
            .add_item(user, product, 1)
            .await
            .unwrap();
        let receipt = CheckoutService::new(store.clone())
            .checkout(user, checkout_request())
            .await
            .unwrap();

        let orders = OrderService::new(store.clone());
        orders
            .update_status(receipt.order_id, StatusUpdate::new(OrderStatus::Processing))
            .await
            .unwrap();

        let err = orders.cancel(user, receipt.order_id).await.unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        let order = orders.get(receipt.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_adds_of_same_product_merge_into_one_line() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, "Bakso", 15_000, 10).await;
        let user = UserId::new(1);
        let carts = CartService::new(store.clone());

        let results = join_all((0..2).map(|_| carts.add_item(user, product, 2))).await;

        assert!(results.iter().all(Result::is_ok));
        let cart = store.get_active_cart(user).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 4);
    }

    #[tokio::test]
    async fn concurrent_checkouts_get_unique_order_numbers() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, "Soto", 20_000, 100).await;
        let users: Vec<UserId> = (1..=10).map(UserId::new).collect();
        let carts = CartService::new(store.clone());
        for &user in &users {
            carts.add_item(user, product, 1).await.unwrap();
        }

        let checkout = CheckoutService::new(store.clone());
        let receipts = join_all(
            users
                .iter()
                .map(|&user| checkout.checkout(user, checkout_request())),
        )
        .await;

        let numbers: HashSet<String> = receipts
            .into_iter()
            .map(|r| r.unwrap().order_number)
            .collect();
        assert_eq!(numbers.len(), users.len());
        assert_eq!(store.order_count().await, users.len());
    }

    #[tokio::test]
    async fn stock_is_never_oversold() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, "Martabak", 40_000, 3).await;
        let users: Vec<UserId> = (1..=5).map(UserId::new).collect();
        let carts = CartService::new(store.clone());
        for &user in &users {
            carts.add_item(user, product, 1).await.unwrap();
        }

        let checkout = CheckoutService::new(store.clone());
        let results = join_all(
            users
                .iter()
                .map(|&user| checkout.checkout(user, checkout_request())),
        )
        .await;

        let placed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(placed, 3);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, CommerceError::InsufficientStock { .. }))
        );
        let stock = store.get_product(product).await.unwrap().unwrap().stock;
        assert_eq!(stock, 0);
    }

    #[tokio::test]
    async fn double_submitted_checkout_places_one_order() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, "Nasi Uduk", 25_000, 10).await;
        let user = UserId::new(1);
        CartService::new(store.clone())
            .add_item(user, product, 2)
            .await
            .unwrap();

        let checkout = CheckoutService::new(store.clone());
        let results = join_all([
            checkout.checkout(user, checkout_request()),
            checkout.checkout(user, checkout_request()),
        ])
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.order_count().await, 1);
        let stock = store.get_product(product).await.unwrap().unwrap().stock;
        assert_eq!(stock, 8);
    }
}
