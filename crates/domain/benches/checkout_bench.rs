use common::{Money, PaymentMethod, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CartService, CheckoutRequest, CheckoutService, GuestCartMerger, PricingPolicy};
use serde_json::json;
use store::{CommerceStore, InMemoryStore, NewProduct, ShippingAddress};

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: ShippingAddress {
            label: None,
            address: "Jl. Asia Afrika 65".to_string(),
            city: "Bandung".to_string(),
            province: "Jawa Barat".to_string(),
            postal_code: "40111".to_string(),
        },
        payment_method: PaymentMethod::BankTransfer,
        notes: None,
    }
}

fn bench_quote(c: &mut Criterion) {
    let lines: Vec<(Money, u32)> = (1..=50).map(|i| (Money::new(1_000 * i), 2)).collect();
    let policy = PricingPolicy::checkout();

    c.bench_function("pricing/quote_50_lines", |b| {
        b.iter(|| policy.quote(lines.iter().copied()));
    });
}

fn bench_add_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product = rt.block_on(async {
        store
            .insert_product(NewProduct::new("Bench", Money::new(1_000), u32::MAX))
            .await
            .unwrap()
    });
    let carts = CartService::new(store);

    c.bench_function("cart/add_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                carts.add_item(UserId::new(1), product.id, 1).await.unwrap();
            });
        });
    });
}

fn bench_guest_merge(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let entries: Vec<_> = rt.block_on(async {
        let mut entries = Vec::new();
        for i in 0..10 {
            let product = store
                .insert_product(NewProduct::new(format!("P{i}"), Money::new(500), u32::MAX))
                .await
                .unwrap();
            entries.push(json!({"product_id": product.id.as_i64(), "quantity": "1"}));
        }
        entries
    });
    let merger = GuestCartMerger::new(store);

    c.bench_function("guest_cart/merge_10_entries", |b| {
        b.iter(|| {
            rt.block_on(async {
                merger.merge(UserId::new(1), &entries).await;
            });
        });
    });
}

fn bench_full_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkout/add_and_checkout", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let product = store
                    .insert_product(NewProduct::new("Bench", Money::new(25_000), 10))
                    .await
                    .unwrap();
                let user = UserId::new(1);
                CartService::new(store.clone())
                    .add_item(user, product.id, 2)
                    .await
                    .unwrap();
                CheckoutService::new(store)
                    .checkout(user, checkout_request())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_quote,
    bench_add_item,
    bench_guest_merge,
    bench_full_checkout,
);
criterion_main!(benches);
