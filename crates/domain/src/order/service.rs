//! Order service providing the order API used by the HTTP layer.

use common::{OrderId, OrderStatus, PaymentStatus, UserId};
use store::{CommerceStore, Order, OrderQuery, OrderUpdate, StoreError};

use crate::error::CommerceError;

use super::{OrderFilter, OrderListing, StatusUpdate};
use crate::pagination::Pagination;

/// Service for reading and transitioning placed orders.
pub struct OrderService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads an order owned by `user_id`.
    ///
    /// Orders owned by someone else are reported as missing.
    #[tracing::instrument(skip(self))]
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, CommerceError> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or_else(|| not_found(order_id))
    }

    /// Returns the user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn history(&self, user_id: UserId) -> Result<Vec<Order>, CommerceError> {
        let page = self.store.list_orders(OrderQuery::for_user(user_id)).await?;
        Ok(page.orders)
    }

    /// Cancels a pending order on behalf of its owner.
    ///
    /// The pending check is repeated by the store as part of the write, so a
    /// concurrent status change cannot be overwritten.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: UserId, order_id: OrderId) -> Result<Order, CommerceError> {
        let order = self.get_for_user(user_id, order_id).await?;
        if !order.status.can_customer_cancel() {
            return Err(CommerceError::InvalidTransition {
                order_id,
                current: order.status,
                action: "cancel",
            });
        }

        let cancelled = self
            .store
            .update_order(
                order_id,
                OrderUpdate::status(OrderStatus::Cancelled),
                Some(OrderStatus::Pending),
            )
            .await
            .map_err(|e| match e {
                StoreError::StatusMismatch { actual, .. } => CommerceError::InvalidTransition {
                    order_id,
                    current: actual,
                    action: "cancel",
                },
                other => other.into(),
            })?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, order_number = %cancelled.order_number, "order cancelled by customer");
        Ok(cancelled)
    }

    /// Loads any order.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId) -> Result<Order, CommerceError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| not_found(order_id))
    }

    /// Lists orders for the back office.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: OrderFilter) -> Result<OrderListing, CommerceError> {
        let (page, limit) = filter.paging();

        let mut query = OrderQuery::new().page(page, limit);
        if let Some(status) = filter.status {
            query = query.status(status);
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.payment_status(payment_status);
        }
        if let Some(search) = filter.search {
            query = query.search(search);
        }

        let result = self.store.list_orders(query).await?;
        Ok(OrderListing {
            orders: result.orders,
            pagination: Pagination::new(page, limit, result.total),
        })
    }

    /// Overwrites the fulfillment status.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        update: StatusUpdate,
    ) -> Result<Order, CommerceError> {
        let order = self
            .store
            .update_order(
                order_id,
                OrderUpdate {
                    status: Some(update.status),
                    tracking_number: update.tracking_number,
                    notes: update.notes,
                    ..Default::default()
                },
                None,
            )
            .await?;

        tracing::info!(%order_id, status = %order.status, "order status updated");
        Ok(order)
    }

    /// Overwrites the payment status.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: OrderId,
        payment_status: PaymentStatus,
    ) -> Result<Order, CommerceError> {
        let order = self
            .store
            .update_order(order_id, OrderUpdate::payment_status(payment_status), None)
            .await?;

        tracing::info!(%order_id, payment_status = %order.payment_status, "payment status updated");
        Ok(order)
    }
}

fn not_found(order_id: OrderId) -> CommerceError {
    CommerceError::NotFound(format!("Order not found: {order_id}"))
}

#[cfg(test)]
mod tests {
    use common::{Money, PaymentMethod};
    use store::{
        CartChange, CommerceStoreExt, InMemoryStore, NewOrder, NewOrderItem, NewProduct,
        ShippingAddress,
    };

    use super::*;

    async fn place(store: &InMemoryStore, user: UserId, number: &str, city: &str) -> Order {
        let product = store
            .insert_product(NewProduct::new("Sambal", Money::new(25_000), 100))
            .await
            .unwrap();
        let cart = store.find_or_create_active_cart(user).await.unwrap();
        let cart = store
            .apply_cart_changes(
                cart.id,
                vec![CartChange::ItemAdded {
                    product_id: product.id,
                    quantity: 1,
                }],
                cart.version,
            )
            .await
            .unwrap();
        let item = NewOrderItem {
            product_id: product.id,
            quantity: 1,
            unit_price: product.price,
        };
        let order = store
            .place_order(NewOrder {
                user_id: user,
                cart_id: cart.id,
                cart_version: cart.version,
                order_number: number.to_string(),
                subtotal: item.line_total(),
                tax: Money::zero(),
                shipping_cost: Money::zero(),
                total: item.line_total(),
                payment_method: PaymentMethod::CashOnDelivery,
                address: ShippingAddress {
                    label: None,
                    address: "Jl. Pemuda 3".to_string(),
                    city: city.to_string(),
                    province: "Jawa Tengah".to_string(),
                    postal_code: "50132".to_string(),
                },
                notes: None,
                items: vec![item],
            })
            .await
            .unwrap();
        store.rotate_cart(cart.id).await.unwrap();
        order
    }

    mod customer {
        use super::*;

        #[tokio::test]
        async fn cancel_pending_order() {
            let store = InMemoryStore::new();
            let user = UserId::new(1);
            let order = place(&store, user, "ORD-1", "Semarang").await;
            let service = OrderService::new(store);

            let cancelled = service.cancel(user, order.id).await.unwrap();

            assert_eq!(cancelled.status, OrderStatus::Cancelled);
        }

        #[tokio::test]
        async fn cancel_non_pending_fails_and_keeps_status() {
            let store = InMemoryStore::new();
            let user = UserId::new(1);
            let order = place(&store, user, "ORD-1", "Semarang").await;
            let service = OrderService::new(store);
            service
                .update_status(order.id, StatusUpdate::new(OrderStatus::Shipped))
                .await
                .unwrap();

            let err = service.cancel(user, order.id).await.unwrap_err();

            assert!(matches!(
                err,
                CommerceError::InvalidTransition {
                    current: OrderStatus::Shipped,
                    action: "cancel",
                    ..
                }
            ));
            assert_eq!(
                service.get(order.id).await.unwrap().status,
                OrderStatus::Shipped
            );
        }

        #[tokio::test]
        async fn cancel_twice_fails() {
            let store = InMemoryStore::new();
            let user = UserId::new(1);
            let order = place(&store, user, "ORD-1", "Semarang").await;
            let service = OrderService::new(store);

            service.cancel(user, order.id).await.unwrap();
            let err = service.cancel(user, order.id).await.unwrap_err();
            assert!(matches!(err, CommerceError::InvalidTransition { .. }));
        }

        #[tokio::test]
        async fn other_users_orders_are_not_found() {
            let store = InMemoryStore::new();
            let order = place(&store, UserId::new(1), "ORD-1", "Semarang").await;
            let service = OrderService::new(store);
            let stranger = UserId::new(2);

            assert!(matches!(
                service.get_for_user(stranger, order.id).await,
                Err(CommerceError::NotFound(_))
            ));
            assert!(matches!(
                service.cancel(stranger, order.id).await,
                Err(CommerceError::NotFound(_))
            ));
        }

        #[tokio::test]
        async fn history_is_newest_first_and_scoped() {
            let store = InMemoryStore::new();
            let user = UserId::new(1);
            place(&store, user, "ORD-1", "Semarang").await;
            place(&store, UserId::new(2), "ORD-2", "Solo").await;
            place(&store, user, "ORD-3", "Semarang").await;
            let service = OrderService::new(store);

            let numbers: Vec<_> = service
                .history(user)
                .await
                .unwrap()
                .into_iter()
                .map(|o| o.order_number)
                .collect();
            assert_eq!(numbers, vec!["ORD-3", "ORD-1"]);
        }
    }

    mod admin {
        use super::*;

        #[tokio::test]
        async fn status_update_sets_tracking() {
            let store = InMemoryStore::new();
            let order = place(&store, UserId::new(1), "ORD-1", "Semarang").await;
            let service = OrderService::new(store);

            let updated = service
                .update_status(
                    order.id,
                    StatusUpdate {
                        status: OrderStatus::Shipped,
                        tracking_number: Some("JNE-42".to_string()),
                        notes: None,
                    },
                )
                .await
                .unwrap();

            assert_eq!(updated.status, OrderStatus::Shipped);
            assert_eq!(updated.tracking_number.as_deref(), Some("JNE-42"));
        }

        #[tokio::test]
        async fn payment_update_is_unconditional() {
            let store = InMemoryStore::new();
            let order = place(&store, UserId::new(1), "ORD-1", "Semarang").await;
            let service = OrderService::new(store);

            let updated = service
                .update_payment_status(order.id, PaymentStatus::Paid)
                .await
                .unwrap();
            assert_eq!(updated.payment_status, PaymentStatus::Paid);
        }

        #[tokio::test]
        async fn missing_order_is_not_found() {
            let service = OrderService::new(InMemoryStore::new());
            let err = service
                .update_payment_status(OrderId::new(99), PaymentStatus::Paid)
                .await
                .unwrap_err();
            assert!(matches!(err, CommerceError::NotFound(_)));
        }

        #[tokio::test]
        async fn list_filters_and_paginates() {
            let store = InMemoryStore::new();
            for n in 1..=3 {
                place(&store, UserId::new(1), &format!("ORD-{n}"), "Semarang").await;
            }
            place(&store, UserId::new(2), "ORD-4", "Surabaya").await;
            let service = OrderService::new(store);

            let listing = service
                .list(OrderFilter {
                    limit: Some(2),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(listing.orders.len(), 2);
            assert_eq!(listing.pagination.total, 4);
            assert_eq!(listing.pagination.total_pages, 2);

            let listing = service
                .list(OrderFilter {
                    search: Some("surabaya".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(listing.orders.len(), 1);
            assert_eq!(listing.orders[0].order_number, "ORD-4");
        }
    }
}
