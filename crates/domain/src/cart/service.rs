//! Cart service providing the cart API used by the HTTP layer.

use common::{CartItemId, ProductId, UserId};
use store::{Cart, CartItem, CommerceStore};

use crate::command::CommandHandler;
use crate::error::CommerceError;
use crate::pricing::PricingPolicy;

use super::{CartLine, CartSummary, CartView};

/// Service for managing a user's active cart.
///
/// Every mutation goes through the command handler, so it is applied against
/// the cart version it was computed from.
pub struct CartService<S: CommerceStore> {
    handler: CommandHandler<S>,
    pricing: PricingPolicy,
}

impl<S: CommerceStore> CartService<S> {
    /// Creates a new cart service using the summary pricing policy.
    pub fn new(store: S) -> Self {
        Self::with_pricing(store, PricingPolicy::cart_summary())
    }

    pub fn with_pricing(store: S, pricing: PricingPolicy) -> Self {
        Self {
            handler: CommandHandler::new(store),
            pricing,
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S> {
        &self.handler
    }

    fn store(&self) -> &S {
        self.handler.store()
    }

    /// Returns the active cart with each line joined to its product.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartView, CommerceError> {
        let cart = self.handler.load(user_id).await?.into_cart();
        let cart_items = self.lines(&cart).await?;

        Ok(CartView {
            id: cart.id,
            user_id: cart.user_id,
            is_active: cart.is_active,
            version: cart.version,
            cart_items,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
        })
    }

    /// Adds a product to the active cart and returns the resulting line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem, CommerceError> {
        if quantity == 0 {
            return Err(CommerceError::validation("Quantity must be greater than 0"));
        }

        let product = self
            .store()
            .get_product(product_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {product_id}")))?;

        let result = self
            .handler
            .execute(user_id, |cart| cart.add_item(&product, quantity))
            .await?;

        result
            .cart
            .items
            .into_iter()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| CommerceError::InvalidState("Cart line missing after add".to_string()))
    }

    /// Overwrites the quantity of one of the user's cart lines.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, CommerceError> {
        if quantity == 0 {
            return Err(CommerceError::validation("Quantity must be greater than 0"));
        }

        let found = self
            .store()
            .find_cart_item(item_id)
            .await?
            .filter(|found| found.cart_is_active)
            .ok_or_else(|| CommerceError::NotFound(format!("Cart item not found: {item_id}")))?;
        if found.owner != user_id {
            return Err(CommerceError::Forbidden(
                "Cart item belongs to another user".to_string(),
            ));
        }

        let product_id = found.item.product_id;
        let product = self
            .store()
            .get_product(product_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {product_id}")))?;

        let result = self
            .handler
            .execute(user_id, |cart| cart.update_quantity(item_id, &product, quantity))
            .await?;

        result
            .cart
            .items
            .into_iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CommerceError::NotFound(format!("Cart item not found: {item_id}")))
    }

    /// Removes a line. Succeeds if the line is already gone.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<(), CommerceError> {
        if let Some(found) = self.store().find_cart_item(item_id).await?
            && found.owner != user_id
        {
            return Err(CommerceError::Forbidden(
                "Cart item belongs to another user".to_string(),
            ));
        }

        self.handler
            .execute(user_id, |cart| Ok(cart.remove_item(item_id)))
            .await?;
        Ok(())
    }

    /// Removes every line from the active cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<(), CommerceError> {
        self.handler.execute(user_id, |cart| Ok(cart.clear())).await?;
        Ok(())
    }

    /// Computes advisory totals for the active cart from current prices.
    #[tracing::instrument(skip(self))]
    pub async fn summary(&self, user_id: UserId) -> Result<CartSummary, CommerceError> {
        let cart = self.handler.load(user_id).await?.into_cart();
        let cart_items = self.lines(&cart).await?;
        let totals = self
            .pricing
            .quote(cart_items.iter().map(|l| (l.product.price, l.item.quantity)))?;

        Ok(CartSummary { totals, cart_items })
    }

    async fn lines(&self, cart: &Cart) -> Result<Vec<CartLine>, CommerceError> {
        let ids: Vec<ProductId> = cart.items.iter().map(|i| i.product_id).collect();
        let mut products = self.store().get_products(&ids).await?;

        Ok(cart
            .items
            .iter()
            .filter_map(|item| match products.remove(&item.product_id) {
                Some(product) => Some(CartLine {
                    item: item.clone(),
                    product,
                }),
                None => {
                    tracing::warn!(item_id = %item.id, product_id = %item.product_id, "cart line references a missing product");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use store::{InMemoryStore, NewProduct};

    use super::*;

    async fn setup(price: i64, stock: u32) -> (CartService<InMemoryStore>, InMemoryStore, ProductId) {
        let store = InMemoryStore::new();
        let product = store
            .insert_product(NewProduct::new("Lumpia", Money::new(price), stock))
            .await
            .unwrap();
        (CartService::new(store.clone()), store, product.id)
    }

    #[tokio::test]
    async fn test_other_users_cannot_update_a_line() {
        let (carts, store, product) = setup(12_000, 10).await;
        let owner = UserId::new(1);
        let item = carts.add_item(owner, product, 2).await.unwrap();

        let err = carts
            .update_item(UserId::new(2), item.id, 7)
            .await
            .unwrap_err();

        assert!(matches!(err, CommerceError::Forbidden(_)));
        let cart = store.get_active_cart(owner).await.unwrap().unwrap();
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_other_users_cannot_remove_a_line() {
        let (carts, store, product) = setup(12_000, 10).await;
        let owner = UserId::new(1);
        let item = carts.add_item(owner, product, 2).await.unwrap();

        let err = carts
            .remove_item(UserId::new(2), item.id)
            .await
            .unwrap_err();

        assert!(matches!(err, CommerceError::Forbidden(_)));
        let cart = store.get_active_cart(owner).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_remove_missing_line_is_idempotent() {
        let (carts, _, product) = setup(12_000, 10).await;
        let user = UserId::new(1);
        let item = carts.add_item(user, product, 1).await.unwrap();

        carts.remove_item(user, item.id).await.unwrap();
        carts.remove_item(user, item.id).await.unwrap();

        assert!(carts.get_cart(user).await.unwrap().cart_items.is_empty());
    }

    #[tokio::test]
    async fn test_summary_with_oversized_price_is_a_validation_error() {
        let (carts, _, product) = setup(2_000_000_000_000_000_000, 5).await;
        let user = UserId::new(1);
        carts.add_item(user, product, 1).await.unwrap();
        let summary = carts.summary(user).await.unwrap();
        assert_eq!(summary.totals.total, Money::new(2_220_000_000_000_000_000));

        carts.add_item(user, product, 4).await.unwrap();
        let err = carts.summary(user).await.unwrap_err();
        assert_eq!(err.code(), "validation");
    }
}
