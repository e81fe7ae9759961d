//! Cart aggregate implementation.

use common::{CartId, CartItemId, ProductId, UserId};
use store::{Cart, CartChange, CartItem, Product, Version};

use super::CartError;

/// Cart aggregate root.
///
/// Wraps a loaded cart and decides which changes a command produces. It
/// never writes; the command handler persists the changes against the
/// version the aggregate was loaded at.
#[derive(Debug, Clone)]
pub struct CartAggregate {
    cart: Cart,
}

impl CartAggregate {
    pub fn new(cart: Cart) -> Self {
        Self { cart }
    }

    pub fn into_cart(self) -> Cart {
        self.cart
    }
}

// Query methods
impl CartAggregate {
    pub fn id(&self) -> CartId {
        self.cart.id
    }

    pub fn user_id(&self) -> UserId {
        self.cart.user_id
    }

    pub fn version(&self) -> Version {
        self.cart.version
    }

    pub fn items(&self) -> &[CartItem] {
        &self.cart.items
    }

    /// Returns the line holding a product, if any.
    pub fn line_for(&self, product_id: ProductId) -> Option<&CartItem> {
        self.cart.items.iter().find(|i| i.product_id == product_id)
    }

    /// Returns a line by its id.
    pub fn line(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.cart.items.iter().find(|i| i.id == item_id)
    }

    pub fn is_empty(&self) -> bool {
        self.cart.items.is_empty()
    }

    /// Returns the total quantity across all lines.
    pub fn total_items(&self) -> u32 {
        self.cart
            .items
            .iter()
            .fold(0u32, |total, i| total.saturating_add(i.quantity))
    }
}

// Command methods (return changes)
impl CartAggregate {
    /// Adds a quantity of a product.
    ///
    /// An existing line for the product absorbs the quantity; the combined
    /// quantity must still fit within stock or the line is left untouched.
    pub fn add_item(&self, product: &Product, quantity: u32) -> Result<Vec<CartChange>, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        if !product.is_active {
            return Err(CartError::ProductUnavailable(product.id));
        }

        match self.line_for(product.id) {
            Some(existing) => {
                let combined = existing.quantity.saturating_add(quantity);
                if !product.has_stock_for(combined) {
                    return Err(CartError::InsufficientStock {
                        product_id: product.id,
                        requested: combined,
                        available: product.stock,
                    });
                }
                Ok(vec![CartChange::QuantityChanged {
                    item_id: existing.id,
                    quantity: combined,
                }])
            }
            None => {
                if !product.has_stock_for(quantity) {
                    return Err(CartError::InsufficientStock {
                        product_id: product.id,
                        requested: quantity,
                        available: product.stock,
                    });
                }
                Ok(vec![CartChange::ItemAdded {
                    product_id: product.id,
                    quantity,
                }])
            }
        }
    }

    /// Overwrites the quantity of a line.
    pub fn update_quantity(
        &self,
        item_id: CartItemId,
        product: &Product,
        quantity: u32,
    ) -> Result<Vec<CartChange>, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let line = self.line(item_id).ok_or(CartError::ItemNotFound(item_id))?;
        if !product.has_stock_for(quantity) {
            return Err(CartError::InsufficientStock {
                product_id: product.id,
                requested: quantity,
                available: product.stock,
            });
        }

        if line.quantity == quantity {
            return Ok(vec![]);
        }
        Ok(vec![CartChange::QuantityChanged { item_id, quantity }])
    }

    /// Removes a line. Removing a line that is already gone is a no-op.
    pub fn remove_item(&self, item_id: CartItemId) -> Vec<CartChange> {
        match self.line(item_id) {
            Some(_) => vec![CartChange::ItemRemoved { item_id }],
            None => vec![],
        }
    }

    /// Removes every line. The cart itself stays active.
    pub fn clear(&self) -> Vec<CartChange> {
        if self.is_empty() {
            vec![]
        } else {
            vec![CartChange::Cleared]
        }
    }
}
